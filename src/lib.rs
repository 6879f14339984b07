//! aerodb-refcount - reference-count secondary index for an ordered
//! transactional key-value store
//!
//! For every referenced key (a product, a bucket) the index keeps the number
//! of live owning records (invoices, objects) that reference it. Counters
//! are maintained inside the host's record transactions: increments are
//! blind atomic adds, decrements are read-modify-write and leave a zero
//! marker when the count reaches zero.

pub mod cli;
pub mod index;
pub mod kv;
pub mod observability;
pub mod record;
pub mod store;
pub mod tuple;
