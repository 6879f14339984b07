//! Transactional key-value substrate
//!
//! `Transaction` is the contract the host store provides: point reads and
//! writes, clears, a commutative little-endian add, and ordered range reads.
//! `MemoryKv` is an in-memory implementation with optimistic conflict
//! detection, used by the CLI and tests.

mod errors;
mod memory;
mod transaction;

pub use errors::{KvError, KvResult, Retryable};
pub use memory::{MemoryKv, MemoryTransaction};
pub use transaction::{add_little_endian, key_after, KeyRange, KeyValue, Transaction};
