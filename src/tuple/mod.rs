//! Ordered key codec
//!
//! Referenced keys and index namespaces are tuples packed into bytes whose
//! lexicographic order matches the order of the values. Everything the
//! refcount index writes lives under a `Subspace` derived from the index's
//! assigned namespace.

mod element;
mod errors;
mod subspace;

pub use element::Element;
pub use errors::{TupleError, TupleResult};
pub use subspace::{Subspace, Tuple};
