//! Refcount index subsystem
//!
//! Keeps, for every referenced key, the number of live owning records that
//! reference it. The index is derived state: it lives in the host's
//! keyspace and is changed only inside the host's record transactions.
//!
//! # Invariants
//!
//! - A key is held by at most one of the live and zero-marker regions
//! - A live count is always >= 1
//! - Increments never read; decrements always read
//! - An update either applies every counter operation or fails

mod config;
mod counter;
mod errors;
mod factory;
mod keyspace;
mod maintainer;
mod scanner;

pub use config::{CollisionPolicy, RefcountIndexConfig};
pub use counter::{
    encode_count, CounterMutator, CounterOp, CounterPayload, DecrementOutcome, EMPTY_VALUE,
    LITTLE_ENDIAN_INT64_ONE,
};
pub use errors::{ErrorSeverity, IndexError, IndexErrorCode, IndexResult};
pub use factory::{IndexMaintainerFactory, RefcountIndexMaintainerFactory};
pub use keyspace::{IndexKeyspace, Region};
pub use maintainer::{
    ConsistencyReport, IndexDefinition, MaintainerState, RebuildSummary, RefcountIndexMaintainer,
    UpdateSummary, REFCOUNT_INDEX_TYPE,
};
pub use scanner::{
    decode_continuation, encode_continuation, IndexCursor, IndexEntry, ScanProperties, ScanRange,
};
