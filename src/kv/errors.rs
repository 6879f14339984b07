//! Transaction substrate errors

use thiserror::Error;

/// Result type for key-value operations
pub type KvResult<T> = Result<T, KvError>;

/// Errors raised by the transactional key-value substrate
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KvError {
    /// Another transaction committed a write this transaction read
    #[error("Transaction {transaction_id} conflicts with commit version {conflicting_version}")]
    Conflict {
        transaction_id: String,
        conflicting_version: u64,
    },

    #[error("Store lock poisoned")]
    Poisoned,

    #[error("Invalid key range: begin sorts after end")]
    InvalidRange,
}

/// Classifies errors the host retry loop may re-run a transaction for
pub trait Retryable {
    /// Returns whether re-executing the transaction may succeed
    fn is_retryable(&self) -> bool;
}

impl Retryable for KvError {
    fn is_retryable(&self) -> bool {
        matches!(self, KvError::Conflict { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_conflicts_retry() {
        let conflict = KvError::Conflict {
            transaction_id: "t1".into(),
            conflicting_version: 3,
        };
        assert!(conflict.is_retryable());
        assert!(!KvError::Poisoned.is_retryable());
        assert!(!KvError::InvalidRange.is_retryable());
    }
}
