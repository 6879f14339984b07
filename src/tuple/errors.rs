//! Tuple codec errors

use thiserror::Error;

/// Result type for tuple encoding and decoding
pub type TupleResult<T> = Result<T, TupleError>;

/// Errors raised while unpacking tuple-encoded keys
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TupleError {
    #[error("Unknown tuple type code 0x{0:02x} at position {1}")]
    UnknownTypeCode(u8, usize),

    #[error("Truncated tuple encoding at position {0}")]
    Truncated(usize),

    #[error("Tuple string element is not valid UTF-8")]
    InvalidUtf8,

    #[error("Tuple integer does not fit in i64")]
    IntegerOverflow,

    #[error("Key does not start with subspace prefix")]
    PrefixMismatch,

    #[error("Expected a tuple of {expected} element(s), found {found}")]
    Arity { expected: usize, found: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_position() {
        let err = TupleError::UnknownTypeCode(0x33, 4);
        let display = err.to_string();
        assert!(display.contains("0x33"));
        assert!(display.contains("4"));
    }
}
