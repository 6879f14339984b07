//! Refcount index error types
//!
//! Error codes:
//! - AERO_REFCOUNT_UNSUPPORTED_RECORD_TYPE (FATAL)
//! - AERO_REFCOUNT_RECORD_DECODE_FAILED (FATAL)
//! - AERO_REFCOUNT_MISSING_COUNTER (FATAL)
//! - AERO_REFCOUNT_CORRUPT_ENTRY (FATAL)
//! - AERO_REFCOUNT_CONSISTENCY (FATAL)
//! - AERO_REFCOUNT_STORAGE_FAILED (FATAL)
//! - AERO_REFCOUNT_INVALID_INDEX (FATAL)
//! - AERO_REFCOUNT_CONFLICT_RETRY (RETRYABLE)
//! - AERO_REFCOUNT_INVALID_CONTINUATION (ERROR)
//! - AERO_REFCOUNT_NOT_ACTIVE (ERROR)
//! - AERO_REFCOUNT_INVALID_CONFIG (ERROR)
//!
//! Nothing here is recovered locally. Fatal errors mean the counters and the
//! record set may have diverged or the index is misconfigured; retryable
//! errors abort the enclosing transaction so the host can re-run it.

use std::fmt;

use crate::kv::{KvError, Retryable};
use crate::tuple::{Element, TupleError};

/// How the caller must treat an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Abort the transaction and re-run it
    Retryable,
    /// The request was invalid; nothing was written
    Error,
    /// Counter state or configuration is broken; must not be retried blindly
    Fatal,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorSeverity::Retryable => write!(f, "RETRYABLE"),
            ErrorSeverity::Error => write!(f, "ERROR"),
            ErrorSeverity::Fatal => write!(f, "FATAL"),
        }
    }
}

/// Refcount index error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexErrorCode {
    /// Extraction met a record type it has no mapping for
    AeroRefcountUnsupportedRecordType,
    /// A known record type carried a body that does not decode
    AeroRefcountRecordDecodeFailed,
    /// Decrement found no live counter
    AeroRefcountMissingCounter,
    /// A stored key or payload does not decode
    AeroRefcountCorruptEntry,
    /// A key holds both a live counter and a zero marker
    AeroRefcountConsistency,
    /// Transaction conflict; the host should retry
    AeroRefcountConflictRetry,
    /// Non-retryable failure from the transaction substrate
    AeroRefcountStorageFailed,
    /// Continuation token is malformed or belongs elsewhere
    AeroRefcountInvalidContinuation,
    /// Operation not allowed in the maintainer's current state
    AeroRefcountNotActive,
    /// Index definition cannot be bound
    AeroRefcountInvalidIndex,
    /// Configuration value out of range
    AeroRefcountInvalidConfig,
}

impl IndexErrorCode {
    /// Returns the string code
    pub fn code(&self) -> &'static str {
        match self {
            IndexErrorCode::AeroRefcountUnsupportedRecordType => {
                "AERO_REFCOUNT_UNSUPPORTED_RECORD_TYPE"
            }
            IndexErrorCode::AeroRefcountRecordDecodeFailed => "AERO_REFCOUNT_RECORD_DECODE_FAILED",
            IndexErrorCode::AeroRefcountMissingCounter => "AERO_REFCOUNT_MISSING_COUNTER",
            IndexErrorCode::AeroRefcountCorruptEntry => "AERO_REFCOUNT_CORRUPT_ENTRY",
            IndexErrorCode::AeroRefcountConsistency => "AERO_REFCOUNT_CONSISTENCY",
            IndexErrorCode::AeroRefcountConflictRetry => "AERO_REFCOUNT_CONFLICT_RETRY",
            IndexErrorCode::AeroRefcountStorageFailed => "AERO_REFCOUNT_STORAGE_FAILED",
            IndexErrorCode::AeroRefcountInvalidContinuation => {
                "AERO_REFCOUNT_INVALID_CONTINUATION"
            }
            IndexErrorCode::AeroRefcountNotActive => "AERO_REFCOUNT_NOT_ACTIVE",
            IndexErrorCode::AeroRefcountInvalidIndex => "AERO_REFCOUNT_INVALID_INDEX",
            IndexErrorCode::AeroRefcountInvalidConfig => "AERO_REFCOUNT_INVALID_CONFIG",
        }
    }

    /// Returns the severity level for this error
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            IndexErrorCode::AeroRefcountConflictRetry => ErrorSeverity::Retryable,
            IndexErrorCode::AeroRefcountInvalidContinuation
            | IndexErrorCode::AeroRefcountNotActive
            | IndexErrorCode::AeroRefcountInvalidConfig => ErrorSeverity::Error,
            _ => ErrorSeverity::Fatal,
        }
    }
}

impl fmt::Display for IndexErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Refcount index error with context
#[derive(Debug, Clone)]
pub struct IndexError {
    code: IndexErrorCode,
    message: String,
    /// Referenced key involved, if any
    key: Option<Element>,
}

impl IndexError {
    fn new(code: IndexErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            key: None,
        }
    }

    fn with_key(mut self, key: &Element) -> Self {
        self.key = Some(key.clone());
        self
    }

    /// Record type has no extraction mapping
    pub fn unsupported_record_type(record_type: &str) -> Self {
        Self::new(
            IndexErrorCode::AeroRefcountUnsupportedRecordType,
            format!("Unsupported record type '{}'", record_type),
        )
    }

    /// Record body does not match its declared type
    pub fn record_decode(record_type: &str, reason: impl fmt::Display) -> Self {
        Self::new(
            IndexErrorCode::AeroRefcountRecordDecodeFailed,
            format!("Cannot decode {} record: {}", record_type, reason),
        )
    }

    /// Decrement of a key with no live counter
    pub fn missing_counter(key: &Element) -> Self {
        Self::new(
            IndexErrorCode::AeroRefcountMissingCounter,
            format!("No live counter for referenced key {}", key),
        )
        .with_key(key)
    }

    /// Stored counter payload is not a valid count
    pub fn corrupt_counter(key: &Element, reason: impl Into<String>) -> Self {
        Self::new(
            IndexErrorCode::AeroRefcountCorruptEntry,
            format!("Corrupt counter for {}: {}", key, reason.into()),
        )
        .with_key(key)
    }

    /// Stored index key does not decode
    pub fn corrupt_key(reason: impl fmt::Display) -> Self {
        Self::new(
            IndexErrorCode::AeroRefcountCorruptEntry,
            format!("Corrupt index key: {}", reason),
        )
    }

    /// Key present in both regions
    pub fn consistency(key: &Element) -> Self {
        Self::new(
            IndexErrorCode::AeroRefcountConsistency,
            format!("Key {} holds both a live counter and a zero marker", key),
        )
        .with_key(key)
    }

    /// Continuation token rejected
    pub fn invalid_continuation(reason: impl Into<String>) -> Self {
        Self::new(IndexErrorCode::AeroRefcountInvalidContinuation, reason)
    }

    /// Operation attempted in the wrong lifecycle state
    pub fn not_active(operation: &str, state: impl fmt::Display) -> Self {
        Self::new(
            IndexErrorCode::AeroRefcountNotActive,
            format!("Cannot {} while maintainer is {}", operation, state),
        )
    }

    /// Index definition rejected
    pub fn invalid_index(reason: impl Into<String>) -> Self {
        Self::new(IndexErrorCode::AeroRefcountInvalidIndex, reason)
    }

    /// Configuration rejected
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::new(IndexErrorCode::AeroRefcountInvalidConfig, reason)
    }

    /// Returns the error code
    pub fn code(&self) -> IndexErrorCode {
        self.code
    }

    /// Returns the severity level
    pub fn severity(&self) -> ErrorSeverity {
        self.code.severity()
    }

    /// Returns the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the referenced key involved, if any
    pub fn key(&self) -> Option<&Element> {
        self.key.as_ref()
    }

    /// Returns whether this is a fatal error
    pub fn is_fatal(&self) -> bool {
        self.severity() == ErrorSeverity::Fatal
    }
}

impl fmt::Display for IndexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.severity(), self.code.code(), self.message)
    }
}

impl std::error::Error for IndexError {}

impl Retryable for IndexError {
    fn is_retryable(&self) -> bool {
        self.severity() == ErrorSeverity::Retryable
    }
}

impl From<KvError> for IndexError {
    fn from(e: KvError) -> Self {
        let code = match e {
            KvError::Conflict { .. } => IndexErrorCode::AeroRefcountConflictRetry,
            _ => IndexErrorCode::AeroRefcountStorageFailed,
        };
        Self::new(code, e.to_string())
    }
}

impl From<TupleError> for IndexError {
    fn from(e: TupleError) -> Self {
        Self::corrupt_key(e)
    }
}

/// Result type for index operations
pub type IndexResult<T> = Result<T, IndexError>;
