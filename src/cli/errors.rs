//! Replay and plan command errors
//!
//! A command stops at its first error and reports it as one JSON object.
//! Failures raised by the index keep their `AERO_REFCOUNT_*` code alongside
//! the CLI code, so a caller can tell a conflict that outlived the retry
//! limit from a missing counter.

use std::fmt;
use std::io;

use serde_json::{json, Value};

use crate::index::{IndexError, IndexErrorCode};

/// CLI error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CliErrorCode {
    /// Config file missing, unparsable, or failing validation
    ConfigError,
    /// Reading stdin or writing stdout failed
    IoError,
    /// A mutation line, plan request, or continuation is malformed
    InvalidInput,
    /// Applying, rebuilding, scanning, or verifying the index failed
    IndexFailed,
}

impl CliErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigError => "AERO_CLI_CONFIG_ERROR",
            Self::IoError => "AERO_CLI_IO_ERROR",
            Self::InvalidInput => "AERO_CLI_INVALID_INPUT",
            Self::IndexFailed => "AERO_CLI_INDEX_FAILED",
        }
    }
}

/// Error reported by `replay` or `plan`
#[derive(Debug)]
pub struct CliError {
    code: CliErrorCode,
    message: String,
    /// Index error behind an `IndexFailed`
    index_code: Option<IndexErrorCode>,
}

impl CliError {
    pub fn new(code: CliErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            index_code: None,
        }
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::ConfigError, msg)
    }

    pub fn io_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::IoError, msg)
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::InvalidInput, msg)
    }

    pub fn code(&self) -> CliErrorCode {
        self.code
    }

    pub fn code_str(&self) -> &'static str {
        self.code.code()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Code of the index error this wraps, if any
    pub fn index_code(&self) -> Option<IndexErrorCode> {
        self.index_code
    }

    /// Error response body
    pub fn to_json(&self) -> Value {
        let mut body = json!({
            "status": "error",
            "code": self.code_str(),
            "message": self.message,
        });
        if let Some(index_code) = self.index_code {
            body["index_code"] = Value::from(index_code.code());
        }
        body
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.code(), self.message)
    }
}

impl std::error::Error for CliError {}

impl From<io::Error> for CliError {
    fn from(e: io::Error) -> Self {
        Self::io_error(e.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        if e.is_io() {
            Self::io_error(e.to_string())
        } else {
            Self::invalid_input(format!("Malformed JSON: {}", e))
        }
    }
}

impl From<IndexError> for CliError {
    fn from(e: IndexError) -> Self {
        Self {
            code: CliErrorCode::IndexFailed,
            message: e.message().to_string(),
            index_code: Some(e.code()),
        }
    }
}

pub type CliResult<T> = Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tuple::Element;

    #[test]
    fn test_index_failure_keeps_index_code() {
        let err = CliError::from(IndexError::missing_counter(&Element::from_string("p1")));
        assert_eq!(err.code(), CliErrorCode::IndexFailed);
        assert_eq!(err.index_code(), Some(IndexErrorCode::AeroRefcountMissingCounter));

        let body = err.to_json();
        assert_eq!(body["code"], "AERO_CLI_INDEX_FAILED");
        assert_eq!(body["index_code"], "AERO_REFCOUNT_MISSING_COUNTER");
    }

    #[test]
    fn test_malformed_json_is_invalid_input() {
        let parse = serde_json::from_str::<Value>("{oops").unwrap_err();
        let err = CliError::from(parse);
        assert_eq!(err.code_str(), "AERO_CLI_INVALID_INPUT");
        assert!(err.to_json().get("index_code").is_none());
    }
}
