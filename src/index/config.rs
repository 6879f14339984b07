//! Refcount index configuration

use serde::{Deserialize, Serialize};

use super::errors::{IndexError, IndexResult};

/// What a scan does when a key shows up in both regions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollisionPolicy {
    /// Yield both entries and log a warning
    #[default]
    Warn,
    /// Stop the scan with `AERO_REFCOUNT_CONSISTENCY`
    Fail,
}

/// Per-index tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefcountIndexConfig {
    /// Raw entries fetched per region per range read (default: 128)
    #[serde(default = "default_scan_batch_size")]
    pub scan_batch_size: usize,

    /// Collision handling during scans (default: warn)
    #[serde(default)]
    pub on_collision: CollisionPolicy,
}

fn default_scan_batch_size() -> usize {
    128
}

impl Default for RefcountIndexConfig {
    fn default() -> Self {
        Self {
            scan_batch_size: default_scan_batch_size(),
            on_collision: CollisionPolicy::default(),
        }
    }
}

impl RefcountIndexConfig {
    /// Reject values the scanner cannot work with
    pub fn validate(&self) -> IndexResult<()> {
        if self.scan_batch_size == 0 {
            return Err(IndexError::invalid_config("scan_batch_size must be > 0"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config: RefcountIndexConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, RefcountIndexConfig::default());
        assert_eq!(config.scan_batch_size, 128);
        assert_eq!(config.on_collision, CollisionPolicy::Warn);
    }

    #[test]
    fn test_parse_fail_policy() {
        let config: RefcountIndexConfig =
            serde_json::from_str(r#"{"scan_batch_size": 4, "on_collision": "fail"}"#).unwrap();
        assert_eq!(config.on_collision, CollisionPolicy::Fail);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_batch_rejected() {
        let config = RefcountIndexConfig {
            scan_batch_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
