//! Observable events for the refcount index
//!
//! Events are explicit and typed. Each has a fixed string name and a
//! default severity.

use std::fmt;

use super::logger::Severity;

/// Observable events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Maintainer lifecycle
    /// Keyspace prefixes resolved from the index definition
    MaintainerBound,
    /// Maintainer accepts update and scan calls
    MaintainerActivated,
    /// Keyspace handles released
    MaintainerReleased,

    // Counter maintenance
    /// A counter reached zero and was replaced by a zero marker
    CounterReachedZero,
    /// Decrement found no live counter
    CounterMissing,
    /// A stored counter payload could not be decoded
    CounterCorrupt,

    // Scans
    /// A key was found in both the live and zero-marker regions
    ScanCollision,

    // Rebuild / verify
    /// Rebuild from the record set begins
    RebuildStart,
    /// Rebuild complete
    RebuildComplete,
    /// Consistency verification complete
    VerifyComplete,

    // Host
    /// Configuration loaded
    ConfigLoaded,
    /// Host transaction re-run after a retryable failure
    TransactionRetry,
}

impl Event {
    /// Returns the string representation of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::MaintainerBound => "REFCOUNT_BOUND",
            Event::MaintainerActivated => "REFCOUNT_ACTIVE",
            Event::MaintainerReleased => "REFCOUNT_RELEASED",
            Event::CounterReachedZero => "REFCOUNT_ZERO_MARKER_WRITTEN",
            Event::CounterMissing => "REFCOUNT_MISSING_COUNTER",
            Event::CounterCorrupt => "REFCOUNT_CORRUPT_COUNTER",
            Event::ScanCollision => "REFCOUNT_SCAN_COLLISION",
            Event::RebuildStart => "REFCOUNT_REBUILD_BEGIN",
            Event::RebuildComplete => "REFCOUNT_REBUILD_COMPLETE",
            Event::VerifyComplete => "REFCOUNT_VERIFY_COMPLETE",
            Event::ConfigLoaded => "CONFIG_LOADED",
            Event::TransactionRetry => "TRANSACTION_RETRY",
        }
    }

    /// Severity the event is logged at
    pub fn severity(&self) -> Severity {
        match self {
            Event::CounterReachedZero => Severity::Trace,
            Event::ScanCollision | Event::TransactionRetry => Severity::Warn,
            Event::CounterMissing | Event::CounterCorrupt => Severity::Error,
            _ => Severity::Info,
        }
    }

    /// Returns true if this event indicates the counter state diverged from
    /// the record set
    pub fn is_fatal(&self) -> bool {
        matches!(self, Event::CounterMissing | Event::CounterCorrupt)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Event; 12] = [
        Event::MaintainerBound,
        Event::MaintainerActivated,
        Event::MaintainerReleased,
        Event::CounterReachedZero,
        Event::CounterMissing,
        Event::CounterCorrupt,
        Event::ScanCollision,
        Event::RebuildStart,
        Event::RebuildComplete,
        Event::VerifyComplete,
        Event::ConfigLoaded,
        Event::TransactionRetry,
    ];

    #[test]
    fn test_all_events_have_string_representation() {
        for event in ALL {
            let s = event.as_str();
            assert!(!s.is_empty());
            assert_eq!(s, s.to_uppercase());
        }
    }

    #[test]
    fn test_event_names_unique() {
        let mut names: Vec<_> = ALL.iter().map(|e| e.as_str()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), ALL.len());
    }

    #[test]
    fn test_fatal_events() {
        assert!(Event::CounterMissing.is_fatal());
        assert!(!Event::ScanCollision.is_fatal());
        assert_eq!(Event::ScanCollision.severity(), Severity::Warn);
    }
}
