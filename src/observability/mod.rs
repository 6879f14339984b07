//! Observability for the refcount index
//!
//! - Structured JSON logging
//! - Typed lifecycle and maintenance events
//! - Per-maintainer counters
//!
//! Observability is read-only: it never changes the outcome of an index
//! operation and its own failures are swallowed.

mod events;
mod logger;
mod metrics;

pub use events::Event;
pub use logger::{Logger, Severity};
pub use metrics::{IndexMetrics, MetricsSnapshot};

/// Log an event at its default severity
pub fn log_event(event: Event) {
    Logger::log(event.severity(), event.as_str(), &[]);
}

/// Log an event with fields at its default severity
pub fn log_event_with_fields(event: Event, fields: &[(&str, &str)]) {
    Logger::log(event.severity(), event.as_str(), fields);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_event() {
        // This just verifies no panic
        log_event(Event::MaintainerBound);
        log_event_with_fields(Event::ConfigLoaded, &[("path", "/tmp/refcount.json")]);
    }
}
