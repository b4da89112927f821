//! Observability subsystem
//!
//! - Structured logging (JSON lines)
//! - Query telemetry events (`start`, `stop`, `exception`) and sinks
//! - Counters
//!
//! # Principles
//!
//! 1. Observability is read-only: a failing sink never fails a query
//! 2. Filter values never reach a log line or telemetry event
//! 3. Deterministic output
//!
//! # Usage
//!
//! ```ignore
//! use querytoken::observability::{log_event_with_fields, Event, MetricsRegistry};
//!
//! log_event_with_fields(Event::SafetyLimitApplied, &[("limit", "20")]);
//!
//! let metrics = MetricsRegistry::new();
//! metrics.increment_queries_executed();
//! ```

mod events;
mod logger;
mod metrics;
mod telemetry;

pub use events::Event;
pub use logger::{LogTarget, Logger, Severity};
pub use metrics::{MetricsRegistry, MetricsSnapshot};
pub use telemetry::{
    LogSink, MemorySink, QueryMetadata, TelemetryEvent, TelemetryKind, TelemetrySink,
};

/// Log an event at its natural severity
pub fn log_event(event: Event) {
    log_event_with_fields(event, &[]);
}

/// Log an event with fields; warning events log at WARN, the rest at INFO
pub fn log_event_with_fields(event: Event, fields: &[(&str, &str)]) {
    let severity = if event.is_warning() {
        Severity::Warn
    } else {
        Severity::Info
    };
    Logger::log(severity, event.as_str(), fields);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_event() {
        // No panic on either severity path
        log_event(Event::BatchBegin);
        log_event_with_fields(Event::ComplexityWarning, &[("joins", "12")]);
    }
}
