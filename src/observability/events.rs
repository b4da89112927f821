//! Observable log events
//!
//! Events are explicit and typed; the string form is the `event` key of the
//! log line.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// Configuration loaded
    ConfigLoaded,

    /// Default limit appended to an unbounded token
    SafetyLimitApplied,
    /// Token exceeds a complexity ceiling
    ComplexityWarning,
    /// Stream has neither limit nor pagination
    UnboundedStream,

    /// Batch started
    BatchBegin,
    /// Batch finished (some tasks may have failed)
    BatchComplete,
    /// One batch task exceeded its timeout
    BatchTaskTimeout,
}

impl Event {
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::ConfigLoaded => "CONFIG_LOADED",
            Event::SafetyLimitApplied => "SAFETY_LIMIT_APPLIED",
            Event::ComplexityWarning => "COMPLEXITY_WARNING",
            Event::UnboundedStream => "UNBOUNDED_STREAM",
            Event::BatchBegin => "BATCH_BEGIN",
            Event::BatchComplete => "BATCH_COMPLETE",
            Event::BatchTaskTimeout => "BATCH_TASK_TIMEOUT",
        }
    }

    /// Events that indicate the caller should look at the query
    pub fn is_warning(&self) -> bool {
        matches!(
            self,
            Event::SafetyLimitApplied
                | Event::ComplexityWarning
                | Event::UnboundedStream
                | Event::BatchTaskTimeout
        )
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

    #[test]
    fn test_all_events_uppercase() {
        let events = [
            Event::ConfigLoaded,
            Event::SafetyLimitApplied,
            Event::ComplexityWarning,
            Event::UnboundedStream,
            Event::BatchBegin,
            Event::BatchComplete,
            Event::BatchTaskTimeout,
        ];
        for event in events {
            let s = event.as_str();
            assert!(!s.is_empty());
            assert!(s.chars().all(|c| c.is_uppercase() || c == '_'));
        }
    }

    #[test]
    fn test_warning_events() {
        assert!(Event::UnboundedStream.is_warning());
        assert!(!Event::BatchComplete.is_warning());
    }
}
