//! Cast error type
//!
//! Carries the offending value, the requested target and a remediation hint
//! so callers can build diagnostics without parsing the message.

use thiserror::Error;

/// Result type for cast operations
pub type CastResult<T> = Result<T, CastError>;

/// Type conversion failure
#[derive(Debug, Clone, PartialEq, Error)]
#[error("cannot cast {value} to {target}{}: {hint}", index_suffix(.index))]
pub struct CastError {
    /// Rendered offending value
    pub value: String,
    /// Target type name
    pub target: String,
    /// Remediation hint
    pub hint: String,
    /// Position inside a list, when the failing value was a list element
    pub index: Option<usize>,
}

fn index_suffix(index: &Option<usize>) -> String {
    match index {
        Some(i) => format!(" (element {})", i),
        None => String::new(),
    }
}

impl CastError {
    /// Create a new cast error
    pub fn new(value: impl Into<String>, target: impl Into<String>, hint: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            target: target.into(),
            hint: hint.into(),
            index: None,
        }
    }

    /// Attach the list position of the failing element
    pub fn at_index(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }

    /// Stable error code
    pub fn code(&self) -> &'static str {
        "QT_CAST_FAILED"
    }
}
