//! Token construction errors
//!
//! Every variant is structural: it is raised while an operation is appended
//! and never reaches the compiler. These errors are deterministic and must
//! not be retried.
//!
//! Codes:
//! - QT_VALIDATION_FAILED
//! - QT_LIMIT_EXCEEDED
//! - QT_PAGINATION_INVALID
//! - QT_FILTER_GROUP_ARITY
//! - QT_UNKNOWN_OPERATOR
//! - QT_UNKNOWN_SEARCH_MODE
//! - QT_PARAMETER_LIMIT
//! - QT_CAST_FAILED

use thiserror::Error;

use crate::caster::CastError;

/// Result type for token operations
pub type TokenResult<T> = Result<T, TokenError>;

/// Structural errors raised while building a token
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TokenError {
    /// Malformed operation
    #[error("invalid {operation} operation: {reason} (got {value})")]
    Validation {
        operation: &'static str,
        reason: String,
        value: String,
        suggestion: Option<String>,
    },

    /// Requested limit above the configured maximum
    #[error("limit {requested} exceeds maximum {max}")]
    LimitExceeded { requested: i64, max: u64 },

    /// Malformed pagination options
    #[error("invalid pagination: {reason}")]
    Pagination {
        reason: String,
        suggestion: Option<String>,
    },

    /// Filter group with fewer than two members
    #[error("{combinator} group needs at least 2 filters, got {count}")]
    FilterGroup {
        combinator: &'static str,
        count: usize,
    },

    /// Operator outside the closed operator set
    #[error("unknown filter operator '{operator}'")]
    Operator {
        operator: String,
        allowed: Vec<&'static str>,
    },

    /// Search mode outside the closed mode set
    #[error("unknown search mode '{mode}'")]
    SearchMode {
        mode: String,
        allowed: Vec<&'static str>,
    },

    /// Raw fragment carrying more parameters than the cap
    #[error("raw fragment binds {count} parameters, maximum is {max_allowed}")]
    ParameterLimit { count: usize, max_allowed: usize },

    /// Filter value failed its requested cast
    #[error(transparent)]
    Cast(#[from] CastError),
}

impl TokenError {
    /// Create a validation error
    pub fn validation(
        operation: &'static str,
        reason: impl Into<String>,
        value: impl ToString,
    ) -> Self {
        TokenError::Validation {
            operation,
            reason: reason.into(),
            value: value.to_string(),
            suggestion: None,
        }
    }

    /// Create a pagination error
    pub fn pagination(reason: impl Into<String>) -> Self {
        TokenError::Pagination {
            reason: reason.into(),
            suggestion: None,
        }
    }

    /// Attach a remediation suggestion (no-op for variants without one)
    pub fn suggest(mut self, text: impl Into<String>) -> Self {
        match &mut self {
            TokenError::Validation { suggestion, .. } | TokenError::Pagination { suggestion, .. } => {
                *suggestion = Some(text.into());
            }
            _ => {}
        }
        self
    }

    /// Stable error code
    pub fn code(&self) -> &'static str {
        match self {
            TokenError::Validation { .. } => "QT_VALIDATION_FAILED",
            TokenError::LimitExceeded { .. } => "QT_LIMIT_EXCEEDED",
            TokenError::Pagination { .. } => "QT_PAGINATION_INVALID",
            TokenError::FilterGroup { .. } => "QT_FILTER_GROUP_ARITY",
            TokenError::Operator { .. } => "QT_UNKNOWN_OPERATOR",
            TokenError::SearchMode { .. } => "QT_UNKNOWN_SEARCH_MODE",
            TokenError::ParameterLimit { .. } => "QT_PARAMETER_LIMIT",
            TokenError::Cast(e) => e.code(),
        }
    }

    /// Remediation text, derived where the variant does not store one
    pub fn suggestion(&self) -> Option<String> {
        match self {
            TokenError::Validation { suggestion, .. } | TokenError::Pagination { suggestion, .. } => {
                suggestion.clone()
            }
            TokenError::LimitExceeded { max, .. } => {
                Some(format!("request at most {} rows or paginate", max))
            }
            TokenError::FilterGroup { .. } => {
                Some("use a plain filter for a single condition".into())
            }
            TokenError::Operator { allowed, .. } => Some(format!("use one of: {}", allowed.join(", "))),
            TokenError::SearchMode { allowed, .. } => Some(format!("use one of: {}", allowed.join(", "))),
            TokenError::ParameterLimit { max_allowed, .. } => Some(format!(
                "split the fragment so each binds at most {} parameters",
                max_allowed
            )),
            TokenError::Cast(e) => Some(e.hint.clone()),
        }
    }
}
