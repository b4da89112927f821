//! Compiler errors
//!
//! Only failures that cannot be detected while a token is built end up
//! here: undecodable cursors, unknown bindings, fragment overflow,
//! unresolvable subqueries. None are retryable.

use thiserror::Error;

use crate::cursor::CursorError;

pub type CompileResult<T> = Result<T, CompileError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    #[error("invalid cursor: {0}")]
    Cursor(#[from] CursorError),

    #[error("raw fragment binds {count} parameters, maximum is {max_allowed}")]
    ParameterLimit { count: usize, max_allowed: usize },

    #[error("{operation} references unknown binding '{binding}'")]
    UnknownBinding {
        binding: String,
        operation: &'static str,
    },

    #[error("no association '{association}' declared on binding '{binding}'")]
    UnknownAssociation { association: String, binding: String },

    #[error("cannot resolve {operation} subquery: {reason}")]
    UnresolvableSubquery {
        operation: &'static str,
        reason: String,
    },

    #[error("nested tokens can only be used as a subquery or CTE operand")]
    NestedSource,

    #[error("cursor has no value for order field '{field}'")]
    MissingCursorField { field: String },

    #[error("{0}")]
    Validation(String),
}

impl CompileError {
    pub fn code(&self) -> &'static str {
        match self {
            CompileError::Cursor(e) => e.code(),
            CompileError::ParameterLimit { .. } => "QT_PARAMETER_LIMIT",
            CompileError::UnknownBinding { .. } => "QT_UNKNOWN_BINDING",
            CompileError::UnknownAssociation { .. } => "QT_UNKNOWN_ASSOCIATION",
            CompileError::UnresolvableSubquery { .. } => "QT_UNRESOLVABLE_SUBQUERY",
            CompileError::NestedSource => "QT_NESTED_SOURCE",
            CompileError::MissingCursorField { .. } => "QT_CURSOR_FIELD_MISSING",
            CompileError::Validation(_) => "QT_VALIDATION_FAILED",
        }
    }

    pub(crate) fn unresolvable(operation: &'static str, cause: CompileError) -> Self {
        CompileError::UnresolvableSubquery {
            operation,
            reason: cause.to_string(),
        }
    }
}
