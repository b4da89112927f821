//! Executor errors
//!
//! Only transient driver failures and timeouts are worth retrying; token and
//! compile errors are deterministic.

use thiserror::Error;

use crate::compiler::CompileError;
use crate::cursor::CursorError;
use crate::token::TokenError;

use super::driver::DriverError;

pub type ExecResult<T> = Result<T, ExecError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExecError {
    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Compile(#[from] CompileError),

    /// Result rows could not be turned into pagination cursors
    #[error("cannot build cursor from result: {0}")]
    Cursor(#[from] CursorError),

    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error("query timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// A batch task panicked or was cancelled by the runtime
    #[error("batch task failed: {0}")]
    TaskFailed(String),
}

impl ExecError {
    pub fn code(&self) -> &'static str {
        match self {
            ExecError::Token(e) => e.code(),
            ExecError::Compile(e) => e.code(),
            ExecError::Cursor(e) => e.code(),
            ExecError::Driver(_) => "QT_DRIVER",
            ExecError::Timeout { .. } => "QT_TIMEOUT",
            ExecError::TaskFailed(_) => "QT_TASK_FAILED",
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            ExecError::Driver(e) => e.transient,
            ExecError::Timeout { .. } => true,
            _ => false,
        }
    }
}
