//! CLI-specific error types
//!
//! Library errors keep their own `QT_*` code when they surface here.

use std::io;

use thiserror::Error;

use crate::compiler::CompileError;
use crate::config::ConfigError;
use crate::executor::{DriverError, ExecError};
use crate::token::TokenError;

#[derive(Debug, Clone, PartialEq, Error)]
#[error("{code}: {message}")]
pub struct CliError {
    code: &'static str,
    message: String,
}

impl CliError {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Unreadable file or broken stdout
    pub fn io_error(msg: impl Into<String>) -> Self {
        Self::new("QT_CLI_IO_ERROR", msg)
    }

    /// Input file is not the expected JSON shape
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::new("QT_CLI_INVALID_INPUT", msg)
    }

    pub fn code_str(&self) -> &'static str {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<io::Error> for CliError {
    fn from(e: io::Error) -> Self {
        Self::io_error(e.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        Self::invalid_input(format!("JSON error: {}", e))
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        Self::new(e.code(), e.to_string())
    }
}

impl From<TokenError> for CliError {
    fn from(e: TokenError) -> Self {
        Self::new(e.code(), e.to_string())
    }
}

impl From<CompileError> for CliError {
    fn from(e: CompileError) -> Self {
        Self::new(e.code(), e.to_string())
    }
}

impl From<DriverError> for CliError {
    fn from(e: DriverError) -> Self {
        Self::new("QT_DRIVER", e.message)
    }
}

impl From<ExecError> for CliError {
    fn from(e: ExecError) -> Self {
        Self::new(e.code(), e.to_string())
    }
}

/// CLI result type
pub type CliResult<T> = Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_codes_survive() {
        let e = CliError::from(CompileError::ParameterLimit {
            count: 21,
            max_allowed: 20,
        });
        assert_eq!(e.code_str(), "QT_PARAMETER_LIMIT");
        assert!(e.to_string().starts_with("QT_PARAMETER_LIMIT: "));
    }
}
