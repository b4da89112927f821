//! Database driver boundary
//!
//! The executor never opens connections. It hands each compiled query to a
//! caller-supplied [`Driver`] together with the timeout it will enforce, and
//! gets rows or an error back.

use std::time::Duration;

use futures_util::future::BoxFuture;
use thiserror::Error;

use crate::compiler::NativeQuery;
use crate::value::Row;

/// Failure reported by a driver
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("driver error: {message}")]
pub struct DriverError {
    pub message: String,
    /// Connection resets, pool exhaustion, serialization failures
    pub transient: bool,
}

impl DriverError {
    /// Deterministic failure (bad SQL, constraint violation)
    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            transient: false,
        }
    }

    /// Failure that may succeed on retry
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            transient: true,
        }
    }
}

/// Executes compiled queries.
///
/// SQL backends render with [`NativeQuery::to_sql`]; the timeout is advisory
/// for the driver since the executor enforces it as well.
pub trait Driver: Send + Sync {
    fn fetch(&self, query: NativeQuery, timeout: Duration) -> BoxFuture<'_, Result<Vec<Row>, DriverError>>;
}
