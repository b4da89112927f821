//! Concurrent batch execution
//!
//! One tokio task per token, at most `batch_concurrency` running at a time,
//! each under its own `batch_timeout`. Results come back in input order.
//! A failed, panicked or timed-out task only affects its own slot.

use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::observability::{log_event_with_fields, Event};
use crate::token::Token;

use super::errors::{ExecError, ExecResult};
use super::executor::{ExecOptions, Executor};
use super::result::QueryResult;

impl Executor {
    /// Execute independent tokens concurrently
    pub async fn batch(&self, tokens: Vec<Token>, opts: ExecOptions) -> Vec<ExecResult<QueryResult>> {
        let total = tokens.len();
        let concurrency = self.config().batch_concurrency.max(1);
        let timeout = self.config().batch_timeout();
        let total_str = total.to_string();
        let concurrency_str = concurrency.to_string();
        log_event_with_fields(
            Event::BatchBegin,
            &[("tasks", total_str.as_str()), ("concurrency", concurrency_str.as_str())],
        );

        let permits = Arc::new(Semaphore::new(concurrency));
        let mut handles = Vec::with_capacity(total);
        for (index, token) in tokens.into_iter().enumerate() {
            let exec = self.clone();
            let permits = Arc::clone(&permits);
            handles.push(tokio::spawn(async move {
                let _permit = match permits.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return Err(ExecError::TaskFailed("batch semaphore closed".into())),
                };
                match tokio::time::timeout(timeout, exec.execute(&token, opts)).await {
                    Ok(result) => result,
                    Err(_) => {
                        exec.metrics.increment_batch_timeouts();
                        let index_str = index.to_string();
                        let source = token.source().describe();
                        log_event_with_fields(
                            Event::BatchTaskTimeout,
                            &[("index", index_str.as_str()), ("source", source.as_str())],
                        );
                        Err(ExecError::Timeout {
                            timeout_ms: timeout.as_millis() as u64,
                        })
                    }
                }
            }));
        }

        let mut results = Vec::with_capacity(total);
        for handle in handles {
            results.push(match handle.await {
                Ok(result) => result,
                Err(e) => Err(ExecError::TaskFailed(e.to_string())),
            });
        }

        let failed = results.iter().filter(|r| r.is_err()).count();
        let failed_str = failed.to_string();
        log_event_with_fields(
            Event::BatchComplete,
            &[("tasks", total_str.as_str()), ("failed", failed_str.as_str())],
        );
        results
    }
}
