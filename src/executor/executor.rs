//! Query executor
//!
//! Execution flow (strict order):
//! 1. Complexity analysis (warnings only)
//! 2. Safety limit, unless the caller opted out
//! 3. Compile
//! 4. Optional total count
//! 5. Fetch, with one lookahead row when paginating
//! 6. Pagination metadata
//!
//! Every execution emits `query.start` followed by exactly one of
//! `query.stop` or `query.exception`.

use std::borrow::Cow;
use std::sync::Arc;
use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::compiler::{Compiler, NativeQuery};
use crate::config::QueryConfig;
use crate::observability::{
    log_event_with_fields, Event, LogSink, MetricsRegistry, QueryMetadata, TelemetryEvent,
    TelemetrySink,
};
use crate::token::{Operation, Token};
use crate::value::{Row, Value};

use super::complexity::ComplexityAnalyzer;
use super::driver::Driver;
use super::errors::{ExecError, ExecResult};
use super::pagination::PageRequest;
use super::result::{PaginationInfo, QueryResult, ResultMetadata};

/// Per-call execution options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecOptions {
    /// Skip the safety limit for tokens without `Limit` or `Paginate`
    pub unbounded: bool,
    /// Run a count query alongside the main one
    pub include_total: bool,
    /// Render the SQL into the result metadata
    pub include_sql: bool,
    /// Overrides the configured query timeout
    pub timeout: Option<Duration>,
}

impl ExecOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unbounded(mut self) -> Self {
        self.unbounded = true;
        self
    }

    pub fn with_total(mut self) -> Self {
        self.include_total = true;
        self
    }

    pub fn with_sql(mut self) -> Self {
        self.include_sql = true;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Compiles tokens and runs them through a [`Driver`]
#[derive(Clone)]
pub struct Executor {
    pub(super) compiler: Arc<Compiler>,
    pub(super) driver: Arc<dyn Driver>,
    pub(super) telemetry: Arc<dyn TelemetrySink>,
    pub(super) metrics: Arc<MetricsRegistry>,
}

impl Executor {
    pub fn new(config: QueryConfig, driver: Arc<dyn Driver>) -> Self {
        Self {
            compiler: Arc::new(Compiler::new(config)),
            driver,
            telemetry: Arc::new(LogSink),
            metrics: Arc::new(MetricsRegistry::new()),
        }
    }

    pub fn with_telemetry(mut self, sink: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = sink;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn config(&self) -> &QueryConfig {
        self.compiler.config()
    }

    pub fn compiler(&self) -> &Compiler {
        &self.compiler
    }

    pub fn metrics(&self) -> &MetricsRegistry {
        &self.metrics
    }

    /// Execute one token
    pub async fn execute(&self, token: &Token, opts: ExecOptions) -> ExecResult<QueryResult> {
        let query_id = Uuid::new_v4();
        let metadata = telemetry_metadata(token);
        let started = Instant::now();
        self.telemetry
            .emit(&TelemetryEvent::start(query_id, metadata.clone()));

        match self.run(token, opts, started).await {
            Ok(result) => {
                self.metrics.increment_queries_executed();
                self.metrics.add_rows_returned(result.len() as u64);
                self.telemetry.emit(&TelemetryEvent::stop(
                    query_id,
                    metadata,
                    result.metadata.total_time,
                    result.metadata.query_time,
                    result.len(),
                ));
                Ok(result)
            }
            Err(e) => {
                self.metrics.increment_queries_failed();
                self.telemetry.emit(&TelemetryEvent::exception(
                    query_id,
                    metadata,
                    started.elapsed(),
                    e.code(),
                ));
                Err(e)
            }
        }
    }

    /// Execute one token, panicking with the error's message on failure
    pub async fn execute_or_panic(&self, token: &Token, opts: ExecOptions) -> QueryResult {
        match self.execute(token, opts).await {
            Ok(result) => result,
            Err(e) => panic!("{}", e),
        }
    }

    async fn run(&self, token: &Token, opts: ExecOptions, started: Instant) -> ExecResult<QueryResult> {
        let mut warnings = self.complexity_warnings(token);

        let token = self.bounded(token, opts, &mut warnings)?;
        let query = self.compiler.compile(&token)?;
        warnings.extend(query.notes.iter().cloned());

        let sql = (opts.include_sql || self.config().include_sql).then(|| query.to_sql().sql);
        let timeout = opts.timeout.unwrap_or_else(|| self.config().query_timeout());

        let total_count = if opts.include_total {
            Some(self.count(&token, timeout).await?)
        } else {
            None
        };

        let page = PageRequest::resolve(&token, &query);
        let query = match &page {
            Some(page) => page.with_lookahead(query),
            None => query,
        };

        let fetch_started = Instant::now();
        let mut data = self.fetch(query, timeout).await?;
        let query_time = fetch_started.elapsed();

        let pagination = match &page {
            Some(page) => page.finish(&mut data, self.compiler.codec())?,
            None => PaginationInfo::None,
        };

        Ok(QueryResult {
            data,
            pagination,
            metadata: ResultMetadata {
                query_time,
                total_time: started.elapsed(),
                sql,
                total_count,
                operation_count: token.operations().len(),
                warnings,
            },
        })
    }

    fn complexity_warnings(&self, token: &Token) -> Vec<String> {
        let report = ComplexityAnalyzer::new(self.config()).analyze(token);
        if report.is_complex() {
            self.metrics
                .add_complexity_warnings(report.warnings.len() as u64);
            let source = token.source().describe();
            for warning in &report.warnings {
                log_event_with_fields(
                    Event::ComplexityWarning,
                    &[("source", source.as_str()), ("detail", warning.as_str())],
                );
            }
        }
        report.warnings
    }

    /// Append the default limit to tokens that could return every row
    pub(super) fn bounded<'t>(
        &self,
        token: &'t Token,
        opts: ExecOptions,
        warnings: &mut Vec<String>,
    ) -> ExecResult<Cow<'t, Token>> {
        if opts.unbounded || token.has_limit() || token.has_pagination() {
            return Ok(Cow::Borrowed(token));
        }
        let limit = self.config().default_page_size;
        let bounded = token.add_with(Operation::Limit(limit as i64), self.config())?;

        self.metrics.increment_safety_limits();
        let source = token.source().describe();
        let limit_str = limit.to_string();
        log_event_with_fields(
            Event::SafetyLimitApplied,
            &[("source", source.as_str()), ("limit", limit_str.as_str())],
        );
        warnings.push(format!(
            "no limit or pagination given, applied default limit of {}",
            limit
        ));
        Ok(Cow::Owned(bounded))
    }

    async fn count(&self, token: &Token, timeout: Duration) -> ExecResult<u64> {
        let query = self.compiler.compile_count(token)?;
        let rows = self.fetch(query, timeout).await?;
        let count = rows
            .first()
            .and_then(|row| row.get("count"))
            .and_then(|v| match v {
                Value::Integer(n) => u64::try_from(*n).ok(),
                _ => None,
            })
            .unwrap_or(0);
        Ok(count)
    }

    pub(super) async fn fetch(&self, query: NativeQuery, timeout: Duration) -> ExecResult<Vec<Row>> {
        match tokio::time::timeout(timeout, self.driver.fetch(query, timeout)).await {
            Ok(rows) => Ok(rows?),
            Err(_) => Err(ExecError::Timeout {
                timeout_ms: timeout.as_millis() as u64,
            }),
        }
    }
}

fn telemetry_metadata(token: &Token) -> QueryMetadata {
    let counts = token.counts();
    QueryMetadata {
        source: token.source().describe(),
        operation_count: counts.operations,
        join_count: counts.joins,
        filter_count: counts.filters,
        filter_summary: token.filter_summary(),
    }
}
