//! Query configuration
//!
//! Every limit the validator, compiler and executor enforce lives here.
//! Values come from defaults, an optional JSON file, and `QUERYTOKEN_*`
//! environment overrides resolved once at startup.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "QUERYTOKEN_";

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Read(String),

    #[error("invalid config JSON: {0}")]
    Parse(String),

    #[error("invalid value for {key}: {value}")]
    InvalidOverride { key: String, value: String },

    #[error("invalid config: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub fn code(&self) -> &'static str {
        "QT_CONFIG_INVALID"
    }
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Limits and defaults shared by the validator, compiler and executor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Page size used by the safety limit and paginations without a limit
    #[serde(default = "default_page_size")]
    pub default_page_size: u64,

    /// Largest accepted limit / page size
    #[serde(default = "default_max_page_size")]
    pub max_page_size: u64,

    /// Soft ceiling on operations per token (warning only)
    #[serde(default = "default_max_operations")]
    pub max_operations: usize,

    /// Soft ceiling on joins per token (warning only)
    #[serde(default = "default_max_joins")]
    pub max_joins: usize,

    /// Soft ceiling on filters per token (warning only)
    #[serde(default = "default_max_filters")]
    pub max_filters: usize,

    /// Hard cap on bound parameters in one raw fragment
    #[serde(default = "default_raw_param_cap")]
    pub raw_param_cap: usize,

    /// Per-query driver timeout
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,

    /// Per-task timeout inside a batch
    #[serde(default = "default_batch_timeout_ms")]
    pub batch_timeout_ms: u64,

    /// Maximum tasks of a batch running at once
    #[serde(default = "default_batch_concurrency")]
    pub batch_concurrency: usize,

    /// Rows fetched per streamed chunk
    #[serde(default = "default_stream_chunk_size")]
    pub stream_chunk_size: u64,

    /// Secret mixed into the cursor tag
    #[serde(default)]
    pub cursor_secret: String,

    /// Similarity threshold used when a filter or search field gives none
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,

    /// Attach rendered SQL to result metadata
    #[serde(default)]
    pub include_sql: bool,
}

fn default_page_size() -> u64 {
    20
}
fn default_max_page_size() -> u64 {
    1000
}
fn default_max_operations() -> usize {
    50
}
fn default_max_joins() -> usize {
    10
}
fn default_max_filters() -> usize {
    30
}
fn default_raw_param_cap() -> usize {
    20
}
fn default_query_timeout_ms() -> u64 {
    15_000
}
fn default_batch_timeout_ms() -> u64 {
    30_000
}
fn default_batch_concurrency() -> usize {
    8
}
fn default_stream_chunk_size() -> u64 {
    500
}
fn default_similarity_threshold() -> f64 {
    0.3
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
            max_operations: default_max_operations(),
            max_joins: default_max_joins(),
            max_filters: default_max_filters(),
            raw_param_cap: default_raw_param_cap(),
            query_timeout_ms: default_query_timeout_ms(),
            batch_timeout_ms: default_batch_timeout_ms(),
            batch_concurrency: default_batch_concurrency(),
            stream_chunk_size: default_stream_chunk_size(),
            cursor_secret: String::new(),
            similarity_threshold: default_similarity_threshold(),
            include_sql: false,
        }
    }
}

impl QueryConfig {
    /// Load configuration from a JSON file, then validate it
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Read(e.to_string()))?;
        let config: QueryConfig =
            serde_json::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults with `QUERYTOKEN_*` environment overrides applied
    pub fn from_env() -> ConfigResult<Self> {
        Self::default().with_overrides(std::env::vars())
    }

    /// Apply `QUERYTOKEN_*` overrides from an iterator of `(key, value)`
    /// pairs. Unknown keys are ignored.
    pub fn with_overrides<I>(mut self, vars: I) -> ConfigResult<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            let Some(name) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let bad = || ConfigError::InvalidOverride {
                key: key.clone(),
                value: value.clone(),
            };
            match name {
                "DEFAULT_PAGE_SIZE" => self.default_page_size = value.parse().map_err(|_| bad())?,
                "MAX_PAGE_SIZE" => self.max_page_size = value.parse().map_err(|_| bad())?,
                "MAX_OPERATIONS" => self.max_operations = value.parse().map_err(|_| bad())?,
                "MAX_JOINS" => self.max_joins = value.parse().map_err(|_| bad())?,
                "MAX_FILTERS" => self.max_filters = value.parse().map_err(|_| bad())?,
                "RAW_PARAM_CAP" => self.raw_param_cap = value.parse().map_err(|_| bad())?,
                "QUERY_TIMEOUT_MS" => self.query_timeout_ms = value.parse().map_err(|_| bad())?,
                "BATCH_TIMEOUT_MS" => self.batch_timeout_ms = value.parse().map_err(|_| bad())?,
                "BATCH_CONCURRENCY" => {
                    self.batch_concurrency = value.parse().map_err(|_| bad())?
                }
                "STREAM_CHUNK_SIZE" => self.stream_chunk_size = value.parse().map_err(|_| bad())?,
                "CURSOR_SECRET" => self.cursor_secret = value.clone(),
                "SIMILARITY_THRESHOLD" => {
                    self.similarity_threshold = value.parse().map_err(|_| bad())?
                }
                "INCLUDE_SQL" => self.include_sql = value.parse().map_err(|_| bad())?,
                _ => {}
            }
        }
        self.validate()?;
        Ok(self)
    }

    /// Check internal consistency of the limits
    pub fn validate(&self) -> ConfigResult<()> {
        if self.default_page_size == 0 || self.max_page_size == 0 {
            return Err(ConfigError::Invalid("page sizes must be positive".into()));
        }
        if self.default_page_size > self.max_page_size {
            return Err(ConfigError::Invalid(format!(
                "default_page_size {} exceeds max_page_size {}",
                self.default_page_size, self.max_page_size
            )));
        }
        if self.raw_param_cap == 0 {
            return Err(ConfigError::Invalid("raw_param_cap must be positive".into()));
        }
        if self.batch_concurrency == 0 || self.stream_chunk_size == 0 {
            return Err(ConfigError::Invalid(
                "batch_concurrency and stream_chunk_size must be positive".into(),
            ));
        }
        if !(self.similarity_threshold > 0.0 && self.similarity_threshold <= 1.0) {
            return Err(ConfigError::Invalid(
                "similarity_threshold must be in (0, 1]".into(),
            ));
        }
        Ok(())
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    pub fn batch_timeout(&self) -> Duration {
        Duration::from_millis(self.batch_timeout_ms)
    }
}
