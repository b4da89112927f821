//! Executor subsystem
//!
//! Runs tokens end to end: complexity checks, safety limiting, compilation,
//! dispatch to a [`Driver`], pagination metadata and telemetry.
//!
//! # Execution modes
//!
//! - [`Executor::execute`]: one token, one result
//! - [`Executor::batch`]: independent tokens concurrently, results in
//!   input order, failures isolated per token
//! - [`Executor::stream`]: bounded chunks for large result sets
//!
//! # Invariants
//!
//! - A token without `Limit` or `Paginate` is bounded by the default page
//!   size unless the caller opts out
//! - Complexity ceilings produce warnings, never errors
//! - Telemetry never carries filter values

mod batch;
mod complexity;
mod driver;
mod errors;
#[allow(clippy::module_inception)]
mod executor;
mod pagination;
mod result;
mod stream;

pub use complexity::{ComplexityAnalyzer, ComplexityReport};
pub use driver::{Driver, DriverError};
pub use errors::{ExecError, ExecResult};
pub use executor::{ExecOptions, Executor};
pub use result::{PaginationInfo, QueryResult, ResultMetadata};
