//! querytoken - validated query tokens compiled to parameterized SQL
//!
//! A [`token::Token`] is an immutable source plus an ordered list of
//! validated operations. The [`compiler`] lowers it to a native query with
//! bound parameters, the [`cursor`] codec makes keyset pagination opaque and
//! tamper-evident, and the [`executor`] runs compiled queries through a
//! caller-supplied driver with safety limits, pagination metadata and
//! telemetry.

pub mod caster;
pub mod cli;
pub mod compiler;
pub mod config;
pub mod cursor;
pub mod executor;
pub mod memory;
pub mod observability;
pub mod token;
pub mod value;
