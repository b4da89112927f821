//! In-memory driver
//!
//! Evaluates compiled queries against tables held in memory. Used by tests
//! and by the CLI's `run` command to exercise the full pipeline without a
//! database. Supports single-table queries: filters, ordering, limit and
//! offset, projection, distinct and ungrouped aggregates. Anything that
//! needs a real planner (joins, grouping, CTEs, raw fragments) fails with a
//! permanent driver error.

mod eval;

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::{self, BoxFuture, FutureExt};

use crate::compiler::NativeQuery;
use crate::executor::{Driver, DriverError};
use crate::value::Row;

#[derive(Debug, Clone, Default)]
pub struct MemoryDriver {
    tables: Arc<BTreeMap<String, Vec<Row>>>,
    /// Every query received, in order
    log: Arc<Mutex<Vec<NativeQuery>>>,
}

impl MemoryDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, name: impl Into<String>, rows: Vec<Row>) -> Self {
        Arc::make_mut(&mut self.tables).insert(name.into(), rows);
        self
    }

    /// Load tables from a JSON object of `{"table": [{...row...}, ...]}`
    pub fn from_json(doc: &serde_json::Value) -> Result<Self, DriverError> {
        let tables = doc
            .as_object()
            .ok_or_else(|| DriverError::permanent("fixture must be an object of tables"))?;
        let mut driver = Self::new();
        for (name, rows) in tables {
            let rows = rows
                .as_array()
                .ok_or_else(|| DriverError::permanent(format!("table {} must be an array", name)))?
                .iter()
                .map(|r| match r.as_object() {
                    Some(obj) => Ok(obj
                        .iter()
                        .map(|(k, v)| (k.clone(), crate::value::Value::from_json(v)))
                        .collect::<Row>()),
                    None => Err(DriverError::permanent(format!(
                        "rows of table {} must be objects",
                        name
                    ))),
                })
                .collect::<Result<Vec<_>, _>>()?;
            driver = driver.with_table(name.clone(), rows);
        }
        Ok(driver)
    }

    /// Queries received so far
    pub fn queries(&self) -> Vec<NativeQuery> {
        self.log.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn query_count(&self) -> usize {
        self.log.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    /// Evaluate without going through the async driver interface
    pub fn evaluate(&self, query: &NativeQuery) -> Result<Vec<Row>, DriverError> {
        eval::run(&self.tables, query)
    }
}

impl Driver for MemoryDriver {
    fn fetch(&self, query: NativeQuery, _timeout: Duration) -> BoxFuture<'_, Result<Vec<Row>, DriverError>> {
        let result = self.evaluate(&query);
        self.log.lock().unwrap_or_else(|p| p.into_inner()).push(query);
        future::ready(result).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::Compiler;
    use crate::token::{build, FilterOp, SortDirection, Token};
    use crate::value::{row, Value};

    fn people() -> MemoryDriver {
        MemoryDriver::new().with_table(
            "people",
            vec![
                row([("id", Value::from(1)), ("name", Value::from("john")), ("age", Value::from(30))]),
                row([("id", Value::from(2)), ("name", Value::from("Jane")), ("age", Value::from(25))]),
                row([("id", Value::from(3)), ("name", Value::from("Bob")), ("age", Value::Null)]),
            ],
        )
    }

    fn ids(rows: &[Row]) -> Vec<Value> {
        rows.iter().map(|r| r["id"].clone()).collect()
    }

    #[test]
    fn test_filter_sort_limit() {
        let t = Token::table("people");
        let t = build::filter(&t, "age", FilterOp::Gte, 20).unwrap();
        let t = build::order(&t, "age", SortDirection::Desc).unwrap();
        let t = build::limit(&t, 1).unwrap();
        let q = Compiler::default().compile(&t).unwrap();
        let rows = people().evaluate(&q).unwrap();
        assert_eq!(ids(&rows), vec![Value::Integer(1)]);
    }

    #[test]
    fn test_null_never_matches_comparison() {
        let t = build::filter(&Token::table("people"), "age", FilterOp::Lt, 100).unwrap();
        let q = Compiler::default().compile(&t).unwrap();
        assert_eq!(people().evaluate(&q).unwrap().len(), 2);
    }

    #[test]
    fn test_nulls_sort_last_ascending() {
        let t = build::order(&Token::table("people"), "age", SortDirection::Asc).unwrap();
        let q = Compiler::default().compile(&t).unwrap();
        let rows = people().evaluate(&q).unwrap();
        assert_eq!(ids(&rows), vec![Value::Integer(2), Value::Integer(1), Value::Integer(3)]);
    }

    #[test]
    fn test_count_query() {
        let t = build::filter(&Token::table("people"), "age", FilterOp::Gt, 0).unwrap();
        let q = Compiler::default().compile_count(&t).unwrap();
        let rows = people().evaluate(&q).unwrap();
        assert_eq!(rows[0]["count"], Value::Integer(2));
    }

    #[test]
    fn test_missing_table_is_permanent_error() {
        let q = Compiler::default().compile(&Token::table("nope")).unwrap();
        let err = MemoryDriver::new().evaluate(&q).unwrap_err();
        assert!(!err.transient);
        assert!(err.message.contains("nope"));
    }

    #[test]
    fn test_from_json_fixture() {
        let doc = serde_json::json!({"t": [{"id": 1, "tags": ["a"]}]});
        let driver = MemoryDriver::from_json(&doc).unwrap();
        let q = Compiler::default().compile(&Token::table("t")).unwrap();
        assert_eq!(driver.evaluate(&q).unwrap().len(), 1);
        assert!(MemoryDriver::from_json(&serde_json::json!([])).is_err());
    }
}
