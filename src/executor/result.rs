//! Result types for query execution

use std::time::Duration;

use serde::Serialize;
use serde_json::json;

use crate::value::{Row, Value};

/// Pagination state derived from the returned rows
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PaginationInfo {
    /// No pagination operation in the token
    None,
    Offset {
        page: u64,
        page_size: u64,
        offset: u64,
        has_more: bool,
        has_previous: bool,
        next_offset: Option<u64>,
        prev_offset: Option<u64>,
    },
    Cursor {
        page_size: u64,
        /// More rows exist in the direction of travel
        has_more: bool,
        /// Cursor of the first returned row
        start_cursor: Option<String>,
        /// Cursor of the last returned row
        end_cursor: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResultMetadata {
    /// Time spent waiting on the driver for the main query
    pub query_time: Duration,
    /// Wall time of the whole execution
    pub total_time: Duration,
    pub sql: Option<String>,
    pub total_count: Option<u64>,
    pub operation_count: usize,
    /// Complexity and safety-limit notes, plus compiler approximations
    pub warnings: Vec<String>,
}

/// Rows plus everything known about how they were produced
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    pub data: Vec<Row>,
    pub pagination: PaginationInfo,
    pub metadata: ResultMetadata,
}

impl QueryResult {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Column values of `field` across the returned rows
    pub fn column(&self, field: &str) -> Vec<Value> {
        self.data
            .iter()
            .map(|row| row.get(field).cloned().unwrap_or(Value::Null))
            .collect()
    }

    /// Plain JSON rendering: rows as objects, durations in microseconds
    pub fn to_json(&self) -> serde_json::Value {
        let data: Vec<serde_json::Value> = self
            .data
            .iter()
            .map(|row| {
                row.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect::<serde_json::Map<_, _>>()
                    .into()
            })
            .collect();
        json!({
            "data": data,
            "pagination": serde_json::to_value(&self.pagination).unwrap_or(serde_json::Value::Null),
            "metadata": {
                "query_time_us": self.metadata.query_time.as_micros() as u64,
                "total_time_us": self.metadata.total_time.as_micros() as u64,
                "sql": self.metadata.sql,
                "total_count": self.metadata.total_count,
                "operation_count": self.metadata.operation_count,
                "warnings": self.metadata.warnings,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::row;

    #[test]
    fn test_to_json_shape() {
        let result = QueryResult {
            data: vec![row([("id", 1)]), row([("id", 2)])],
            pagination: PaginationInfo::Cursor {
                page_size: 2,
                has_more: true,
                start_cursor: Some("a".into()),
                end_cursor: Some("b".into()),
            },
            metadata: ResultMetadata {
                operation_count: 3,
                ..Default::default()
            },
        };
        let json = result.to_json();
        assert_eq!(json["data"][1]["id"], 2);
        assert_eq!(json["pagination"]["type"], "cursor");
        assert_eq!(json["pagination"]["has_more"], true);
        assert_eq!(json["metadata"]["operation_count"], 3);
        assert_eq!(result.column("id"), vec![Value::Integer(1), Value::Integer(2)]);
    }
}
