//! Value Caster
//!
//! Converts untyped input (typically strings from a request) into typed
//! values before they enter a filter. Lists are cast element-wise and the
//! first failing element is reported with its position.
//!
//! Null passes through every cast unchanged.

mod errors;

pub use errors::{CastError, CastResult};

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::value::Value;

/// Target type for a cast
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CastType {
    Integer,
    Float,
    Decimal,
    Boolean,
    Date,
    DateTime,
    Uuid,
    /// Enumerant restricted to the listed names
    Enum(Vec<String>),
    Text,
}

impl CastType {
    /// Returns the type name
    pub fn as_str(&self) -> &'static str {
        match self {
            CastType::Integer => "integer",
            CastType::Float => "float",
            CastType::Decimal => "decimal",
            CastType::Boolean => "boolean",
            CastType::Date => "date",
            CastType::DateTime => "datetime",
            CastType::Uuid => "uuid",
            CastType::Enum(_) => "enum",
            CastType::Text => "text",
        }
    }

    fn hint(&self) -> String {
        match self {
            CastType::Integer => "use a whole number such as 42".into(),
            CastType::Float => "use a number such as 3.14".into(),
            CastType::Decimal => "use digits with an optional fraction such as 10.50".into(),
            CastType::Boolean => "use true/false, 1/0, yes/no or on/off".into(),
            CastType::Date => "use an ISO-8601 date such as 2024-01-31".into(),
            CastType::DateTime => {
                "use an RFC 3339 timestamp such as 2024-01-31T12:00:00Z".into()
            }
            CastType::Uuid => "use a hyphenated UUID".into(),
            CastType::Enum(allowed) => format!("use one of: {}", allowed.join(", ")),
            CastType::Text => "use a string".into(),
        }
    }
}

impl fmt::Display for CastType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for CastType {
    type Err = CastError;

    /// Parses scalar type names. Enumerations need their allowed names and
    /// are built directly with `CastType::Enum`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "integer" | "int" => Ok(CastType::Integer),
            "float" => Ok(CastType::Float),
            "decimal" => Ok(CastType::Decimal),
            "boolean" | "bool" => Ok(CastType::Boolean),
            "date" => Ok(CastType::Date),
            "datetime" | "utc_datetime" => Ok(CastType::DateTime),
            "uuid" | "id" => Ok(CastType::Uuid),
            "text" | "string" => Ok(CastType::Text),
            other => Err(CastError::new(
                other,
                "cast type",
                "use integer, float, decimal, boolean, date, datetime, uuid or text",
            )),
        }
    }
}

/// Cast a value to the target type
pub fn cast(value: &Value, target: &CastType) -> CastResult<Value> {
    match value {
        Value::Null => Ok(Value::Null),
        Value::List(items) => items
            .iter()
            .enumerate()
            .map(|(i, item)| cast_scalar(item, target).map_err(|e| e.at_index(i)))
            .collect::<CastResult<Vec<_>>>()
            .map(Value::List),
        scalar => cast_scalar(scalar, target),
    }
}

fn cast_scalar(value: &Value, target: &CastType) -> CastResult<Value> {
    let fail = || CastError::new(value.to_string(), target.as_str(), target.hint());

    match target {
        CastType::Integer => match value {
            Value::Integer(i) => Ok(Value::Integer(*i)),
            Value::Float(f) if f.fract() == 0.0 && f.is_finite() => Ok(Value::Integer(*f as i64)),
            Value::Text(s) => s.trim().parse().map(Value::Integer).map_err(|_| fail()),
            _ => Err(fail()),
        },
        CastType::Float => match value {
            Value::Integer(i) => Ok(Value::Float(*i as f64)),
            Value::Float(f) => Ok(Value::Float(*f)),
            Value::Decimal(d) => d.parse().map(Value::Float).map_err(|_| fail()),
            Value::Text(s) => s
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|f| f.is_finite())
                .map(Value::Float)
                .ok_or_else(fail),
            _ => Err(fail()),
        },
        CastType::Decimal => match value {
            Value::Integer(i) => Ok(Value::Decimal(i.to_string())),
            Value::Float(f) if f.is_finite() => Ok(Value::Decimal(f.to_string())),
            Value::Decimal(d) => Ok(Value::Decimal(d.clone())),
            Value::Text(s) => normalize_decimal(s.trim()).map(Value::Decimal).ok_or_else(fail),
            _ => Err(fail()),
        },
        CastType::Boolean => match value {
            Value::Bool(b) => Ok(Value::Bool(*b)),
            Value::Integer(0) => Ok(Value::Bool(false)),
            Value::Integer(1) => Ok(Value::Bool(true)),
            Value::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" | "on" | "t" => Ok(Value::Bool(true)),
                "false" | "0" | "no" | "off" | "f" => Ok(Value::Bool(false)),
                _ => Err(fail()),
            },
            _ => Err(fail()),
        },
        CastType::Date => match value {
            Value::Date(d) => Ok(Value::Date(*d)),
            Value::DateTime(dt) => Ok(Value::Date(dt.date_naive())),
            Value::Text(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
                .map(Value::Date)
                .map_err(|_| fail()),
            _ => Err(fail()),
        },
        CastType::DateTime => match value {
            Value::DateTime(dt) => Ok(Value::DateTime(*dt)),
            Value::Text(s) => parse_datetime(s.trim()).map(Value::DateTime).ok_or_else(fail),
            _ => Err(fail()),
        },
        CastType::Uuid => match value {
            Value::Uuid(u) => Ok(Value::Uuid(*u)),
            Value::Text(s) => Uuid::parse_str(s.trim()).map(Value::Uuid).map_err(|_| fail()),
            _ => Err(fail()),
        },
        CastType::Enum(allowed) => match value {
            Value::Text(s) | Value::Enum(s) if allowed.iter().any(|a| a == s) => {
                Ok(Value::Enum(s.clone()))
            }
            _ => Err(fail()),
        },
        CastType::Text => match value {
            Value::Text(s) | Value::Enum(s) | Value::Decimal(s) => Ok(Value::Text(s.clone())),
            Value::Integer(i) => Ok(Value::Text(i.to_string())),
            Value::Uuid(u) => Ok(Value::Text(u.to_string())),
            _ => Err(fail()),
        },
    }
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S"))
        .ok()
        .map(|naive| naive.and_utc())
}

/// Validates decimal text and strips a leading `+` and redundant leading
/// zeros. Fraction digits are kept exactly.
fn normalize_decimal(s: &str) -> Option<String> {
    let (sign, digits) = match s.as_bytes().first()? {
        b'-' => ("-", &s[1..]),
        b'+' => ("", &s[1..]),
        _ => ("", s),
    };
    let (int_part, frac_part) = match digits.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (digits, None),
    };
    if int_part.is_empty() || !int_part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if let Some(frac) = frac_part {
        if frac.is_empty() || !frac.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
    }
    let trimmed = int_part.trim_start_matches('0');
    let int_norm = if trimmed.is_empty() { "0" } else { trimmed };
    Some(match frac_part {
        Some(frac) => format!("{}{}.{}", sign, int_norm, frac),
        None => format!("{}{}", sign, int_norm),
    })
}
