//! Raw fragment binder
//!
//! Fragments are text with placeholders plus a bound value list; nothing
//! is ever interpolated into the SQL. Named `:name` placeholders become
//! positional `?` in order of appearance, quoted literals and `::` casts
//! are left alone. The parameter count is checked against the cap before
//! any rewriting.

use std::sync::OnceLock;

use regex::{Captures, Regex};

use crate::token::{RawParams, RawWhere};
use crate::value::Value;

use super::errors::{CompileError, CompileResult};
use super::query::Expr;

fn named_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"'(?:[^']|'')*'|"(?:[^"]|"")*"|::|:([A-Za-z_][A-Za-z0-9_]*)"#)
            .expect("named placeholder pattern is valid")
    })
}

/// Splits `sql` at every `?` outside quoted literals and identifiers
pub fn split_positional(sql: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    let mut start = 0;
    let mut quote: Option<char> = None;
    for (i, c) in sql.char_indices() {
        match (quote, c) {
            (None, '\'' | '"') => quote = Some(c),
            (Some(q), c) if c == q => quote = None,
            (None, '?') => {
                segments.push(&sql[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    segments.push(&sql[start..]);
    segments
}

/// Number of positional placeholders
pub fn count_positional(sql: &str) -> usize {
    split_positional(sql).len() - 1
}

/// Named placeholders in order of appearance (repeats included)
pub fn placeholder_names(sql: &str) -> Vec<String> {
    named_pattern()
        .captures_iter(sql)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
        .collect()
}

/// Lower a raw fragment into a bound expression
pub fn lower_raw(raw: &RawWhere, cap: usize) -> CompileResult<Expr> {
    let declared = raw.params.len();
    if declared > cap {
        return Err(CompileError::ParameterLimit {
            count: declared,
            max_allowed: cap,
        });
    }

    let (sql, params) = match &raw.params {
        RawParams::Positional(params) => {
            let placeholders = count_positional(&raw.sql);
            if placeholders != params.len() {
                return Err(CompileError::Validation(format!(
                    "raw fragment has {} placeholders but {} parameters",
                    placeholders,
                    params.len()
                )));
            }
            (raw.sql.clone(), params.clone())
        }
        RawParams::Named(named) => rewrite_named(&raw.sql, named)?,
    };

    if params.len() > cap {
        return Err(CompileError::ParameterLimit {
            count: params.len(),
            max_allowed: cap,
        });
    }
    Ok(Expr::Raw { sql, params })
}

fn rewrite_named(sql: &str, named: &[(String, Value)]) -> CompileResult<(String, Vec<Value>)> {
    let mut params = Vec::new();
    let mut missing: Option<String> = None;

    let rewritten = named_pattern().replace_all(sql, |caps: &Captures| {
        let Some(name) = caps.get(1) else {
            return caps[0].to_string();
        };
        match named.iter().find(|(n, _)| n == name.as_str()) {
            Some((_, value)) => {
                params.push(value.clone());
                "?".to_string()
            }
            None => {
                missing.get_or_insert_with(|| name.as_str().to_string());
                caps[0].to_string()
            }
        }
    });

    if let Some(name) = missing {
        return Err(CompileError::Validation(format!(
            "raw fragment placeholder :{} has no parameter",
            name
        )));
    }
    Ok((rewritten.into_owned(), params))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn positional(sql: &str, n: usize) -> RawWhere {
        RawWhere {
            sql: sql.to_string(),
            params: RawParams::Positional((0..n as i64).map(Value::from).collect()),
        }
    }

    #[test]
    fn test_split_skips_quoted() {
        assert_eq!(count_positional("a = ? AND b = '?' AND \"c?\" = ?"), 2);
        assert_eq!(count_positional("no placeholders"), 0);
    }

    #[test]
    fn test_named_rewritten_in_order() {
        let raw = RawWhere {
            sql: "age > :min AND age < :max AND created_at::date = :min".into(),
            params: RawParams::Named(vec![
                ("max".into(), Value::from(65)),
                ("min".into(), Value::from(18)),
            ]),
        };
        match lower_raw(&raw, 20).unwrap() {
            Expr::Raw { sql, params } => {
                assert_eq!(sql, "age > ? AND age < ? AND created_at::date = ?");
                assert_eq!(params, vec![Value::from(18), Value::from(65), Value::from(18)]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_named_ignores_literals() {
        assert_eq!(placeholder_names("x = ':not_me' AND y = :me"), vec!["me"]);
    }

    #[test]
    fn test_cap_checked_before_binding() {
        let sql = vec!["?"; 21].join(", ");
        let err = lower_raw(&positional(&sql, 21), 20).unwrap_err();
        assert_eq!(err, CompileError::ParameterLimit { count: 21, max_allowed: 20 });

        let sql = vec!["?"; 20].join(", ");
        assert!(lower_raw(&positional(&sql, 20), 20).is_ok());
    }

    #[test]
    fn test_repeated_names_count_against_cap() {
        let sql = vec![":v"; 3].join(" + ");
        let raw = RawWhere {
            sql,
            params: RawParams::Named(vec![("v".into(), Value::from(1))]),
        };
        assert!(matches!(
            lower_raw(&raw, 2),
            Err(CompileError::ParameterLimit { count: 3, max_allowed: 2 })
        ));
    }

    #[test]
    fn test_placeholder_mismatch() {
        assert!(matches!(
            lower_raw(&positional("a = ?", 2), 20),
            Err(CompileError::Validation(_))
        ));
    }
}
