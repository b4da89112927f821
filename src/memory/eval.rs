//! Row-level evaluation of native queries
//!
//! SQL three-valued logic: an unknown predicate result is `Value::Null`, and
//! only rows whose WHERE evaluates to `true` survive. Ordering puts nulls
//! last for ascending and first for descending sorts, like PostgreSQL.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};

use crate::compiler::{CompareOp, Expr, FromItem, NativeQuery, SimilarityFn};
use crate::executor::DriverError;
use crate::token::{AggregateFn, SortDirection};
use crate::value::{Row, Value};

type EvalResult<T> = Result<T, DriverError>;

/// Run `query` against `tables`
pub(crate) fn run(tables: &BTreeMap<String, Vec<Row>>, query: &NativeQuery) -> EvalResult<Vec<Row>> {
    unsupported(query)?;

    let source = match &query.from {
        FromItem::Table { name, .. } => tables
            .get(name)
            .cloned()
            .ok_or_else(|| DriverError::permanent(format!("relation \"{}\" does not exist", name)))?,
        FromItem::Subquery { query, .. } => run(tables, query)?,
    };
    let alias = query.root_alias();

    let mut rows = Vec::with_capacity(source.len());
    for row in source {
        let scope = Scope { alias, row: &row };
        let mut keep = true;
        for cond in &query.wheres {
            if !truthy(&scope.eval(cond)?) {
                keep = false;
                break;
            }
        }
        if keep {
            rows.push(row);
        }
    }

    if query.select.iter().any(|s| matches!(s.expr, Expr::Aggregate { .. })) {
        return aggregate(alias, &rows, query).map(|row| vec![row]);
    }

    sort(alias, &mut rows, query)?;

    if let Some(on) = &query.distinct {
        if !on.is_empty() {
            rows = distinct_on(alias, rows, on)?;
        }
    }

    let offset = query.offset.unwrap_or(0) as usize;
    let limit = query.limit.map(|l| l as usize).unwrap_or(usize::MAX);
    let mut out: Vec<Row> = Vec::new();
    for row in rows.into_iter().skip(offset) {
        let projected = project(alias, row, query)?;
        if matches!(&query.distinct, Some(on) if on.is_empty()) && out.contains(&projected) {
            continue;
        }
        if out.len() == limit {
            break;
        }
        out.push(projected);
    }
    Ok(out)
}

fn unsupported(query: &NativeQuery) -> EvalResult<()> {
    let feature = if !query.joins.is_empty() {
        Some("joins")
    } else if !query.ctes.is_empty() {
        Some("common table expressions")
    } else if !query.combinations.is_empty() {
        Some("set operations")
    } else if !query.group_by.is_empty() || !query.having.is_empty() {
        Some("grouping")
    } else if !query.windows.is_empty() {
        Some("windows")
    } else {
        None
    };
    match feature {
        Some(f) => Err(DriverError::permanent(format!("memory driver does not support {}", f))),
        None => Ok(()),
    }
}

fn sort(alias: &str, rows: &mut [Row], query: &NativeQuery) -> EvalResult<()> {
    if query.order_by.is_empty() {
        return Ok(());
    }
    // Evaluate sort keys once per row
    let mut keyed = Vec::with_capacity(rows.len());
    for row in rows.iter() {
        let scope = Scope { alias, row };
        let keys = query
            .order_by
            .iter()
            .map(|o| scope.eval(&o.expr))
            .collect::<EvalResult<Vec<_>>>()?;
        keyed.push((keys, row.clone()));
    }
    keyed.sort_by(|(a, _), (b, _)| {
        for ((x, y), order) in a.iter().zip(b.iter()).zip(&query.order_by) {
            match compare_for_sort(x, y, order.direction) {
                Ordering::Equal => continue,
                ord => return ord,
            }
        }
        Ordering::Equal
    });
    for (slot, (_, row)) in rows.iter_mut().zip(keyed) {
        *slot = row;
    }
    Ok(())
}

fn compare_for_sort(a: &Value, b: &Value, direction: SortDirection) -> Ordering {
    let nulls_first = direction.nulls_first();
    match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => {
            if nulls_first {
                Ordering::Less
            } else {
                Ordering::Greater
            }
        }
        (false, true) => {
            if nulls_first {
                Ordering::Greater
            } else {
                Ordering::Less
            }
        }
        (false, false) => {
            let ord = a.compare(b).unwrap_or(Ordering::Equal);
            if direction.is_ascending() {
                ord
            } else {
                ord.reverse()
            }
        }
    }
}

fn distinct_on(alias: &str, rows: Vec<Row>, on: &[Expr]) -> EvalResult<Vec<Row>> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for row in rows {
        let scope = Scope { alias, row: &row };
        let key = on
            .iter()
            .map(|e| scope.eval(e).map(|v| v.to_json().to_string()))
            .collect::<EvalResult<Vec<_>>>()?;
        if seen.insert(key) {
            out.push(row);
        }
    }
    Ok(out)
}

fn project(alias: &str, row: Row, query: &NativeQuery) -> EvalResult<Row> {
    if query.select.is_empty() {
        return Ok(row);
    }
    let scope = Scope { alias, row: &row };
    let mut out = Row::new();
    for item in &query.select {
        let name = match (&item.alias, &item.expr) {
            (Some(a), _) => a.clone(),
            (None, Expr::Column { field, .. }) => field.clone(),
            (None, _) => "?column?".to_string(),
        };
        out.insert(name, scope.eval(&item.expr)?);
    }
    Ok(out)
}

fn aggregate(alias: &str, rows: &[Row], query: &NativeQuery) -> EvalResult<Row> {
    let mut out = Row::new();
    for item in &query.select {
        let (func, arg) = match &item.expr {
            Expr::Aggregate { func, arg } => (*func, arg),
            _ => {
                return Err(DriverError::permanent(
                    "column must appear in GROUP BY or be used in an aggregate",
                ))
            }
        };
        let values = match arg {
            None => rows.iter().map(|_| Value::Integer(1)).collect::<Vec<_>>(),
            Some(arg) => rows
                .iter()
                .map(|row| Scope { alias, row }.eval(arg))
                .collect::<EvalResult<Vec<_>>>()?
                .into_iter()
                .filter(|v| !v.is_null())
                .collect(),
        };
        let result = match func {
            AggregateFn::Count => Value::Integer(values.len() as i64),
            AggregateFn::Sum => sum(&values),
            AggregateFn::Avg => match sum(&values) {
                Value::Integer(s) => Value::Float(s as f64 / values.len() as f64),
                Value::Float(s) => Value::Float(s / values.len() as f64),
                other => other,
            },
            AggregateFn::Min => extreme(&values, Ordering::Less),
            AggregateFn::Max => extreme(&values, Ordering::Greater),
        };
        let name = item.alias.clone().unwrap_or_else(|| func.as_sql().to_string());
        out.insert(name, result);
    }
    Ok(out)
}

fn sum(values: &[Value]) -> Value {
    if values.is_empty() {
        return Value::Null;
    }
    if values.iter().all(|v| matches!(v, Value::Integer(_))) {
        let total = values
            .iter()
            .map(|v| if let Value::Integer(i) = v { *i } else { 0 })
            .sum();
        return Value::Integer(total);
    }
    let total = values
        .iter()
        .map(|v| match v {
            Value::Integer(i) => *i as f64,
            Value::Float(f) => *f,
            Value::Decimal(d) => d.parse().unwrap_or(0.0),
            _ => 0.0,
        })
        .sum();
    Value::Float(total)
}

fn extreme(values: &[Value], want: Ordering) -> Value {
    values
        .iter()
        .fold(None::<&Value>, |best, v| match best {
            Some(b) if v.compare(b) != Some(want) => Some(b),
            _ => Some(v),
        })
        .cloned()
        .unwrap_or(Value::Null)
}

fn truthy(v: &Value) -> bool {
    matches!(v, Value::Bool(true))
}

/// Three-valued boolean
fn tri(v: &Value) -> Option<bool> {
    match v {
        Value::Bool(b) => Some(*b),
        _ => None,
    }
}

fn from_tri(b: Option<bool>) -> Value {
    b.map(Value::Bool).unwrap_or(Value::Null)
}

struct Scope<'r> {
    alias: &'r str,
    row: &'r Row,
}

impl Scope<'_> {
    fn column(&self, binding: &str, field: &str) -> Value {
        let found = if binding == self.alias {
            self.row.get(field)
        } else {
            self.row.get(&format!("{}.{}", binding, field))
        };
        found.cloned().unwrap_or(Value::Null)
    }

    fn eval(&self, expr: &Expr) -> EvalResult<Value> {
        Ok(match expr {
            Expr::Column { binding, field } => self.column(binding, field),
            Expr::Param(v) => v.clone(),
            Expr::Int(i) => Value::Integer(*i),
            Expr::Bool(b) => Value::Bool(*b),
            Expr::Compare { left, op, right } => {
                let (l, r) = (self.eval(left)?, self.eval(right)?);
                from_tri(l.compare(&r).map(|ord| compare_holds(*op, ord)))
            }
            Expr::And(items) => {
                let mut unknown = false;
                for item in items {
                    match tri(&self.eval(item)?) {
                        Some(false) => return Ok(Value::Bool(false)),
                        None => unknown = true,
                        Some(true) => {}
                    }
                }
                from_tri((!unknown).then_some(true))
            }
            Expr::Or(items) => {
                let mut unknown = false;
                for item in items {
                    match tri(&self.eval(item)?) {
                        Some(true) => return Ok(Value::Bool(true)),
                        None => unknown = true,
                        Some(false) => {}
                    }
                }
                from_tri((!unknown).then_some(false))
            }
            Expr::Not(inner) => from_tri(tri(&self.eval(inner)?).map(|b| !b)),
            Expr::IsNull(inner) => Value::Bool(self.eval(inner)?.is_null()),
            Expr::IsNotNull(inner) => Value::Bool(!self.eval(inner)?.is_null()),
            Expr::InList { expr, list, negated } => {
                let v = self.eval(expr)?;
                if v.is_null() {
                    return Ok(Value::Null);
                }
                let mut unknown = false;
                let mut found = false;
                for item in list {
                    match v.compare(&self.eval(item)?) {
                        Some(Ordering::Equal) => {
                            found = true;
                            break;
                        }
                        None => unknown = true,
                        _ => {}
                    }
                }
                let result = if found {
                    Some(true)
                } else if unknown {
                    None
                } else {
                    Some(false)
                };
                from_tri(result.map(|b| b != *negated))
            }
            Expr::Like {
                expr,
                pattern,
                case_insensitive,
                negated,
            } => {
                let (v, p) = (self.eval(expr)?, self.eval(pattern)?);
                match (v.as_str(), p.as_str()) {
                    (Some(text), Some(pat)) => {
                        Value::Bool(like_match(text, pat, *case_insensitive) != *negated)
                    }
                    _ => Value::Null,
                }
            }
            Expr::Lower(inner) => self.eval(inner)?.lowercased(),
            Expr::Between { expr, low, high } => {
                let v = self.eval(expr)?;
                let lo = v.compare(&self.eval(low)?).map(|o| o != Ordering::Less);
                let hi = v.compare(&self.eval(high)?).map(|o| o != Ordering::Greater);
                from_tri(match (lo, hi) {
                    (Some(a), Some(b)) => Some(a && b),
                    (Some(false), None) | (None, Some(false)) => Some(false),
                    _ => None,
                })
            }
            Expr::Contains { left, right } => {
                let (l, r) = (self.eval(left)?, self.eval(right)?);
                match (&l, &r) {
                    (Value::List(a), Value::List(b)) => {
                        Value::Bool(b.iter().all(|x| a.iter().any(|y| x.compare(y) == Some(Ordering::Equal))))
                    }
                    (Value::Json(a), Value::Json(b)) => Value::Bool(json_contains(a, b)),
                    (Value::Null, _) | (_, Value::Null) => Value::Null,
                    _ => return Err(DriverError::permanent("operator @> needs arrays or json")),
                }
            }
            Expr::Overlaps { left, right } => match (self.eval(left)?, self.eval(right)?) {
                (Value::List(a), Value::List(b)) => {
                    Value::Bool(a.iter().any(|x| b.iter().any(|y| x.compare(y) == Some(Ordering::Equal))))
                }
                (Value::Null, _) | (_, Value::Null) => Value::Null,
                _ => return Err(DriverError::permanent("operator && needs arrays")),
            },
            Expr::Similarity { func, left, right } => {
                let (l, r) = (self.eval(left)?, self.eval(right)?);
                match (l.as_str(), r.as_str()) {
                    (Some(a), Some(b)) => Value::Float(match func {
                        SimilarityFn::Similarity => similarity(a, b),
                        SimilarityFn::WordSimilarity => word_similarity(a, b),
                    }),
                    _ => Value::Null,
                }
            }
            Expr::Case { whens, otherwise } => {
                for (cond, result) in whens {
                    if truthy(&self.eval(cond)?) {
                        return self.eval(result);
                    }
                }
                self.eval(otherwise)?
            }
            Expr::Greatest(items) => {
                let values = items
                    .iter()
                    .map(|e| self.eval(e))
                    .collect::<EvalResult<Vec<_>>>()?
                    .into_iter()
                    .filter(|v| !v.is_null())
                    .collect::<Vec<_>>();
                extreme(&values, Ordering::Greater)
            }
            Expr::Raw { .. } => {
                return Err(DriverError::permanent("memory driver cannot evaluate raw fragments"))
            }
            Expr::Exists { .. } => {
                return Err(DriverError::permanent("memory driver cannot evaluate subqueries"))
            }
            Expr::Aggregate { .. } => {
                return Err(DriverError::permanent("aggregate functions are not allowed here"))
            }
        })
    }
}

fn compare_holds(op: CompareOp, ord: Ordering) -> bool {
    match op {
        CompareOp::Eq => ord == Ordering::Equal,
        CompareOp::Ne => ord != Ordering::Equal,
        CompareOp::Gt => ord == Ordering::Greater,
        CompareOp::Gte => ord != Ordering::Less,
        CompareOp::Lt => ord == Ordering::Less,
        CompareOp::Lte => ord != Ordering::Greater,
    }
}

/// LIKE with `%`, `_` and backslash escapes
pub(crate) fn like_match(text: &str, pattern: &str, case_insensitive: bool) -> bool {
    let (text, pattern) = if case_insensitive {
        (text.to_lowercase(), pattern.to_lowercase())
    } else {
        (text.to_string(), pattern.to_string())
    };
    let text: Vec<char> = text.chars().collect();

    // Tokenize pattern: None = '%', Some(None) = '_', Some(Some(c)) = literal
    let mut tokens = Vec::new();
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '%' => tokens.push(None),
            '_' => tokens.push(Some(None)),
            '\\' => tokens.push(Some(chars.next().or(Some('\\')))),
            c => tokens.push(Some(Some(c))),
        }
    }

    // dp[j] = pattern prefix of length i matches text prefix of length j
    let mut dp = vec![false; text.len() + 1];
    dp[0] = true;
    for token in &tokens {
        let mut next = vec![false; text.len() + 1];
        match token {
            None => {
                let mut reachable = false;
                for j in 0..=text.len() {
                    reachable |= dp[j];
                    next[j] = reachable;
                }
            }
            Some(expected) => {
                for j in 1..=text.len() {
                    next[j] = dp[j - 1] && expected.map_or(true, |c| c == text[j - 1]);
                }
            }
        }
        dp = next;
    }
    dp[text.len()]
}

fn json_contains(haystack: &serde_json::Value, needle: &serde_json::Value) -> bool {
    use serde_json::Value as J;
    match (haystack, needle) {
        (J::Object(h), J::Object(n)) => n
            .iter()
            .all(|(k, v)| h.get(k).map_or(false, |hv| json_contains(hv, v))),
        (J::Array(h), J::Array(n)) => n.iter().all(|v| h.iter().any(|hv| json_contains(hv, v))),
        (J::Array(h), scalar) => h.iter().any(|hv| hv == scalar),
        (h, n) => h == n,
    }
}

/// pg_trgm style trigram set: each word padded with two leading spaces and
/// one trailing space, lowercased, non-alphanumerics as separators
fn trigrams(text: &str) -> HashSet<String> {
    let mut set = HashSet::new();
    for word in text
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let padded: Vec<char> = format!("  {} ", word).chars().collect();
        for window in padded.windows(3) {
            set.insert(window.iter().collect());
        }
    }
    set
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

pub(crate) fn similarity(a: &str, b: &str) -> f64 {
    jaccard(&trigrams(a), &trigrams(b))
}

/// Best similarity between `needle` and any single word of `haystack`, or
/// the whole haystack
pub(crate) fn word_similarity(needle: &str, haystack: &str) -> f64 {
    let target = trigrams(needle);
    haystack
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| jaccard(&target, &trigrams(w)))
        .fold(jaccard(&target, &trigrams(haystack)), f64::max)
}
