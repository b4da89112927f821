//! Filter dispatch table
//!
//! One predicate builder per operator. Plain filters, filter groups,
//! `having` conditions and field-to-field comparisons all go through
//! [`predicate`], so operator semantics live in exactly one place.

use crate::token::FilterOp;
use crate::value::Value;

use super::query::{CompareOp, Expr, SimilarityFn};

/// Right-hand side of a predicate
#[derive(Debug, Clone)]
pub enum Operand {
    Value(Value),
    /// Another expression, usually a column
    Expr(Expr),
}

impl Operand {
    fn into_expr(self) -> Expr {
        match self {
            Operand::Value(v) => Expr::Param(v),
            Operand::Expr(e) => e,
        }
    }

    /// Lowercased operand for case-insensitive comparisons
    fn lowered(self) -> Expr {
        match self {
            Operand::Value(v) => Expr::Param(v.lowercased()),
            Operand::Expr(e) => Expr::lower(e),
        }
    }

    fn value(&self) -> Option<&Value> {
        match self {
            Operand::Value(v) => Some(v),
            Operand::Expr(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PredicateOpts {
    pub case_insensitive: bool,
    pub threshold: f64,
}

pub type PredicateBuilder = fn(Expr, Operand, &PredicateOpts) -> Expr;

/// Builder for an operator
pub fn predicate(op: FilterOp) -> PredicateBuilder {
    match op {
        FilterOp::Eq => eq,
        FilterOp::Ne => ne,
        FilterOp::Gt => gt,
        FilterOp::Gte => gte,
        FilterOp::Lt => lt,
        FilterOp::Lte => lte,
        FilterOp::In => in_list,
        FilterOp::NotIn => not_in_list,
        FilterOp::Like => like,
        FilterOp::Ilike => ilike,
        FilterOp::NotLike => not_like,
        FilterOp::StartsWith => starts_with,
        FilterOp::EndsWith => ends_with,
        FilterOp::Contains => contains,
        FilterOp::IsNil => is_nil,
        FilterOp::NotNil => not_nil,
        FilterOp::Between => between,
        FilterOp::ArrayContains => array_contains,
        FilterOp::ArrayOverlap => array_overlap,
        FilterOp::JsonContains => json_contains,
        FilterOp::Similar => similar,
        FilterOp::WordSimilar => word_similar,
    }
}

fn compare(left: Expr, op: CompareOp, right: Operand, opts: &PredicateOpts) -> Expr {
    if opts.case_insensitive {
        Expr::compare(Expr::lower(left), op, right.lowered())
    } else {
        Expr::compare(left, op, right.into_expr())
    }
}

fn eq(left: Expr, right: Operand, opts: &PredicateOpts) -> Expr {
    compare(left, CompareOp::Eq, right, opts)
}

fn ne(left: Expr, right: Operand, opts: &PredicateOpts) -> Expr {
    compare(left, CompareOp::Ne, right, opts)
}

fn gt(left: Expr, right: Operand, _: &PredicateOpts) -> Expr {
    Expr::compare(left, CompareOp::Gt, right.into_expr())
}

fn gte(left: Expr, right: Operand, _: &PredicateOpts) -> Expr {
    Expr::compare(left, CompareOp::Gte, right.into_expr())
}

fn lt(left: Expr, right: Operand, _: &PredicateOpts) -> Expr {
    Expr::compare(left, CompareOp::Lt, right.into_expr())
}

fn lte(left: Expr, right: Operand, _: &PredicateOpts) -> Expr {
    Expr::compare(left, CompareOp::Lte, right.into_expr())
}

fn membership(left: Expr, right: Operand, opts: &PredicateOpts, negated: bool) -> Expr {
    let items: Vec<Value> = right
        .value()
        .and_then(Value::as_list)
        .map(<[Value]>::to_vec)
        .unwrap_or_default();
    if items.is_empty() {
        // `x IN ()` matches nothing, `x NOT IN ()` everything
        return Expr::Bool(negated);
    }
    let (expr, list) = if opts.case_insensitive {
        (
            Expr::lower(left),
            items.iter().map(|v| Expr::Param(v.lowercased())).collect(),
        )
    } else {
        (left, items.into_iter().map(Expr::Param).collect())
    };
    Expr::InList {
        expr: Box::new(expr),
        list,
        negated,
    }
}

fn in_list(left: Expr, right: Operand, opts: &PredicateOpts) -> Expr {
    membership(left, right, opts, false)
}

fn not_in_list(left: Expr, right: Operand, opts: &PredicateOpts) -> Expr {
    membership(left, right, opts, true)
}

fn pattern(left: Expr, pattern: Expr, case_insensitive: bool, negated: bool) -> Expr {
    Expr::Like {
        expr: Box::new(left),
        pattern: Box::new(pattern),
        case_insensitive,
        negated,
    }
}

fn like(left: Expr, right: Operand, opts: &PredicateOpts) -> Expr {
    pattern(left, right.into_expr(), opts.case_insensitive, false)
}

fn ilike(left: Expr, right: Operand, _: &PredicateOpts) -> Expr {
    pattern(left, right.into_expr(), true, false)
}

fn not_like(left: Expr, right: Operand, opts: &PredicateOpts) -> Expr {
    pattern(left, right.into_expr(), opts.case_insensitive, true)
}

/// Escape LIKE metacharacters in literal text
pub fn escape_like(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn affixed(left: Expr, right: Operand, opts: &PredicateOpts, prefix: &str, suffix: &str) -> Expr {
    let text = right.value().and_then(Value::as_str).unwrap_or_default();
    let wrapped = format!("{}{}{}", prefix, escape_like(text), suffix);
    pattern(left, Expr::param(wrapped), opts.case_insensitive, false)
}

fn starts_with(left: Expr, right: Operand, opts: &PredicateOpts) -> Expr {
    affixed(left, right, opts, "", "%")
}

fn ends_with(left: Expr, right: Operand, opts: &PredicateOpts) -> Expr {
    affixed(left, right, opts, "%", "")
}

fn contains(left: Expr, right: Operand, opts: &PredicateOpts) -> Expr {
    affixed(left, right, opts, "%", "%")
}

fn is_nil(left: Expr, _: Operand, _: &PredicateOpts) -> Expr {
    Expr::IsNull(Box::new(left))
}

fn not_nil(left: Expr, _: Operand, _: &PredicateOpts) -> Expr {
    Expr::IsNotNull(Box::new(left))
}

/// Single `[low, high]` range or a list of ranges, OR-combined
fn between(left: Expr, right: Operand, _: &PredicateOpts) -> Expr {
    let items = right.value().and_then(Value::as_list).unwrap_or_default();
    let multi = !items.is_empty() && items.iter().all(|i| i.as_list().is_some());
    let ranges: Vec<&[Value]> = if multi {
        items.iter().filter_map(Value::as_list).collect()
    } else {
        vec![items]
    };
    let branches = ranges
        .into_iter()
        .filter_map(|range| match range {
            [low, high] => Some(Expr::Between {
                expr: Box::new(left.clone()),
                low: Box::new(Expr::Param(low.clone())),
                high: Box::new(Expr::Param(high.clone())),
            }),
            _ => None,
        })
        .collect();
    Expr::or_all(branches)
}

fn array_contains(left: Expr, right: Operand, _: &PredicateOpts) -> Expr {
    Expr::Contains {
        left: Box::new(left),
        right: Box::new(right.into_expr()),
    }
}

fn array_overlap(left: Expr, right: Operand, _: &PredicateOpts) -> Expr {
    Expr::Overlaps {
        left: Box::new(left),
        right: Box::new(right.into_expr()),
    }
}

fn json_contains(left: Expr, right: Operand, _: &PredicateOpts) -> Expr {
    let right = match right {
        Operand::Value(Value::List(items)) => {
            Expr::Param(Value::Json(Value::List(items).to_json()))
        }
        other => other.into_expr(),
    };
    Expr::Contains {
        left: Box::new(left),
        right: Box::new(right),
    }
}

/// `similarity(field, term) > threshold`
fn similar(left: Expr, right: Operand, opts: &PredicateOpts) -> Expr {
    let score = Expr::Similarity {
        func: SimilarityFn::Similarity,
        left: Box::new(left),
        right: Box::new(right.into_expr()),
    };
    Expr::compare(score, CompareOp::Gt, Expr::param(opts.threshold))
}

/// `word_similarity(term, field) > threshold`
fn word_similar(left: Expr, right: Operand, opts: &PredicateOpts) -> Expr {
    let score = Expr::Similarity {
        func: SimilarityFn::WordSimilarity,
        left: Box::new(right.into_expr()),
        right: Box::new(left),
    };
    Expr::compare(score, CompareOp::Gt, Expr::param(opts.threshold))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts() -> PredicateOpts {
        PredicateOpts {
            case_insensitive: false,
            threshold: 0.3,
        }
    }

    fn col() -> Expr {
        Expr::column("root", "name")
    }

    fn sql(op: FilterOp, value: impl Into<Value>, opts: PredicateOpts) -> String {
        predicate(op)(col(), Operand::Value(value.into()), &opts)
            .to_sql()
            .sql
    }

    #[test]
    fn test_every_operator_has_a_builder() {
        for op in FilterOp::ALL {
            let value = match op {
                FilterOp::In | FilterOp::NotIn | FilterOp::ArrayContains | FilterOp::ArrayOverlap => {
                    Value::from(vec![1, 2])
                }
                FilterOp::Between => Value::from(vec![1, 2]),
                _ => Value::from("x"),
            };
            let rendered = sql(op, value, opts());
            assert!(rendered.contains("\"root\".\"name\""), "{}: {}", op, rendered);
        }
    }

    #[test]
    fn test_case_insensitive_eq_lowers_both_sides() {
        let ci = PredicateOpts {
            case_insensitive: true,
            ..opts()
        };
        let e = predicate(FilterOp::Eq)(col(), Operand::Value("John".into()), &ci);
        let compiled = e.to_sql();
        assert_eq!(compiled.sql, "lower(\"root\".\"name\") = $1");
        assert_eq!(compiled.params, vec![Value::from("john")]);
    }

    #[test]
    fn test_in_case_insensitive() {
        let ci = PredicateOpts {
            case_insensitive: true,
            ..opts()
        };
        let e = predicate(FilterOp::In)(col(), Operand::Value(vec!["A", "b"].into()), &ci);
        let compiled = e.to_sql();
        assert_eq!(compiled.sql, "lower(\"root\".\"name\") IN ($1, $2)");
        assert_eq!(compiled.params, vec![Value::from("a"), Value::from("b")]);
    }

    #[test]
    fn test_empty_in_list() {
        assert_eq!(sql(FilterOp::In, Vec::<i64>::new(), opts()), "FALSE");
        assert_eq!(sql(FilterOp::NotIn, Vec::<i64>::new(), opts()), "TRUE");
    }

    #[test]
    fn test_affix_patterns_escape() {
        let e = predicate(FilterOp::StartsWith)(col(), Operand::Value("50%_off".into()), &opts());
        assert_eq!(e.to_sql().params, vec![Value::from("50\\%\\_off%")]);
        assert_eq!(sql(FilterOp::Ilike, "a%", opts()), "\"root\".\"name\" ILIKE $1");
    }

    #[test]
    fn test_multi_range_between() {
        let ranges = Value::List(vec![Value::from(vec![1, 5]), Value::from(vec![10, 20])]);
        assert_eq!(
            sql(FilterOp::Between, ranges, opts()),
            "(\"root\".\"name\" BETWEEN $1 AND $2 OR \"root\".\"name\" BETWEEN $3 AND $4)"
        );
    }

    #[test]
    fn test_field_compare_operand() {
        let e = predicate(FilterOp::Gt)(
            Expr::column("root", "updated_at"),
            Operand::Expr(Expr::column("root", "created_at")),
            &opts(),
        );
        assert_eq!(
            e.to_sql().sql,
            "\"root\".\"updated_at\" > \"root\".\"created_at\""
        );
    }

    #[test]
    fn test_similarity_threshold() {
        let compiled = predicate(FilterOp::Similar)(col(), Operand::Value("ada".into()), &opts()).to_sql();
        assert_eq!(compiled.sql, "similarity(\"root\".\"name\", $1) > $2");
        assert_eq!(compiled.params[1], Value::Float(0.3));
    }
}
