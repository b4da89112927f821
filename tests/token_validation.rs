//! Operation validation tests
//!
//! Structural errors surface when the operation is added, never at compile
//! time, and every error carries the limits and values needed to explain it.

use querytoken::config::QueryConfig;
use querytoken::token::{
    build, Combinator, Filter, FilterGroup, FilterNode, FilterOp, Operation, RawParams, Token,
    TokenError, TokenSpec,
};
use querytoken::value::Value;

fn users() -> Token {
    Token::table("users")
}

// =============================================================================
// FILTER GROUP ARITY
// =============================================================================

#[test]
fn test_or_group_needs_two_conditions() {
    let one = vec![Filter::new("age", FilterOp::Gt, 18)];
    let err = build::where_any(&users(), one).unwrap_err();
    assert!(matches!(err, TokenError::FilterGroup { .. }));
    assert_eq!(err.code(), "QT_FILTER_GROUP_ARITY");

    let two = vec![
        Filter::new("age", FilterOp::Gt, 18),
        Filter::new("name", FilterOp::Eq, "ada"),
    ];
    let t = build::where_any(&users(), two).unwrap();
    assert_eq!(t.counts().filters, 2);
}

#[test]
fn test_nested_groups_validated() {
    let inner = FilterGroup::new(Combinator::And, vec![Filter::new("a", FilterOp::Eq, 1)]);
    let outer: Vec<FilterNode> = vec![inner.into(), Filter::new("b", FilterOp::Eq, 2).into()];
    assert!(build::where_any(&users(), outer).is_err());
}

// =============================================================================
// LIMIT BOUNDS
// =============================================================================

#[test]
fn test_limit_bounds() {
    let max = QueryConfig::default().max_page_size as i64;

    let err = build::limit(&users(), max + 1).unwrap_err();
    assert_eq!(
        err,
        TokenError::LimitExceeded {
            requested: max + 1,
            max: max as u64,
        }
    );
    assert!(matches!(
        build::limit(&users(), 0),
        Err(TokenError::Validation { .. })
    ));
    assert!(matches!(
        build::limit(&users(), -3),
        Err(TokenError::Validation { .. })
    ));
    assert!(build::limit(&users(), max).is_ok());
    assert!(build::limit(&users(), 1).is_ok());
}

#[test]
fn test_limit_checked_against_supplied_config() {
    let config = QueryConfig {
        max_page_size: 10,
        default_page_size: 5,
        ..Default::default()
    };
    let err = users()
        .add_with(Operation::Limit(11), &config)
        .unwrap_err();
    assert!(matches!(err, TokenError::LimitExceeded { requested: 11, max: 10 }));
}

#[test]
fn test_pagination_rejects_bad_page() {
    let err = build::paginate_offset(&users(), 10, 0).unwrap_err();
    assert_eq!(err.code(), "QT_PAGINATION_INVALID");
}

// =============================================================================
// RAW FRAGMENT PARAMETER CAP
// =============================================================================

#[test]
fn test_fragment_parameter_cap() {
    let placeholders = |n: usize| vec!["id = ?"; n].join(" OR ");
    let params = |n: usize| RawParams::Positional((0..n as i64).map(Value::from).collect());

    let err = build::raw_where(&users(), &placeholders(21), params(21)).unwrap_err();
    assert_eq!(
        err,
        TokenError::ParameterLimit {
            count: 21,
            max_allowed: 20,
        }
    );
    assert!(build::raw_where(&users(), &placeholders(20), params(20)).is_ok());
}

// =============================================================================
// OPERATORS AND DESCRIPTIONS
// =============================================================================

#[test]
fn test_unknown_operator_lists_allowed() {
    let err = "approximately".parse::<FilterOp>().unwrap_err();
    assert_eq!(err.code(), "QT_UNKNOWN_OPERATOR");
    assert!(err.suggestion().unwrap().contains("eq"));
}

#[test]
fn test_rejected_operation_leaves_token_unchanged() {
    let base = build::filter(&users(), "age", FilterOp::Gt, 1).unwrap();
    assert!(build::limit(&base, 0).is_err());
    assert_eq!(base.operations().len(), 1);
}

#[test]
fn test_description_replays_validator() {
    let spec = TokenSpec::from_json(
        r#"{"table": "users", "operations": [
            {"op": "filter", "field": "age", "operator": "gte", "value": 21},
            {"op": "limit", "value": 5000}
        ]}"#,
    )
    .unwrap();
    let err = spec.to_token(&QueryConfig::default()).unwrap_err();
    assert_eq!(err.code(), "QT_LIMIT_EXCEEDED");
}
