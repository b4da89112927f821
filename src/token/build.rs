//! Construction API
//!
//! Pure functions, each taking a token and returning a new one with a
//! validated operation appended. Every function goes through
//! [`Token::add`], so nothing here can bypass the validator.

use crate::value::Value;

use super::ast::{
    AggregateFn, Combination, CombinationKind, Cte, CursorPage, Distinct, FieldCompare, FieldRef,
    Filter, FilterGroup, FilterNode, FilterOp, FilterOpts, GroupBy, Having, HavingFilter, Join,
    JoinCondition, JoinKind, JoinTarget, LockMode, OffsetPage, Operation, Order, Paginate, Preload,
    RawParams, RawWhere, SearchField, SearchRank, Select, SelectItem, SortDirection, Subquery,
    Window, Combinator, ROOT_BINDING,
};
use super::errors::TokenResult;
use super::token::Token;

/// `field <op> value` on the root binding
pub fn filter(token: &Token, field: &str, op: FilterOp, value: impl Into<Value>) -> TokenResult<Token> {
    token.add(Operation::Filter(Filter::new(field, op, value)))
}

/// Filter with explicit options (binding, case-insensitivity, threshold, cast)
pub fn filter_with(
    token: &Token,
    field: &str,
    op: FilterOp,
    value: impl Into<Value>,
    opts: FilterOpts,
) -> TokenResult<Token> {
    token.add(Operation::Filter(Filter::new(field, op, value).with_opts(opts)))
}

fn group<I, N>(token: &Token, combinator: Combinator, filters: I) -> TokenResult<Token>
where
    I: IntoIterator<Item = N>,
    N: Into<FilterNode>,
{
    token.add(Operation::FilterGroup(FilterGroup::new(combinator, filters)))
}

/// `(a OR b ...)`
pub fn where_any<I, N>(token: &Token, filters: I) -> TokenResult<Token>
where
    I: IntoIterator<Item = N>,
    N: Into<FilterNode>,
{
    group(token, Combinator::Or, filters)
}

/// `(a AND b ...)`
pub fn where_all<I, N>(token: &Token, filters: I) -> TokenResult<Token>
where
    I: IntoIterator<Item = N>,
    N: Into<FilterNode>,
{
    group(token, Combinator::And, filters)
}

/// `NOT (a OR b ...)`
pub fn where_none<I, N>(token: &Token, filters: I) -> TokenResult<Token>
where
    I: IntoIterator<Item = N>,
    N: Into<FilterNode>,
{
    group(token, Combinator::NotOr, filters)
}

pub fn order(token: &Token, field: &str, direction: SortDirection) -> TokenResult<Token> {
    token.add(Operation::Order(Order::new(field, direction)))
}

/// Join a declared association of the root schema; the binding is named
/// after the association.
pub fn join(token: &Token, association: &str, kind: JoinKind) -> TokenResult<Token> {
    token.add(Operation::Join(Join {
        target: JoinTarget::Association(association.to_string()),
        kind,
        binding: association.to_string(),
        from: ROOT_BINDING.to_string(),
        on: Vec::new(),
    }))
}

/// Join a table under `binding` with explicit `left = binding.right` pairs
pub fn join_on(
    token: &Token,
    table: &str,
    binding: &str,
    kind: JoinKind,
    on: &[(&str, &str)],
) -> TokenResult<Token> {
    let on = on
        .iter()
        .map(|(left, right)| JoinCondition {
            left: FieldRef::parse(left),
            right_field: right.to_string(),
        })
        .collect();
    token.add(Operation::Join(Join {
        target: JoinTarget::Table(table.to_string()),
        kind,
        binding: binding.to_string(),
        from: ROOT_BINDING.to_string(),
        on,
    }))
}

/// Page-numbered pagination, pages start at 1
pub fn paginate_offset(token: &Token, limit: i64, page: i64) -> TokenResult<Token> {
    token.add(Operation::Paginate(Paginate::Offset(OffsetPage {
        limit,
        page,
        offset: None,
    })))
}

/// Keyset pagination over `order`, resuming after or before a cursor
pub fn paginate_cursor(
    token: &Token,
    order: Vec<Order>,
    limit: i64,
    after: Option<String>,
    before: Option<String>,
) -> TokenResult<Token> {
    token.add(Operation::Paginate(Paginate::Cursor(CursorPage {
        order,
        limit,
        after,
        before,
    })))
}

pub fn limit(token: &Token, n: i64) -> TokenResult<Token> {
    token.add(Operation::Limit(n))
}

pub fn offset(token: &Token, n: i64) -> TokenResult<Token> {
    token.add(Operation::Offset(n))
}

/// Select plain fields (`field` or `binding.field`)
pub fn select(token: &Token, fields: &[&str]) -> TokenResult<Token> {
    let items = fields
        .iter()
        .map(|f| SelectItem::Field(FieldRef::parse(f)))
        .collect();
    token.add(Operation::Select(Select { items }))
}

pub fn group_by(token: &Token, fields: &[&str]) -> TokenResult<Token> {
    let fields = fields.iter().map(|f| FieldRef::parse(f)).collect();
    token.add(Operation::GroupBy(GroupBy { fields }))
}

/// `HAVING func(field) <op> value`; `field: None` aggregates `*`
pub fn having(
    token: &Token,
    func: AggregateFn,
    field: Option<&str>,
    op: FilterOp,
    value: impl Into<Value>,
) -> TokenResult<Token> {
    token.add(Operation::Having(Having {
        filters: vec![HavingFilter {
            func,
            field: field.map(FieldRef::parse),
            op,
            value: value.into(),
        }],
    }))
}

/// `DISTINCT`, or `DISTINCT ON (...)` when fields are given
pub fn distinct(token: &Token, on: &[&str]) -> TokenResult<Token> {
    let on = on.iter().map(|f| FieldRef::parse(f)).collect();
    token.add(Operation::Distinct(Distinct { on }))
}

pub fn lock(token: &Token, mode: LockMode) -> TokenResult<Token> {
    token.add(Operation::Lock(mode))
}

/// Preload an association path such as `["posts", "comments"]`
pub fn preload(token: &Token, path: &[&str]) -> TokenResult<Token> {
    token.add(Operation::Preload(Preload {
        path: path.iter().map(|p| p.to_string()).collect(),
        binding: None,
    }))
}

pub fn cte(token: &Token, name: &str, query: Token, recursive: bool) -> TokenResult<Token> {
    token.add(Operation::Cte(Cte {
        name: name.to_string(),
        token: query,
        recursive,
    }))
}

pub fn window(
    token: &Token,
    name: &str,
    partition_by: &[&str],
    order_by: Vec<Order>,
) -> TokenResult<Token> {
    token.add(Operation::Window(Window {
        name: name.to_string(),
        partition_by: partition_by.iter().map(|f| FieldRef::parse(f)).collect(),
        order_by,
    }))
}

/// Parameterized raw condition (`?` or `:name` placeholders)
pub fn raw_where(token: &Token, sql: &str, params: RawParams) -> TokenResult<Token> {
    token.add(Operation::RawWhere(RawWhere {
        sql: sql.to_string(),
        params,
    }))
}

/// `EXISTS (subquery)` correlated through `(outer field, inner field)` pairs
pub fn exists(token: &Token, subquery: Token, correlate: &[(&str, &str)]) -> TokenResult<Token> {
    token.add(Operation::Exists(subquery_of(subquery, correlate)))
}

pub fn not_exists(token: &Token, subquery: Token, correlate: &[(&str, &str)]) -> TokenResult<Token> {
    token.add(Operation::NotExists(subquery_of(subquery, correlate)))
}

fn subquery_of(token: Token, correlate: &[(&str, &str)]) -> Subquery {
    Subquery {
        token,
        correlate: correlate
            .iter()
            .map(|(outer, inner)| (FieldRef::parse(outer), inner.to_string()))
            .collect(),
    }
}

/// Rank rows by the first matching search field
pub fn search_rank(token: &Token, fields: Vec<SearchField>, term: &str) -> TokenResult<Token> {
    token.add(Operation::SearchRank(SearchRank {
        fields,
        term: term.to_string(),
        limited: false,
    }))
}

/// Ranked search capped at the sum of every field's `take`
pub fn search_rank_limited(token: &Token, fields: Vec<SearchField>, term: &str) -> TokenResult<Token> {
    token.add(Operation::SearchRank(SearchRank {
        fields,
        term: term.to_string(),
        limited: true,
    }))
}

/// `left <op> right` between two columns
pub fn compare_fields(token: &Token, left: &str, op: FilterOp, right: &str) -> TokenResult<Token> {
    token.add(Operation::FieldCompare(FieldCompare {
        left: FieldRef::parse(left),
        op,
        right: FieldRef::parse(right),
    }))
}

fn combine(token: &Token, kind: CombinationKind, other: Token) -> TokenResult<Token> {
    token.add(Operation::Combination(Combination { kind, other }))
}

pub fn union(token: &Token, other: Token, all: bool) -> TokenResult<Token> {
    let kind = if all { CombinationKind::UnionAll } else { CombinationKind::Union };
    combine(token, kind, other)
}

pub fn intersect(token: &Token, other: Token, all: bool) -> TokenResult<Token> {
    let kind = if all {
        CombinationKind::IntersectAll
    } else {
        CombinationKind::Intersect
    };
    combine(token, kind, other)
}

pub fn except(token: &Token, other: Token, all: bool) -> TokenResult<Token> {
    let kind = if all { CombinationKind::ExceptAll } else { CombinationKind::Except };
    combine(token, kind, other)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::errors::TokenError;

    #[test]
    fn test_chained_construction() {
        let base = Token::table("users");
        let t = filter(&base, "age", FilterOp::Gte, 18).unwrap();
        let t = order(&t, "name", SortDirection::Asc).unwrap();
        let t = limit(&t, 10).unwrap();
        assert_eq!(t.describe(), vec!["filter", "order", "limit"]);
        assert!(t.has_limit());
        assert!(base.operations().is_empty());
    }

    #[test]
    fn test_where_any_arity() {
        let base = Token::table("users");
        let err = where_any(&base, [Filter::new("a", FilterOp::Eq, 1)]).unwrap_err();
        assert!(matches!(err, TokenError::FilterGroup { count: 1, .. }));
        assert!(where_any(
            &base,
            [Filter::new("a", FilterOp::Eq, 1), Filter::new("b", FilterOp::Eq, 2)]
        )
        .is_ok());
    }

    #[test]
    fn test_join_on_parses_bindings() {
        let t = join_on(
            &Token::table("posts"),
            "users",
            "author",
            JoinKind::Inner,
            &[("author_id", "id")],
        )
        .unwrap();
        match &t.operations()[0] {
            Operation::Join(j) => {
                assert_eq!(j.on[0].left, FieldRef::new("author_id"));
                assert_eq!(j.binding, "author");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_table_join_without_conditions_rejected() {
        let err = join_on(&Token::table("posts"), "users", "u", JoinKind::Left, &[]).unwrap_err();
        assert!(matches!(err, TokenError::Validation { operation: "join", .. }));
    }

    #[test]
    fn test_union_rejects_paginated_operand() {
        let other = paginate_offset(&Token::table("admins"), 10, 1).unwrap();
        assert!(union(&Token::table("users"), other, false).is_err());
    }
}
