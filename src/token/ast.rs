//! Operation vocabulary
//!
//! A closed sum type with one variant per query feature. The validator and
//! the compiler both match on it exhaustively, so a new operation kind is a
//! compile error everywhere it must be handled.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::caster::CastType;
use crate::value::Value;

use super::errors::TokenError;
use super::token::Token;

/// Binding introduced by the token's source
pub const ROOT_BINDING: &str = "root";

/// Filter operators (closed set)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    NotIn,
    Like,
    Ilike,
    NotLike,
    StartsWith,
    EndsWith,
    Contains,
    IsNil,
    NotNil,
    Between,
    ArrayContains,
    ArrayOverlap,
    JsonContains,
    Similar,
    WordSimilar,
}

impl FilterOp {
    /// Every operator, in documentation order
    pub const ALL: [FilterOp; 22] = [
        FilterOp::Eq,
        FilterOp::Ne,
        FilterOp::Gt,
        FilterOp::Gte,
        FilterOp::Lt,
        FilterOp::Lte,
        FilterOp::In,
        FilterOp::NotIn,
        FilterOp::Like,
        FilterOp::Ilike,
        FilterOp::NotLike,
        FilterOp::StartsWith,
        FilterOp::EndsWith,
        FilterOp::Contains,
        FilterOp::IsNil,
        FilterOp::NotNil,
        FilterOp::Between,
        FilterOp::ArrayContains,
        FilterOp::ArrayOverlap,
        FilterOp::JsonContains,
        FilterOp::Similar,
        FilterOp::WordSimilar,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOp::Eq => "eq",
            FilterOp::Ne => "ne",
            FilterOp::Gt => "gt",
            FilterOp::Gte => "gte",
            FilterOp::Lt => "lt",
            FilterOp::Lte => "lte",
            FilterOp::In => "in",
            FilterOp::NotIn => "not_in",
            FilterOp::Like => "like",
            FilterOp::Ilike => "ilike",
            FilterOp::NotLike => "not_like",
            FilterOp::StartsWith => "starts_with",
            FilterOp::EndsWith => "ends_with",
            FilterOp::Contains => "contains",
            FilterOp::IsNil => "is_nil",
            FilterOp::NotNil => "not_nil",
            FilterOp::Between => "between",
            FilterOp::ArrayContains => "array_contains",
            FilterOp::ArrayOverlap => "array_overlap",
            FilterOp::JsonContains => "json_contains",
            FilterOp::Similar => "similar",
            FilterOp::WordSimilar => "word_similar",
        }
    }

    /// Names of every operator
    pub fn names() -> Vec<&'static str> {
        Self::ALL.iter().map(FilterOp::as_str).collect()
    }

    /// Plain ordering / equality comparisons
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            FilterOp::Eq | FilterOp::Ne | FilterOp::Gt | FilterOp::Gte | FilterOp::Lt | FilterOp::Lte
        )
    }

    /// Operators that take a list value
    pub fn takes_list(&self) -> bool {
        matches!(
            self,
            FilterOp::In | FilterOp::NotIn | FilterOp::Between | FilterOp::ArrayContains | FilterOp::ArrayOverlap
        )
    }

    /// Null checks ignore their value
    pub fn is_null_check(&self) -> bool {
        matches!(self, FilterOp::IsNil | FilterOp::NotNil)
    }

    /// Operators whose value must be text
    pub fn takes_pattern(&self) -> bool {
        matches!(
            self,
            FilterOp::Like
                | FilterOp::Ilike
                | FilterOp::NotLike
                | FilterOp::StartsWith
                | FilterOp::EndsWith
                | FilterOp::Contains
                | FilterOp::Similar
                | FilterOp::WordSimilar
        )
    }

    pub fn is_similarity(&self) -> bool {
        matches!(self, FilterOp::Similar | FilterOp::WordSimilar)
    }
}

impl FromStr for FilterOp {
    type Err = TokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        let alias = match normalized.as_str() {
            "neq" | "!=" => "ne",
            "=" | "==" => "eq",
            ">" => "gt",
            ">=" => "gte",
            "<" => "lt",
            "<=" => "lte",
            "nin" => "not_in",
            "is_null" => "is_nil",
            "not_null" => "not_nil",
            other => other,
        };
        FilterOp::ALL
            .iter()
            .copied()
            .find(|op| op.as_str() == alias)
            .ok_or_else(|| TokenError::Operator {
                operator: s.to_string(),
                allowed: FilterOp::names(),
            })
    }
}

impl fmt::Display for FilterOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A field qualified by the binding it belongs to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldRef {
    pub binding: String,
    pub field: String,
}

impl FieldRef {
    /// Field on the root binding
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            binding: ROOT_BINDING.to_string(),
            field: field.into(),
        }
    }

    /// Field on a named binding
    pub fn on(binding: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            binding: binding.into(),
            field: field.into(),
        }
    }

    /// Parses `field` or `binding.field`
    pub fn parse(path: &str) -> Self {
        match path.split_once('.') {
            Some((binding, field)) => Self::on(binding, field),
            None => Self::new(path),
        }
    }

    /// Key used for this field in rows and cursors
    pub fn key(&self) -> String {
        if self.binding == ROOT_BINDING {
            self.field.clone()
        } else {
            format!("{}.{}", self.binding, self.field)
        }
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.binding, self.field)
    }
}

impl From<&str> for FieldRef {
    fn from(path: &str) -> Self {
        FieldRef::parse(path)
    }
}

/// Per-filter options
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterOpts {
    /// Binding the field belongs to (`root` when absent)
    pub binding: Option<String>,
    /// Lowercase both sides before comparing
    pub case_insensitive: bool,
    /// Similarity threshold for `similar` / `word_similar`
    pub threshold: Option<f64>,
    /// Cast the value before it enters the token
    pub cast: Option<CastType>,
}

/// A single filter condition
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
    pub opts: FilterOpts,
}

impl Filter {
    pub fn new(field: impl Into<String>, op: FilterOp, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            op,
            value: value.into(),
            opts: FilterOpts::default(),
        }
    }

    pub fn with_opts(mut self, opts: FilterOpts) -> Self {
        self.opts = opts;
        self
    }

    pub fn case_insensitive(mut self) -> Self {
        self.opts.case_insensitive = true;
        self
    }

    pub fn on_binding(mut self, binding: impl Into<String>) -> Self {
        self.opts.binding = Some(binding.into());
        self
    }

    pub fn binding(&self) -> &str {
        self.opts.binding.as_deref().unwrap_or(ROOT_BINDING)
    }

    pub fn field_ref(&self) -> FieldRef {
        FieldRef::on(self.binding(), &self.field)
    }
}

/// Group combinators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Combinator {
    And,
    Or,
    /// `NOT (a OR b ...)`
    NotOr,
}

impl Combinator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Combinator::And => "and",
            Combinator::Or => "or",
            Combinator::NotOr => "not_or",
        }
    }
}

/// Member of a filter group; groups may nest
#[derive(Debug, Clone, PartialEq)]
pub enum FilterNode {
    Filter(Filter),
    Group(FilterGroup),
}

impl From<Filter> for FilterNode {
    fn from(f: Filter) -> Self {
        FilterNode::Filter(f)
    }
}

impl From<FilterGroup> for FilterNode {
    fn from(g: FilterGroup) -> Self {
        FilterNode::Group(g)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterGroup {
    pub combinator: Combinator,
    pub filters: Vec<FilterNode>,
}

impl FilterGroup {
    pub fn new<I, N>(combinator: Combinator, filters: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<FilterNode>,
    {
        Self {
            combinator,
            filters: filters.into_iter().map(Into::into).collect(),
        }
    }

    /// Count of leaf filters, recursively
    pub fn leaf_count(&self) -> usize {
        self.filters
            .iter()
            .map(|node| match node {
                FilterNode::Filter(_) => 1,
                FilterNode::Group(g) => g.leaf_count(),
            })
            .sum()
    }
}

/// Sort direction. Null-ordering variants sort like their base direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Asc,
    Desc,
    AscNullsFirst,
    AscNullsLast,
    DescNullsFirst,
    DescNullsLast,
}

impl SortDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
            SortDirection::AscNullsFirst => "asc_nulls_first",
            SortDirection::AscNullsLast => "asc_nulls_last",
            SortDirection::DescNullsFirst => "desc_nulls_first",
            SortDirection::DescNullsLast => "desc_nulls_last",
        }
    }

    pub fn is_ascending(&self) -> bool {
        matches!(
            self,
            SortDirection::Asc | SortDirection::AscNullsFirst | SortDirection::AscNullsLast
        )
    }

    /// Base direction with null ordering collapsed
    pub fn base(&self) -> SortDirection {
        if self.is_ascending() {
            SortDirection::Asc
        } else {
            SortDirection::Desc
        }
    }

    /// Whether nulls sort before non-null values, PostgreSQL style:
    /// ascending defaults to nulls last, descending to nulls first
    pub fn nulls_first(&self) -> bool {
        match self {
            SortDirection::AscNullsFirst | SortDirection::DescNullsFirst => true,
            SortDirection::AscNullsLast | SortDirection::DescNullsLast => false,
            SortDirection::Asc => false,
            SortDirection::Desc => true,
        }
    }

    /// Opposite direction, swapping null placement along with it
    pub fn reversed(&self) -> SortDirection {
        match self {
            SortDirection::Asc => SortDirection::Desc,
            SortDirection::Desc => SortDirection::Asc,
            SortDirection::AscNullsFirst => SortDirection::DescNullsLast,
            SortDirection::AscNullsLast => SortDirection::DescNullsFirst,
            SortDirection::DescNullsFirst => SortDirection::AscNullsLast,
            SortDirection::DescNullsLast => SortDirection::AscNullsFirst,
        }
    }
}

impl FromStr for SortDirection {
    type Err = TokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" => Ok(SortDirection::Asc),
            "desc" => Ok(SortDirection::Desc),
            "asc_nulls_first" => Ok(SortDirection::AscNullsFirst),
            "asc_nulls_last" => Ok(SortDirection::AscNullsLast),
            "desc_nulls_first" => Ok(SortDirection::DescNullsFirst),
            "desc_nulls_last" => Ok(SortDirection::DescNullsLast),
            other => Err(TokenError::validation("order", "unknown sort direction", other)
                .suggest("use asc, desc or a *_nulls_first / *_nulls_last variant")),
        }
    }
}

/// One ORDER BY entry
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub field: FieldRef,
    pub direction: SortDirection,
}

impl Order {
    pub fn asc(field: impl Into<FieldRef>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(field: impl Into<FieldRef>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Desc,
        }
    }

    pub fn new(field: impl Into<FieldRef>, direction: SortDirection) -> Self {
        Self {
            field: field.into(),
            direction,
        }
    }
}

/// Offset pagination: page numbers start at 1; an explicit offset wins over
/// the page-derived one.
#[derive(Debug, Clone, PartialEq)]
pub struct OffsetPage {
    pub limit: i64,
    pub page: i64,
    pub offset: Option<i64>,
}

impl OffsetPage {
    pub fn effective_offset(&self) -> u64 {
        match self.offset {
            Some(offset) => offset.max(0) as u64,
            None => ((self.page.max(1) - 1) as u64).saturating_mul(self.limit.max(0) as u64),
        }
    }
}

/// Keyset pagination over an ordered field list
#[derive(Debug, Clone, PartialEq)]
pub struct CursorPage {
    pub order: Vec<Order>,
    pub limit: i64,
    /// Resume strictly after this cursor
    pub after: Option<String>,
    /// Resume strictly before this cursor
    pub before: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Paginate {
    Offset(OffsetPage),
    Cursor(CursorPage),
}

impl Paginate {
    pub fn limit(&self) -> i64 {
        match self {
            Paginate::Offset(p) => p.limit,
            Paginate::Cursor(p) => p.limit,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Paginate::Offset(_) => "offset",
            Paginate::Cursor(_) => "cursor",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Full,
    Cross,
}

impl JoinKind {
    pub fn as_sql(&self) -> &'static str {
        match self {
            JoinKind::Inner => "INNER JOIN",
            JoinKind::Left => "LEFT OUTER JOIN",
            JoinKind::Right => "RIGHT OUTER JOIN",
            JoinKind::Full => "FULL OUTER JOIN",
            JoinKind::Cross => "CROSS JOIN",
        }
    }
}

/// What a join attaches
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinTarget {
    /// Association declared on the schema of the `from` binding
    Association(String),
    /// Plain table, requires explicit ON conditions
    Table(String),
}

impl JoinTarget {
    pub fn name(&self) -> &str {
        match self {
            JoinTarget::Association(n) | JoinTarget::Table(n) => n,
        }
    }
}

/// `left = joined.right_field`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinCondition {
    pub left: FieldRef,
    pub right_field: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub target: JoinTarget,
    pub kind: JoinKind,
    /// Binding introduced by this join
    pub binding: String,
    /// Binding the association is resolved from
    pub from: String,
    pub on: Vec<JoinCondition>,
}

/// Association path to load alongside the main rows
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preload {
    pub path: Vec<String>,
    /// Preload through an existing join binding instead of a separate query
    pub binding: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateFn {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateFn {
    pub fn as_sql(&self) -> &'static str {
        match self {
            AggregateFn::Count => "count",
            AggregateFn::Sum => "sum",
            AggregateFn::Avg => "avg",
            AggregateFn::Min => "min",
            AggregateFn::Max => "max",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SelectItem {
    Field(FieldRef),
    /// Aggregate; `field: None` means `count(*)`
    Aggregate {
        func: AggregateFn,
        field: Option<FieldRef>,
        alias: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    pub items: Vec<SelectItem>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupBy {
    pub fields: Vec<FieldRef>,
}

/// Condition over an aggregate, lowered with the filter dispatch table
#[derive(Debug, Clone, PartialEq)]
pub struct HavingFilter {
    pub func: AggregateFn,
    pub field: Option<FieldRef>,
    pub op: FilterOp,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Having {
    pub filters: Vec<HavingFilter>,
}

/// `DISTINCT`, or `DISTINCT ON (...)` when fields are given
#[derive(Debug, Clone, PartialEq)]
pub struct Distinct {
    pub on: Vec<FieldRef>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockMode {
    ForUpdate,
    ForShare,
    ForUpdateSkipLocked,
    ForUpdateNowait,
}

impl LockMode {
    pub fn as_sql(&self) -> &'static str {
        match self {
            LockMode::ForUpdate => "FOR UPDATE",
            LockMode::ForShare => "FOR SHARE",
            LockMode::ForUpdateSkipLocked => "FOR UPDATE SKIP LOCKED",
            LockMode::ForUpdateNowait => "FOR UPDATE NOWAIT",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cte {
    pub name: String,
    pub token: Token,
    pub recursive: bool,
}

/// Named window definition
#[derive(Debug, Clone, PartialEq)]
pub struct Window {
    pub name: String,
    pub partition_by: Vec<FieldRef>,
    pub order_by: Vec<Order>,
}

/// Raw fragment parameters. Positional fragments use `?`, named ones use
/// `:name` and are rewritten to positional form before binding.
#[derive(Debug, Clone, PartialEq)]
pub enum RawParams {
    Positional(Vec<Value>),
    Named(Vec<(String, Value)>),
}

impl RawParams {
    pub fn len(&self) -> usize {
        match self {
            RawParams::Positional(p) => p.len(),
            RawParams::Named(p) => p.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawWhere {
    pub sql: String,
    pub params: RawParams,
}

/// Subquery for EXISTS / NOT EXISTS, correlated through `outer = inner` pairs
#[derive(Debug, Clone, PartialEq)]
pub struct Subquery {
    pub token: Token,
    pub correlate: Vec<(FieldRef, String)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    Exact,
    Prefix,
    Contains,
    Similarity,
    WordSimilarity,
}

impl SearchMode {
    pub const ALL: [SearchMode; 5] = [
        SearchMode::Exact,
        SearchMode::Prefix,
        SearchMode::Contains,
        SearchMode::Similarity,
        SearchMode::WordSimilarity,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SearchMode::Exact => "exact",
            SearchMode::Prefix => "prefix",
            SearchMode::Contains => "contains",
            SearchMode::Similarity => "similarity",
            SearchMode::WordSimilarity => "word_similarity",
        }
    }

    pub fn is_similarity(&self) -> bool {
        matches!(self, SearchMode::Similarity | SearchMode::WordSimilarity)
    }
}

impl FromStr for SearchMode {
    type Err = TokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        SearchMode::ALL
            .iter()
            .copied()
            .find(|m| m.as_str() == normalized)
            .ok_or_else(|| TokenError::SearchMode {
                mode: s.to_string(),
                allowed: SearchMode::ALL.iter().map(SearchMode::as_str).collect(),
            })
    }
}

/// One ranked search field
#[derive(Debug, Clone, PartialEq)]
pub struct SearchField {
    pub field: FieldRef,
    pub mode: SearchMode,
    pub threshold: Option<f64>,
    pub rank: u32,
    /// Rows wanted from this rank (limited variant only)
    pub take: Option<u64>,
}

impl SearchField {
    pub fn new(field: impl Into<FieldRef>, mode: SearchMode, rank: u32) -> Self {
        Self {
            field: field.into(),
            mode,
            threshold: None,
            rank,
            take: None,
        }
    }

    pub fn take(mut self, take: u64) -> Self {
        self.take = Some(take);
        self
    }

    pub fn threshold(mut self, threshold: f64) -> Self {
        self.threshold = Some(threshold);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchRank {
    pub fields: Vec<SearchField>,
    pub term: String,
    /// Cap rows to the sum of each field's `take`
    pub limited: bool,
}

/// `left <op> right` between two columns
#[derive(Debug, Clone, PartialEq)]
pub struct FieldCompare {
    pub left: FieldRef,
    pub op: FilterOp,
    pub right: FieldRef,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombinationKind {
    Union,
    UnionAll,
    Intersect,
    IntersectAll,
    Except,
    ExceptAll,
}

impl CombinationKind {
    pub fn as_sql(&self) -> &'static str {
        match self {
            CombinationKind::Union => "UNION",
            CombinationKind::UnionAll => "UNION ALL",
            CombinationKind::Intersect => "INTERSECT",
            CombinationKind::IntersectAll => "INTERSECT ALL",
            CombinationKind::Except => "EXCEPT",
            CombinationKind::ExceptAll => "EXCEPT ALL",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Combination {
    pub kind: CombinationKind,
    pub other: Token,
}

/// A single query operation
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Filter(Filter),
    FilterGroup(FilterGroup),
    Paginate(Paginate),
    Order(Order),
    Join(Join),
    Preload(Preload),
    Select(Select),
    GroupBy(GroupBy),
    Having(Having),
    Limit(i64),
    Offset(i64),
    Distinct(Distinct),
    Lock(LockMode),
    Cte(Cte),
    Window(Window),
    RawWhere(RawWhere),
    Exists(Subquery),
    NotExists(Subquery),
    SearchRank(SearchRank),
    FieldCompare(FieldCompare),
    Combination(Combination),
}

impl Operation {
    /// Operation kind name (used in errors and telemetry)
    pub fn kind(&self) -> &'static str {
        match self {
            Operation::Filter(_) => "filter",
            Operation::FilterGroup(_) => "filter_group",
            Operation::Paginate(_) => "paginate",
            Operation::Order(_) => "order",
            Operation::Join(_) => "join",
            Operation::Preload(_) => "preload",
            Operation::Select(_) => "select",
            Operation::GroupBy(_) => "group_by",
            Operation::Having(_) => "having",
            Operation::Limit(_) => "limit",
            Operation::Offset(_) => "offset",
            Operation::Distinct(_) => "distinct",
            Operation::Lock(_) => "lock",
            Operation::Cte(_) => "cte",
            Operation::Window(_) => "window",
            Operation::RawWhere(_) => "raw_where",
            Operation::Exists(_) => "exists",
            Operation::NotExists(_) => "not_exists",
            Operation::SearchRank(_) => "search_rank",
            Operation::FieldCompare(_) => "field_compare",
            Operation::Combination(_) => "combination",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operator_parse_and_aliases() {
        assert_eq!("eq".parse::<FilterOp>().unwrap(), FilterOp::Eq);
        assert_eq!("NEQ".parse::<FilterOp>().unwrap(), FilterOp::Ne);
        assert_eq!(">=".parse::<FilterOp>().unwrap(), FilterOp::Gte);
        for op in FilterOp::ALL {
            assert_eq!(op.as_str().parse::<FilterOp>().unwrap(), op);
        }
    }

    #[test]
    fn test_unknown_operator_lists_allowed() {
        let err = "approximately".parse::<FilterOp>().unwrap_err();
        match err {
            TokenError::Operator { operator, allowed } => {
                assert_eq!(operator, "approximately");
                assert_eq!(allowed.len(), FilterOp::ALL.len());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_unknown_search_mode() {
        assert_eq!("prefix".parse::<SearchMode>().unwrap(), SearchMode::Prefix);
        assert!(matches!(
            "fuzzy".parse::<SearchMode>(),
            Err(TokenError::SearchMode { .. })
        ));
    }

    #[test]
    fn test_direction_base_and_reverse() {
        assert_eq!(SortDirection::DescNullsLast.base(), SortDirection::Desc);
        assert_eq!(SortDirection::AscNullsFirst.base(), SortDirection::Asc);
        assert_eq!(
            SortDirection::AscNullsFirst.reversed(),
            SortDirection::DescNullsLast
        );
        assert!(!SortDirection::Asc.nulls_first());
        assert!(SortDirection::Desc.nulls_first());
        assert!(!SortDirection::Asc.reversed().reversed().nulls_first());
        assert!(SortDirection::AscNullsFirst.nulls_first());
    }

    #[test]
    fn test_field_ref_parse_and_key() {
        let f = FieldRef::parse("author.name");
        assert_eq!(f.binding, "author");
        assert_eq!(f.key(), "author.name");
        assert_eq!(FieldRef::parse("id").key(), "id");
    }

    #[test]
    fn test_offset_page_effective_offset() {
        let page = OffsetPage { limit: 20, page: 3, offset: None };
        assert_eq!(page.effective_offset(), 40);
        let explicit = OffsetPage { limit: 20, page: 1, offset: Some(7) };
        assert_eq!(explicit.effective_offset(), 7);
    }
}
