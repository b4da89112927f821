//! Operation validator
//!
//! Runs the instant an operation is appended to a token. Each variant has
//! its own predicate (type and range checks, closed-enum membership, group
//! arity). Filters that request a cast come back with their value already
//! converted.

use std::collections::HashSet;

use crate::caster;
use crate::compiler::fragment;
use crate::config::QueryConfig;
use crate::value::Value;

use super::ast::{
    Combination, CursorPage, FieldCompare, FieldRef, Filter, FilterGroup, FilterNode, FilterOp,
    Having, Join, JoinKind, JoinTarget, OffsetPage, Operation, Order, Paginate, Preload, RawParams,
    RawWhere, SearchRank, Select, SelectItem, Subquery, Window, ROOT_BINDING,
};
use super::errors::{TokenError, TokenResult};

/// Checks operations against the configured limits
pub struct Validator<'a> {
    config: &'a QueryConfig,
}

impl<'a> Validator<'a> {
    pub fn new(config: &'a QueryConfig) -> Self {
        Self { config }
    }

    /// Validate an operation, returning it (possibly with cast values)
    pub fn validate(&self, op: Operation) -> TokenResult<Operation> {
        match op {
            Operation::Filter(f) => self.filter(f).map(Operation::Filter),
            Operation::FilterGroup(g) => self.group(g).map(Operation::FilterGroup),
            Operation::Paginate(p) => self.paginate(&p).map(|_| Operation::Paginate(p)),
            Operation::Order(o) => self.order("order", &o).map(|_| Operation::Order(o)),
            Operation::Join(j) => self.join(&j).map(|_| Operation::Join(j)),
            Operation::Preload(p) => self.preload(&p).map(|_| Operation::Preload(p)),
            Operation::Select(s) => self.select(&s).map(|_| Operation::Select(s)),
            Operation::GroupBy(g) => {
                if g.fields.is_empty() {
                    return Err(TokenError::validation("group_by", "needs at least one field", "[]"));
                }
                self.fields("group_by", &g.fields)?;
                Ok(Operation::GroupBy(g))
            }
            Operation::Having(h) => self.having(&h).map(|_| Operation::Having(h)),
            Operation::Limit(n) => self.limit(n).map(|_| Operation::Limit(n)),
            Operation::Offset(n) => {
                if n < 0 {
                    return Err(TokenError::validation("offset", "must not be negative", n)
                        .suggest("use 0 or a positive offset"));
                }
                Ok(Operation::Offset(n))
            }
            Operation::Distinct(d) => self.fields("distinct", &d.on).map(|_| Operation::Distinct(d)),
            Operation::Lock(mode) => Ok(Operation::Lock(mode)),
            Operation::Cte(c) => {
                identifier("cte", &c.name)?;
                Ok(Operation::Cte(c))
            }
            Operation::Window(w) => self.window(&w).map(|_| Operation::Window(w)),
            Operation::RawWhere(r) => self.raw_where(&r).map(|_| Operation::RawWhere(r)),
            Operation::Exists(s) => self.subquery("exists", &s).map(|_| Operation::Exists(s)),
            Operation::NotExists(s) => {
                self.subquery("not_exists", &s).map(|_| Operation::NotExists(s))
            }
            Operation::SearchRank(s) => self.search_rank(&s).map(|_| Operation::SearchRank(s)),
            Operation::FieldCompare(c) => {
                self.field_compare(&c).map(|_| Operation::FieldCompare(c))
            }
            Operation::Combination(c) => self.combination(&c).map(|_| Operation::Combination(c)),
        }
    }

    fn limit(&self, n: i64) -> TokenResult<()> {
        if n <= 0 {
            return Err(TokenError::validation("limit", "must be a positive integer", n)
                .suggest(format!("use a value between 1 and {}", self.config.max_page_size)));
        }
        if n as u64 > self.config.max_page_size {
            return Err(TokenError::LimitExceeded {
                requested: n,
                max: self.config.max_page_size,
            });
        }
        Ok(())
    }

    fn filter(&self, mut filter: Filter) -> TokenResult<Filter> {
        identifier("filter", &filter.field)?;
        if let Some(binding) = &filter.opts.binding {
            identifier("filter", binding)?;
        }
        if let Some(target) = &filter.opts.cast {
            filter.value = caster::cast(&filter.value, target)?;
        }
        if let Some(threshold) = filter.opts.threshold {
            threshold_in_range("filter", threshold)?;
        }
        check_filter_value(filter.op, &filter.value)?;
        Ok(filter)
    }

    fn group(&self, group: FilterGroup) -> TokenResult<FilterGroup> {
        if group.filters.len() < 2 {
            return Err(TokenError::FilterGroup {
                combinator: group.combinator.as_str(),
                count: group.filters.len(),
            });
        }
        let filters = group
            .filters
            .into_iter()
            .map(|node| match node {
                FilterNode::Filter(f) => self.filter(f).map(FilterNode::Filter),
                FilterNode::Group(g) => self.group(g).map(FilterNode::Group),
            })
            .collect::<TokenResult<Vec<_>>>()?;
        Ok(FilterGroup {
            combinator: group.combinator,
            filters,
        })
    }

    fn paginate(&self, paginate: &Paginate) -> TokenResult<()> {
        match paginate {
            Paginate::Offset(page) => self.offset_page(page),
            Paginate::Cursor(page) => self.cursor_page(page),
        }
    }

    fn offset_page(&self, page: &OffsetPage) -> TokenResult<()> {
        self.limit(page.limit)?;
        if page.page < 1 {
            return Err(TokenError::pagination(format!("page must be >= 1, got {}", page.page))
                .suggest("pages are numbered from 1"));
        }
        if let Some(offset) = page.offset {
            if offset < 0 {
                return Err(TokenError::pagination(format!(
                    "offset must not be negative, got {}",
                    offset
                )));
            }
        }
        Ok(())
    }

    fn cursor_page(&self, page: &CursorPage) -> TokenResult<()> {
        self.limit(page.limit)?;
        if page.order.is_empty() {
            return Err(TokenError::pagination("cursor pagination needs at least one order field")
                .suggest("order by a unique column such as id as the last tie-breaker"));
        }
        let mut seen = HashSet::new();
        for order in &page.order {
            self.order("paginate", order)?;
            if !seen.insert(order.field.key()) {
                return Err(TokenError::pagination(format!(
                    "duplicate cursor field '{}'",
                    order.field
                )));
            }
        }
        if page.after.is_some() && page.before.is_some() {
            return Err(TokenError::pagination("after and before are mutually exclusive")
                .suggest("page forward with after or backward with before"));
        }
        for cursor in [&page.after, &page.before].into_iter().flatten() {
            if cursor.trim().is_empty() {
                return Err(TokenError::pagination("cursor must not be empty"));
            }
        }
        Ok(())
    }

    fn order(&self, operation: &'static str, order: &Order) -> TokenResult<()> {
        field_ref(operation, &order.field)
    }

    fn fields(&self, operation: &'static str, fields: &[FieldRef]) -> TokenResult<()> {
        fields.iter().try_for_each(|f| field_ref(operation, f))
    }

    fn join(&self, join: &Join) -> TokenResult<()> {
        identifier("join", join.target.name())?;
        identifier("join", &join.binding)?;
        identifier("join", &join.from)?;
        if join.binding == ROOT_BINDING {
            return Err(TokenError::validation("join", "binding name is reserved", &join.binding)
                .suggest("pick a binding name such as the association name"));
        }
        if matches!(join.target, JoinTarget::Table(_))
            && join.kind != JoinKind::Cross
            && join.on.is_empty()
        {
            return Err(TokenError::validation(
                "join",
                "table joins need explicit ON conditions",
                join.target.name(),
            )
            .suggest("add conditions or join through a declared association"));
        }
        for condition in &join.on {
            field_ref("join", &condition.left)?;
            identifier("join", &condition.right_field)?;
        }
        Ok(())
    }

    fn preload(&self, preload: &Preload) -> TokenResult<()> {
        if preload.path.is_empty() {
            return Err(TokenError::validation("preload", "needs an association path", "[]"));
        }
        preload.path.iter().try_for_each(|p| identifier("preload", p))?;
        if let Some(binding) = &preload.binding {
            identifier("preload", binding)?;
        }
        Ok(())
    }

    fn select(&self, select: &Select) -> TokenResult<()> {
        if select.items.is_empty() {
            return Err(TokenError::validation("select", "needs at least one item", "[]"));
        }
        for item in &select.items {
            match item {
                SelectItem::Field(f) => field_ref("select", f)?,
                SelectItem::Aggregate { field, alias, .. } => {
                    identifier("select", alias)?;
                    if let Some(f) = field {
                        field_ref("select", f)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn having(&self, having: &Having) -> TokenResult<()> {
        if having.filters.is_empty() {
            return Err(TokenError::validation("having", "needs at least one condition", "[]"));
        }
        for filter in &having.filters {
            if let Some(f) = &filter.field {
                field_ref("having", f)?;
            }
            if filter.op.takes_pattern() || filter.op.is_similarity() {
                return Err(TokenError::validation(
                    "having",
                    "aggregates support comparison, set and range operators only",
                    filter.op,
                ));
            }
            check_filter_value(filter.op, &filter.value)?;
        }
        Ok(())
    }

    fn window(&self, window: &Window) -> TokenResult<()> {
        identifier("window", &window.name)?;
        if window.partition_by.is_empty() && window.order_by.is_empty() {
            return Err(TokenError::validation(
                "window",
                "needs a partition or an ordering",
                &window.name,
            ));
        }
        self.fields("window", &window.partition_by)?;
        window
            .order_by
            .iter()
            .try_for_each(|o| self.order("window", o))
    }

    fn raw_where(&self, raw: &RawWhere) -> TokenResult<()> {
        if raw.sql.trim().is_empty() {
            return Err(TokenError::validation("raw_where", "fragment is empty", "\"\""));
        }
        let count = raw.params.len();
        if count > self.config.raw_param_cap {
            return Err(TokenError::ParameterLimit {
                count,
                max_allowed: self.config.raw_param_cap,
            });
        }
        match &raw.params {
            RawParams::Positional(params) => {
                let placeholders = fragment::count_positional(&raw.sql);
                if placeholders != params.len() {
                    return Err(TokenError::validation(
                        "raw_where",
                        format!(
                            "fragment has {} placeholders but {} parameters",
                            placeholders,
                            params.len()
                        ),
                        &raw.sql,
                    ));
                }
            }
            RawParams::Named(params) => {
                let mut declared = HashSet::new();
                for (name, _) in params {
                    identifier("raw_where", name)?;
                    if !declared.insert(name.as_str()) {
                        return Err(TokenError::validation(
                            "raw_where",
                            "parameter declared twice",
                            name,
                        ));
                    }
                }
                for name in fragment::placeholder_names(&raw.sql) {
                    if !declared.contains(name.as_str()) {
                        return Err(TokenError::validation(
                            "raw_where",
                            "placeholder has no parameter",
                            format!(":{}", name),
                        )
                        .suggest(format!("declare a parameter named '{}'", name)));
                    }
                }
            }
        }
        Ok(())
    }

    fn subquery(&self, operation: &'static str, subquery: &Subquery) -> TokenResult<()> {
        for (outer, inner) in &subquery.correlate {
            field_ref(operation, outer)?;
            identifier(operation, inner)?;
        }
        Ok(())
    }

    fn search_rank(&self, search: &SearchRank) -> TokenResult<()> {
        if search.term.trim().is_empty() {
            return Err(TokenError::validation("search_rank", "search term is empty", "\"\""));
        }
        if search.fields.is_empty() {
            return Err(TokenError::validation("search_rank", "needs at least one field", "[]"));
        }
        let mut total_take: u64 = 0;
        for field in &search.fields {
            field_ref("search_rank", &field.field)?;
            if let Some(threshold) = field.threshold {
                threshold_in_range("search_rank", threshold)?;
            }
            if search.limited {
                match field.take {
                    Some(take) if take > 0 => total_take = total_take.saturating_add(take),
                    _ => {
                        return Err(TokenError::validation(
                            "search_rank",
                            "limited search needs a positive take per field",
                            &field.field,
                        ))
                    }
                }
            }
        }
        if search.limited && total_take > self.config.max_page_size {
            return Err(TokenError::LimitExceeded {
                requested: i64::try_from(total_take).unwrap_or(i64::MAX),
                max: self.config.max_page_size,
            });
        }
        Ok(())
    }

    fn field_compare(&self, compare: &FieldCompare) -> TokenResult<()> {
        field_ref("field_compare", &compare.left)?;
        field_ref("field_compare", &compare.right)?;
        if !compare.op.is_comparison() {
            return Err(TokenError::validation(
                "field_compare",
                "only eq, ne, gt, gte, lt and lte compare two fields",
                compare.op,
            ));
        }
        Ok(())
    }

    fn combination(&self, combination: &Combination) -> TokenResult<()> {
        if combination.other.has_pagination() {
            return Err(TokenError::validation(
                "combination",
                "combined queries cannot paginate on their own",
                combination.kind.as_sql(),
            )
            .suggest("paginate the outer token instead"));
        }
        Ok(())
    }
}

fn identifier(operation: &'static str, name: &str) -> TokenResult<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(TokenError::validation(operation, "not a valid identifier", format!("{:?}", name))
            .suggest("use letters, digits and underscores, starting with a letter"))
    }
}

fn field_ref(operation: &'static str, field: &FieldRef) -> TokenResult<()> {
    identifier(operation, &field.binding)?;
    identifier(operation, &field.field)
}

fn threshold_in_range(operation: &'static str, threshold: f64) -> TokenResult<()> {
    if threshold > 0.0 && threshold <= 1.0 {
        Ok(())
    } else {
        Err(TokenError::validation(operation, "threshold must be in (0, 1]", threshold))
    }
}

/// Operator / value shape agreement
fn check_filter_value(op: FilterOp, value: &Value) -> TokenResult<()> {
    let reject = |reason: &str| TokenError::validation("filter", reason.to_string(), value);

    if op.is_null_check() {
        return Ok(());
    }
    match op {
        FilterOp::In | FilterOp::NotIn | FilterOp::ArrayContains | FilterOp::ArrayOverlap => {
            if value.as_list().is_none() {
                return Err(reject(&format!("{} needs a list value", op)));
            }
        }
        FilterOp::Between => check_ranges(value)?,
        FilterOp::JsonContains => {
            if !matches!(value, Value::Json(_) | Value::List(_)) {
                return Err(reject("json_contains needs an object or array value"));
            }
        }
        _ if op.takes_pattern() => {
            if value.as_str().is_none() {
                return Err(reject(&format!("{} needs a text value", op)));
            }
        }
        _ => {
            if value.is_null() {
                return Err(reject(&format!("{} cannot compare against null", op))
                    .suggest("use is_nil / not_nil for null checks"));
            }
            if value.as_list().is_some() {
                return Err(reject(&format!("{} needs a scalar value", op))
                    .suggest("use in / not_in for lists"));
            }
        }
    }
    Ok(())
}

/// `between` takes `[low, high]` or a list of such pairs
fn check_ranges(value: &Value) -> TokenResult<()> {
    let items = value.as_list().ok_or_else(|| {
        TokenError::validation("filter", "between needs [low, high] or a list of ranges", value)
    })?;
    let is_multi = !items.is_empty() && items.iter().all(|i| i.as_list().is_some());
    let ranges: Vec<&[Value]> = if is_multi {
        items.iter().filter_map(Value::as_list).collect()
    } else {
        vec![items]
    };
    for range in ranges {
        let [low, high] = range else {
            return Err(TokenError::validation(
                "filter",
                "each range needs exactly two bounds",
                value,
            ));
        };
        if low.is_null() || high.is_null() {
            return Err(TokenError::validation("filter", "range bounds cannot be null", value));
        }
        if low.compare(high) == Some(std::cmp::Ordering::Greater) {
            return Err(TokenError::validation("filter", "range low bound exceeds high bound", value)
                .suggest("swap the bounds"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caster::CastType;
    use crate::token::ast::{Combinator, FilterOpts, SearchField, SearchMode};

    fn validate(op: Operation) -> TokenResult<Operation> {
        Validator::new(&QueryConfig::default()).validate(op)
    }

    #[test]
    fn test_limit_bounds() {
        assert!(validate(Operation::Limit(1)).is_ok());
        assert!(validate(Operation::Limit(1000)).is_ok());
        assert_eq!(
            validate(Operation::Limit(1001)).unwrap_err(),
            TokenError::LimitExceeded { requested: 1001, max: 1000 }
        );
        assert!(matches!(
            validate(Operation::Limit(0)),
            Err(TokenError::Validation { operation: "limit", .. })
        ));
        assert!(matches!(
            validate(Operation::Limit(-3)),
            Err(TokenError::Validation { .. })
        ));
    }

    #[test]
    fn test_group_arity() {
        let single = FilterGroup::new(Combinator::Or, [Filter::new("a", FilterOp::Eq, 1)]);
        assert_eq!(
            validate(Operation::FilterGroup(single)).unwrap_err(),
            TokenError::FilterGroup { combinator: "or", count: 1 }
        );

        let pair = FilterGroup::new(
            Combinator::Or,
            [Filter::new("a", FilterOp::Eq, 1), Filter::new("b", FilterOp::Eq, 2)],
        );
        assert!(validate(Operation::FilterGroup(pair)).is_ok());
    }

    #[test]
    fn test_nested_group_arity_checked() {
        let inner = FilterGroup::new(Combinator::And, [Filter::new("a", FilterOp::Eq, 1)]);
        let outer = FilterGroup::new(
            Combinator::Or,
            [FilterNode::Group(inner), Filter::new("b", FilterOp::Eq, 2).into()],
        );
        assert!(matches!(
            validate(Operation::FilterGroup(outer)),
            Err(TokenError::FilterGroup { combinator: "and", .. })
        ));
    }

    #[test]
    fn test_filter_cast_applied() {
        let filter = Filter::new("age", FilterOp::Gte, "21").with_opts(FilterOpts {
            cast: Some(CastType::Integer),
            ..Default::default()
        });
        match validate(Operation::Filter(filter)).unwrap() {
            Operation::Filter(f) => assert_eq!(f.value, Value::Integer(21)),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_filter_cast_failure() {
        let filter = Filter::new("age", FilterOp::Gte, "abc").with_opts(FilterOpts {
            cast: Some(CastType::Integer),
            ..Default::default()
        });
        assert!(matches!(
            validate(Operation::Filter(filter)),
            Err(TokenError::Cast(_))
        ));
    }

    #[test]
    fn test_filter_value_shapes() {
        assert!(validate(Operation::Filter(Filter::new("a", FilterOp::In, 5))).is_err());
        assert!(validate(Operation::Filter(Filter::new("a", FilterOp::In, vec![1, 2]))).is_ok());
        assert!(validate(Operation::Filter(Filter::new("a", FilterOp::Eq, Value::Null))).is_err());
        assert!(validate(Operation::Filter(Filter::new("a", FilterOp::IsNil, Value::Null))).is_ok());
        assert!(validate(Operation::Filter(Filter::new("a", FilterOp::Like, 3))).is_err());
    }

    #[test]
    fn test_between_ranges() {
        let single = Filter::new("n", FilterOp::Between, vec![1, 10]);
        assert!(validate(Operation::Filter(single)).is_ok());

        let multi = Filter::new(
            "n",
            FilterOp::Between,
            Value::List(vec![Value::from(vec![1, 5]), Value::from(vec![10, 20])]),
        );
        assert!(validate(Operation::Filter(multi)).is_ok());

        let inverted = Filter::new("n", FilterOp::Between, vec![10, 1]);
        assert!(validate(Operation::Filter(inverted)).is_err());

        let triple = Filter::new("n", FilterOp::Between, vec![1, 2, 3]);
        assert!(validate(Operation::Filter(triple)).is_err());
    }

    #[test]
    fn test_rejects_bad_identifiers() {
        let filter = Filter::new("name; DROP TABLE users", FilterOp::Eq, 1);
        assert!(matches!(
            validate(Operation::Filter(filter)),
            Err(TokenError::Validation { .. })
        ));
    }

    #[test]
    fn test_raw_where_parameter_cap() {
        let sql = vec!["?"; 21].join(" + ");
        let over = RawWhere {
            sql: format!("{} > 0", sql),
            params: RawParams::Positional((0..21).map(Value::from).collect()),
        };
        assert_eq!(
            validate(Operation::RawWhere(over)).unwrap_err(),
            TokenError::ParameterLimit { count: 21, max_allowed: 20 }
        );

        let sql = vec!["?"; 20].join(" + ");
        let at_cap = RawWhere {
            sql: format!("{} > 0", sql),
            params: RawParams::Positional((0..20).map(Value::from).collect()),
        };
        assert!(validate(Operation::RawWhere(at_cap)).is_ok());
    }

    #[test]
    fn test_raw_where_named_placeholders_resolved() {
        let missing = RawWhere {
            sql: "age > :min AND age < :max".into(),
            params: RawParams::Named(vec![("min".into(), Value::from(1))]),
        };
        assert!(validate(Operation::RawWhere(missing)).is_err());
    }

    #[test]
    fn test_cursor_pagination_checks() {
        let both = CursorPage {
            order: vec![Order::asc("id")],
            limit: 10,
            after: Some("a".into()),
            before: Some("b".into()),
        };
        assert!(matches!(
            validate(Operation::Paginate(Paginate::Cursor(both))),
            Err(TokenError::Pagination { .. })
        ));

        let empty = CursorPage { order: vec![], limit: 10, after: None, before: None };
        assert!(matches!(
            validate(Operation::Paginate(Paginate::Cursor(empty))),
            Err(TokenError::Pagination { .. })
        ));

        let dup = CursorPage {
            order: vec![Order::asc("id"), Order::desc("id")],
            limit: 10,
            after: None,
            before: None,
        };
        assert!(validate(Operation::Paginate(Paginate::Cursor(dup))).is_err());
    }

    #[test]
    fn test_offset_pagination_checks() {
        let page_zero = OffsetPage { limit: 10, page: 0, offset: None };
        assert!(matches!(
            validate(Operation::Paginate(Paginate::Offset(page_zero))),
            Err(TokenError::Pagination { .. })
        ));
        let too_big = OffsetPage { limit: 5000, page: 1, offset: None };
        assert!(matches!(
            validate(Operation::Paginate(Paginate::Offset(too_big))),
            Err(TokenError::LimitExceeded { requested: 5000, .. })
        ));
    }

    #[test]
    fn test_limited_search_needs_takes() {
        let search = SearchRank {
            fields: vec![SearchField::new("name", SearchMode::Exact, 1)],
            term: "ada".into(),
            limited: true,
        };
        assert!(validate(Operation::SearchRank(search)).is_err());

        let search = SearchRank {
            fields: vec![SearchField::new("name", SearchMode::Exact, 1).take(5)],
            term: "ada".into(),
            limited: true,
        };
        assert!(validate(Operation::SearchRank(search)).is_ok());
    }

    #[test]
    fn test_field_compare_operator_restricted() {
        let compare = FieldCompare {
            left: FieldRef::new("updated_at"),
            op: FilterOp::Like,
            right: FieldRef::new("created_at"),
        };
        assert!(validate(Operation::FieldCompare(compare)).is_err());
    }
}
