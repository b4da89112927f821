//! Query compiler
//!
//! Lowers a token's operation list, in order, into a [`NativeQuery`].
//! Compilation is a pure function of the token and the configuration, so
//! the same token can be compiled concurrently from any number of threads.
//!
//! # Lowering rules
//!
//! - Schema sources root the query at binding `root`; raw sources are used
//!   unchanged as the base; nested sources only compile as operands.
//! - Every field reference is resolved against the bindings introduced so
//!   far. A filter on a join binding that precedes the join fails with
//!   `UnknownBinding`.
//! - `Limit`, `Offset` and pagination are last-wins.
//! - Cursor pagination replaces the ORDER BY with the cursor ordering
//!   (reversed when paging before the cursor).

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::QueryConfig;
use crate::cursor::CursorCodec;
use crate::token::{
    Combinator, CursorPage, FieldRef, Filter, FilterGroup, FilterNode, Join, JoinKind, JoinTarget,
    Operation, Order, Paginate, SchemaRef, SelectItem, SortDirection, Source, Subquery, Token,
    Window, ROOT_BINDING,
};
use crate::value::Value;

use super::errors::{CompileError, CompileResult};
use super::filters::{predicate, Operand, PredicateOpts};
use super::fragment;
use super::keyset::{keyset_predicate, CursorDirection};
use super::query::{
    CombinationClause, CompareOp, CteClause, Expr, JoinClause, NativeQuery, OrderExpr, SelectExpr,
    WindowDef,
};
use super::render::{direction_sql, quote_column, CompiledSql};
use super::search::{lower_search, LIMITED_SEARCH_NOTE};

/// Compiles tokens against one configuration
#[derive(Debug, Clone)]
pub struct Compiler {
    config: QueryConfig,
    codec: CursorCodec,
}

/// Bindings visible while lowering one query level
struct Scope {
    /// Alias that `root` refers to
    root: String,
    /// Binding -> schema, when the binding's schema is known
    bindings: HashMap<String, Option<Arc<SchemaRef>>>,
}

impl Scope {
    fn binding<'a>(&'a self, name: &'a str) -> &'a str {
        if name == ROOT_BINDING {
            &self.root
        } else {
            name
        }
    }

    fn resolve(&self, field: &FieldRef, operation: &'static str) -> CompileResult<Expr> {
        let binding = self.binding(&field.binding);
        if !self.bindings.contains_key(binding) {
            return Err(CompileError::UnknownBinding {
                binding: field.binding.clone(),
                operation,
            });
        }
        Ok(Expr::column(binding, &field.field))
    }

    fn schema(&self, name: &str) -> Option<&Arc<SchemaRef>> {
        self.bindings.get(self.binding(name)).and_then(Option::as_ref)
    }
}

/// Per-compilation state shared across nested query levels
#[derive(Default)]
struct Context {
    subqueries: usize,
}

impl Compiler {
    pub fn new(config: QueryConfig) -> Self {
        let codec = CursorCodec::new(config.cursor_secret.as_bytes());
        Self { config, codec }
    }

    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    /// Codec used to decode `after` / `before` cursors
    pub fn codec(&self) -> &CursorCodec {
        &self.codec
    }

    /// Lower a token into a native query
    pub fn compile(&self, token: &Token) -> CompileResult<NativeQuery> {
        if matches!(token.source(), Source::Nested(_)) {
            return Err(CompileError::NestedSource);
        }
        self.lower(token, ROOT_BINDING, &mut Context::default())
    }

    /// Compile and render as SQL
    pub fn compile_sql(&self, token: &Token) -> CompileResult<CompiledSql> {
        Ok(self.compile(token)?.to_sql())
    }

    /// Query counting every row the token matches, ignoring pagination.
    ///
    /// Pagination operations are skipped entirely, so a cursor's keyset
    /// predicate never narrows the total.
    pub fn compile_count(&self, token: &Token) -> CompileResult<NativeQuery> {
        if matches!(token.source(), Source::Nested(_)) {
            return Err(CompileError::NestedSource);
        }
        let query = self.lower_where(token, ROOT_BINDING, &mut Context::default(), |op| {
            !matches!(op, Operation::Paginate(_))
        })?;
        Ok(query.into_count())
    }

    fn lower(&self, token: &Token, alias: &str, ctx: &mut Context) -> CompileResult<NativeQuery> {
        self.lower_where(token, alias, ctx, |_| true)
    }

    /// Lower a token, applying only the operations `keep` accepts at this level
    fn lower_where<K>(
        &self,
        token: &Token,
        alias: &str,
        ctx: &mut Context,
        keep: K,
    ) -> CompileResult<NativeQuery>
    where
        K: Fn(&Operation) -> bool,
    {
        let (mut query, mut scope) = match token.source() {
            Source::Schema(schema) => {
                let query = NativeQuery::from_table(&schema.table, alias);
                let mut bindings = HashMap::new();
                bindings.insert(alias.to_string(), Some(Arc::clone(schema)));
                let scope = Scope {
                    root: alias.to_string(),
                    bindings,
                };
                (query, scope)
            }
            Source::Raw(native) => {
                let query = (**native).clone();
                let scope = Scope {
                    root: query.root_alias().to_string(),
                    bindings: query
                        .bindings()
                        .into_iter()
                        .map(|b| (b.to_string(), None))
                        .collect(),
                };
                (query, scope)
            }
            Source::Nested(inner) => {
                let query = self.lower(inner, alias, ctx)?;
                let scope = Scope {
                    root: query.root_alias().to_string(),
                    bindings: query
                        .bindings()
                        .into_iter()
                        .map(|b| (b.to_string(), None))
                        .collect(),
                };
                (query, scope)
            }
        };

        for op in token.operations().iter().filter(|op| keep(*op)) {
            self.apply(op, &mut query, &mut scope, ctx)?;
        }
        Ok(query)
    }

    /// Compile a token used as an operand (subquery, CTE, set operation)
    fn fragment(
        &self,
        token: &Token,
        alias: &str,
        operation: &'static str,
        ctx: &mut Context,
    ) -> CompileResult<NativeQuery> {
        self.lower(token, alias, ctx)
            .map_err(|e| CompileError::unresolvable(operation, e))
    }

    fn apply(
        &self,
        op: &Operation,
        query: &mut NativeQuery,
        scope: &mut Scope,
        ctx: &mut Context,
    ) -> CompileResult<()> {
        match op {
            Operation::Filter(f) => query.wheres.push(self.filter(f, scope)?),
            Operation::FilterGroup(g) => query.wheres.push(self.group(g, scope)?),
            Operation::Paginate(Paginate::Offset(page)) => {
                query.limit = Some(page.limit as u64);
                query.offset = Some(page.effective_offset());
            }
            Operation::Paginate(Paginate::Cursor(page)) => self.cursor(page, query, scope)?,
            Operation::Order(o) => {
                let expr = scope.resolve(&o.field, "order")?;
                query.order_by.push(OrderExpr {
                    expr,
                    direction: o.direction,
                });
            }
            Operation::Join(j) => self.join(j, query, scope)?,
            Operation::Preload(p) => {
                if let Some(binding) = &p.binding {
                    if !scope.bindings.contains_key(scope.binding(binding)) {
                        return Err(CompileError::UnknownBinding {
                            binding: binding.clone(),
                            operation: "preload",
                        });
                    }
                }
                if let (Some(schema), Some(first)) = (scope.schema(ROOT_BINDING), p.path.first()) {
                    if p.binding.is_none() && schema.association(first).is_none() {
                        return Err(CompileError::UnknownAssociation {
                            association: first.clone(),
                            binding: ROOT_BINDING.into(),
                        });
                    }
                }
                query.preloads.push(p.clone());
            }
            Operation::Select(s) => {
                for item in &s.items {
                    let select = match item {
                        SelectItem::Field(f) => SelectExpr {
                            expr: scope.resolve(f, "select")?,
                            alias: None,
                        },
                        SelectItem::Aggregate { func, field, alias } => SelectExpr {
                            expr: Expr::Aggregate {
                                func: *func,
                                arg: field
                                    .as_ref()
                                    .map(|f| scope.resolve(f, "select").map(Box::new))
                                    .transpose()?,
                            },
                            alias: Some(alias.clone()),
                        },
                    };
                    query.select.push(select);
                }
            }
            Operation::GroupBy(g) => {
                for f in &g.fields {
                    query.group_by.push(scope.resolve(f, "group_by")?);
                }
            }
            Operation::Having(h) => {
                let mut conds = Vec::with_capacity(h.filters.len());
                for hf in &h.filters {
                    let arg = hf
                        .field
                        .as_ref()
                        .map(|f| scope.resolve(f, "having").map(Box::new))
                        .transpose()?;
                    let aggregate = Expr::Aggregate { func: hf.func, arg };
                    conds.push(predicate(hf.op)(
                        aggregate,
                        Operand::Value(hf.value.clone()),
                        &self.opts(false, None),
                    ));
                }
                query.having.push(Expr::and_all(conds));
            }
            Operation::Limit(n) => query.limit = Some(*n as u64),
            Operation::Offset(n) => query.offset = Some(*n as u64),
            Operation::Distinct(d) => {
                let on = d
                    .on
                    .iter()
                    .map(|f| scope.resolve(f, "distinct"))
                    .collect::<CompileResult<Vec<_>>>()?;
                query.distinct = Some(on);
            }
            Operation::Lock(mode) => query.lock = Some(*mode),
            Operation::Cte(c) => {
                let inner = self.fragment(&c.token, ROOT_BINDING, "cte", ctx)?;
                query.ctes.push(CteClause {
                    name: c.name.clone(),
                    query: inner,
                    recursive: c.recursive,
                });
            }
            Operation::Window(w) => query.windows.push(self.window(w, scope)?),
            Operation::RawWhere(r) => {
                query
                    .wheres
                    .push(fragment::lower_raw(r, self.config.raw_param_cap)?);
            }
            Operation::Exists(s) => query.wheres.push(self.exists(s, false, scope, ctx)?),
            Operation::NotExists(s) => query.wheres.push(self.exists(s, true, scope, ctx)?),
            Operation::SearchRank(s) => {
                let lowered = lower_search(s, self.config.similarity_threshold, |f| {
                    scope.resolve(f, "search_rank")
                })?;
                query.wheres.push(lowered.filter);
                query.order_by.push(OrderExpr {
                    expr: lowered.rank,
                    direction: SortDirection::Asc,
                });
                if let Some(tie) = lowered.tie_break {
                    query.order_by.push(OrderExpr {
                        expr: tie,
                        direction: SortDirection::Desc,
                    });
                }
                if let Some(limit) = lowered.limit {
                    query.limit = Some(limit);
                    query.notes.push(LIMITED_SEARCH_NOTE.to_string());
                }
            }
            Operation::FieldCompare(c) => {
                let left = scope.resolve(&c.left, "field_compare")?;
                let right = scope.resolve(&c.right, "field_compare")?;
                query.wheres.push(predicate(c.op)(
                    left,
                    Operand::Expr(right),
                    &self.opts(false, None),
                ));
            }
            Operation::Combination(c) => {
                let other = self.fragment(&c.other, ROOT_BINDING, "combination", ctx)?;
                query.combinations.push(CombinationClause {
                    kind: c.kind,
                    query: other,
                });
            }
        }
        Ok(())
    }

    fn opts(&self, case_insensitive: bool, threshold: Option<f64>) -> PredicateOpts {
        PredicateOpts {
            case_insensitive,
            threshold: threshold.unwrap_or(self.config.similarity_threshold),
        }
    }

    fn filter(&self, f: &Filter, scope: &Scope) -> CompileResult<Expr> {
        let column = scope.resolve(&f.field_ref(), "filter")?;
        Ok(predicate(f.op)(
            column,
            Operand::Value(f.value.clone()),
            &self.opts(f.opts.case_insensitive, f.opts.threshold),
        ))
    }

    fn group(&self, g: &FilterGroup, scope: &Scope) -> CompileResult<Expr> {
        let members = g
            .filters
            .iter()
            .map(|node| match node {
                FilterNode::Filter(f) => self.filter(f, scope),
                FilterNode::Group(inner) => self.group(inner, scope),
            })
            .collect::<CompileResult<Vec<_>>>()?;
        Ok(match g.combinator {
            Combinator::And => Expr::And(members),
            Combinator::Or => Expr::Or(members),
            Combinator::NotOr => Expr::Not(Box::new(Expr::Or(members))),
        })
    }

    fn cursor(&self, page: &CursorPage, query: &mut NativeQuery, scope: &Scope) -> CompileResult<()> {
        let (cursor, direction) = match (&page.after, &page.before) {
            (Some(c), _) => (Some(c), CursorDirection::After),
            (None, Some(c)) => (Some(c), CursorDirection::Before),
            (None, None) => (None, CursorDirection::After),
        };

        let column = |o: &Order| scope.resolve(&o.field, "paginate");
        query.order_by = page
            .order
            .iter()
            .map(|o| {
                Ok(OrderExpr {
                    expr: column(o)?,
                    direction: match direction {
                        CursorDirection::After => o.direction,
                        CursorDirection::Before => o.direction.reversed(),
                    },
                })
            })
            .collect::<CompileResult<Vec<_>>>()?;

        if let Some(cursor) = cursor {
            let values = self.codec.decode(cursor)?;
            query
                .wheres
                .push(keyset_predicate(&page.order, &values, direction, column)?);
        }
        query.limit = Some(page.limit as u64);
        query.offset = None;
        Ok(())
    }

    fn join(&self, j: &Join, query: &mut NativeQuery, scope: &mut Scope) -> CompileResult<()> {
        let from = scope.binding(&j.from).to_string();
        if !scope.bindings.contains_key(&from) {
            return Err(CompileError::UnknownBinding {
                binding: j.from.clone(),
                operation: "join",
            });
        }
        if scope.bindings.contains_key(&j.binding) {
            return Err(CompileError::Validation(format!(
                "binding '{}' is already defined",
                j.binding
            )));
        }

        let (table, implied) = match &j.target {
            JoinTarget::Table(table) => (table.clone(), None),
            JoinTarget::Association(name) => {
                let association = scope
                    .schema(&j.from)
                    .and_then(|s| s.association(name))
                    .ok_or_else(|| CompileError::UnknownAssociation {
                        association: name.clone(),
                        binding: j.from.clone(),
                    })?;
                let implied = Expr::compare(
                    Expr::column(&from, &association.owner_key),
                    CompareOp::Eq,
                    Expr::column(&j.binding, &association.related_key),
                );
                (association.table.clone(), Some(implied))
            }
        };

        let on = if j.kind == JoinKind::Cross {
            None
        } else if j.on.is_empty() {
            implied
        } else {
            let conds = j
                .on
                .iter()
                .map(|c| {
                    Ok(Expr::compare(
                        scope.resolve(&c.left, "join")?,
                        CompareOp::Eq,
                        Expr::column(&j.binding, &c.right_field),
                    ))
                })
                .collect::<CompileResult<Vec<_>>>()?;
            Some(Expr::and_all(conds))
        };

        query.joins.push(JoinClause {
            kind: j.kind,
            table,
            alias: j.binding.clone(),
            on,
        });
        scope.bindings.insert(j.binding.clone(), None);
        Ok(())
    }

    fn window(&self, w: &Window, scope: &Scope) -> CompileResult<WindowDef> {
        let mut parts = Vec::new();
        if !w.partition_by.is_empty() {
            let cols = w
                .partition_by
                .iter()
                .map(|f| self.column_text(f, scope))
                .collect::<CompileResult<Vec<_>>>()?;
            parts.push(format!("PARTITION BY {}", cols.join(", ")));
        }
        if !w.order_by.is_empty() {
            let cols = w
                .order_by
                .iter()
                .map(|o| {
                    self.column_text(&o.field, scope)
                        .map(|c| format!("{} {}", c, direction_sql(o.direction)))
                })
                .collect::<CompileResult<Vec<_>>>()?;
            parts.push(format!("ORDER BY {}", cols.join(", ")));
        }
        Ok(WindowDef {
            name: w.name.clone(),
            definition: parts.join(" "),
        })
    }

    fn column_text(&self, field: &FieldRef, scope: &Scope) -> CompileResult<String> {
        scope.resolve(field, "window")?;
        Ok(quote_column(scope.binding(&field.binding), &field.field))
    }

    fn exists(
        &self,
        s: &Subquery,
        negated: bool,
        scope: &Scope,
        ctx: &mut Context,
    ) -> CompileResult<Expr> {
        ctx.subqueries += 1;
        let alias = format!("sq{}", ctx.subqueries);
        let operation = if negated { "not_exists" } else { "exists" };
        let mut inner = self.fragment(&s.token, &alias, operation, ctx)?;

        let inner_root = inner.root_alias().to_string();
        for (outer, inner_field) in &s.correlate {
            let outer = scope.resolve(outer, operation)?;
            inner.wheres.push(Expr::compare(
                Expr::column(&inner_root, inner_field),
                CompareOp::Eq,
                outer,
            ));
        }
        inner.select = vec![SelectExpr {
            expr: Expr::Int(1),
            alias: None,
        }];
        Ok(Expr::Exists {
            query: Box::new(inner),
            negated,
        })
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new(QueryConfig::default())
    }
}

/// Parameter values of a compiled query, rendered as JSON
pub fn params_json(params: &[Value]) -> Vec<serde_json::Value> {
    params.iter().map(Value::to_json).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::{
        build, Association, FilterOp, FilterOpts, JoinKind, RawParams, SearchField, SearchMode,
        SortDirection,
    };
    use crate::value::row;

    fn users() -> Token {
        Token::from_schema(
            SchemaRef::new("users").with_association(Association::has_many("posts", "posts", "user_id")),
        )
    }

    fn sql(token: &Token) -> CompiledSql {
        Compiler::default().compile_sql(token).unwrap()
    }

    #[test]
    fn test_filters_and_order() {
        let t = build::filter(&users(), "age", FilterOp::Gte, 18).unwrap();
        let t = build::order(&t, "name", SortDirection::Asc).unwrap();
        let t = build::limit(&t, 10).unwrap();
        let compiled = sql(&t);
        assert_eq!(
            compiled.sql,
            "SELECT \"root\".* FROM \"users\" AS \"root\" WHERE \"root\".\"age\" >= $1 \
             ORDER BY \"root\".\"name\" ASC LIMIT 10"
        );
        assert_eq!(compiled.params, vec![Value::from(18)]);
    }

    #[test]
    fn test_group_combinators() {
        let t = build::where_none(
            &users(),
            [
                Filter::new("role", FilterOp::Eq, "banned"),
                Filter::new("role", FilterOp::Eq, "deleted"),
            ],
        )
        .unwrap();
        assert!(sql(&t)
            .sql
            .ends_with("WHERE NOT ((\"root\".\"role\" = $1 OR \"root\".\"role\" = $2))"));
    }

    #[test]
    fn test_association_join_falls_back_to_schema() {
        let t = build::join(&users(), "posts", JoinKind::Left).unwrap();
        let t = build::filter_with(
            &t,
            "published",
            FilterOp::Eq,
            true,
            FilterOpts {
                binding: Some("posts".into()),
                ..Default::default()
            },
        )
        .unwrap();
        let compiled = sql(&t);
        assert!(compiled.sql.contains(
            "LEFT OUTER JOIN \"posts\" AS \"posts\" ON \"root\".\"id\" = \"posts\".\"user_id\""
        ));
        assert!(compiled.sql.contains("WHERE \"posts\".\"published\" = $1"));
    }

    #[test]
    fn test_explicit_join_conditions() {
        let t = build::join_on(
            &Token::table("posts"),
            "users",
            "author",
            JoinKind::Inner,
            &[("author_id", "id"), ("tenant_id", "tenant_id")],
        )
        .unwrap();
        assert!(sql(&t).sql.contains(
            "INNER JOIN \"users\" AS \"author\" ON (\"root\".\"author_id\" = \"author\".\"id\" \
             AND \"root\".\"tenant_id\" = \"author\".\"tenant_id\")"
        ));
    }

    #[test]
    fn test_filter_before_join_is_unknown_binding() {
        let t = build::filter_with(
            &users(),
            "title",
            FilterOp::Eq,
            "x",
            FilterOpts {
                binding: Some("posts".into()),
                ..Default::default()
            },
        )
        .unwrap();
        assert!(matches!(
            Compiler::default().compile(&t),
            Err(CompileError::UnknownBinding { operation: "filter", .. })
        ));
    }

    #[test]
    fn test_unknown_association() {
        let t = build::join(&users(), "comments", JoinKind::Inner).unwrap();
        assert!(matches!(
            Compiler::default().compile(&t),
            Err(CompileError::UnknownAssociation { .. })
        ));
    }

    #[test]
    fn test_offset_pagination() {
        let t = build::paginate_offset(&users(), 25, 3).unwrap();
        let q = Compiler::default().compile(&t).unwrap();
        assert_eq!(q.limit, Some(25));
        assert_eq!(q.offset, Some(50));
    }

    #[test]
    fn test_cursor_after_and_before() {
        let compiler = Compiler::default();
        let order = vec![Order::asc("a"), Order::desc("b")];
        let cursor = compiler
            .codec()
            .encode(&row([("a", 5), ("b", 10)]), &order)
            .unwrap();

        let after = build::paginate_cursor(&users(), order.clone(), 10, Some(cursor.clone()), None)
            .unwrap();
        let compiled = compiler.compile_sql(&after).unwrap();
        assert!(compiled.sql.contains(
            "WHERE ((\"root\".\"a\" > $1 OR \"root\".\"a\" IS NULL) \
             OR (\"root\".\"a\" = $2 AND \"root\".\"b\" < $3)) \
             ORDER BY \"root\".\"a\" ASC, \"root\".\"b\" DESC LIMIT 10"
        ));

        let before = build::paginate_cursor(&users(), order, 10, None, Some(cursor)).unwrap();
        let compiled = compiler.compile_sql(&before).unwrap();
        assert!(compiled.sql.contains(
            "WHERE (\"root\".\"a\" < $1 \
             OR (\"root\".\"a\" = $2 AND (\"root\".\"b\" > $3 OR \"root\".\"b\" IS NULL))) \
             ORDER BY \"root\".\"a\" DESC, \"root\".\"b\" ASC"
        ));
    }

    #[test]
    fn test_tampered_cursor_is_compile_error() {
        let t = build::paginate_cursor(
            &users(),
            vec![Order::asc("id")],
            10,
            Some("bm90LWEtY3Vyc29y".into()),
            None,
        )
        .unwrap();
        assert!(matches!(
            Compiler::default().compile(&t),
            Err(CompileError::Cursor(_))
        ));
    }

    #[test]
    fn test_raw_fragment_overflow_at_compile() {
        // A token built under a looser cap still compiles against the
        // compiler's own cap.
        let loose = QueryConfig {
            raw_param_cap: 30,
            ..Default::default()
        };
        let sql_text = vec!["?"; 21].join(" + ");
        let t = users()
            .add_with(
                Operation::RawWhere(crate::token::RawWhere {
                    sql: format!("{} > 0", sql_text),
                    params: RawParams::Positional((0..21).map(Value::from).collect()),
                }),
                &loose,
            )
            .unwrap();
        assert_eq!(
            Compiler::default().compile(&t).unwrap_err(),
            CompileError::ParameterLimit { count: 21, max_allowed: 20 }
        );
    }

    #[test]
    fn test_exists_correlated() {
        let posts = build::filter(&Token::table("posts"), "published", FilterOp::Eq, true).unwrap();
        let t = build::exists(&users(), posts, &[("id", "user_id")]).unwrap();
        let compiled = sql(&t);
        assert!(compiled.sql.contains(
            "WHERE EXISTS (SELECT 1 FROM \"posts\" AS \"sq1\" WHERE \"sq1\".\"published\" = $1 \
             AND \"sq1\".\"user_id\" = \"root\".\"id\")"
        ));
    }

    #[test]
    fn test_subquery_failure_is_unresolvable() {
        let bad = build::filter_with(
            &Token::table("posts"),
            "x",
            FilterOp::Eq,
            1,
            FilterOpts {
                binding: Some("nope".into()),
                ..Default::default()
            },
        )
        .unwrap();
        let t = build::not_exists(&users(), bad, &[]).unwrap();
        assert!(matches!(
            Compiler::default().compile(&t),
            Err(CompileError::UnresolvableSubquery { operation: "not_exists", .. })
        ));
    }

    #[test]
    fn test_nested_source_only_as_operand() {
        let nested = Token::nested(build::filter(&Token::table("users"), "a", FilterOp::Eq, 1).unwrap());
        assert_eq!(
            Compiler::default().compile(&nested).unwrap_err(),
            CompileError::NestedSource
        );

        let t = build::cte(&users(), "active", nested, false).unwrap();
        let compiled = sql(&t);
        assert!(compiled
            .sql
            .starts_with("WITH \"active\" AS (SELECT \"root\".* FROM \"users\" AS \"root\" WHERE"));
    }

    #[test]
    fn test_combination_and_lock() {
        let admins = build::filter(&Token::table("admins"), "active", FilterOp::Eq, true).unwrap();
        let t = build::union(&users(), admins, true).unwrap();
        let t = build::order(&t, "id", SortDirection::Asc).unwrap();
        let t = build::limit(&t, 5).unwrap();
        let compiled = sql(&t);
        assert_eq!(
            compiled.sql,
            "SELECT \"root\".* FROM (SELECT \"root\".* FROM \"users\" AS \"root\" \
             UNION ALL (SELECT \"root\".* FROM \"admins\" AS \"root\" \
             WHERE \"root\".\"active\" = $1)) AS \"root\" \
             ORDER BY \"root\".\"id\" ASC LIMIT 5"
        );
        assert_eq!(compiled.params, vec![Value::from(true)]);

        // Without a set operation nothing is wrapped
        let plain = build::order(&users(), "id", SortDirection::Asc).unwrap();
        assert!(sql(&plain).sql.starts_with("SELECT \"root\".* FROM \"users\""));
    }

    #[test]
    fn test_search_rank_lowering() {
        let t = build::search_rank_limited(
            &users(),
            vec![
                SearchField::new("name", SearchMode::Exact, 1).take(3),
                SearchField::new("name", SearchMode::Similarity, 2).take(7),
            ],
            "ada",
        )
        .unwrap();
        let q = Compiler::default().compile(&t).unwrap();
        assert_eq!(q.limit, Some(10));
        assert_eq!(q.order_by.len(), 2);
        assert_eq!(q.notes, vec![LIMITED_SEARCH_NOTE.to_string()]);
    }

    #[test]
    fn test_window_text_and_aggregates() {
        let t = build::window(
            &users(),
            "w",
            &["team_id"],
            vec![Order::desc("score")],
        )
        .unwrap();
        let t = build::group_by(&t, &["team_id"]).unwrap();
        let t = build::having(&t, crate::token::AggregateFn::Count, None, FilterOp::Gt, 5).unwrap();
        let compiled = sql(&t);
        assert!(compiled.sql.contains("GROUP BY \"root\".\"team_id\" HAVING count(*) > $1"));
        assert!(compiled.sql.contains(
            "WINDOW \"w\" AS (PARTITION BY \"root\".\"team_id\" ORDER BY \"root\".\"score\" DESC)"
        ));
    }

    #[test]
    fn test_count_query() {
        let t = build::paginate_offset(&users(), 10, 2).unwrap();
        let t = build::filter(&t, "age", FilterOp::Gt, 30).unwrap();
        let count = Compiler::default().compile_count(&t).unwrap().to_sql();
        assert_eq!(
            count.sql,
            "SELECT count(*) AS \"count\" FROM \"users\" AS \"root\" WHERE \"root\".\"age\" > $1"
        );
    }

    #[test]
    fn test_count_query_drops_keyset_predicate() {
        let compiler = Compiler::default();
        let cursor = compiler
            .codec()
            .encode(&row([("id", 4)]), &[Order::asc("id")])
            .unwrap();
        let t = build::filter(&users(), "age", FilterOp::Gt, 30).unwrap();
        let t = build::paginate_cursor(&t, vec![Order::asc("id")], 3, Some(cursor), None).unwrap();

        let count = compiler.compile_count(&t).unwrap().to_sql();
        assert_eq!(
            count.sql,
            "SELECT count(*) AS \"count\" FROM \"users\" AS \"root\" WHERE \"root\".\"age\" > $1"
        );
        assert_eq!(count.params, vec![Value::from(30)]);
    }

    #[test]
    fn test_raw_source_used_unchanged() {
        let mut base = NativeQuery::from_table("events", "e");
        base.wheres.push(Expr::Bool(true));
        let t = build::filter(&Token::from_native(base), "kind", FilterOp::Eq, "click").unwrap();
        let compiled = sql(&t);
        assert_eq!(
            compiled.sql,
            "SELECT \"e\".* FROM \"events\" AS \"e\" WHERE TRUE AND \"e\".\"kind\" = $1"
        );
    }
}
