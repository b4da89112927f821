//! JSON token descriptions
//!
//! A `TokenSpec` describes a source schema and an operation list in plain
//! JSON. Loading replays every operation through the validator, so a spec
//! that loads is exactly as valid as a token built in code. Operator,
//! direction and search-mode names are parsed with the same `FromStr` impls
//! as the builder API, which keeps unknown names on the typed error path.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::caster::CastType;
use crate::config::QueryConfig;
use crate::value::Value;

use super::ast::{
    AggregateFn, Combination, CombinationKind, Cte, CursorPage, Distinct, FieldCompare, FieldRef,
    Filter, FilterGroup, FilterNode, FilterOpts, GroupBy, Having, HavingFilter, Join,
    JoinCondition, JoinKind, JoinTarget, LockMode, OffsetPage, Operation, Order, Paginate,
    Preload, RawParams, RawWhere, SearchField, SearchRank, Select, SelectItem, SortDirection,
    Subquery, Window, Combinator, ROOT_BINDING,
};
use super::errors::{TokenError, TokenResult};
use super::token::{Association, Cardinality, SchemaRef, Token};

#[derive(Debug, Clone, Deserialize)]
pub struct TokenSpec {
    pub table: String,
    #[serde(default)]
    pub primary_key: Option<String>,
    #[serde(default)]
    pub associations: Vec<AssociationSpec>,
    #[serde(default)]
    pub operations: Vec<OperationSpec>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssociationSpec {
    pub name: String,
    pub table: String,
    pub owner_key: String,
    pub related_key: String,
    #[serde(default)]
    pub many: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FilterSpec {
    pub field: String,
    pub operator: String,
    #[serde(default)]
    pub value: serde_json::Value,
    #[serde(default)]
    pub binding: Option<String>,
    #[serde(default)]
    pub case_insensitive: bool,
    #[serde(default)]
    pub threshold: Option<f64>,
    #[serde(default)]
    pub cast: Option<String>,
    /// Allowed names when `cast` is `enum`
    #[serde(default)]
    pub enum_values: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum FilterNodeSpec {
    Group {
        combinator: Combinator,
        filters: Vec<FilterNodeSpec>,
    },
    Filter(FilterSpec),
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderSpec {
    pub field: String,
    #[serde(default = "default_direction")]
    pub direction: String,
}

fn default_direction() -> String {
    "asc".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchFieldSpec {
    pub field: String,
    pub mode: String,
    pub rank: u32,
    #[serde(default)]
    pub threshold: Option<f64>,
    #[serde(default)]
    pub take: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PaginateSpec {
    Offset {
        limit: i64,
        #[serde(default = "default_page")]
        page: i64,
        #[serde(default)]
        offset: Option<i64>,
    },
    Cursor {
        limit: i64,
        order: Vec<OrderSpec>,
        #[serde(default)]
        after: Option<String>,
        #[serde(default)]
        before: Option<String>,
    },
}

fn default_page() -> i64 {
    1
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawParamsSpec {
    Positional(Vec<serde_json::Value>),
    Named(BTreeMap<String, serde_json::Value>),
}

/// One operation, tagged by `op`
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum OperationSpec {
    Filter(FilterSpec),
    FilterGroup {
        combinator: Combinator,
        filters: Vec<FilterNodeSpec>,
    },
    Paginate(PaginateSpec),
    Order(OrderSpec),
    Join {
        #[serde(default)]
        association: Option<String>,
        #[serde(default)]
        table: Option<String>,
        #[serde(rename = "as", default)]
        binding: Option<String>,
        #[serde(default)]
        from: Option<String>,
        #[serde(default = "default_join_kind")]
        kind: JoinKind,
        #[serde(default)]
        on: Vec<(String, String)>,
    },
    Preload {
        path: Vec<String>,
        #[serde(default)]
        binding: Option<String>,
    },
    Select {
        #[serde(default)]
        fields: Vec<String>,
        #[serde(default)]
        aggregates: Vec<AggregateSpec>,
    },
    GroupBy {
        fields: Vec<String>,
    },
    Having {
        func: AggregateFn,
        #[serde(default)]
        field: Option<String>,
        operator: String,
        value: serde_json::Value,
    },
    Limit {
        value: i64,
    },
    Offset {
        value: i64,
    },
    Distinct {
        #[serde(default)]
        on: Vec<String>,
    },
    Lock {
        mode: LockMode,
    },
    Cte {
        name: String,
        query: Box<TokenSpec>,
        #[serde(default)]
        recursive: bool,
    },
    Window {
        name: String,
        #[serde(default)]
        partition_by: Vec<String>,
        #[serde(default)]
        order_by: Vec<OrderSpec>,
    },
    RawWhere {
        sql: String,
        #[serde(default = "default_raw_params")]
        params: RawParamsSpec,
    },
    Exists {
        query: Box<TokenSpec>,
        #[serde(default)]
        correlate: Vec<(String, String)>,
    },
    NotExists {
        query: Box<TokenSpec>,
        #[serde(default)]
        correlate: Vec<(String, String)>,
    },
    SearchRank {
        term: String,
        fields: Vec<SearchFieldSpec>,
        #[serde(default)]
        limited: bool,
    },
    FieldCompare {
        left: String,
        operator: String,
        right: String,
    },
    Combination {
        kind: CombinationKind,
        query: Box<TokenSpec>,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct AggregateSpec {
    pub func: AggregateFn,
    #[serde(default)]
    pub field: Option<String>,
    pub alias: String,
}

fn default_join_kind() -> JoinKind {
    JoinKind::Inner
}

fn default_raw_params() -> RawParamsSpec {
    RawParamsSpec::Positional(Vec::new())
}

impl TokenSpec {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Replay every operation through the validator
    pub fn to_token(&self, config: &QueryConfig) -> TokenResult<Token> {
        let mut schema = SchemaRef::new(&self.table);
        if let Some(pk) = &self.primary_key {
            schema = schema.with_primary_key(pk);
        }
        for a in &self.associations {
            schema = schema.with_association(Association {
                name: a.name.clone(),
                table: a.table.clone(),
                owner_key: a.owner_key.clone(),
                related_key: a.related_key.clone(),
                cardinality: if a.many { Cardinality::Many } else { Cardinality::One },
            });
        }

        self.operations
            .iter()
            .try_fold(Token::from_schema(schema), |token, spec| {
                token.add_with(spec.to_operation(config)?, config)
            })
    }
}

impl FilterSpec {
    fn to_filter(&self) -> TokenResult<Filter> {
        let cast = match self.cast.as_deref() {
            None => None,
            Some("enum") => Some(CastType::Enum(self.enum_values.clone())),
            Some(name) => Some(name.parse::<CastType>()?),
        };
        let op = self.operator.parse()?;
        Ok(Filter {
            field: self.field.clone(),
            op,
            value: Value::from_json(&self.value),
            opts: FilterOpts {
                binding: self.binding.clone(),
                case_insensitive: self.case_insensitive,
                threshold: self.threshold,
                cast,
            },
        })
    }
}

impl FilterNodeSpec {
    fn to_node(&self) -> TokenResult<FilterNode> {
        match self {
            FilterNodeSpec::Filter(f) => f.to_filter().map(FilterNode::Filter),
            FilterNodeSpec::Group { combinator, filters } => Ok(FilterNode::Group(FilterGroup {
                combinator: *combinator,
                filters: filters.iter().map(FilterNodeSpec::to_node).collect::<TokenResult<_>>()?,
            })),
        }
    }
}

impl OrderSpec {
    fn to_order(&self) -> TokenResult<Order> {
        let direction: SortDirection = self.direction.parse()?;
        Ok(Order::new(FieldRef::parse(&self.field), direction))
    }
}

fn orders(specs: &[OrderSpec]) -> TokenResult<Vec<Order>> {
    specs.iter().map(OrderSpec::to_order).collect()
}

fn field_refs(fields: &[String]) -> Vec<FieldRef> {
    fields.iter().map(|f| FieldRef::parse(f)).collect()
}

fn correlation(pairs: &[(String, String)]) -> Vec<(FieldRef, String)> {
    pairs
        .iter()
        .map(|(outer, inner)| (FieldRef::parse(outer), inner.clone()))
        .collect()
}

impl OperationSpec {
    fn to_operation(&self, config: &QueryConfig) -> TokenResult<Operation> {
        let op = match self {
            OperationSpec::Filter(f) => Operation::Filter(f.to_filter()?),
            OperationSpec::FilterGroup { combinator, filters } => {
                Operation::FilterGroup(FilterGroup {
                    combinator: *combinator,
                    filters: filters
                        .iter()
                        .map(FilterNodeSpec::to_node)
                        .collect::<TokenResult<_>>()?,
                })
            }
            OperationSpec::Paginate(PaginateSpec::Offset { limit, page, offset }) => {
                Operation::Paginate(Paginate::Offset(OffsetPage {
                    limit: *limit,
                    page: *page,
                    offset: *offset,
                }))
            }
            OperationSpec::Paginate(PaginateSpec::Cursor { limit, order, after, before }) => {
                Operation::Paginate(Paginate::Cursor(CursorPage {
                    order: orders(order)?,
                    limit: *limit,
                    after: after.clone(),
                    before: before.clone(),
                }))
            }
            OperationSpec::Order(o) => Operation::Order(o.to_order()?),
            OperationSpec::Join { association, table, binding, from, kind, on } => {
                let target = match (association, table) {
                    (Some(a), None) => JoinTarget::Association(a.clone()),
                    (None, Some(t)) => JoinTarget::Table(t.clone()),
                    _ => {
                        return Err(TokenError::validation(
                            "join",
                            "give exactly one of association or table",
                            format!("{:?}/{:?}", association, table),
                        ))
                    }
                };
                Operation::Join(Join {
                    binding: binding.clone().unwrap_or_else(|| target.name().to_string()),
                    target,
                    kind: *kind,
                    from: from.clone().unwrap_or_else(|| ROOT_BINDING.to_string()),
                    on: on
                        .iter()
                        .map(|(left, right)| JoinCondition {
                            left: FieldRef::parse(left),
                            right_field: right.clone(),
                        })
                        .collect(),
                })
            }
            OperationSpec::Preload { path, binding } => Operation::Preload(Preload {
                path: path.clone(),
                binding: binding.clone(),
            }),
            OperationSpec::Select { fields, aggregates } => {
                let mut items: Vec<SelectItem> = fields
                    .iter()
                    .map(|f| SelectItem::Field(FieldRef::parse(f)))
                    .collect();
                items.extend(aggregates.iter().map(|a| SelectItem::Aggregate {
                    func: a.func,
                    field: a.field.as_deref().map(FieldRef::parse),
                    alias: a.alias.clone(),
                }));
                Operation::Select(Select { items })
            }
            OperationSpec::GroupBy { fields } => Operation::GroupBy(GroupBy {
                fields: field_refs(fields),
            }),
            OperationSpec::Having { func, field, operator, value } => Operation::Having(Having {
                filters: vec![HavingFilter {
                    func: *func,
                    field: field.as_deref().map(FieldRef::parse),
                    op: operator.parse()?,
                    value: Value::from_json(value),
                }],
            }),
            OperationSpec::Limit { value } => Operation::Limit(*value),
            OperationSpec::Offset { value } => Operation::Offset(*value),
            OperationSpec::Distinct { on } => Operation::Distinct(Distinct { on: field_refs(on) }),
            OperationSpec::Lock { mode } => Operation::Lock(*mode),
            OperationSpec::Cte { name, query, recursive } => Operation::Cte(Cte {
                name: name.clone(),
                token: query.to_token(config)?,
                recursive: *recursive,
            }),
            OperationSpec::Window { name, partition_by, order_by } => Operation::Window(Window {
                name: name.clone(),
                partition_by: field_refs(partition_by),
                order_by: orders(order_by)?,
            }),
            OperationSpec::RawWhere { sql, params } => Operation::RawWhere(RawWhere {
                sql: sql.clone(),
                params: match params {
                    RawParamsSpec::Positional(values) => {
                        RawParams::Positional(values.iter().map(Value::from_json).collect())
                    }
                    RawParamsSpec::Named(values) => RawParams::Named(
                        values
                            .iter()
                            .map(|(k, v)| (k.clone(), Value::from_json(v)))
                            .collect(),
                    ),
                },
            }),
            OperationSpec::Exists { query, correlate } => Operation::Exists(Subquery {
                token: query.to_token(config)?,
                correlate: correlation(correlate),
            }),
            OperationSpec::NotExists { query, correlate } => Operation::NotExists(Subquery {
                token: query.to_token(config)?,
                correlate: correlation(correlate),
            }),
            OperationSpec::SearchRank { term, fields, limited } => {
                let fields = fields
                    .iter()
                    .map(|f| {
                        Ok(SearchField {
                            field: FieldRef::parse(&f.field),
                            mode: f.mode.parse()?,
                            threshold: f.threshold,
                            rank: f.rank,
                            take: f.take,
                        })
                    })
                    .collect::<TokenResult<Vec<_>>>()?;
                Operation::SearchRank(SearchRank {
                    fields,
                    term: term.clone(),
                    limited: *limited,
                })
            }
            OperationSpec::FieldCompare { left, operator, right } => {
                Operation::FieldCompare(FieldCompare {
                    left: FieldRef::parse(left),
                    op: operator.parse()?,
                    right: FieldRef::parse(right),
                })
            }
            OperationSpec::Combination { kind, query } => Operation::Combination(Combination {
                kind: *kind,
                other: query.to_token(config)?,
            }),
        };
        Ok(op)
    }
}
