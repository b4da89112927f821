//! Backend-native query model
//!
//! The compiler's output. A `NativeQuery` is a plain value: drivers either
//! render it with [`NativeQuery::to_sql`] or evaluate the expression tree
//! directly (see `memory`).

use crate::token::{AggregateFn, CombinationKind, JoinKind, LockMode, Preload, SortDirection};
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl CompareOp {
    pub fn as_sql(&self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "<>",
            CompareOp::Gt => ">",
            CompareOp::Gte => ">=",
            CompareOp::Lt => "<",
            CompareOp::Lte => "<=",
        }
    }
}

/// Trigram similarity functions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimilarityFn {
    /// `similarity(a, b)`
    Similarity,
    /// `word_similarity(a, b)`: best match of `a` within `b`
    WordSimilarity,
}

impl SimilarityFn {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SimilarityFn::Similarity => "similarity",
            SimilarityFn::WordSimilarity => "word_similarity",
        }
    }
}

/// Expression tree
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Column {
        binding: String,
        field: String,
    },
    /// Bound parameter
    Param(Value),
    /// Inline integer literal (ranks, `SELECT 1`)
    Int(i64),
    Bool(bool),
    Compare {
        left: Box<Expr>,
        op: CompareOp,
        right: Box<Expr>,
    },
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Not(Box<Expr>),
    IsNull(Box<Expr>),
    IsNotNull(Box<Expr>),
    InList {
        expr: Box<Expr>,
        list: Vec<Expr>,
        negated: bool,
    },
    Like {
        expr: Box<Expr>,
        pattern: Box<Expr>,
        case_insensitive: bool,
        negated: bool,
    },
    Lower(Box<Expr>),
    Between {
        expr: Box<Expr>,
        low: Box<Expr>,
        high: Box<Expr>,
    },
    /// `left @> right` (array or jsonb containment)
    Contains {
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// `left && right`
    Overlaps {
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Similarity {
        func: SimilarityFn,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Case {
        whens: Vec<(Expr, Expr)>,
        otherwise: Box<Expr>,
    },
    Greatest(Vec<Expr>),
    /// Raw fragment with `?` placeholders, bound in order
    Raw {
        sql: String,
        params: Vec<Value>,
    },
    Exists {
        query: Box<NativeQuery>,
        negated: bool,
    },
    Aggregate {
        func: AggregateFn,
        /// `None` means `*`
        arg: Option<Box<Expr>>,
    },
}

impl Expr {
    pub fn column(binding: impl Into<String>, field: impl Into<String>) -> Self {
        Expr::Column {
            binding: binding.into(),
            field: field.into(),
        }
    }

    pub fn param(value: impl Into<Value>) -> Self {
        Expr::Param(value.into())
    }

    pub fn compare(left: Expr, op: CompareOp, right: Expr) -> Self {
        Expr::Compare {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    pub fn lower(expr: Expr) -> Self {
        Expr::Lower(Box::new(expr))
    }

    /// Conjunction; a single member is returned unwrapped
    pub fn and_all(mut exprs: Vec<Expr>) -> Self {
        match exprs.len() {
            0 => Expr::Bool(true),
            1 => exprs.remove(0),
            _ => Expr::And(exprs),
        }
    }

    /// Disjunction; a single member is returned unwrapped
    pub fn or_all(mut exprs: Vec<Expr>) -> Self {
        match exprs.len() {
            0 => Expr::Bool(false),
            1 => exprs.remove(0),
            _ => Expr::Or(exprs),
        }
    }
}

/// What the query reads from
#[derive(Debug, Clone, PartialEq)]
pub enum FromItem {
    Table { name: String, alias: String },
    Subquery { query: Box<NativeQuery>, alias: String },
}

impl FromItem {
    pub fn alias(&self) -> &str {
        match self {
            FromItem::Table { alias, .. } | FromItem::Subquery { alias, .. } => alias,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct JoinClause {
    pub kind: JoinKind,
    pub table: String,
    pub alias: String,
    /// `None` only for cross joins
    pub on: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderExpr {
    pub expr: Expr,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectExpr {
    pub expr: Expr,
    pub alias: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CteClause {
    pub name: String,
    pub query: NativeQuery,
    pub recursive: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CombinationClause {
    pub kind: CombinationKind,
    pub query: NativeQuery,
}

/// Named window; `definition` is the text inside `AS (...)`
#[derive(Debug, Clone, PartialEq)]
pub struct WindowDef {
    pub name: String,
    pub definition: String,
}

/// Compiled query
#[derive(Debug, Clone, PartialEq)]
pub struct NativeQuery {
    pub ctes: Vec<CteClause>,
    /// `Some(vec![])` is plain `DISTINCT`
    pub distinct: Option<Vec<Expr>>,
    /// Empty selects every column of the root binding
    pub select: Vec<SelectExpr>,
    pub from: FromItem,
    pub joins: Vec<JoinClause>,
    /// Conjunction of conditions
    pub wheres: Vec<Expr>,
    pub group_by: Vec<Expr>,
    pub having: Vec<Expr>,
    pub windows: Vec<WindowDef>,
    pub combinations: Vec<CombinationClause>,
    pub order_by: Vec<OrderExpr>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub lock: Option<LockMode>,
    /// Associations loaded by the caller after the main query
    pub preloads: Vec<Preload>,
    /// Known approximations taken while compiling
    pub notes: Vec<String>,
}

impl NativeQuery {
    /// `SELECT * FROM table AS alias`
    pub fn from_table(table: impl Into<String>, alias: impl Into<String>) -> Self {
        Self::with_from(FromItem::Table {
            name: table.into(),
            alias: alias.into(),
        })
    }

    fn with_from(from: FromItem) -> Self {
        Self {
            ctes: Vec::new(),
            distinct: None,
            select: Vec::new(),
            from,
            joins: Vec::new(),
            wheres: Vec::new(),
            group_by: Vec::new(),
            having: Vec::new(),
            windows: Vec::new(),
            combinations: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            offset: None,
            lock: None,
            preloads: Vec::new(),
            notes: Vec::new(),
        }
    }

    /// Alias of the base relation
    pub fn root_alias(&self) -> &str {
        self.from.alias()
    }

    /// Every binding the query introduces, base first
    pub fn bindings(&self) -> Vec<&str> {
        std::iter::once(self.from.alias())
            .chain(self.joins.iter().map(|j| j.alias.as_str()))
            .collect()
    }

    /// Query counting the rows this one would return, ignoring
    /// ordering, pagination, preloads and locks
    pub fn into_count(mut self) -> NativeQuery {
        self.order_by.clear();
        self.limit = None;
        self.offset = None;
        self.lock = None;
        self.preloads.clear();

        let count = SelectExpr {
            expr: Expr::Aggregate {
                func: AggregateFn::Count,
                arg: None,
            },
            alias: Some("count".into()),
        };

        let needs_wrap = self.distinct.is_some()
            || !self.group_by.is_empty()
            || !self.combinations.is_empty();
        if needs_wrap {
            let ctes = std::mem::take(&mut self.ctes);
            let mut outer = NativeQuery::with_from(FromItem::Subquery {
                query: Box::new(self),
                alias: "counted".into(),
            });
            outer.ctes = ctes;
            outer.select = vec![count];
            outer
        } else {
            self.select = vec![count];
            self
        }
    }
}
