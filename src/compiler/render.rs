//! PostgreSQL rendering
//!
//! Identifiers are always double-quoted, values are always bound as `$n`
//! parameters numbered in render order. Only integers the compiler itself
//! produces (ranks, limits, offsets) are written inline.

use crate::value::Value;

use super::fragment;
use super::query::{Expr, FromItem, NativeQuery};

/// Parameterized SQL text
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledSql {
    pub sql: String,
    pub params: Vec<Value>,
}

/// Quote an identifier, doubling embedded quotes
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// `"binding"."field"`
pub fn quote_column(binding: &str, field: &str) -> String {
    format!("{}.{}", quote_ident(binding), quote_ident(field))
}

#[derive(Default)]
struct SqlWriter {
    sql: String,
    params: Vec<Value>,
}

impl SqlWriter {
    fn push(&mut self, text: &str) {
        self.sql.push_str(text);
    }

    fn param(&mut self, value: &Value) {
        self.params.push(value.clone());
        self.sql.push_str(&format!("${}", self.params.len()));
    }

    fn list(&mut self, exprs: &[Expr], sep: &str) {
        for (i, e) in exprs.iter().enumerate() {
            if i > 0 {
                self.push(sep);
            }
            self.expr(e);
        }
    }

    fn expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Column { binding, field } => self.push(&quote_column(binding, field)),
            Expr::Param(v) => self.param(v),
            Expr::Int(i) => self.push(&i.to_string()),
            Expr::Bool(true) => self.push("TRUE"),
            Expr::Bool(false) => self.push("FALSE"),
            Expr::Compare { left, op, right } => {
                self.expr(left);
                self.push(" ");
                self.push(op.as_sql());
                self.push(" ");
                self.expr(right);
            }
            Expr::And(items) => {
                self.push("(");
                self.list(items, " AND ");
                self.push(")");
            }
            Expr::Or(items) => {
                self.push("(");
                self.list(items, " OR ");
                self.push(")");
            }
            Expr::Not(inner) => {
                self.push("NOT (");
                self.expr(inner);
                self.push(")");
            }
            Expr::IsNull(inner) => {
                self.expr(inner);
                self.push(" IS NULL");
            }
            Expr::IsNotNull(inner) => {
                self.expr(inner);
                self.push(" IS NOT NULL");
            }
            Expr::InList { expr, list, negated } => {
                self.expr(expr);
                self.push(if *negated { " NOT IN (" } else { " IN (" });
                self.list(list, ", ");
                self.push(")");
            }
            Expr::Like {
                expr,
                pattern,
                case_insensitive,
                negated,
            } => {
                self.expr(expr);
                self.push(match (*negated, *case_insensitive) {
                    (false, false) => " LIKE ",
                    (false, true) => " ILIKE ",
                    (true, false) => " NOT LIKE ",
                    (true, true) => " NOT ILIKE ",
                });
                self.expr(pattern);
            }
            Expr::Lower(inner) => {
                self.push("lower(");
                self.expr(inner);
                self.push(")");
            }
            Expr::Between { expr, low, high } => {
                self.expr(expr);
                self.push(" BETWEEN ");
                self.expr(low);
                self.push(" AND ");
                self.expr(high);
            }
            Expr::Contains { left, right } => {
                self.expr(left);
                self.push(" @> ");
                self.expr(right);
            }
            Expr::Overlaps { left, right } => {
                self.expr(left);
                self.push(" && ");
                self.expr(right);
            }
            Expr::Similarity { func, left, right } => {
                self.push(func.as_sql());
                self.push("(");
                self.expr(left);
                self.push(", ");
                self.expr(right);
                self.push(")");
            }
            Expr::Case { whens, otherwise } => {
                self.push("CASE");
                for (cond, result) in whens {
                    self.push(" WHEN ");
                    self.expr(cond);
                    self.push(" THEN ");
                    self.expr(result);
                }
                self.push(" ELSE ");
                self.expr(otherwise);
                self.push(" END");
            }
            Expr::Greatest(items) => {
                self.push("GREATEST(");
                self.list(items, ", ");
                self.push(")");
            }
            Expr::Raw { sql, params } => {
                self.push("(");
                for (i, segment) in fragment::split_positional(sql).into_iter().enumerate() {
                    if i > 0 {
                        if let Some(value) = params.get(i - 1) {
                            self.param(value);
                        }
                    }
                    self.push(segment);
                }
                self.push(")");
            }
            Expr::Exists { query, negated } => {
                self.push(if *negated { "NOT EXISTS (" } else { "EXISTS (" });
                self.query(query);
                self.push(")");
            }
            Expr::Aggregate { func, arg } => {
                self.push(func.as_sql());
                self.push("(");
                match arg {
                    Some(arg) => self.expr(arg),
                    None => self.push("*"),
                }
                self.push(")");
            }
        }
    }

    fn query(&mut self, q: &NativeQuery) {
        if !q.ctes.is_empty() {
            self.push("WITH ");
            if q.ctes.iter().any(|c| c.recursive) {
                self.push("RECURSIVE ");
            }
            for (i, cte) in q.ctes.iter().enumerate() {
                if i > 0 {
                    self.push(", ");
                }
                self.push(&quote_ident(&cte.name));
                self.push(" AS (");
                self.query(&cte.query);
                self.push(")");
            }
            self.push(" ");
        }

        // ORDER BY over a set operation may only name output columns, so the
        // combined query is wrapped and exposed under the root alias again
        let wrapped = !q.combinations.is_empty();
        if wrapped {
            self.push("SELECT ");
            self.push(&quote_ident(q.root_alias()));
            self.push(".* FROM (");
        }
        self.select_core(q);
        if wrapped {
            self.push(") AS ");
            self.push(&quote_ident(q.root_alias()));
        }
        self.tail(q);
    }

    /// SELECT through the set operations, without CTEs or ordering
    fn select_core(&mut self, q: &NativeQuery) {
        self.push("SELECT ");
        match &q.distinct {
            Some(on) if on.is_empty() => self.push("DISTINCT "),
            Some(on) => {
                self.push("DISTINCT ON (");
                self.list(on, ", ");
                self.push(") ");
            }
            None => {}
        }
        if q.select.is_empty() {
            self.push(&quote_ident(q.root_alias()));
            self.push(".*");
        } else {
            for (i, item) in q.select.iter().enumerate() {
                if i > 0 {
                    self.push(", ");
                }
                self.expr(&item.expr);
                if let Some(alias) = &item.alias {
                    self.push(" AS ");
                    self.push(&quote_ident(alias));
                }
            }
        }

        self.push(" FROM ");
        match &q.from {
            FromItem::Table { name, alias } => {
                self.push(&quote_ident(name));
                self.push(" AS ");
                self.push(&quote_ident(alias));
            }
            FromItem::Subquery { query, alias } => {
                self.push("(");
                self.query(query);
                self.push(") AS ");
                self.push(&quote_ident(alias));
            }
        }

        for join in &q.joins {
            self.push(" ");
            self.push(join.kind.as_sql());
            self.push(" ");
            self.push(&quote_ident(&join.table));
            self.push(" AS ");
            self.push(&quote_ident(&join.alias));
            if let Some(on) = &join.on {
                self.push(" ON ");
                self.expr(on);
            }
        }

        if !q.wheres.is_empty() {
            self.push(" WHERE ");
            self.list(&q.wheres, " AND ");
        }
        if !q.group_by.is_empty() {
            self.push(" GROUP BY ");
            self.list(&q.group_by, ", ");
        }
        if !q.having.is_empty() {
            self.push(" HAVING ");
            self.list(&q.having, " AND ");
        }
        if !q.windows.is_empty() {
            self.push(" WINDOW ");
            for (i, w) in q.windows.iter().enumerate() {
                if i > 0 {
                    self.push(", ");
                }
                self.push(&quote_ident(&w.name));
                self.push(" AS (");
                self.push(&w.definition);
                self.push(")");
            }
        }
        for combination in &q.combinations {
            self.push(" ");
            self.push(combination.kind.as_sql());
            self.push(" (");
            self.query(&combination.query);
            self.push(")");
        }
    }

    /// ORDER BY, LIMIT, OFFSET and locking
    fn tail(&mut self, q: &NativeQuery) {
        if !q.order_by.is_empty() {
            self.push(" ORDER BY ");
            for (i, o) in q.order_by.iter().enumerate() {
                if i > 0 {
                    self.push(", ");
                }
                self.expr(&o.expr);
                self.push(" ");
                self.push(direction_sql(o.direction));
            }
        }
        if let Some(limit) = q.limit {
            self.push(&format!(" LIMIT {}", limit));
        }
        if let Some(offset) = q.offset {
            self.push(&format!(" OFFSET {}", offset));
        }
        if let Some(lock) = q.lock {
            self.push(" ");
            self.push(lock.as_sql());
        }
    }
}

pub(crate) fn direction_sql(direction: crate::token::SortDirection) -> &'static str {
    use crate::token::SortDirection::*;
    match direction {
        Asc => "ASC",
        Desc => "DESC",
        AscNullsFirst => "ASC NULLS FIRST",
        AscNullsLast => "ASC NULLS LAST",
        DescNullsFirst => "DESC NULLS FIRST",
        DescNullsLast => "DESC NULLS LAST",
    }
}

impl NativeQuery {
    /// Render as PostgreSQL text with `$n` parameters
    pub fn to_sql(&self) -> CompiledSql {
        let mut writer = SqlWriter::default();
        writer.query(self);
        CompiledSql {
            sql: writer.sql,
            params: writer.params,
        }
    }
}

impl Expr {
    /// Render a standalone expression; parameters are numbered from `$1`
    pub fn to_sql(&self) -> CompiledSql {
        let mut writer = SqlWriter::default();
        writer.expr(self);
        CompiledSql {
            sql: writer.sql,
            params: writer.params,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::query::{CompareOp, OrderExpr, SimilarityFn};
    use crate::token::SortDirection;

    #[test]
    fn test_select_all_with_params() {
        let mut q = NativeQuery::from_table("users", "root");
        q.wheres.push(Expr::compare(
            Expr::column("root", "age"),
            CompareOp::Gte,
            Expr::param(18),
        ));
        q.wheres.push(Expr::compare(
            Expr::column("root", "status"),
            CompareOp::Eq,
            Expr::param("active"),
        ));
        q.order_by.push(OrderExpr {
            expr: Expr::column("root", "name"),
            direction: SortDirection::DescNullsLast,
        });
        q.limit = Some(20);
        q.offset = Some(40);

        let compiled = q.to_sql();
        assert_eq!(
            compiled.sql,
            "SELECT \"root\".* FROM \"users\" AS \"root\" WHERE \"root\".\"age\" >= $1 \
             AND \"root\".\"status\" = $2 ORDER BY \"root\".\"name\" DESC NULLS LAST \
             LIMIT 20 OFFSET 40"
        );
        assert_eq!(compiled.params, vec![Value::from(18), Value::from("active")]);
    }

    #[test]
    fn test_quote_escapes() {
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_raw_fragment_renumbered() {
        let e = Expr::And(vec![
            Expr::compare(Expr::column("root", "a"), CompareOp::Eq, Expr::param(1)),
            Expr::Raw {
                sql: "b BETWEEN ? AND ? AND c <> '?'".into(),
                params: vec![Value::from(2), Value::from(3)],
            },
        ]);
        let compiled = e.to_sql();
        assert_eq!(
            compiled.sql,
            "(\"root\".\"a\" = $1 AND (b BETWEEN $2 AND $3 AND c <> '?'))"
        );
        assert_eq!(compiled.params.len(), 3);
    }

    #[test]
    fn test_case_and_greatest() {
        let e = Expr::Case {
            whens: vec![(Expr::Bool(true), Expr::Int(1))],
            otherwise: Box::new(Expr::Int(2)),
        };
        assert_eq!(e.to_sql().sql, "CASE WHEN TRUE THEN 1 ELSE 2 END");

        let g = Expr::Greatest(vec![
            Expr::Similarity {
                func: SimilarityFn::Similarity,
                left: Box::new(Expr::column("root", "name")),
                right: Box::new(Expr::param("ada")),
            },
            Expr::Similarity {
                func: SimilarityFn::WordSimilarity,
                left: Box::new(Expr::param("ada")),
                right: Box::new(Expr::column("root", "bio")),
            },
        ]);
        assert_eq!(
            g.to_sql().sql,
            "GREATEST(similarity(\"root\".\"name\", $1), word_similarity($2, \"root\".\"bio\"))"
        );
    }
}
