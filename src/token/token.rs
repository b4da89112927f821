//! Immutable query token
//!
//! A token is a source plus an ordered list of validated operations.
//! Appending never mutates an existing token: `add` returns a new token that
//! carries the operation only if validation succeeded.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::compiler::NativeQuery;
use crate::config::QueryConfig;

use super::ast::{FilterNode, Operation};
use super::errors::TokenResult;
use super::validator::Validator;

/// Cardinality of a declared association
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    One,
    Many,
}

/// Relationship declared on a schema.
///
/// Lowered to `owner.owner_key = related.related_key` when a join names the
/// association without explicit conditions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Association {
    pub name: String,
    pub table: String,
    pub owner_key: String,
    pub related_key: String,
    pub cardinality: Cardinality,
}

impl Association {
    /// `owner has many related` through `related.foreign_key = owner.id`
    pub fn has_many(
        name: impl Into<String>,
        table: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            owner_key: "id".into(),
            related_key: foreign_key.into(),
            cardinality: Cardinality::Many,
        }
    }

    /// `owner belongs to related` through `owner.foreign_key = related.id`
    pub fn belongs_to(
        name: impl Into<String>,
        table: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            owner_key: foreign_key.into(),
            related_key: "id".into(),
            cardinality: Cardinality::One,
        }
    }
}

/// Schema the token is rooted at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaRef {
    pub table: String,
    pub primary_key: String,
    pub associations: Vec<Association>,
}

impl SchemaRef {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            primary_key: "id".into(),
            associations: Vec::new(),
        }
    }

    pub fn with_primary_key(mut self, key: impl Into<String>) -> Self {
        self.primary_key = key.into();
        self
    }

    pub fn with_association(mut self, association: Association) -> Self {
        self.associations.push(association);
        self
    }

    pub fn association(&self, name: &str) -> Option<&Association> {
        self.associations.iter().find(|a| a.name == name)
    }
}

/// What the token queries
#[derive(Debug, Clone, PartialEq)]
pub enum Source {
    Schema(Arc<SchemaRef>),
    /// Pre-built native query, used unchanged as the base
    Raw(Box<NativeQuery>),
    /// Another token; only usable as a subquery / CTE operand
    Nested(Box<Token>),
}

impl Source {
    pub fn describe(&self) -> String {
        match self {
            Source::Schema(s) => s.table.clone(),
            Source::Raw(_) => "raw".into(),
            Source::Nested(t) => format!("nested({})", t.source.describe()),
        }
    }
}

/// Per-kind operation counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OperationCounts {
    pub operations: usize,
    pub joins: usize,
    pub filters: usize,
}

/// Immutable query description
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    source: Source,
    operations: Vec<Operation>,
    metadata: BTreeMap<String, String>,
}

impl Token {
    pub fn new(source: Source) -> Self {
        Self {
            source,
            operations: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }

    /// Token rooted at a schema
    pub fn from_schema(schema: SchemaRef) -> Self {
        Self::new(Source::Schema(Arc::new(schema)))
    }

    /// Token rooted at a bare table with no declared associations
    pub fn table(name: impl Into<String>) -> Self {
        Self::from_schema(SchemaRef::new(name))
    }

    /// Token using a pre-built native query as its base
    pub fn from_native(query: NativeQuery) -> Self {
        Self::new(Source::Raw(Box::new(query)))
    }

    /// Token wrapping another token (subquery / CTE operand only)
    pub fn nested(inner: Token) -> Self {
        Self::new(Source::Nested(Box::new(inner)))
    }

    pub fn source(&self) -> &Source {
        &self.source
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    /// New token with a metadata entry set
    pub fn with_metadata(&self, key: impl Into<String>, value: impl Into<String>) -> Token {
        let mut next = self.clone();
        next.metadata.insert(key.into(), value.into());
        next
    }

    /// Validate `op` against the default configuration and append it
    pub fn add(&self, op: Operation) -> TokenResult<Token> {
        self.add_with(op, &QueryConfig::default())
    }

    /// Validate `op` against `config` and append it
    pub fn add_with(&self, op: Operation, config: &QueryConfig) -> TokenResult<Token> {
        let op = Validator::new(config).validate(op)?;
        let mut operations = Vec::with_capacity(self.operations.len() + 1);
        operations.extend(self.operations.iter().cloned());
        operations.push(op);
        Ok(Token {
            source: self.source.clone(),
            operations,
            metadata: self.metadata.clone(),
        })
    }

    /// Raising form of [`Token::add`].
    ///
    /// # Panics
    ///
    /// Panics with the validation error when `op` is rejected.
    #[track_caller]
    pub fn push(&self, op: Operation) -> Token {
        match self.add(op) {
            Ok(token) => token,
            Err(e) => panic!("{}", e),
        }
    }

    /// True when an explicit `Limit` (or a limited search rank) is present
    pub fn has_limit(&self) -> bool {
        self.operations.iter().any(|op| match op {
            Operation::Limit(_) => true,
            Operation::SearchRank(s) => s.limited,
            _ => false,
        })
    }

    /// True when a `Paginate` operation is present
    pub fn has_pagination(&self) -> bool {
        self.operations
            .iter()
            .any(|op| matches!(op, Operation::Paginate(_)))
    }

    /// Last pagination operation, which is the one that takes effect
    pub fn pagination(&self) -> Option<&super::ast::Paginate> {
        self.operations.iter().rev().find_map(|op| match op {
            Operation::Paginate(p) => Some(p),
            _ => None,
        })
    }

    /// Operation, join and filter counts (group members and having
    /// conditions count as filters)
    pub fn counts(&self) -> OperationCounts {
        let mut counts = OperationCounts {
            operations: self.operations.len(),
            ..Default::default()
        };
        for op in &self.operations {
            match op {
                Operation::Join(_) => counts.joins += 1,
                Operation::Filter(_) | Operation::FieldCompare(_) | Operation::RawWhere(_) => {
                    counts.filters += 1
                }
                Operation::FilterGroup(g) => counts.filters += g.leaf_count(),
                Operation::Having(h) => counts.filters += h.filters.len(),
                _ => {}
            }
        }
        counts
    }

    /// Redacted filter summary: `binding.field op` entries, never values
    pub fn filter_summary(&self) -> Vec<String> {
        fn walk(nodes: &[FilterNode], out: &mut Vec<String>) {
            for node in nodes {
                match node {
                    FilterNode::Filter(f) => out.push(format!("{} {}", f.field_ref(), f.op)),
                    FilterNode::Group(g) => walk(&g.filters, out),
                }
            }
        }

        let mut out = Vec::new();
        for op in &self.operations {
            match op {
                Operation::Filter(f) => out.push(format!("{} {}", f.field_ref(), f.op)),
                Operation::FilterGroup(g) => walk(&g.filters, &mut out),
                Operation::FieldCompare(c) => out.push(format!("{} {} {}", c.left, c.op, c.right)),
                Operation::RawWhere(_) => out.push("raw_where".into()),
                _ => {}
            }
        }
        out
    }

    /// One line per operation kind, in order
    pub fn describe(&self) -> Vec<String> {
        self.operations.iter().map(|op| op.kind().to_string()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::ast::{Combinator, Filter, FilterGroup, FilterOp};

    #[test]
    fn test_add_does_not_mutate_original() {
        let base = Token::table("users");
        let next = base
            .add(Operation::Filter(Filter::new("age", FilterOp::Gt, 18)))
            .unwrap();
        assert!(base.operations().is_empty());
        assert_eq!(next.operations().len(), 1);
    }

    #[test]
    fn test_rejected_op_never_enters_token() {
        let base = Token::table("users");
        assert!(base.add(Operation::Limit(0)).is_err());
        assert!(base.operations().is_empty());
    }

    #[test]
    #[should_panic(expected = "exceeds maximum")]
    fn test_push_panics_on_invalid() {
        Token::table("users").push(Operation::Limit(1_000_000));
    }

    #[test]
    fn test_counts_and_summary_redact_values() {
        let token = Token::table("users")
            .push(Operation::Filter(Filter::new("email", FilterOp::Eq, "secret@x.io")))
            .push(Operation::FilterGroup(FilterGroup::new(
                Combinator::Or,
                [
                    Filter::new("age", FilterOp::Gt, 18),
                    Filter::new("role", FilterOp::Eq, "admin"),
                ],
            )));

        let counts = token.counts();
        assert_eq!(counts.operations, 2);
        assert_eq!(counts.filters, 3);

        let summary = token.filter_summary();
        assert_eq!(summary, vec!["root.email eq", "root.age gt", "root.role eq"]);
        assert!(summary.iter().all(|s| !s.contains("secret")));
    }
}
