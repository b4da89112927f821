//! Query Compiler
//!
//! Translates a validated token into a backend-native query. The output is a
//! [`NativeQuery`] value; [`NativeQuery::to_sql`] renders it as
//! parameterized PostgreSQL.
//!
//! # Guarantees
//!
//! - User-supplied values only ever appear as bound parameters
//! - Operations are applied in token order; limit, offset and pagination are
//!   last-wins
//! - Compilation never touches the database

#[allow(clippy::module_inception)]
mod compiler;
mod errors;
mod filters;
pub(crate) mod fragment;
mod keyset;
mod query;
mod render;
mod search;

pub use compiler::{params_json, Compiler};
pub use errors::{CompileError, CompileResult};
pub use filters::{escape_like, predicate, Operand, PredicateOpts};
pub use keyset::{keyset_predicate, strict_op, CursorDirection};
pub use query::{
    CombinationClause, CompareOp, CteClause, Expr, FromItem, JoinClause, NativeQuery, OrderExpr,
    SelectExpr, SimilarityFn, WindowDef,
};
pub use render::{quote_column, quote_ident, CompiledSql};
pub use search::{lower_search, SearchLowering, LIMITED_SEARCH_NOTE};
