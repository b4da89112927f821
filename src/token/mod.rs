//! Operation IR & Validator
//!
//! A [`Token`] is an immutable description of a query: a source (schema,
//! pre-built native query, or another token) and an ordered list of
//! operations. Operations are validated the instant they are appended, so a
//! token never carries a malformed operation and structural errors never
//! reach the compiler.
//!
//! # Building tokens
//!
//! ```ignore
//! use querytoken::token::{build, FilterOp, SortDirection, Token};
//!
//! let t = Token::table("users");
//! let t = build::filter(&t, "age", FilterOp::Gte, 18)?;
//! let t = build::order(&t, "name", SortDirection::Asc)?;
//! let t = build::paginate_offset(&t, 20, 1)?;
//! ```
//!
//! Ordering between operations (a filter on a join binding must follow the
//! join) is checked by the compiler, not here.

mod ast;
pub mod build;
mod errors;
mod spec;
#[allow(clippy::module_inception)]
mod token;
mod validator;

pub use ast::{
    AggregateFn, Combination, CombinationKind, Combinator, Cte, CursorPage, Distinct,
    FieldCompare, FieldRef, Filter, FilterGroup, FilterNode, FilterOp, FilterOpts, GroupBy,
    Having, HavingFilter, Join, JoinCondition, JoinKind, JoinTarget, LockMode, OffsetPage,
    Operation, Order, Paginate, Preload, RawParams, RawWhere, SearchField, SearchMode, SearchRank,
    Select, SelectItem, SortDirection, Subquery, Window, ROOT_BINDING,
};
pub use errors::{TokenError, TokenResult};
pub use spec::{OperationSpec, TokenSpec};
pub use token::{Association, Cardinality, OperationCounts, SchemaRef, Source, Token};
pub use validator::Validator;
