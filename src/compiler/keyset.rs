//! Keyset (cursor) pagination lowering
//!
//! For order fields `[f1..fn]` and boundary values `[v1..vn]` the "next
//! row" predicate is
//!
//! ```text
//! (f1 op1 v1)
//! OR (f1 = v1 AND f2 op2 v2)
//! OR ...
//! OR (f1 = v1 AND ... AND f(n-1) = v(n-1) AND fn opn vn)
//! ```
//!
//! where each `op` is `>` or `<` depending on the field's direction and
//! whether we page after or before the cursor.
//!
//! Nulls follow PostgreSQL placement for the direction being scanned. A
//! null boundary uses `IS NULL` in the equality prefix. When nulls sort
//! after non-null values, a non-null boundary's branch also admits
//! `fi IS NULL`, and a null boundary has nothing strictly past it in that
//! field. When nulls sort first, a null boundary's branch is
//! `fi IS NOT NULL`.

use crate::cursor::CursorValues;
use crate::token::{Order, SortDirection};

use super::errors::{CompileError, CompileResult};
use super::query::{CompareOp, Expr};

/// Which side of the cursor to resume from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorDirection {
    After,
    Before,
}

/// Strict operator for one order field
pub fn strict_op(direction: SortDirection, cursor: CursorDirection) -> CompareOp {
    match (direction.base(), cursor) {
        (SortDirection::Asc, CursorDirection::After) => CompareOp::Gt,
        (SortDirection::Asc, CursorDirection::Before) => CompareOp::Lt,
        (_, CursorDirection::After) => CompareOp::Lt,
        (_, CursorDirection::Before) => CompareOp::Gt,
    }
}

/// Direction rows are actually scanned in for one order field
fn scan_direction(direction: SortDirection, cursor: CursorDirection) -> SortDirection {
    match cursor {
        CursorDirection::After => direction,
        CursorDirection::Before => direction.reversed(),
    }
}

/// Lexicographic predicate selecting rows strictly past the cursor.
///
/// `column` maps an order field to its expression.
pub fn keyset_predicate<F>(
    order: &[Order],
    values: &CursorValues,
    cursor: CursorDirection,
    mut column: F,
) -> CompileResult<Expr>
where
    F: FnMut(&Order) -> CompileResult<Expr>,
{
    let mut resolved = Vec::with_capacity(order.len());
    for o in order {
        let key = o.field.key();
        let entry = values
            .entries()
            .iter()
            .find(|e| e.field == key)
            .ok_or_else(|| CompileError::MissingCursorField { field: key.clone() })?;
        if entry.direction.base() != o.direction.base() {
            return Err(CompileError::Validation(format!(
                "cursor was issued for a different ordering of '{}'",
                key
            )));
        }
        resolved.push((column(o)?, o.direction, entry.value.clone()));
    }

    let mut branches = Vec::with_capacity(resolved.len());
    for (i, (expr, direction, value)) in resolved.iter().enumerate() {
        let nulls_after = !scan_direction(*direction, cursor).nulls_first();
        let past = match (value.is_null(), nulls_after) {
            (true, true) => continue,
            (true, false) => Expr::IsNotNull(Box::new(expr.clone())),
            (false, nulls_after) => {
                let strict = Expr::compare(
                    expr.clone(),
                    strict_op(*direction, cursor),
                    Expr::Param(value.clone()),
                );
                if nulls_after {
                    Expr::Or(vec![strict, Expr::IsNull(Box::new(expr.clone()))])
                } else {
                    strict
                }
            }
        };
        let mut conds: Vec<Expr> = resolved[..i]
            .iter()
            .map(|(prev, _, prev_value)| {
                if prev_value.is_null() {
                    Expr::IsNull(Box::new(prev.clone()))
                } else {
                    Expr::compare(prev.clone(), CompareOp::Eq, Expr::Param(prev_value.clone()))
                }
            })
            .collect();
        conds.push(past);
        branches.push(Expr::and_all(conds));
    }
    Ok(Expr::or_all(branches))
}
