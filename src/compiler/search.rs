//! Ranked search lowering
//!
//! Every search field contributes one match condition. Rows matching none
//! are filtered out; the rest are ordered by
//! `CASE WHEN cond_1 THEN rank_1 ... ELSE max_rank + 1 END` ascending, with
//! the greatest similarity score as a descending tie-break when any field
//! uses a similarity mode.
//!
//! The limited variant caps `LIMIT` at the sum of per-field takes. Per-rank
//! caps would need a windowed subquery and are not attempted; the
//! compiled query records this in its notes.

use crate::token::{SearchMode, SearchRank};
use crate::value::Value;

use super::errors::CompileResult;
use super::filters::escape_like;
use super::query::{CompareOp, Expr, SimilarityFn};

pub const LIMITED_SEARCH_NOTE: &str =
    "search_rank limited: LIMIT is the sum of per-field takes, per-rank takes are not enforced";

/// Lowered pieces of a search rank operation
#[derive(Debug, Clone)]
pub struct SearchLowering {
    /// Any field matches
    pub filter: Expr,
    /// Order ascending
    pub rank: Expr,
    /// Order descending
    pub tie_break: Option<Expr>,
    /// Set only for the limited variant
    pub limit: Option<u64>,
}

/// Lower `search`; `column` resolves a search field to its expression
pub fn lower_search<F>(
    search: &SearchRank,
    default_threshold: f64,
    mut column: F,
) -> CompileResult<SearchLowering>
where
    F: FnMut(&crate::token::FieldRef) -> CompileResult<Expr>,
{
    let mut fields: Vec<_> = search.fields.iter().collect();
    fields.sort_by_key(|f| f.rank);

    let term = search.term.trim();
    let mut conditions = Vec::with_capacity(fields.len());
    let mut whens = Vec::with_capacity(fields.len());
    let mut scores = Vec::new();

    for field in &fields {
        let col = column(&field.field)?;
        let threshold = field.threshold.unwrap_or(default_threshold);
        let condition = match field.mode {
            SearchMode::Exact => Expr::compare(
                Expr::lower(col),
                CompareOp::Eq,
                Expr::param(term.to_lowercase()),
            ),
            SearchMode::Prefix => like(col, format!("{}%", escape_like(term))),
            SearchMode::Contains => like(col, format!("%{}%", escape_like(term))),
            SearchMode::Similarity | SearchMode::WordSimilarity => {
                let score = score(field.mode, col, term);
                scores.push(score.clone());
                Expr::compare(score, CompareOp::Gt, Expr::param(threshold))
            }
        };
        conditions.push(condition.clone());
        whens.push((condition, Expr::Int(i64::from(field.rank))));
    }

    let default_rank = fields.iter().map(|f| f.rank).max().unwrap_or(0);
    let rank = Expr::Case {
        whens,
        otherwise: Box::new(Expr::Int(i64::from(default_rank) + 1)),
    };

    let tie_break = match scores.len() {
        0 => None,
        1 => scores.pop(),
        _ => Some(Expr::Greatest(scores)),
    };

    let limit = search
        .limited
        .then(|| fields.iter().filter_map(|f| f.take).sum::<u64>());

    Ok(SearchLowering {
        filter: Expr::or_all(conditions),
        rank,
        tie_break,
        limit,
    })
}

fn like(col: Expr, pattern: String) -> Expr {
    Expr::Like {
        expr: Box::new(col),
        pattern: Box::new(Expr::param(pattern)),
        case_insensitive: true,
        negated: false,
    }
}

fn score(mode: SearchMode, col: Expr, term: &str) -> Expr {
    let term = Box::new(Expr::Param(Value::from(term)));
    match mode {
        SearchMode::WordSimilarity => Expr::Similarity {
            func: SimilarityFn::WordSimilarity,
            left: term,
            right: Box::new(col),
        },
        _ => Expr::Similarity {
            func: SimilarityFn::Similarity,
            left: Box::new(col),
            right: term,
        },
    }
}
