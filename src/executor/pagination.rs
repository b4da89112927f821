//! Pagination metadata
//!
//! Paginated queries are fetched with one lookahead row. The extra row only
//! answers "is there more?" and is trimmed before the result is returned.

use crate::compiler::{CursorDirection, NativeQuery};
use crate::cursor::{CursorCodec, CursorResult};
use crate::token::{Order, Paginate, Token};
use crate::value::Row;

use super::result::PaginationInfo;

/// What the caller asked for, resolved against the compiled query
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum PageRequest {
    Offset {
        page_size: u64,
        offset: u64,
    },
    Cursor {
        page_size: u64,
        order: Vec<Order>,
        direction: CursorDirection,
    },
}

impl PageRequest {
    /// `None` when the token does not paginate. The compiled query's limit
    /// and offset win over the pagination operation's own values, since a
    /// later `Limit`/`Offset` overrides it.
    pub(crate) fn resolve(token: &Token, query: &NativeQuery) -> Option<Self> {
        match token.pagination()? {
            Paginate::Offset(page) => Some(PageRequest::Offset {
                page_size: query.limit.unwrap_or(page.limit.max(1) as u64).max(1),
                offset: query.offset.unwrap_or_else(|| page.effective_offset()),
            }),
            Paginate::Cursor(page) => Some(PageRequest::Cursor {
                page_size: query.limit.unwrap_or(page.limit.max(1) as u64).max(1),
                order: page.order.clone(),
                direction: if page.after.is_none() && page.before.is_some() {
                    CursorDirection::Before
                } else {
                    CursorDirection::After
                },
            }),
        }
    }

    pub(crate) fn page_size(&self) -> u64 {
        match self {
            PageRequest::Offset { page_size, .. } | PageRequest::Cursor { page_size, .. } => {
                *page_size
            }
        }
    }

    /// Query with room for the lookahead row
    pub(crate) fn with_lookahead(&self, mut query: NativeQuery) -> NativeQuery {
        query.limit = Some(self.page_size() + 1);
        query
    }

    /// Trim the lookahead row, restore cursor order and describe the page
    pub(crate) fn finish(&self, rows: &mut Vec<Row>, codec: &CursorCodec) -> CursorResult<PaginationInfo> {
        let page_size = self.page_size();
        let has_more = rows.len() as u64 > page_size;
        rows.truncate(page_size as usize);

        match self {
            PageRequest::Offset { offset, .. } => {
                let offset = *offset;
                Ok(PaginationInfo::Offset {
                    page: offset / page_size + 1,
                    page_size,
                    offset,
                    has_more,
                    has_previous: offset > 0,
                    next_offset: has_more.then_some(offset + page_size),
                    prev_offset: (offset > 0).then(|| offset.saturating_sub(page_size)),
                })
            }
            PageRequest::Cursor {
                order, direction, ..
            } => {
                // Rows before the cursor were fetched in reverse
                if *direction == CursorDirection::Before {
                    rows.reverse();
                }
                let start_cursor = rows.first().map(|r| codec.encode(r, order)).transpose()?;
                let end_cursor = rows.last().map(|r| codec.encode(r, order)).transpose()?;
                Ok(PaginationInfo::Cursor {
                    page_size,
                    has_more,
                    start_cursor,
                    end_cursor,
                })
            }
        }
    }
}
