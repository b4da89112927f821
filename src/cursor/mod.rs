//! Cursor Codec
//!
//! Keyset pagination cursors carry the actual boundary values of the last
//! row seen, not a sequence number, so they stay correct when rows are
//! inserted or removed between pages. The wire token is opaque, URL-safe
//! and tamper-checked; consumers must not parse it.

mod codec;
mod errors;

pub use codec::{CursorCodec, CursorEntry, CursorValues, CURSOR_VERSION, MAX_CURSOR_LEN};
pub use errors::{CursorError, CursorResult};
