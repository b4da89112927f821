//! Cursor decoding errors
//!
//! "Corrupt" means the bytes could not be read as a cursor at all; "wrong
//! shape" means they parsed but did not describe an ordered field map.

use thiserror::Error;

pub type CursorResult<T> = Result<T, CursorError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CursorError {
    #[error("cursor is empty")]
    Empty,

    #[error("cursor is {len} bytes, maximum is {max}")]
    TooLong { len: usize, max: usize },

    #[error("cursor is not valid base64url: {0}")]
    Encoding(String),

    #[error("cursor checksum mismatch")]
    Checksum,

    #[error("unsupported cursor version {0}")]
    UnsupportedVersion(u8),

    #[error("corrupt cursor: {0}")]
    Corrupt(String),

    #[error("cursor has the wrong shape: expected an ordered field map, found {found}")]
    WrongShape { found: String },

    #[error("row has no value for cursor field '{field}'")]
    MissingField { field: String },
}

impl CursorError {
    pub fn code(&self) -> &'static str {
        match self {
            CursorError::Empty | CursorError::TooLong { .. } => "QT_CURSOR_INVALID",
            CursorError::Encoding(_) | CursorError::Corrupt(_) => "QT_CURSOR_CORRUPT",
            CursorError::Checksum => "QT_CURSOR_TAMPERED",
            CursorError::UnsupportedVersion(_) => "QT_CURSOR_VERSION",
            CursorError::WrongShape { .. } => "QT_CURSOR_SHAPE",
            CursorError::MissingField { .. } => "QT_CURSOR_FIELD_MISSING",
        }
    }
}
