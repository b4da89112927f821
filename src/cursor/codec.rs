//! Opaque cursor encoding
//!
//! Wire layout before base64url (no padding):
//!
//! ```text
//! [magic 0xC7][version 1][CBOR body ...][tag: 8 bytes]
//! ```
//!
//! The body is the CBOR encoding of `{"entries": [[field, direction,
//! value], ...]}` in sort order. The tag is the first 8 bytes of
//! `SHA-256(secret || magic || version || body)` and is compared in
//! constant time.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::{Deserialize, Serialize};
use serde_cbor::Value as Cbor;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::token::{Order, SortDirection};
use crate::value::{Row, Value};

use super::errors::{CursorError, CursorResult};

pub const CURSOR_MAGIC: u8 = 0xC7;
pub const CURSOR_VERSION: u8 = 1;
const TAG_LEN: usize = 8;
/// Longest accepted wire cursor, in characters
pub const MAX_CURSOR_LEN: usize = 8 * 1024;

/// One boundary value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CursorEntry {
    pub field: String,
    pub direction: SortDirection,
    pub value: Value,
}

#[derive(Serialize, Deserialize)]
struct CursorBody {
    entries: Vec<(String, SortDirection, Value)>,
}

/// Decoded cursor: boundary values in sort order
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CursorValues {
    entries: Vec<CursorEntry>,
}

impl CursorValues {
    pub fn new(entries: Vec<CursorEntry>) -> Self {
        Self { entries }
    }

    /// Boundary value for a field key (`field` or `binding.field`)
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|e| e.field == field)
            .map(|e| &e.value)
    }

    pub fn entries(&self) -> &[CursorEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Encodes and decodes cursors signed with one secret
#[derive(Debug, Clone)]
pub struct CursorCodec {
    secret: Vec<u8>,
}

impl CursorCodec {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            secret: secret.to_vec(),
        }
    }

    /// Cursor for `row` positioned at the fields of the active ordering
    pub fn encode(&self, row: &Row, order: &[Order]) -> CursorResult<String> {
        if order.is_empty() {
            return Err(CursorError::Empty);
        }
        let entries = order
            .iter()
            .map(|o| {
                let key = o.field.key();
                row.get(&key)
                    .map(|value| (key.clone(), o.direction, value.clone()))
                    .ok_or(CursorError::MissingField { field: key })
            })
            .collect::<CursorResult<Vec<_>>>()?;

        let body = serde_cbor::to_vec(&CursorBody { entries })
            .map_err(|e| CursorError::Corrupt(e.to_string()))?;

        let mut bytes = Vec::with_capacity(2 + body.len() + TAG_LEN);
        bytes.push(CURSOR_MAGIC);
        bytes.push(CURSOR_VERSION);
        bytes.extend_from_slice(&body);
        bytes.extend_from_slice(&self.tag(CURSOR_VERSION, &body));
        Ok(URL_SAFE_NO_PAD.encode(bytes))
    }

    /// Verify and decode a wire cursor
    pub fn decode(&self, cursor: &str) -> CursorResult<CursorValues> {
        let cursor = cursor.trim();
        if cursor.is_empty() {
            return Err(CursorError::Empty);
        }
        if cursor.len() > MAX_CURSOR_LEN {
            return Err(CursorError::TooLong {
                len: cursor.len(),
                max: MAX_CURSOR_LEN,
            });
        }

        let bytes = URL_SAFE_NO_PAD
            .decode(cursor)
            .map_err(|e| CursorError::Encoding(e.to_string()))?;
        if bytes.len() < 2 + TAG_LEN + 1 {
            return Err(CursorError::Corrupt("truncated cursor".into()));
        }
        if bytes[0] != CURSOR_MAGIC {
            return Err(CursorError::Corrupt("unrecognized cursor header".into()));
        }
        let version = bytes[1];
        if version != CURSOR_VERSION {
            return Err(CursorError::UnsupportedVersion(version));
        }

        let (body, tag) = bytes[2..].split_at(bytes.len() - 2 - TAG_LEN);
        let expected = self.tag(version, body);
        if !bool::from(expected.as_slice().ct_eq(tag)) {
            return Err(CursorError::Checksum);
        }

        let parsed: Cbor =
            serde_cbor::from_slice(body).map_err(|e| CursorError::Corrupt(e.to_string()))?;
        check_shape(&parsed)?;
        let body: CursorBody = serde_cbor::from_slice(body).map_err(|e| CursorError::WrongShape {
            found: e.to_string(),
        })?;

        Ok(CursorValues::new(
            body.entries
                .into_iter()
                .map(|(field, direction, value)| CursorEntry {
                    field,
                    direction,
                    value,
                })
                .collect(),
        ))
    }

    fn tag(&self, version: u8, body: &[u8]) -> [u8; TAG_LEN] {
        let mut hasher = Sha256::new();
        hasher.update(&self.secret);
        hasher.update([CURSOR_MAGIC, version]);
        hasher.update(body);
        let digest = hasher.finalize();
        let mut tag = [0u8; TAG_LEN];
        tag.copy_from_slice(&digest[..TAG_LEN]);
        tag
    }
}

/// Top level must be `{"entries": [[field, direction, value], ...]}`
fn check_shape(parsed: &Cbor) -> CursorResult<()> {
    let wrong = |found: &str| CursorError::WrongShape {
        found: found.to_string(),
    };
    let map = match parsed {
        Cbor::Map(map) => map,
        other => return Err(wrong(cbor_kind(other))),
    };
    let entries = match map.get(&Cbor::Text("entries".into())) {
        Some(Cbor::Array(entries)) => entries,
        Some(_) => return Err(wrong("non-array entries")),
        None => return Err(wrong("map without entries")),
    };
    if entries.is_empty() {
        return Err(wrong("empty entries"));
    }
    for entry in entries {
        match entry {
            Cbor::Array(triple) if triple.len() == 3 && matches!(triple[0], Cbor::Text(_)) => {}
            other => return Err(wrong(&format!("entry {}", cbor_kind(other)))),
        }
    }
    Ok(())
}

fn cbor_kind(value: &Cbor) -> &'static str {
    match value {
        Cbor::Null => "null",
        Cbor::Bool(_) => "boolean",
        Cbor::Integer(_) | Cbor::Float(_) => "number",
        Cbor::Bytes(_) => "bytes",
        Cbor::Text(_) => "string",
        Cbor::Array(_) => "array",
        Cbor::Map(_) => "map",
        _ => "tagged value",
    }
}
