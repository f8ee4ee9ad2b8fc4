//! Continuation cursors
//!
//! A backend hands out one of two native continuation shapes: an opaque
//! scroll session id, or the sort-key tuple of the last hit (search_after).
//! [`Cursor`] wraps either shape together with the fingerprint of the query
//! that produced it and the number of records already delivered, and
//! serializes to an opaque URL-safe token.

use crate::search::error::{SearchError, SearchResult};
use crate::search::query::QueryDescriptor;
use base64ct::{Base64UrlUnpadded, Encoding};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Envelope version written into every token
const TOKEN_VERSION: u8 = 1;

/// Tokens longer than this are refused before decoding
pub const MAX_TOKEN_LEN: usize = 16 * 1024;

/// One sort key value as reported by the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SortValue {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
}

impl SortValue {
    fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(SortValue::Null),
            Value::Bool(b) => Some(SortValue::Bool(*b)),
            Value::Number(n) => n
                .as_i64()
                .map(SortValue::Int)
                .or_else(|| n.as_u64().map(SortValue::UInt))
                .or_else(|| n.as_f64().map(SortValue::Float)),
            Value::String(s) => Some(SortValue::Text(s.clone())),
            Value::Array(_) | Value::Object(_) => None,
        }
    }

    fn to_json(&self) -> Value {
        match self {
            SortValue::Null => Value::Null,
            SortValue::Bool(b) => Value::Bool(*b),
            SortValue::Int(i) => Value::from(*i),
            SortValue::UInt(u) => Value::from(*u),
            SortValue::Float(f) => Value::from(*f),
            SortValue::Text(s) => Value::String(s.clone()),
        }
    }
}

/// Continuation exactly as the backend understands it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NativeCursor {
    /// Stateful scroll session id
    Scroll(String),
    /// Sort values of the last hit of the previous page
    SearchAfter(Vec<SortValue>),
}

impl NativeCursor {
    /// Interpret a raw backend continuation value.
    ///
    /// A non-empty string is a scroll id; a non-empty array of scalars is a
    /// search_after tuple. Anything else is malformed.
    pub fn from_backend(value: Value) -> SearchResult<Self> {
        match value {
            Value::String(id) if !id.is_empty() => Ok(NativeCursor::Scroll(id)),
            Value::Array(values) if !values.is_empty() => values
                .iter()
                .map(SortValue::from_json)
                .collect::<Option<Vec<_>>>()
                .map(NativeCursor::SearchAfter)
                .ok_or_else(|| {
                    SearchError::MalformedCursor("sort values must be scalars".to_string())
                }),
            other => Err(SearchError::MalformedCursor(format!(
                "unsupported continuation shape: {}",
                shape_name(&other)
            ))),
        }
    }

    /// Value to send back to the backend
    pub fn to_backend(&self) -> Value {
        match self {
            NativeCursor::Scroll(id) => Value::String(id.clone()),
            NativeCursor::SearchAfter(values) => {
                Value::Array(values.iter().map(SortValue::to_json).collect())
            }
        }
    }

    pub fn is_scroll(&self) -> bool {
        matches!(self, NativeCursor::Scroll(_))
    }
}

fn shape_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "empty string",
        Value::Array(_) => "empty array",
        Value::Object(_) => "object",
    }
}

/// Opaque continuation token bound to one query
#[derive(Debug, Clone, PartialEq)]
pub struct Cursor {
    fingerprint: String,
    position: u64,
    native: NativeCursor,
}

#[derive(Deserialize)]
struct Envelope {
    v: u8,
    fp: String,
    pos: u64,
    n: NativeCursor,
}

impl Cursor {
    /// Wrap a native continuation issued for `query` after `position`
    /// records have been delivered.
    pub fn encode(native: NativeCursor, query: &QueryDescriptor, position: u64) -> Self {
        Self {
            fingerprint: query.fingerprint(),
            position,
            native,
        }
    }

    /// Unwrap the native continuation, refusing it for any other query.
    pub fn decode(&self, query: &QueryDescriptor) -> SearchResult<NativeCursor> {
        if self.fingerprint != query.fingerprint() {
            return Err(SearchError::MalformedCursor(
                "cursor was issued for a different query".to_string(),
            ));
        }
        Ok(self.native.clone())
    }

    /// Number of records delivered before this cursor
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn native(&self) -> &NativeCursor {
        &self.native
    }

    /// Serialize to a URL-safe token
    pub fn token(&self) -> String {
        let native = match &self.native {
            NativeCursor::Scroll(id) => json!({ "scroll": id }),
            NativeCursor::SearchAfter(_) => json!({ "search_after": self.native.to_backend() }),
        };
        let envelope = json!({
            "v": TOKEN_VERSION,
            "fp": self.fingerprint,
            "pos": self.position,
            "n": native,
        });
        Base64UrlUnpadded::encode_string(envelope.to_string().as_bytes())
    }

    /// Parse a token produced by [`Cursor::token`]
    pub fn parse(token: &str) -> SearchResult<Self> {
        let token = token.trim();
        if token.is_empty() {
            return Err(SearchError::MalformedCursor("empty cursor".to_string()));
        }
        if token.len() > MAX_TOKEN_LEN {
            return Err(SearchError::MalformedCursor(format!(
                "cursor longer than {} bytes",
                MAX_TOKEN_LEN
            )));
        }

        let bytes = Base64UrlUnpadded::decode_vec(token)
            .map_err(|e| SearchError::MalformedCursor(format!("invalid encoding: {}", e)))?;
        let envelope: Envelope = serde_json::from_slice(&bytes)
            .map_err(|e| SearchError::MalformedCursor(format!("invalid envelope: {}", e)))?;

        if envelope.v != TOKEN_VERSION {
            return Err(SearchError::MalformedCursor(format!(
                "unsupported cursor version {}",
                envelope.v
            )));
        }
        match &envelope.n {
            NativeCursor::Scroll(id) if id.is_empty() => {
                return Err(SearchError::MalformedCursor("empty scroll id".to_string()))
            }
            NativeCursor::SearchAfter(values) if values.is_empty() => {
                return Err(SearchError::MalformedCursor(
                    "empty sort tuple".to_string(),
                ))
            }
            _ => {}
        }

        Ok(Self {
            fingerprint: envelope.fp,
            position: envelope.pos,
            native: envelope.n,
        })
    }
}
