//! Entry decoder: raw store document to typed [`Entry`].
//!
//! Decoding is all-or-nothing. The list path drops documents that fail here;
//! the single-entry path returns the failure to the caller.

use crate::model::entry::{parse_instant, Entry};
use crate::store::RawDocument;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Why a raw document could not become an [`Entry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// Body absent or `null`.
    SourceNotAccessible,
    /// Named key missing, of the wrong type, or not a parseable instant.
    KeyNotAccessible(&'static str),
}

impl Display for DecodeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SourceNotAccessible => write!(f, "document source is missing"),
            Self::KeyNotAccessible(key) => {
                write!(f, "document source key `{key}` is missing or malformed")
            }
        }
    }
}

impl Error for DecodeError {}

/// Validates a raw document and converts it into an [`Entry`].
///
/// `entry_id` comes from the document id and `channel_id` from the
/// collection holding it. A present source that is not an object has none of
/// the required keys.
pub fn decode_entry(document: &RawDocument) -> Result<Entry, DecodeError> {
    let source = match &document.source {
        None | Some(Value::Null) => return Err(DecodeError::SourceNotAccessible),
        Some(Value::Object(source)) => source,
        Some(_) => return Err(DecodeError::KeyNotAccessible("group")),
    };

    let group = required_str(source, "group")?;
    let message = required_str(source, "message")?;
    let metadata = source
        .get("metadata")
        .ok_or(DecodeError::KeyNotAccessible("metadata"))?;
    let timestamp = required_instant(source, "timestamp")?;
    let inserted = required_instant(source, "inserted")?;

    Ok(Entry {
        entry_id: document.id.clone(),
        channel_id: document.collection.clone(),
        group: group.to_string(),
        message: message.to_string(),
        metadata: metadata.clone(),
        timestamp,
        inserted,
    })
}

fn required_str<'a>(source: &'a Map<String, Value>, key: &'static str) -> Result<&'a str, DecodeError> {
    source
        .get(key)
        .and_then(Value::as_str)
        .ok_or(DecodeError::KeyNotAccessible(key))
}

fn required_instant(
    source: &Map<String, Value>,
    key: &'static str,
) -> Result<DateTime<Utc>, DecodeError> {
    parse_instant(required_str(source, key)?).ok_or(DecodeError::KeyNotAccessible(key))
}
