//! Entry domain model.
//!
//! # Responsibility
//! - Define the typed entry returned by entry operations.
//! - Own the stored document shape and instant encoding.
//!
//! # Invariants
//! - `entry_id` is unique within its channel and never reused.
//! - `inserted` is set server-side at write time and never changes.
//! - Instants are kept at millisecond precision so a written entry equals the
//!   entry read back from the store.

use crate::model::channel::ChannelId;
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Opaque entry identifier (UUID v4 text for entries created by the core).
pub type EntryId = String;

/// Entry stored in a channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    pub entry_id: EntryId,
    /// Taken from the collection holding the document, not from its body.
    pub channel_id: ChannelId,
    pub group: String,
    pub message: String,
    pub metadata: Value,
    pub timestamp: DateTime<Utc>,
    pub inserted: DateTime<Utc>,
}

/// Caller-supplied fields for a new entry.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEntry {
    pub group: String,
    pub message: String,
    pub metadata: Value,
    /// Defaults to the moment of the create call when `None`.
    pub timestamp: Option<DateTime<Utc>>,
}

impl NewEntry {
    /// Creates a request without metadata or explicit timestamp.
    pub fn new(group: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            message: message.into(),
            metadata: Value::Null,
            timestamp: None,
        }
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

impl Entry {
    /// Document body written to the store. `entry_id` and `channel_id` are
    /// carried by the document address, not by the body.
    pub fn to_document(&self) -> Value {
        json!({
            "group": self.group,
            "message": self.message,
            "metadata": self.metadata,
            "timestamp": format_instant(&self.timestamp),
            "inserted": format_instant(&self.inserted),
        })
    }
}

/// Truncates an instant to the precision kept by stored documents.
pub fn normalize_instant(value: DateTime<Utc>) -> DateTime<Utc> {
    value.trunc_subsecs(3)
}

/// Encodes an instant as RFC 3339 with milliseconds and a `Z` offset.
pub fn format_instant(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Date-time layouts without an offset, read as UTC.
const NAIVE_LAYOUTS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"];

/// Minute-precision layouts carrying a numeric offset.
const OFFSET_LAYOUTS: &[&str] = &["%Y-%m-%dT%H:%M%:z", "%Y-%m-%dT%H:%M%z"];

/// Parses a stored instant.
///
/// Accepts RFC 3339 with any offset, minute-precision times with a numeric
/// offset or `Z`, naive `YYYY-MM-DDTHH:MM[:SS[.fff]]` read as UTC, and a
/// bare `YYYY-MM-DD` read as midnight UTC.
pub fn parse_instant(value: &str) -> Option<DateTime<Utc>> {
    let trimmed = value.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(parsed.with_timezone(&Utc));
    }

    if let Some(parsed) = OFFSET_LAYOUTS
        .iter()
        .find_map(|layout| DateTime::parse_from_str(trimmed, layout).ok())
    {
        return Some(parsed.with_timezone(&Utc));
    }

    let naive = trimmed.strip_suffix(['Z', 'z']).unwrap_or(trimmed);
    if let Some(parsed) = NAIVE_LAYOUTS
        .iter()
        .find_map(|layout| NaiveDateTime::parse_from_str(naive, layout).ok())
    {
        return Some(parsed.and_utc());
    }

    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|midnight| midnight.and_utc())
}

#[cfg(test)]
mod tests {
    use super::{format_instant, normalize_instant, parse_instant, Entry};
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    #[test]
    fn format_and_parse_instant_agree() {
        let instant = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        let text = format_instant(&instant);
        assert_eq!(text, "2024-03-01T12:30:00.000Z");
        assert_eq!(parse_instant(&text), Some(instant));
    }

    #[test]
    fn parse_instant_normalizes_offsets_and_naive_values() {
        let expected = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        assert_eq!(parse_instant("2024-03-01T12:00:00+02:00"), Some(expected));
        assert_eq!(parse_instant("2024-03-01T10:00:00"), Some(expected));
        assert_eq!(parse_instant("yesterday"), None);
    }

    #[test]
    fn parse_instant_accepts_date_only_and_minute_values() {
        let midnight = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let ten = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        assert_eq!(parse_instant("2024-05-01"), Some(midnight));
        assert_eq!(parse_instant("2024-05-01T10:00Z"), Some(ten));
        assert_eq!(parse_instant("2024-05-01T10:00"), Some(ten));
        assert_eq!(parse_instant("2024-05-01T12:00+02:00"), Some(ten));
        assert_eq!(parse_instant("2024-05-01T12:00+0200"), Some(ten));
        assert_eq!(parse_instant("2024-13-01"), None);
    }

    #[test]
    fn normalize_instant_drops_sub_millisecond_precision() {
        let precise = Utc.timestamp_opt(1_700_000_000, 123_456_789).unwrap();
        let normalized = normalize_instant(precise);
        assert_eq!(normalized.timestamp_subsec_nanos(), 123_000_000);
    }

    #[test]
    fn document_body_excludes_address_fields() {
        let instant = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let entry = Entry {
            entry_id: "e-1".to_string(),
            channel_id: "c-1".to_string(),
            group: "db".to_string(),
            message: "x".to_string(),
            metadata: json!({ "k": 1 }),
            timestamp: instant,
            inserted: instant,
        };

        let body = entry.to_document();
        assert_eq!(body["group"], "db");
        assert_eq!(body["metadata"], json!({ "k": 1 }));
        assert_eq!(body["timestamp"], "2024-01-02T03:04:05.000Z");
        assert!(body.get("entryId").is_none());
        assert!(body.get("channelId").is_none());
    }
}
