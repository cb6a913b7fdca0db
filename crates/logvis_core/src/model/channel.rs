//! Channel domain model.
//!
//! # Responsibility
//! - Describe the channel descriptor returned by channel operations.
//! - Own the fixed field schema declared for every channel collection.
//!
//! # Invariants
//! - `channel_id` is generated once and never reused.
//! - Every channel created through the core carries [`ChannelSchema::fixed`].

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

/// Opaque channel identifier; doubles as the backing collection name.
///
/// Channels created by the core use UUID v4 text, but callers may look up any
/// string, so this stays a plain alias instead of `Uuid`.
pub type ChannelId = String;

/// Field type declared in a collection schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// Exact-match string.
    Keyword,
    /// Full-text string.
    Text,
    /// Arbitrary structured value.
    Object,
    /// Point in time.
    Date,
}

impl FieldKind {
    /// Mapping type name used by the search backend.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Keyword => "keyword",
            Self::Text => "text",
            Self::Object => "object",
            Self::Date => "date",
        }
    }

    /// Parses a mapping type name.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "keyword" => Some(Self::Keyword),
            "text" => Some(Self::Text),
            "object" => Some(Self::Object),
            "date" => Some(Self::Date),
            _ => None,
        }
    }
}

/// Field schema of a channel collection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSchema {
    pub fields: BTreeMap<String, FieldKind>,
}

impl ChannelSchema {
    /// The schema every channel is created with.
    pub fn fixed() -> Self {
        let fields = [
            ("group", FieldKind::Keyword),
            ("message", FieldKind::Text),
            ("metadata", FieldKind::Object),
            ("timestamp", FieldKind::Date),
            ("inserted", FieldKind::Date),
        ]
        .into_iter()
        .map(|(name, kind)| (name.to_string(), kind))
        .collect();

        Self { fields }
    }

    /// Renders the schema as a search-engine mapping body
    /// (`{"properties": {"<field>": {"type": "<kind>"}}}`).
    pub fn to_mappings(&self) -> Value {
        let properties = self
            .fields
            .iter()
            .map(|(name, kind)| (name.clone(), json!({ "type": kind.as_str() })))
            .collect::<Map<String, Value>>();

        json!({ "properties": properties })
    }

    /// Reads a schema back from a mapping body.
    ///
    /// Properties with unknown or missing types are skipped.
    pub fn from_mappings(mappings: &Value) -> Self {
        let fields = mappings
            .get("properties")
            .and_then(Value::as_object)
            .map(|properties| {
                properties
                    .iter()
                    .filter_map(|(name, property)| {
                        let kind = property
                            .get("type")
                            .and_then(Value::as_str)
                            .and_then(FieldKind::parse)?;
                        Some((name.clone(), kind))
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self { fields }
    }
}

/// Channel descriptor returned by channel operations.
///
/// Optional fields are filled from whatever collection metadata the store
/// reported for the call that produced the descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    pub channel_id: ChannelId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<ChannelSchema>,
}

#[cfg(test)]
mod tests {
    use super::{ChannelSchema, FieldKind};
    use serde_json::json;

    #[test]
    fn fixed_schema_declares_all_entry_fields() {
        let schema = ChannelSchema::fixed();
        assert_eq!(schema.fields.len(), 5);
        assert_eq!(schema.fields.get("group"), Some(&FieldKind::Keyword));
        assert_eq!(schema.fields.get("message"), Some(&FieldKind::Text));
        assert_eq!(schema.fields.get("metadata"), Some(&FieldKind::Object));
        assert_eq!(schema.fields.get("timestamp"), Some(&FieldKind::Date));
        assert_eq!(schema.fields.get("inserted"), Some(&FieldKind::Date));
    }

    #[test]
    fn mappings_render_property_types() {
        let mappings = ChannelSchema::fixed().to_mappings();
        assert_eq!(mappings["properties"]["group"], json!({ "type": "keyword" }));
        assert_eq!(mappings["properties"]["inserted"], json!({ "type": "date" }));
        assert_eq!(ChannelSchema::from_mappings(&mappings), ChannelSchema::fixed());
    }

    #[test]
    fn from_mappings_skips_unknown_types() {
        let mappings = json!({
            "properties": {
                "group": { "type": "keyword" },
                "geo": { "type": "geo_point" },
                "nested": { "properties": {} }
            }
        });
        let schema = ChannelSchema::from_mappings(&mappings);
        assert_eq!(schema.fields.len(), 1);
        assert_eq!(schema.fields.get("group"), Some(&FieldKind::Keyword));
    }
}
