//! Domain records (interventions, rooms, users, ...) that reference list values.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;

/// `record_type/id` pair identifying a domain record within an establishment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordRef {
    pub record_type: String,
    pub id: String,
}

impl RecordRef {
    pub fn new(record_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            record_type: record_type.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for RecordRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.record_type, self.id)
    }
}

/// A stored domain record. `data` is the JSON body; foreign keys to list values
/// live at top-level fields named by the configured bindings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainRecord {
    pub establishment_id: String,
    pub record_type: String,
    pub id: String,
    pub data: JsonValue,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<String>,
}

impl DomainRecord {
    pub fn new(
        establishment_id: impl Into<String>,
        record_type: impl Into<String>,
        id: impl Into<String>,
        data: JsonValue,
    ) -> Self {
        Self {
            establishment_id: establishment_id.into(),
            record_type: record_type.into(),
            id: id.into(),
            data,
            updated_at: Utc::now(),
            updated_by: None,
        }
    }

    pub fn reference(&self) -> RecordRef {
        RecordRef::new(self.record_type.clone(), self.id.clone())
    }

    /// String value of a top-level field, if any.
    pub fn field_str(&self, field: &str) -> Option<&str> {
        self.data.get(field).and_then(JsonValue::as_str)
    }

    /// Whether the record references `value` through `field`
    /// (as the field itself, or as an element when `multi`).
    pub fn references(&self, field: &str, value: &str, multi: bool) -> bool {
        match self.data.get(field) {
            Some(JsonValue::String(s)) if !multi => s == value,
            Some(JsonValue::Array(values)) if multi => {
                values.iter().any(|v| v.as_str() == Some(value))
            }
            _ => false,
        }
    }

    /// Every list value the record holds in `field`.
    pub fn referenced_values(&self, field: &str, multi: bool) -> Vec<&str> {
        match self.data.get(field) {
            Some(JsonValue::String(s)) if !multi => vec![s.as_str()],
            Some(JsonValue::Array(values)) if multi => {
                values.iter().filter_map(JsonValue::as_str).collect()
            }
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scalar_and_array_references() {
        let intervention = DomainRecord::new(
            "hotel-1",
            "interventions",
            "i-1",
            json!({"type": "plumbing", "skills": ["plumbing", "electricity"]}),
        );
        assert!(intervention.references("type", "plumbing", false));
        assert!(!intervention.references("type", "plumbing", true));
        assert!(intervention.references("skills", "electricity", true));
        assert!(!intervention.references("skills", "hvac", true));
        assert_eq!(
            intervention.referenced_values("skills", true),
            vec!["plumbing", "electricity"]
        );
    }

    #[test]
    fn record_ref_display() {
        assert_eq!(RecordRef::new("rooms", "101").to_string(), "rooms/101");
    }
}
