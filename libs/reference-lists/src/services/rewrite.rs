//! In-place edits of record bodies performed by cascades.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value as JsonValue;

pub const UPDATED_AT_FIELD: &str = "updatedAt";
pub const UPDATED_BY_FIELD: &str = "updatedBy";

/// Replace `from` with `to` in `field`.
///
/// Scalar fields are replaced when equal to `from`. Array fields (`multi`) have matching
/// elements replaced; if `to` was already present the duplicate is dropped, so merging two
/// values never leaves the same value twice. Returns true if `data` changed.
pub fn replace_value(data: &mut JsonValue, field: &str, from: &str, to: &str, multi: bool) -> bool {
    let Some(current) = data.get_mut(field) else {
        return false;
    };

    match current {
        JsonValue::String(s) if !multi => {
            if s != from {
                return false;
            }
            *s = to.to_string();
            true
        }
        JsonValue::Array(values) if multi => {
            if !values.iter().any(|v| v.as_str() == Some(from)) {
                return false;
            }
            let mut seen_target = false;
            values.retain_mut(|v| {
                if v.as_str() == Some(from) {
                    *v = JsonValue::String(to.to_string());
                }
                if v.as_str() == Some(to) {
                    if seen_target {
                        return false;
                    }
                    seen_target = true;
                }
                true
            });
            true
        }
        _ => false,
    }
}

/// Write a denormalized label copy. Returns true if `data` changed.
pub fn set_label(data: &mut JsonValue, label_field: &str, label: &str) -> bool {
    let Some(object) = data.as_object_mut() else {
        return false;
    };
    if object.get(label_field).and_then(JsonValue::as_str) == Some(label) {
        return false;
    }
    object.insert(label_field.to_string(), JsonValue::String(label.to_string()));
    true
}

/// Audit stamp carried inside the record body.
pub fn stamp(data: &mut JsonValue, at: DateTime<Utc>, actor: &str) {
    if let Some(object) = data.as_object_mut() {
        object.insert(
            UPDATED_AT_FIELD.to_string(),
            JsonValue::String(at.to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
        object.insert(
            UPDATED_BY_FIELD.to_string(),
            JsonValue::String(actor.to_string()),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn replaces_scalar_only_when_equal() {
        let mut data = json!({"type": "urgent", "title": "Leak"});
        assert!(replace_value(&mut data, "type", "urgent", "high", false));
        assert_eq!(data["type"], "high");
        assert!(!replace_value(&mut data, "type", "urgent", "high", false));
    }

    #[test]
    fn scalar_binding_ignores_arrays() {
        let mut data = json!({"type": ["urgent"]});
        assert!(!replace_value(&mut data, "type", "urgent", "high", false));
        assert_eq!(data, json!({"type": ["urgent"]}));
    }

    #[test]
    fn merges_array_values_without_duplicates() {
        let mut data = json!({"skills": ["plumbing", "electricity", "plumbing-senior"]});
        assert!(replace_value(
            &mut data,
            "skills",
            "plumbing-senior",
            "plumbing",
            true
        ));
        assert_eq!(data["skills"], json!(["plumbing", "electricity"]));
    }

    #[test]
    fn missing_field_is_untouched() {
        let mut data = json!({"title": "Leak"});
        assert!(!replace_value(&mut data, "type", "urgent", "high", false));
    }

    #[test]
    fn label_copy_is_written_once() {
        let mut data = json!({"type": "high"});
        assert!(set_label(&mut data, "typeLabel", "High"));
        assert!(!set_label(&mut data, "typeLabel", "High"));
        assert_eq!(data["typeLabel"], "High");
    }

    #[test]
    fn stamp_sets_audit_fields() {
        let mut data = json!({"type": "high"});
        let at = DateTime::parse_from_rfc3339("2025-03-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        stamp(&mut data, at, "admin-1");
        assert_eq!(data[UPDATED_AT_FIELD], "2025-03-01T10:00:00.000Z");
        assert_eq!(data[UPDATED_BY_FIELD], "admin-1");
    }
}
