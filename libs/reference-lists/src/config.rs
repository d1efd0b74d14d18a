//! Settings for the cascade engine, the access-layer cache and record bindings.

use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;

/// Upper bound of one atomic record batch (the store's multi-write limit).
pub const MAX_BATCH_SIZE: usize = 500;

#[derive(Debug, Clone, Deserialize)]
pub struct ReferenceListsConfig {
    #[serde(default)]
    pub cascade: CascadeConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    /// Which record fields hold values of which list.
    #[serde(default = "default_bindings")]
    pub bindings: Vec<RecordBinding>,
}

impl Default for ReferenceListsConfig {
    fn default() -> Self {
        Self {
            cascade: CascadeConfig::default(),
            cache: CacheConfig::default(),
            bindings: default_bindings(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CascadeConfig {
    /// Records rewritten per atomic batch. Default: 500
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Time allowed for a single batch write before it counts as failed. Default: 10s
    #[serde(default = "default_batch_timeout_ms")]
    pub batch_timeout_ms: u64,
}

impl Default for CascadeConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            batch_timeout_ms: default_batch_timeout_ms(),
        }
    }
}

impl CascadeConfig {
    pub fn batch_timeout(&self) -> Duration {
        Duration::from_millis(self.batch_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Number of (establishment, list) entries kept in memory. Default: 256
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: default_cache_capacity(),
        }
    }
}

/// Declares that `record_type.field` stores values of `list_key`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RecordBinding {
    pub record_type: String,
    pub field: String,
    pub list_key: String,
    /// Field holds an array of values rather than a single one.
    #[serde(default)]
    pub multi: bool,
    /// Field holding a denormalized copy of the item label, if the record type keeps one.
    #[serde(default)]
    pub label_field: Option<String>,
}

impl RecordBinding {
    pub fn new(
        record_type: impl Into<String>,
        field: impl Into<String>,
        list_key: impl Into<String>,
    ) -> Self {
        Self {
            record_type: record_type.into(),
            field: field.into(),
            list_key: list_key.into(),
            multi: false,
            label_field: None,
        }
    }

    pub fn multi(mut self) -> Self {
        self.multi = true;
        self
    }

    pub fn with_label_field(mut self, field: impl Into<String>) -> Self {
        self.label_field = Some(field.into());
        self
    }
}

impl ReferenceListsConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.cascade.batch_size == 0 || self.cascade.batch_size > MAX_BATCH_SIZE {
            return Err(format!(
                "cascade.batch_size must be between 1 and {}",
                MAX_BATCH_SIZE
            ));
        }
        if self.cascade.batch_timeout_ms == 0 {
            return Err("cascade.batch_timeout_ms must be > 0".to_string());
        }
        if self.cache.capacity == 0 {
            return Err("cache.capacity must be > 0".to_string());
        }

        let mut seen = HashSet::new();
        for binding in &self.bindings {
            if binding.record_type.is_empty()
                || binding.field.is_empty()
                || binding.list_key.is_empty()
            {
                return Err(format!(
                    "binding {:?} must set record_type, field and list_key",
                    binding
                ));
            }
            if binding.label_field.as_deref() == Some(binding.field.as_str()) {
                return Err(format!(
                    "binding {}.{} cannot use its value field as label_field",
                    binding.record_type, binding.field
                ));
            }
            if binding.multi && binding.label_field.is_some() {
                return Err(format!(
                    "binding {}.{} is multi-valued and cannot denormalize a label",
                    binding.record_type, binding.field
                ));
            }
            if !seen.insert((binding.record_type.as_str(), binding.field.as_str())) {
                return Err(format!(
                    "duplicate binding for {}.{}",
                    binding.record_type, binding.field
                ));
            }
        }

        Ok(())
    }

    pub fn bindings_for<'a>(&'a self, list_key: &'a str) -> impl Iterator<Item = &'a RecordBinding> {
        self.bindings.iter().filter(move |b| b.list_key == list_key)
    }
}

fn default_batch_size() -> usize {
    MAX_BATCH_SIZE
}

fn default_batch_timeout_ms() -> u64 {
    10_000
}

fn default_cache_capacity() -> usize {
    256
}

pub fn default_bindings() -> Vec<RecordBinding> {
    vec![
        RecordBinding::new("interventions", "type", "interventionTypes"),
        RecordBinding::new("interventions", "status", "interventionStatuses"),
        RecordBinding::new("interventions", "priority", "priorities"),
        RecordBinding::new("interventions", "location", "locations"),
        RecordBinding::new("rooms", "status", "roomStatuses"),
        RecordBinding::new("rooms", "roomType", "roomTypes"),
        RecordBinding::new("users", "skills", "technicianSkills").multi(),
        RecordBinding::new("users", "department", "departments"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(ReferenceListsConfig::default().validate().is_ok());
    }

    #[test]
    fn batch_size_is_bounded() {
        let mut config = ReferenceListsConfig::default();
        config.cascade.batch_size = MAX_BATCH_SIZE + 1;
        assert!(config.validate().is_err());
        config.cascade.batch_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn duplicate_bindings_are_rejected() {
        let mut config = ReferenceListsConfig::default();
        config
            .bindings
            .push(RecordBinding::new("interventions", "type", "priorities"));
        assert!(config.validate().unwrap_err().contains("duplicate binding"));
    }

    #[test]
    fn multi_binding_cannot_denormalize_label() {
        let mut config = ReferenceListsConfig::default();
        config.bindings = vec![RecordBinding::new("users", "skills", "technicianSkills")
            .multi()
            .with_label_field("skillLabels")];
        assert!(config.validate().is_err());
    }

    #[test]
    fn bindings_are_deserialized_with_defaults() {
        let config: ReferenceListsConfig = serde_json::from_str(
            r#"{"bindings":[{"record_type":"interventions","field":"type","list_key":"interventionTypes"}]}"#,
        )
        .unwrap();
        assert_eq!(config.bindings.len(), 1);
        assert!(!config.bindings[0].multi);
        assert_eq!(config.cascade.batch_size, MAX_BATCH_SIZE);
        assert_eq!(config.bindings_for("interventionTypes").count(), 1);
    }
}
