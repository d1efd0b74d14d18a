//! Selectable entries of a reference list.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use validator::{Validate, ValidationError};

/// Grey used for values that no longer resolve to a list entry.
pub const FALLBACK_COLOR: &str = "#9e9e9e";

/// One entry of a reference list.
///
/// `value` is the key stored on domain records; `label` is only resolved at read time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ListItem {
    #[validate(length(min = 1, max = 64), custom(function = "validate_value_key"))]
    pub value: String,
    #[validate(length(min = 1, max = 120))]
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(custom(function = "validate_color"))]
    pub color: Option<String>,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub order: i32,
}

fn default_active() -> bool {
    true
}

impl ListItem {
    pub fn new(value: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            label: label.into(),
            icon: None,
            color: None,
            active: true,
            order: 0,
        }
    }

    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    /// Descriptor shown when a stored value has no matching entry.
    pub fn fallback(value: impl Into<String>) -> Self {
        let value = value.into();
        Self {
            label: value.clone(),
            value,
            icon: None,
            color: Some(FALLBACK_COLOR.to_string()),
            active: false,
            order: i32::MAX,
        }
    }

    /// Apply a partial update. Returns true if anything changed.
    pub fn apply(&mut self, changes: &ItemChanges) -> bool {
        let before = self.clone();
        if let Some(label) = &changes.label {
            self.label = label.clone();
        }
        if let Some(icon) = &changes.icon {
            self.icon = Some(icon.clone());
        }
        if let Some(color) = &changes.color {
            self.color = Some(color.clone());
        }
        if let Some(order) = changes.order {
            self.order = order;
        }
        *self != before
    }
}

/// Display-only changes to an item (value and active flag have their own operations).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemChanges {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<i32>,
}

impl ItemChanges {
    pub fn label(label: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.label.is_none() && self.icon.is_none() && self.color.is_none() && self.order.is_none()
    }
}

fn validate_value_key(value: &str) -> Result<(), ValidationError> {
    if value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Ok(());
    }
    let mut err = ValidationError::new("value_key");
    err.message = Some(Cow::from(
        "value may only contain ASCII letters, digits, '_' and '-'",
    ));
    Err(err)
}

fn validate_color(color: &str) -> Result<(), ValidationError> {
    let hex = color.strip_prefix('#').unwrap_or("");
    if matches!(hex.len(), 3 | 6) && hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Ok(());
    }
    let mut err = ValidationError::new("color");
    err.message = Some(Cow::from("color must be #rgb or #rrggbb"));
    Err(err)
}
