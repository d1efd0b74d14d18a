//! Actors and the audit trail of committed list mutations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use uuid::Uuid;

/// Authenticated identity performing a change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl Actor {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: None,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Initialize,
    AddItem,
    UpdateItem,
    RekeyItem,
    DeactivateItem,
    ReactivateItem,
    DeleteItem,
    ReorderItems,
    ReplaceList,
    SeedDefaults,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Initialize => "initialize",
            AuditAction::AddItem => "add_item",
            AuditAction::UpdateItem => "update_item",
            AuditAction::RekeyItem => "rekey_item",
            AuditAction::DeactivateItem => "deactivate_item",
            AuditAction::ReactivateItem => "reactivate_item",
            AuditAction::DeleteItem => "delete_item",
            AuditAction::ReorderItems => "reorder_items",
            AuditAction::ReplaceList => "replace_list",
            AuditAction::SeedDefaults => "seed_defaults",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "initialize" => Some(AuditAction::Initialize),
            "add_item" => Some(AuditAction::AddItem),
            "update_item" => Some(AuditAction::UpdateItem),
            "rekey_item" => Some(AuditAction::RekeyItem),
            "deactivate_item" => Some(AuditAction::DeactivateItem),
            "reactivate_item" => Some(AuditAction::ReactivateItem),
            "delete_item" => Some(AuditAction::DeleteItem),
            "reorder_items" => Some(AuditAction::ReorderItems),
            "replace_list" => Some(AuditAction::ReplaceList),
            "seed_defaults" => Some(AuditAction::SeedDefaults),
            _ => None,
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One committed mutation of a reference list document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub id: Uuid,
    pub establishment_id: String,
    /// Document version produced by the mutation.
    pub version: u64,
    pub actor: String,
    pub action: AuditAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list_key: Option<String>,
    #[serde(default)]
    pub details: JsonValue,
    pub recorded_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(
        establishment_id: impl Into<String>,
        version: u64,
        actor: &Actor,
        action: AuditAction,
        list_key: Option<&str>,
        details: JsonValue,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            establishment_id: establishment_id.into(),
            version,
            actor: actor.id.clone(),
            action,
            list_key: list_key.map(str::to_string),
            details,
            recorded_at: Utc::now(),
        }
    }
}
