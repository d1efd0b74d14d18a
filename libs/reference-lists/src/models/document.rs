//! The per-establishment reference list document.

use super::{Actor, ListItem};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use validator::Validate;

/// Named lists of one establishment, keyed by list key (e.g. `interventionTypes`).
///
/// Items are kept in insertion order; display order comes from [`ReferenceLists::sorted`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReferenceLists(BTreeMap<String, Vec<ListItem>>);

impl ReferenceLists {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn contains_list(&self, list_key: &str) -> bool {
        self.0.contains_key(list_key)
    }

    /// Items of a list as stored. Absent lists are empty.
    pub fn items(&self, list_key: &str) -> &[ListItem] {
        self.0.get(list_key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Items in display order (stable sort on `order`).
    pub fn sorted(&self, list_key: &str) -> Vec<ListItem> {
        let mut items = self.items(list_key).to_vec();
        items.sort_by_key(|item| item.order);
        items
    }

    pub fn find(&self, list_key: &str, value: &str) -> Option<&ListItem> {
        self.items(list_key).iter().find(|item| item.value == value)
    }

    pub fn find_mut(&mut self, list_key: &str, value: &str) -> Option<&mut ListItem> {
        self.0
            .get_mut(list_key)
            .and_then(|items| items.iter_mut().find(|item| item.value == value))
    }

    /// Like [`find_mut`](Self::find_mut) but with a typed error for missing items.
    pub fn require_mut(&mut self, list_key: &str, value: &str) -> Result<&mut ListItem> {
        self.find_mut(list_key, value)
            .ok_or_else(|| Error::ItemNotFound {
                list_key: list_key.to_string(),
                value: value.to_string(),
            })
    }

    pub fn next_order(&self, list_key: &str) -> i32 {
        self.items(list_key)
            .iter()
            .map(|item| item.order)
            .max()
            .map_or(0, |max| max.saturating_add(1))
    }

    /// Append a validated item; `value` must be unique within the list.
    pub fn insert_item(&mut self, list_key: &str, item: ListItem) -> Result<()> {
        validate_list_key(list_key)?;
        item.validate()?;
        if self.find(list_key, &item.value).is_some() {
            return Err(Error::DuplicateValue {
                list_key: list_key.to_string(),
                value: item.value,
            });
        }
        self.0.entry(list_key.to_string()).or_default().push(item);
        Ok(())
    }

    /// Change an item's value in place, keeping every other attribute.
    pub fn rekey_item(&mut self, list_key: &str, old_value: &str, new_value: &str) -> Result<()> {
        if old_value != new_value && self.find(list_key, new_value).is_some() {
            return Err(Error::DuplicateValue {
                list_key: list_key.to_string(),
                value: new_value.to_string(),
            });
        }
        let item = self.require_mut(list_key, old_value)?;
        item.value = new_value.to_string();
        item.validate()?;
        Ok(())
    }

    pub fn remove_item(&mut self, list_key: &str, value: &str) -> Result<ListItem> {
        let not_found = || Error::ItemNotFound {
            list_key: list_key.to_string(),
            value: value.to_string(),
        };
        let items = self.0.get_mut(list_key).ok_or_else(not_found)?;
        let position = items
            .iter()
            .position(|item| item.value == value)
            .ok_or_else(not_found)?;
        Ok(items.remove(position))
    }

    /// Replace a whole list after validating every item and value uniqueness.
    pub fn replace_list(&mut self, list_key: &str, items: Vec<ListItem>) -> Result<()> {
        validate_list_key(list_key)?;
        let mut seen = HashSet::new();
        for item in &items {
            item.validate()?;
            if !seen.insert(item.value.as_str()) {
                return Err(Error::DuplicateValue {
                    list_key: list_key.to_string(),
                    value: item.value.clone(),
                });
            }
        }
        self.0.insert(list_key.to_string(), items);
        Ok(())
    }

    /// Reassign `order` following `values`; every item of the list must be named exactly once.
    pub fn reorder(&mut self, list_key: &str, values: &[String]) -> Result<()> {
        let items = self.0.get_mut(list_key).ok_or_else(|| {
            Error::Validation(format!("List '{}' does not exist", list_key))
        })?;

        let named: HashSet<&str> = values.iter().map(String::as_str).collect();
        if named.len() != values.len() || named.len() != items.len() {
            return Err(Error::Validation(format!(
                "Reorder of '{}' must name each of its {} item(s) exactly once",
                list_key,
                items.len()
            )));
        }

        for item in items.iter_mut() {
            let position = values
                .iter()
                .position(|v| *v == item.value)
                .ok_or_else(|| Error::ItemNotFound {
                    list_key: list_key.to_string(),
                    value: item.value.clone(),
                })?;
            item.order = display_order(list_key, position)?;
        }
        items.sort_by_key(|item| item.order);
        Ok(())
    }
}

fn display_order(list_key: &str, position: usize) -> Result<i32> {
    i32::try_from(position).map_err(|_| {
        Error::Validation(format!(
            "List '{}' is too long to order (position {})",
            list_key, position
        ))
    })
}

fn validate_list_key(list_key: &str) -> Result<()> {
    if list_key.is_empty() || !list_key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(Error::Validation(format!("Invalid list key: '{}'", list_key)));
    }
    Ok(())
}

/// Versioned reference list document, one per establishment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceListDocument {
    pub establishment_id: String,
    pub version: u64,
    pub last_modified: DateTime<Utc>,
    pub modified_by: String,
    #[serde(default)]
    pub lists: ReferenceLists,
}

impl ReferenceListDocument {
    /// A freshly provisioned document: version 1, no lists.
    pub fn new(establishment_id: impl Into<String>, actor: &Actor) -> Self {
        Self {
            establishment_id: establishment_id.into(),
            version: 1,
            last_modified: Utc::now(),
            modified_by: actor.id.clone(),
            lists: ReferenceLists::new(),
        }
    }

    /// Successor document carrying `lists`, stamped for `actor`.
    pub fn next_version(&self, lists: ReferenceLists, actor: &Actor) -> Self {
        Self {
            establishment_id: self.establishment_id.clone(),
            version: self.version + 1,
            last_modified: Utc::now(),
            modified_by: actor.id.clone(),
            lists,
        }
    }
}
