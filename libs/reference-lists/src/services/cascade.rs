//! Cascade update engine - the single write path for reference list edits
//!
//! Edits that change what records store (re-key, delete with reassignment, denormalized
//! labels) follow the same sequence:
//!
//! 1. validate against the current document (fail fast, nothing written)
//! 2. query every record whose bound field holds the affected value
//! 3. rewrite them in independent atomic batches of at most `batch_size`
//! 4. commit the list document at the version read in step 1
//!
//! Batch failures and a conflicting list commit are reported in [`CascadeReport`] rather
//! than returned as errors, because earlier batches are already durable at that point.
//! Concurrent cascades over overlapping records are not serialized; the last writer wins
//! per record, and [`CascadeEngine::find_stray_references`] surfaces what is left over.

use super::{
    reference_lists::{Mutation, ReferenceListStore},
    rewrite,
};
use crate::{
    config::{CascadeConfig, RecordBinding, MAX_BATCH_SIZE},
    db::{DocumentStore, RecordWrite},
    defaults,
    models::{
        Actor, AuditAction, DomainRecord, ItemChanges, ListItem, RecordRef,
        ReferenceListDocument, ReferenceLists,
    },
    Error, Result,
};
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value as JsonValue};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use validator::Validate;

/// Referencing records listed in a `ReferentialBlock` error.
const BLOCK_SAMPLE_SIZE: usize = 5;

/// What to do with records still referencing an item that is being deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeletePolicy {
    /// Refuse with `ReferentialBlock` while any record references the item.
    Refuse,
    /// Rewrite references to this value first, then delete.
    ReassignTo(String),
}

/// Outcome of the list document step of a cascade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "camelCase")]
pub enum ListCommit {
    Committed { version: u64 },
    /// Nothing to change in the list (e.g. re-running a finished re-key).
    Unchanged,
    /// Not attempted because record batches failed.
    Skipped,
    /// Another actor committed first; records may already be rewritten.
    Conflict { expected: u64, actual: u64 },
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedBatch {
    /// Zero-based batch position.
    pub index: usize,
    pub records: Vec<RecordRef>,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CascadeReport {
    pub establishment_id: String,
    pub list_key: String,
    /// Distinct records referencing the affected value.
    pub matched: usize,
    /// Records rewritten by successful batches.
    pub updated: usize,
    pub batches: usize,
    pub failed_batches: Vec<FailedBatch>,
    pub list_commit: ListCommit,
}

impl CascadeReport {
    fn list_only(establishment_id: &str, list_key: &str, list_commit: ListCommit) -> Self {
        Self {
            establishment_id: establishment_id.to_string(),
            list_key: list_key.to_string(),
            matched: 0,
            updated: 0,
            batches: 0,
            failed_batches: Vec::new(),
            list_commit,
        }
    }

    /// Every batch was written and the list is consistent with the records.
    pub fn is_success(&self) -> bool {
        self.failed_batches.is_empty()
            && matches!(
                self.list_commit,
                ListCommit::Committed { .. } | ListCommit::Unchanged
            )
    }

    /// Records left unchanged by failed batches, to retry or reconcile.
    pub fn unapplied_records(&self) -> Vec<RecordRef> {
        self.failed_batches
            .iter()
            .flat_map(|batch| batch.records.iter().cloned())
            .collect()
    }

    /// New document version, if the list was committed.
    pub fn committed_version(&self) -> Option<u64> {
        match self.list_commit {
            ListCommit::Committed { version } => Some(version),
            _ => None,
        }
    }

    /// Convert a partial outcome into an error.
    ///
    /// A conflicting list commit takes precedence over batch failures.
    pub fn into_result(self) -> Result<Self> {
        match &self.list_commit {
            ListCommit::Conflict { expected, actual } => {
                return Err(Error::VersionConflict {
                    expected: *expected,
                    actual: *actual,
                })
            }
            ListCommit::Failed(error) => return Err(Error::Storage(error.clone())),
            _ => {}
        }
        if !self.failed_batches.is_empty() {
            return Err(Error::BatchWriteFailure {
                unapplied: self.unapplied_records(),
            });
        }
        Ok(self)
    }
}

/// A record whose bound field holds a value missing from its list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StrayReference {
    pub record: RecordRef,
    pub field: String,
    pub value: String,
}

#[derive(Debug, Default)]
struct BatchOutcome {
    updated: usize,
    batches: usize,
    failed: Vec<FailedBatch>,
}

pub struct CascadeEngine {
    store: Arc<ReferenceListStore>,
    backend: Arc<dyn DocumentStore>,
    bindings: Vec<RecordBinding>,
    config: CascadeConfig,
}

impl CascadeEngine {
    pub fn new(
        store: Arc<ReferenceListStore>,
        backend: Arc<dyn DocumentStore>,
        bindings: Vec<RecordBinding>,
        mut config: CascadeConfig,
    ) -> Self {
        config.batch_size = config.batch_size.clamp(1, MAX_BATCH_SIZE);
        Self {
            store,
            backend,
            bindings,
            config,
        }
    }

    pub fn bindings(&self) -> &[RecordBinding] {
        &self.bindings
    }

    fn bindings_for<'a>(&'a self, list_key: &'a str) -> impl Iterator<Item = &'a RecordBinding> {
        self.bindings.iter().filter(move |b| b.list_key == list_key)
    }

    // ========================================================================
    // List-only edits
    // ========================================================================

    /// Add an item. Without an explicit `order` it goes after the current last item.
    pub async fn add_item(
        &self,
        establishment_id: &str,
        list_key: &str,
        mut item: ListItem,
        order: Option<i32>,
        actor: &Actor,
    ) -> Result<ReferenceListDocument> {
        let current = self.store.get(establishment_id).await?;
        item.order = order.unwrap_or_else(|| current.lists.next_order(list_key));

        let mutation = Mutation::new(
            AuditAction::AddItem,
            Some(list_key),
            serde_json::to_value(&item)?,
        );
        self.store
            .commit(establishment_id, current.version, actor, mutation, |lists| {
                lists.insert_item(list_key, item)
            })
            .await
    }

    /// Soft delete: hidden from pickers, still resolvable for historical records.
    pub async fn deactivate_item(
        &self,
        establishment_id: &str,
        list_key: &str,
        value: &str,
        actor: &Actor,
    ) -> Result<ReferenceListDocument> {
        self.set_active(establishment_id, list_key, value, false, actor)
            .await
    }

    pub async fn reactivate_item(
        &self,
        establishment_id: &str,
        list_key: &str,
        value: &str,
        actor: &Actor,
    ) -> Result<ReferenceListDocument> {
        self.set_active(establishment_id, list_key, value, true, actor)
            .await
    }

    async fn set_active(
        &self,
        establishment_id: &str,
        list_key: &str,
        value: &str,
        active: bool,
        actor: &Actor,
    ) -> Result<ReferenceListDocument> {
        let current = self.store.get(establishment_id).await?;
        let item = current
            .lists
            .find(list_key, value)
            .ok_or_else(|| Error::ItemNotFound {
                list_key: list_key.to_string(),
                value: value.to_string(),
            })?;

        if item.active == active {
            tracing::debug!(
                establishment_id = establishment_id,
                list_key = list_key,
                value = value,
                active = active,
                "Item already in requested state"
            );
            return Ok(current);
        }

        let action = if active {
            AuditAction::ReactivateItem
        } else {
            AuditAction::DeactivateItem
        };
        let mutation = Mutation::new(action, Some(list_key), json!({ "value": value }));
        self.store
            .commit(establishment_id, current.version, actor, mutation, |lists| {
                lists.require_mut(list_key, value)?.active = active;
                Ok(())
            })
            .await
    }

    /// Reassign display order; `values` must name every item of the list exactly once.
    pub async fn reorder_items(
        &self,
        establishment_id: &str,
        list_key: &str,
        values: &[String],
        actor: &Actor,
    ) -> Result<ReferenceListDocument> {
        let current = self.store.get(establishment_id).await?;
        let mutation = Mutation::new(
            AuditAction::ReorderItems,
            Some(list_key),
            json!({ "values": values }),
        );
        self.store
            .commit(establishment_id, current.version, actor, mutation, |lists| {
                lists.reorder(list_key, values)
            })
            .await
    }

    /// Replace a whole list (bulk import). Values dropped by the new list must not be
    /// referenced by any record.
    pub async fn replace_list(
        &self,
        establishment_id: &str,
        list_key: &str,
        items: Vec<ListItem>,
        actor: &Actor,
    ) -> Result<ReferenceListDocument> {
        let current = self.store.get(establishment_id).await?;

        let mut probe = current.lists.clone();
        probe.replace_list(list_key, items.clone())?;

        let kept: HashSet<&str> = items.iter().map(|item| item.value.as_str()).collect();
        for dropped in current
            .lists
            .items(list_key)
            .iter()
            .filter(|item| !kept.contains(item.value.as_str()))
        {
            self.ensure_unreferenced(establishment_id, list_key, &dropped.value)
                .await?;
        }

        let mutation = Mutation::new(
            AuditAction::ReplaceList,
            Some(list_key),
            json!({ "count": items.len() }),
        );
        self.store
            .commit(establishment_id, current.version, actor, mutation, |lists| {
                lists.replace_list(list_key, items)
            })
            .await
    }

    /// Add the standard lists the establishment does not have yet.
    ///
    /// Existing lists are left alone; nothing is committed when all are present.
    pub async fn seed_defaults(
        &self,
        establishment_id: &str,
        actor: &Actor,
    ) -> Result<ReferenceListDocument> {
        let current = self.store.get(establishment_id).await?;
        let missing: Vec<(String, Vec<ListItem>)> = defaults::default_lists()
            .into_iter()
            .filter(|(key, _)| !current.lists.contains_list(key))
            .collect();

        if missing.is_empty() {
            return Ok(current);
        }

        let seeded: Vec<&str> = missing.iter().map(|(key, _)| key.as_str()).collect();
        let mutation = Mutation::new(AuditAction::SeedDefaults, None, json!({ "lists": seeded }));
        self.store
            .commit(establishment_id, current.version, actor, mutation, |lists| {
                for (key, items) in missing {
                    lists.replace_list(&key, items)?;
                }
                Ok(())
            })
            .await
    }

    // ========================================================================
    // Cascading edits
    // ========================================================================

    /// Change display attributes of an item ("rename").
    ///
    /// Labels are resolved at read time, so records only change when a binding
    /// keeps a denormalized label copy (`label_field`).
    pub async fn update_item(
        &self,
        establishment_id: &str,
        list_key: &str,
        value: &str,
        changes: ItemChanges,
        actor: &Actor,
    ) -> Result<CascadeReport> {
        if changes.is_empty() {
            return Err(Error::Validation("No item changes given".to_string()));
        }

        let current = self.store.get(establishment_id).await?;
        let mut updated = current
            .lists
            .find(list_key, value)
            .cloned()
            .ok_or_else(|| Error::ItemNotFound {
                list_key: list_key.to_string(),
                value: value.to_string(),
            })?;
        let previous_label = updated.label.clone();
        updated.apply(&changes);
        updated.validate()?;
        let label_changed = updated.label != previous_label;

        let label = updated.label.clone();
        let label_bindings: Vec<&RecordBinding> = self
            .bindings_for(list_key)
            .filter(|b| b.label_field.is_some())
            .collect();

        let (matched, outcome) = if label_changed && !label_bindings.is_empty() {
            let matches = self
                .collect_matches(establishment_id, label_bindings.into_iter(), value)
                .await?;
            let writes = plan_writes(&matches, |binding, data| match &binding.label_field {
                Some(field) => rewrite::set_label(data, field, &label),
                None => false,
            });
            let matched = distinct_records(&matches);
            (matched, self.write_batches(establishment_id, writes, actor).await)
        } else {
            (0, BatchOutcome::default())
        };

        let mutation = Mutation::new(
            AuditAction::UpdateItem,
            Some(list_key),
            json!({ "value": value, "changes": changes }),
        );
        let list_commit = self
            .commit_list(establishment_id, current.version, actor, mutation, |lists| {
                let item = lists.require_mut(list_key, value)?;
                item.apply(&changes);
                item.validate()?;
                Ok(())
            })
            .await;

        Ok(self.finish(establishment_id, list_key, matched, outcome, list_commit))
    }

    /// Change an item's value and rewrite every record that stores the old one.
    ///
    /// Re-running a finished re-key (old value gone, new value present) is not an error:
    /// it rewrites any stragglers and leaves the list untouched.
    pub async fn rekey_item(
        &self,
        establishment_id: &str,
        list_key: &str,
        old_value: &str,
        new_value: &str,
        actor: &Actor,
    ) -> Result<CascadeReport> {
        if old_value == new_value {
            return Err(Error::Validation(format!(
                "Re-key of '{}' in '{}' to the same value",
                old_value, list_key
            )));
        }

        // 1. validate
        let current = self.store.get(establishment_id).await?;
        let already_rekeyed = current.lists.find(list_key, old_value).is_none()
            && current.lists.find(list_key, new_value).is_some();
        if !already_rekeyed {
            let mut probe = current.lists.clone();
            probe.rekey_item(list_key, old_value, new_value)?;
        }
        let label = current
            .lists
            .find(list_key, if already_rekeyed { new_value } else { old_value })
            .map(|item| item.label.clone())
            .unwrap_or_else(|| new_value.to_string());

        // 2. query
        let matches = self
            .collect_matches(establishment_id, self.bindings_for(list_key), old_value)
            .await?;
        let matched = distinct_records(&matches);

        tracing::info!(
            establishment_id = establishment_id,
            list_key = list_key,
            old_value = old_value,
            new_value = new_value,
            matched = matched,
            "Starting re-key cascade"
        );

        // 3. batch-write
        let writes = plan_writes(&matches, |binding, data| {
            let mut changed =
                rewrite::replace_value(data, &binding.field, old_value, new_value, binding.multi);
            if let Some(field) = &binding.label_field {
                changed |= rewrite::set_label(data, field, &label);
            }
            changed
        });
        let outcome = self.write_batches(establishment_id, writes, actor).await;

        // 4. commit, even when batches failed
        let list_commit = if already_rekeyed {
            ListCommit::Unchanged
        } else {
            let mutation = Mutation::new(
                AuditAction::RekeyItem,
                Some(list_key),
                json!({ "from": old_value, "to": new_value, "matched": matched }),
            );
            self.commit_list(establishment_id, current.version, actor, mutation, |lists| {
                lists.rekey_item(list_key, old_value, new_value)
            })
            .await
        };

        Ok(self.finish(establishment_id, list_key, matched, outcome, list_commit))
    }

    /// Remove an item from its list.
    ///
    /// With [`DeletePolicy::Refuse`] the delete fails with `ReferentialBlock` while records
    /// still reference the value. With [`DeletePolicy::ReassignTo`] references are rewritten
    /// first; if any batch fails the item is kept (`ListCommit::Skipped`).
    pub async fn delete_item(
        &self,
        establishment_id: &str,
        list_key: &str,
        value: &str,
        policy: DeletePolicy,
        actor: &Actor,
    ) -> Result<CascadeReport> {
        let current = self.store.get(establishment_id).await?;
        if current.lists.find(list_key, value).is_none() {
            return Err(Error::ItemNotFound {
                list_key: list_key.to_string(),
                value: value.to_string(),
            });
        }

        let delete_mutation = |target: Option<&str>| {
            Mutation::new(
                AuditAction::DeleteItem,
                Some(list_key),
                json!({ "value": value, "reassignedTo": target }),
            )
        };

        let target = match policy {
            DeletePolicy::Refuse => {
                self.ensure_unreferenced(establishment_id, list_key, value)
                    .await?;
                let list_commit = self
                    .commit_list(
                        establishment_id,
                        current.version,
                        actor,
                        delete_mutation(None),
                        |lists| lists.remove_item(list_key, value).map(|_| ()),
                    )
                    .await;
                return Ok(CascadeReport::list_only(
                    establishment_id,
                    list_key,
                    list_commit,
                ));
            }
            DeletePolicy::ReassignTo(target) => target,
        };

        if target == value {
            return Err(Error::Validation(format!(
                "Cannot reassign '{}' to itself",
                value
            )));
        }
        let target_label = current
            .lists
            .find(list_key, &target)
            .map(|item| item.label.clone())
            .ok_or_else(|| Error::ItemNotFound {
                list_key: list_key.to_string(),
                value: target.clone(),
            })?;

        let matches = self
            .collect_matches(establishment_id, self.bindings_for(list_key), value)
            .await?;
        let matched = distinct_records(&matches);
        let writes = plan_writes(&matches, |binding, data| {
            let mut changed =
                rewrite::replace_value(data, &binding.field, value, &target, binding.multi);
            if let Some(field) = &binding.label_field {
                changed |= rewrite::set_label(data, field, &target_label);
            }
            changed
        });
        let outcome = self.write_batches(establishment_id, writes, actor).await;

        let list_commit = if !outcome.failed.is_empty() {
            tracing::warn!(
                establishment_id = establishment_id,
                list_key = list_key,
                value = value,
                failed_batches = outcome.failed.len(),
                "Keeping item: some references could not be reassigned"
            );
            ListCommit::Skipped
        } else {
            // Records created since the query would be left dangling.
            match self
                .ensure_unreferenced(establishment_id, list_key, value)
                .await
            {
                Ok(()) => {
                    self.commit_list(
                        establishment_id,
                        current.version,
                        actor,
                        delete_mutation(Some(&target)),
                        |lists| {
                            if lists.find(list_key, &target).is_none() {
                                return Err(Error::ItemNotFound {
                                    list_key: list_key.to_string(),
                                    value: target.clone(),
                                });
                            }
                            lists.remove_item(list_key, value).map(|_| ())
                        },
                    )
                    .await
                }
                Err(e) => {
                    tracing::warn!(
                        establishment_id = establishment_id,
                        list_key = list_key,
                        value = value,
                        "Keeping item: {}",
                        e
                    );
                    ListCommit::Skipped
                }
            }
        };

        Ok(self.finish(establishment_id, list_key, matched, outcome, list_commit))
    }

    /// Records bound to `list_key` whose value is not an item of the list.
    pub async fn find_stray_references(
        &self,
        establishment_id: &str,
        list_key: &str,
    ) -> Result<Vec<StrayReference>> {
        let current = self.store.get(establishment_id).await?;
        let known: HashSet<&str> = current
            .lists
            .items(list_key)
            .iter()
            .map(|item| item.value.as_str())
            .collect();

        let mut strays = Vec::new();
        for binding in self.bindings_for(list_key) {
            let records = self
                .backend
                .list_records(establishment_id, &binding.record_type)
                .await?;
            for record in &records {
                for value in record.referenced_values(&binding.field, binding.multi) {
                    if !known.contains(value) {
                        strays.push(StrayReference {
                            record: record.reference(),
                            field: binding.field.clone(),
                            value: value.to_string(),
                        });
                    }
                }
            }
        }

        if !strays.is_empty() {
            tracing::info!(
                establishment_id = establishment_id,
                list_key = list_key,
                strays = strays.len(),
                "Stray references found"
            );
        }
        Ok(strays)
    }

    // ========================================================================
    // Internals
    // ========================================================================

    async fn collect_matches<'b>(
        &self,
        establishment_id: &str,
        bindings: impl Iterator<Item = &'b RecordBinding>,
        value: &str,
    ) -> Result<Vec<(&'b RecordBinding, DomainRecord)>> {
        let mut matches = Vec::new();
        for binding in bindings {
            let records = self
                .backend
                .query_records(
                    establishment_id,
                    &binding.record_type,
                    &binding.field,
                    value,
                    binding.multi,
                )
                .await?;
            matches.extend(records.into_iter().map(|record| (binding, record)));
        }
        Ok(matches)
    }

    async fn ensure_unreferenced(
        &self,
        establishment_id: &str,
        list_key: &str,
        value: &str,
    ) -> Result<()> {
        let matches = self
            .collect_matches(establishment_id, self.bindings_for(list_key), value)
            .await?;
        let referencing: Vec<RecordRef> = matches
            .iter()
            .map(|(_, record)| record.reference())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        if referencing.is_empty() {
            return Ok(());
        }
        Err(Error::ReferentialBlock {
            list_key: list_key.to_string(),
            value: value.to_string(),
            count: referencing.len(),
            sample: referencing.into_iter().take(BLOCK_SAMPLE_SIZE).collect(),
        })
    }

    /// Write planned record bodies in independent batches. Never fails as a whole.
    async fn write_batches(
        &self,
        establishment_id: &str,
        writes: Vec<(RecordRef, JsonValue)>,
        actor: &Actor,
    ) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        if writes.is_empty() {
            return outcome;
        }

        let total = writes.len();
        let batch_size = self.config.batch_size;
        let timeout = self.config.batch_timeout();

        for (index, chunk) in writes.chunks(batch_size).enumerate() {
            tracing::debug!(
                establishment_id = establishment_id,
                "Writing batch {}/{}",
                index + 1,
                total.div_ceil(batch_size)
            );
            outcome.batches += 1;

            let now = Utc::now();
            let batch: Vec<RecordWrite> = chunk
                .iter()
                .map(|(record, data)| {
                    let mut data = data.clone();
                    rewrite::stamp(&mut data, now, &actor.id);
                    RecordWrite {
                        record: record.clone(),
                        data,
                        updated_at: now,
                        updated_by: actor.id.clone(),
                    }
                })
                .collect();

            let result =
                match tokio::time::timeout(timeout, self.backend.write_records(establishment_id, &batch))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(Error::Timeout(timeout)),
                };

            match result {
                Ok(()) => outcome.updated += batch.len(),
                Err(e) => {
                    tracing::warn!(
                        establishment_id = establishment_id,
                        batch = index,
                        records = batch.len(),
                        "Cascade batch failed: {}",
                        e
                    );
                    outcome.failed.push(FailedBatch {
                        index,
                        records: batch.into_iter().map(|w| w.record).collect(),
                        error: e.to_string(),
                    });
                }
            }
        }

        outcome
    }

    async fn commit_list<F>(
        &self,
        establishment_id: &str,
        expected_version: u64,
        actor: &Actor,
        mutation: Mutation,
        mutator: F,
    ) -> ListCommit
    where
        F: FnOnce(&mut ReferenceLists) -> Result<()> + Send,
    {
        match self
            .store
            .commit(establishment_id, expected_version, actor, mutation, mutator)
            .await
        {
            Ok(document) => ListCommit::Committed {
                version: document.version,
            },
            Err(Error::VersionConflict { expected, actual }) => {
                tracing::warn!(
                    establishment_id = establishment_id,
                    expected = expected,
                    actual = actual,
                    "List commit lost to a concurrent edit"
                );
                ListCommit::Conflict { expected, actual }
            }
            Err(e) => {
                tracing::warn!(
                    establishment_id = establishment_id,
                    "List commit failed: {}",
                    e
                );
                ListCommit::Failed(e.to_string())
            }
        }
    }

    fn finish(
        &self,
        establishment_id: &str,
        list_key: &str,
        matched: usize,
        outcome: BatchOutcome,
        list_commit: ListCommit,
    ) -> CascadeReport {
        let report = CascadeReport {
            establishment_id: establishment_id.to_string(),
            list_key: list_key.to_string(),
            matched,
            updated: outcome.updated,
            batches: outcome.batches,
            failed_batches: outcome.failed,
            list_commit,
        };

        tracing::info!(
            establishment_id = establishment_id,
            list_key = list_key,
            matched = report.matched,
            updated = report.updated,
            batches = report.batches,
            failed_batches = report.failed_batches.len(),
            success = report.is_success(),
            "Cascade finished"
        );
        report
    }
}

fn distinct_records(matches: &[(&RecordBinding, DomainRecord)]) -> usize {
    matches
        .iter()
        .map(|(_, record)| record.reference())
        .collect::<HashSet<_>>()
        .len()
}

/// Apply `edit` for every (binding, record) match, merging edits to the same record.
/// Records left unchanged are not written.
fn plan_writes<F>(
    matches: &[(&RecordBinding, DomainRecord)],
    mut edit: F,
) -> Vec<(RecordRef, JsonValue)>
where
    F: FnMut(&RecordBinding, &mut JsonValue) -> bool,
{
    let mut planned: BTreeMap<RecordRef, (JsonValue, bool)> = BTreeMap::new();
    for (binding, record) in matches {
        let entry = planned
            .entry(record.reference())
            .or_insert_with(|| (record.data.clone(), false));
        if edit(binding, &mut entry.0) {
            entry.1 = true;
        }
    }
    planned
        .into_iter()
        .filter(|(_, (_, changed))| *changed)
        .map(|(record, (data, _))| (record, data))
        .collect()
}
