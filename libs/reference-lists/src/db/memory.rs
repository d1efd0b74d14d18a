//! In-process `DocumentStore` implementation.
//!
//! Every operation holds the state lock for its whole duration, which gives the
//! same atomicity as a single-document transaction or a batched write.
//! Primary use-case: tests, examples and single-process deployments.

use super::{DocumentStore, RecordWrite};
use crate::{
    models::{AuditEntry, DomainRecord, RecordRef, ReferenceListDocument},
    Error, Result,
};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

type RecordKey = (String, String, String);

#[derive(Default)]
struct MemoryState {
    documents: HashMap<String, ReferenceListDocument>,
    audit: Vec<AuditEntry>,
    records: BTreeMap<RecordKey, DomainRecord>,
}

#[derive(Default)]
pub struct InMemoryDocumentStore {
    state: RwLock<MemoryState>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn record_key(establishment_id: &str, record: &RecordRef) -> RecordKey {
    (
        establishment_id.to_string(),
        record.record_type.clone(),
        record.id.clone(),
    )
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn load_reference_lists(
        &self,
        establishment_id: &str,
    ) -> Result<Option<ReferenceListDocument>> {
        Ok(self.state.read().await.documents.get(establishment_id).cloned())
    }

    async fn insert_reference_lists(
        &self,
        document: &ReferenceListDocument,
        audit: &AuditEntry,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        if state.documents.contains_key(&document.establishment_id) {
            return Err(Error::AlreadyExists {
                establishment_id: document.establishment_id.clone(),
            });
        }
        state
            .documents
            .insert(document.establishment_id.clone(), document.clone());
        state.audit.push(audit.clone());
        Ok(())
    }

    async fn replace_reference_lists(
        &self,
        document: &ReferenceListDocument,
        expected_version: u64,
        audit: &AuditEntry,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        let current = state
            .documents
            .get(&document.establishment_id)
            .ok_or_else(|| Error::NotFound {
                establishment_id: document.establishment_id.clone(),
            })?;

        if current.version != expected_version {
            return Err(Error::VersionConflict {
                expected: expected_version,
                actual: current.version,
            });
        }

        state
            .documents
            .insert(document.establishment_id.clone(), document.clone());
        state.audit.push(audit.clone());
        Ok(())
    }

    async fn audit_trail(&self, establishment_id: &str, limit: usize) -> Result<Vec<AuditEntry>> {
        let state = self.state.read().await;
        Ok(state
            .audit
            .iter()
            .rev()
            .filter(|entry| entry.establishment_id == establishment_id)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn query_records(
        &self,
        establishment_id: &str,
        record_type: &str,
        field: &str,
        value: &str,
        multi: bool,
    ) -> Result<Vec<DomainRecord>> {
        let state = self.state.read().await;
        Ok(state
            .records
            .values()
            .filter(|r| r.establishment_id == establishment_id && r.record_type == record_type)
            .filter(|r| r.references(field, value, multi))
            .cloned()
            .collect())
    }

    async fn list_records(
        &self,
        establishment_id: &str,
        record_type: &str,
    ) -> Result<Vec<DomainRecord>> {
        let state = self.state.read().await;
        Ok(state
            .records
            .values()
            .filter(|r| r.establishment_id == establishment_id && r.record_type == record_type)
            .cloned()
            .collect())
    }

    async fn get_record(
        &self,
        establishment_id: &str,
        record: &RecordRef,
    ) -> Result<Option<DomainRecord>> {
        let state = self.state.read().await;
        Ok(state.records.get(&record_key(establishment_id, record)).cloned())
    }

    async fn put_record(&self, record: &DomainRecord) -> Result<()> {
        let mut state = self.state.write().await;
        state.records.insert(
            record_key(&record.establishment_id, &record.reference()),
            record.clone(),
        );
        Ok(())
    }

    async fn write_records(&self, establishment_id: &str, batch: &[RecordWrite]) -> Result<()> {
        let mut state = self.state.write().await;

        // All-or-nothing: check every target before touching any of them.
        if let Some(missing) = batch
            .iter()
            .find(|w| !state.records.contains_key(&record_key(establishment_id, &w.record)))
        {
            return Err(Error::Storage(format!(
                "record {} no longer exists",
                missing.record
            )));
        }

        for write in batch {
            if let Some(record) = state
                .records
                .get_mut(&record_key(establishment_id, &write.record))
            {
                record.data = write.data.clone();
                record.updated_at = write.updated_at;
                record.updated_by = Some(write.updated_by.clone());
            }
        }
        Ok(())
    }
}
