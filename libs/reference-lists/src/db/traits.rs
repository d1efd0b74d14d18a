//! Document store port.

use crate::{
    models::{AuditEntry, DomainRecord, RecordRef, ReferenceListDocument},
    Result,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;

/// Full replacement of one record's body, stamped for audit.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordWrite {
    pub record: RecordRef,
    pub data: JsonValue,
    pub updated_at: DateTime<Utc>,
    pub updated_by: String,
}

/// Persistence consumed by the reference list subsystem.
///
/// Implementations provide per-document optimistic versioning for the list
/// document, query-by-field over domain records, and bounded atomic batches.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Read an establishment's reference list document.
    async fn load_reference_lists(
        &self,
        establishment_id: &str,
    ) -> Result<Option<ReferenceListDocument>>;

    /// Create the document. Fails with `AlreadyExists` rather than overwriting.
    async fn insert_reference_lists(
        &self,
        document: &ReferenceListDocument,
        audit: &AuditEntry,
    ) -> Result<()>;

    /// Atomically replace the document if its stored version equals `expected_version`,
    /// recording `audit` in the same write.
    ///
    /// Fails with `VersionConflict` when the stored version moved on, `NotFound` when
    /// there is no document.
    async fn replace_reference_lists(
        &self,
        document: &ReferenceListDocument,
        expected_version: u64,
        audit: &AuditEntry,
    ) -> Result<()>;

    /// Audit entries of an establishment, newest first.
    async fn audit_trail(&self, establishment_id: &str, limit: usize) -> Result<Vec<AuditEntry>>;

    /// Records of `record_type` whose `field` equals `value`
    /// (or contains it, when `multi`), ordered by id.
    async fn query_records(
        &self,
        establishment_id: &str,
        record_type: &str,
        field: &str,
        value: &str,
        multi: bool,
    ) -> Result<Vec<DomainRecord>>;

    /// All records of a type, ordered by id.
    async fn list_records(
        &self,
        establishment_id: &str,
        record_type: &str,
    ) -> Result<Vec<DomainRecord>>;

    async fn get_record(
        &self,
        establishment_id: &str,
        record: &RecordRef,
    ) -> Result<Option<DomainRecord>>;

    /// Insert or replace a single record.
    async fn put_record(&self, record: &DomainRecord) -> Result<()>;

    /// Apply every write or none of them.
    async fn write_records(&self, establishment_id: &str, batch: &[RecordWrite]) -> Result<()>;
}
