//! PostgreSQL-backed `DocumentStore` implementation

use super::{DocumentStore, RecordWrite};
use crate::{
    models::{AuditAction, AuditEntry, DomainRecord, RecordRef, ReferenceListDocument},
    Error, Result,
};
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use sqlx::{postgres::PgRow, PgPool, Row};

/// PostgreSQL-backed DocumentStore implementation
#[derive(Clone)]
pub struct PostgresDocumentStore {
    pub(crate) pool: PgPool,
}

impl PostgresDocumentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run embedded migrations (idempotent).
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::migrate::MigrateError::Execute(db_err) => Error::Database(db_err),
                other => Error::Internal(format!("Migration failed: {}", other)),
            })
    }

    async fn current_version(&self, establishment_id: &str) -> Result<Option<u64>> {
        let row = sqlx::query("SELECT version FROM reference_lists WHERE establishment_id = $1")
            .bind(establishment_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        row.map(|r| from_db_version(r.get("version"))).transpose()
    }

    fn document_from_row(row: &PgRow) -> Result<ReferenceListDocument> {
        let lists: JsonValue = row.get("lists");
        Ok(ReferenceListDocument {
            establishment_id: row.get("establishment_id"),
            version: from_db_version(row.get("version"))?,
            last_modified: row.get("last_modified"),
            modified_by: row.get("modified_by"),
            lists: serde_json::from_value(lists)?,
        })
    }

    fn audit_from_row(row: &PgRow) -> Result<AuditEntry> {
        let action: String = row.get("action");
        Ok(AuditEntry {
            id: row.get("id"),
            establishment_id: row.get("establishment_id"),
            version: from_db_version(row.get("version"))?,
            actor: row.get("actor"),
            action: AuditAction::from_str(&action)
                .ok_or_else(|| Error::Internal(format!("Unknown audit action '{}'", action)))?,
            list_key: row.get("list_key"),
            details: row.get("details"),
            recorded_at: row.get("recorded_at"),
        })
    }

    fn record_from_row(row: &PgRow) -> DomainRecord {
        DomainRecord {
            establishment_id: row.get("establishment_id"),
            record_type: row.get("record_type"),
            id: row.get("id"),
            data: row.get("data"),
            updated_at: row.get("updated_at"),
            updated_by: row.get("updated_by"),
        }
    }

    async fn insert_audit<'e, E>(executor: E, audit: &AuditEntry) -> Result<()>
    where
        E: sqlx::Executor<'e, Database = sqlx::Postgres>,
    {
        sqlx::query(
            "INSERT INTO reference_list_audit
                 (id, establishment_id, version, actor, action, list_key, details, recorded_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(audit.id)
        .bind(&audit.establishment_id)
        .bind(to_db_version(audit.version)?)
        .bind(&audit.actor)
        .bind(audit.action.as_str())
        .bind(&audit.list_key)
        .bind(&audit.details)
        .bind(audit.recorded_at)
        .execute(executor)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }
}

fn to_db_version(version: u64) -> Result<i64> {
    i64::try_from(version)
        .map_err(|_| Error::Internal(format!("Version {} exceeds storage range", version)))
}

/// `LIMIT` bound; anything past `i64::MAX` means no limit.
fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

fn from_db_version(version: i64) -> Result<u64> {
    u64::try_from(version)
        .map_err(|_| Error::Internal(format!("Negative stored version {}", version)))
}

const RECORD_COLUMNS: &str = "establishment_id, record_type, id, data, updated_at, updated_by";

#[async_trait]
impl DocumentStore for PostgresDocumentStore {
    async fn load_reference_lists(
        &self,
        establishment_id: &str,
    ) -> Result<Option<ReferenceListDocument>> {
        let row = sqlx::query(
            "SELECT establishment_id, version, last_modified, modified_by, lists
             FROM reference_lists
             WHERE establishment_id = $1",
        )
        .bind(establishment_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.as_ref().map(Self::document_from_row).transpose()
    }

    async fn insert_reference_lists(
        &self,
        document: &ReferenceListDocument,
        audit: &AuditEntry,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let inserted = sqlx::query(
            "INSERT INTO reference_lists (establishment_id, version, last_modified, modified_by, lists)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (establishment_id) DO NOTHING",
        )
        .bind(&document.establishment_id)
        .bind(to_db_version(document.version)?)
        .bind(document.last_modified)
        .bind(&document.modified_by)
        .bind(serde_json::to_value(&document.lists)?)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?
        .rows_affected();

        if inserted == 0 {
            return Err(Error::AlreadyExists {
                establishment_id: document.establishment_id.clone(),
            });
        }

        Self::insert_audit(&mut *tx, audit).await?;
        tx.commit().await.map_err(Error::Database)?;
        Ok(())
    }

    async fn replace_reference_lists(
        &self,
        document: &ReferenceListDocument,
        expected_version: u64,
        audit: &AuditEntry,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        // Compare-and-swap on the version column.
        let updated = sqlx::query(
            "UPDATE reference_lists
             SET version = $2, last_modified = $3, modified_by = $4, lists = $5
             WHERE establishment_id = $1 AND version = $6",
        )
        .bind(&document.establishment_id)
        .bind(to_db_version(document.version)?)
        .bind(document.last_modified)
        .bind(&document.modified_by)
        .bind(serde_json::to_value(&document.lists)?)
        .bind(to_db_version(expected_version)?)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?
        .rows_affected();

        if updated == 0 {
            drop(tx);
            return match self.current_version(&document.establishment_id).await? {
                Some(actual) => Err(Error::VersionConflict {
                    expected: expected_version,
                    actual,
                }),
                None => Err(Error::NotFound {
                    establishment_id: document.establishment_id.clone(),
                }),
            };
        }

        Self::insert_audit(&mut *tx, audit).await?;
        tx.commit().await.map_err(Error::Database)?;
        Ok(())
    }

    async fn audit_trail(&self, establishment_id: &str, limit: usize) -> Result<Vec<AuditEntry>> {
        let rows = sqlx::query(
            "SELECT id, establishment_id, version, actor, action, list_key, details, recorded_at
             FROM reference_list_audit
             WHERE establishment_id = $1
             ORDER BY recorded_at DESC, version DESC
             LIMIT $2",
        )
        .bind(establishment_id)
        .bind(sql_limit(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.iter().map(Self::audit_from_row).collect()
    }

    async fn query_records(
        &self,
        establishment_id: &str,
        record_type: &str,
        field: &str,
        value: &str,
        multi: bool,
    ) -> Result<Vec<DomainRecord>> {
        // Note: the filter shape is chosen from a boolean, `field` and `value` are bound.
        let filter = if multi {
            "jsonb_typeof(data -> $3) = 'array' AND data -> $3 @> jsonb_build_array($4::text)"
        } else {
            "jsonb_typeof(data -> $3) = 'string' AND data ->> $3 = $4"
        };
        let sql = format!(
            "SELECT {RECORD_COLUMNS}
             FROM domain_records
             WHERE establishment_id = $1 AND record_type = $2 AND {filter}
             ORDER BY id ASC"
        );

        let rows = sqlx::query(&sql)
            .bind(establishment_id)
            .bind(record_type)
            .bind(field)
            .bind(value)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(rows.iter().map(Self::record_from_row).collect())
    }

    async fn list_records(
        &self,
        establishment_id: &str,
        record_type: &str,
    ) -> Result<Vec<DomainRecord>> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS}
             FROM domain_records
             WHERE establishment_id = $1 AND record_type = $2
             ORDER BY id ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(establishment_id)
            .bind(record_type)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(rows.iter().map(Self::record_from_row).collect())
    }

    async fn get_record(
        &self,
        establishment_id: &str,
        record: &RecordRef,
    ) -> Result<Option<DomainRecord>> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS}
             FROM domain_records
             WHERE establishment_id = $1 AND record_type = $2 AND id = $3"
        );
        let row = sqlx::query(&sql)
            .bind(establishment_id)
            .bind(&record.record_type)
            .bind(&record.id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(row.as_ref().map(Self::record_from_row))
    }

    async fn put_record(&self, record: &DomainRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO domain_records (establishment_id, record_type, id, data, updated_at, updated_by)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (establishment_id, record_type, id)
             DO UPDATE SET data = EXCLUDED.data,
                           updated_at = EXCLUDED.updated_at,
                           updated_by = EXCLUDED.updated_by",
        )
        .bind(&record.establishment_id)
        .bind(&record.record_type)
        .bind(&record.id)
        .bind(&record.data)
        .bind(record.updated_at)
        .bind(&record.updated_by)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn write_records(&self, establishment_id: &str, batch: &[RecordWrite]) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        for write in batch {
            let updated = sqlx::query(
                "UPDATE domain_records
                 SET data = $4, updated_at = $5, updated_by = $6
                 WHERE establishment_id = $1 AND record_type = $2 AND id = $3",
            )
            .bind(establishment_id)
            .bind(&write.record.record_type)
            .bind(&write.record.id)
            .bind(&write.data)
            .bind(write.updated_at)
            .bind(&write.updated_by)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?
            .rows_affected();

            // Dropping the transaction rolls back the writes already made in this batch.
            if updated == 0 {
                return Err(Error::Storage(format!(
                    "record {} no longer exists",
                    write.record
                )));
            }
        }

        tx.commit().await.map_err(Error::Database)?;
        Ok(())
    }
}
