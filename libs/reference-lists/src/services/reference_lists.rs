//! Reference list store - durable, versioned list documents
//!
//! One document per establishment. Every mutation goes through [`ReferenceListStore::commit`],
//! which checks the caller's expected version (optimistic concurrency), bumps the version by
//! exactly one, stamps the actor and records an audit entry in the same atomic write.

use crate::{
    db::DocumentStore,
    hooks::ReferenceListHook,
    models::{Actor, AuditAction, AuditEntry, ReferenceListDocument, ReferenceLists},
    Error, Result,
};
use serde_json::Value as JsonValue;
use std::sync::Arc;

/// Audit description of a mutation passed to [`ReferenceListStore::commit`].
#[derive(Debug, Clone)]
pub struct Mutation {
    pub action: AuditAction,
    pub list_key: Option<String>,
    pub details: JsonValue,
}

impl Mutation {
    pub fn new(action: AuditAction, list_key: Option<&str>, details: JsonValue) -> Self {
        Self {
            action,
            list_key: list_key.map(str::to_string),
            details,
        }
    }
}

pub struct ReferenceListStore {
    backend: Arc<dyn DocumentStore>,
    hooks: Vec<Arc<dyn ReferenceListHook>>,
}

impl ReferenceListStore {
    pub fn new(backend: Arc<dyn DocumentStore>) -> Self {
        Self {
            backend,
            hooks: Vec::new(),
        }
    }

    pub fn with_hooks(mut self, hooks: Vec<Arc<dyn ReferenceListHook>>) -> Self {
        self.hooks.extend(hooks);
        self
    }

    /// Read the current document (`NotFound` if the establishment was never initialized).
    pub async fn get(&self, establishment_id: &str) -> Result<ReferenceListDocument> {
        self.backend
            .load_reference_lists(establishment_id)
            .await?
            .ok_or_else(|| Error::NotFound {
                establishment_id: establishment_id.to_string(),
            })
    }

    /// Create an empty document at version 1.
    ///
    /// Fails with `AlreadyExists` instead of overwriting an existing document.
    pub async fn initialize(
        &self,
        establishment_id: &str,
        actor: &Actor,
    ) -> Result<ReferenceListDocument> {
        if establishment_id.trim().is_empty() {
            return Err(Error::Validation(
                "establishment id must not be empty".to_string(),
            ));
        }

        let document = ReferenceListDocument::new(establishment_id, actor);
        let audit = AuditEntry::new(
            establishment_id,
            document.version,
            actor,
            AuditAction::Initialize,
            None,
            JsonValue::Null,
        );
        self.backend.insert_reference_lists(&document, &audit).await?;

        tracing::info!(
            establishment_id = establishment_id,
            actor = %actor.id,
            "Reference lists initialized"
        );

        self.run_hooks(&document).await;
        Ok(document)
    }

    /// Apply `mutator` to the lists of the document at `expected_version`.
    ///
    /// - `VersionConflict` if the stored version differs (before or during the write)
    /// - mutator errors abort the commit with nothing written
    /// - on success the new document has `version == expected_version + 1`
    pub async fn commit<F>(
        &self,
        establishment_id: &str,
        expected_version: u64,
        actor: &Actor,
        mutation: Mutation,
        mutator: F,
    ) -> Result<ReferenceListDocument>
    where
        F: FnOnce(&mut ReferenceLists) -> Result<()> + Send,
    {
        let current = self.get(establishment_id).await?;
        if current.version != expected_version {
            return Err(Error::VersionConflict {
                expected: expected_version,
                actual: current.version,
            });
        }

        let mut lists = current.lists.clone();
        mutator(&mut lists)?;

        let next = current.next_version(lists, actor);
        let audit = AuditEntry::new(
            establishment_id,
            next.version,
            actor,
            mutation.action,
            mutation.list_key.as_deref(),
            mutation.details,
        );
        self.backend
            .replace_reference_lists(&next, expected_version, &audit)
            .await?;

        tracing::info!(
            establishment_id = establishment_id,
            version = next.version,
            action = %mutation.action,
            list_key = mutation.list_key.as_deref().unwrap_or("-"),
            actor = %actor.id,
            "Reference lists committed"
        );

        self.run_hooks(&next).await;
        Ok(next)
    }

    /// Audit entries of an establishment, newest first.
    pub async fn audit_trail(&self, establishment_id: &str, limit: usize) -> Result<Vec<AuditEntry>> {
        self.backend.audit_trail(establishment_id, limit).await
    }

    async fn run_hooks(&self, document: &ReferenceListDocument) {
        // The commit is durable at this point; hooks only maintain derived state.
        for hook in &self.hooks {
            if let Err(e) = hook.on_committed(document).await {
                tracing::warn!(
                    establishment_id = %document.establishment_id,
                    version = document.version,
                    "Reference list hook failed: {}",
                    e
                );
            }
        }
    }
}
