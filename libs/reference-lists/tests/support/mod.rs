//! Shared fixtures for reference list integration tests.

use async_trait::async_trait;
use gestihotel_reference_lists::{
    Actor, AuditAction, AuditEntry, DocumentStore, DomainRecord, InMemoryDocumentStore,
    ListItem, RecordRef, RecordWrite, ReferenceListDocument, ReferenceListSystem,
    ReferenceListsConfig, Result,
};
use serde_json::{json, Value as JsonValue};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;

pub const HOTEL: &str = "hotel-paris";

// ============================================================================
// Fault injection
// ============================================================================

/// In-memory store that can fail or stall chosen batch writes, simulate a
/// concurrent list edit right before the next compare-and-swap, and hold a
/// document read between loading and returning it.
#[derive(Default)]
pub struct FaultyStore {
    inner: InMemoryDocumentStore,
    write_calls: AtomicUsize,
    failing: Mutex<HashSet<usize>>,
    stalling: Mutex<HashMap<usize, Duration>>,
    bump_before_replace: AtomicBool,
    load_pause: Mutex<Option<LoadPause>>,
}

struct LoadPause {
    loaded: oneshot::Sender<()>,
    release: oneshot::Receiver<()>,
}

impl FaultyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the `n`-th (zero-based) call to `write_records` from now on.
    pub fn fail_batch(&self, n: usize) {
        let at = self.write_calls.load(Ordering::SeqCst) + n;
        self.failing.lock().unwrap().insert(at);
    }

    /// Delay the `n`-th call to `write_records` before it touches anything.
    pub fn stall_batch(&self, n: usize, delay: Duration) {
        let at = self.write_calls.load(Ordering::SeqCst) + n;
        self.stalling.lock().unwrap().insert(at, delay);
    }

    /// Let another actor commit just before the next list replacement.
    pub fn bump_version_before_next_replace(&self) {
        self.bump_before_replace.store(true, Ordering::SeqCst);
    }

    /// Hold the next `load_reference_lists` call after it has read the document.
    ///
    /// The first receiver fires once the read happened; sending on the returned
    /// sender lets the call return what it read.
    pub fn pause_next_load(&self) -> (oneshot::Receiver<()>, oneshot::Sender<()>) {
        let (loaded_tx, loaded_rx) = oneshot::channel();
        let (release_tx, release_rx) = oneshot::channel();
        *self.load_pause.lock().unwrap() = Some(LoadPause {
            loaded: loaded_tx,
            release: release_rx,
        });
        (loaded_rx, release_tx)
    }

    pub fn write_calls(&self) -> usize {
        self.write_calls.load(Ordering::SeqCst)
    }

    async fn concurrent_edit(&self, establishment_id: &str) -> Result<()> {
        if let Some(current) = self.inner.load_reference_lists(establishment_id).await? {
            let other = Actor::new("other-admin");
            let next = current.next_version(current.lists.clone(), &other);
            let audit = AuditEntry::new(
                establishment_id,
                next.version,
                &other,
                AuditAction::ReorderItems,
                None,
                json!({}),
            );
            self.inner
                .replace_reference_lists(&next, current.version, &audit)
                .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for FaultyStore {
    async fn load_reference_lists(
        &self,
        establishment_id: &str,
    ) -> Result<Option<ReferenceListDocument>> {
        let document = self.inner.load_reference_lists(establishment_id).await?;
        let pause = self.load_pause.lock().unwrap().take();
        if let Some(pause) = pause {
            let _ = pause.loaded.send(());
            let _ = pause.release.await;
        }
        Ok(document)
    }

    async fn insert_reference_lists(
        &self,
        document: &ReferenceListDocument,
        audit: &AuditEntry,
    ) -> Result<()> {
        self.inner.insert_reference_lists(document, audit).await
    }

    async fn replace_reference_lists(
        &self,
        document: &ReferenceListDocument,
        expected_version: u64,
        audit: &AuditEntry,
    ) -> Result<()> {
        if self.bump_before_replace.swap(false, Ordering::SeqCst) {
            self.concurrent_edit(&document.establishment_id).await?;
        }
        self.inner
            .replace_reference_lists(document, expected_version, audit)
            .await
    }

    async fn audit_trail(&self, establishment_id: &str, limit: usize) -> Result<Vec<AuditEntry>> {
        self.inner.audit_trail(establishment_id, limit).await
    }

    async fn query_records(
        &self,
        establishment_id: &str,
        record_type: &str,
        field: &str,
        value: &str,
        multi: bool,
    ) -> Result<Vec<DomainRecord>> {
        self.inner
            .query_records(establishment_id, record_type, field, value, multi)
            .await
    }

    async fn list_records(
        &self,
        establishment_id: &str,
        record_type: &str,
    ) -> Result<Vec<DomainRecord>> {
        self.inner.list_records(establishment_id, record_type).await
    }

    async fn get_record(
        &self,
        establishment_id: &str,
        record: &RecordRef,
    ) -> Result<Option<DomainRecord>> {
        self.inner.get_record(establishment_id, record).await
    }

    async fn put_record(&self, record: &DomainRecord) -> Result<()> {
        self.inner.put_record(record).await
    }

    async fn write_records(&self, establishment_id: &str, batch: &[RecordWrite]) -> Result<()> {
        let call = self.write_calls.fetch_add(1, Ordering::SeqCst);

        let delay = self.stalling.lock().unwrap().remove(&call);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.lock().unwrap().remove(&call) {
            return Err(gestihotel_reference_lists::Error::Storage(format!(
                "injected failure on batch call {}",
                call
            )));
        }
        self.inner.write_records(establishment_id, batch).await
    }
}

// ============================================================================
// Test system
// ============================================================================

pub struct TestSystem {
    pub backend: Arc<FaultyStore>,
    pub system: ReferenceListSystem,
    pub admin: Actor,
}

impl TestSystem {
    /// Default configuration, `HOTEL` initialized with an `interventionTypes` list
    /// holding `urgent` and `normal`.
    pub async fn new() -> anyhow::Result<Self> {
        Self::with_config(|_| {}).await
    }

    pub async fn with_config(
        configure: impl FnOnce(&mut ReferenceListsConfig),
    ) -> anyhow::Result<Self> {
        let mut config = ReferenceListsConfig::default();
        configure(&mut config);

        let backend = Arc::new(FaultyStore::new());
        let system = ReferenceListSystem::new(backend.clone(), config);
        let admin = Actor::new("admin-1").with_display_name("Front office admin");

        system.store.initialize(HOTEL, &admin).await?;
        system
            .cascade
            .add_item(
                HOTEL,
                "interventionTypes",
                ListItem::new("urgent", "Urgent").with_color("#f44336"),
                None,
                &admin,
            )
            .await?;
        system
            .cascade
            .add_item(
                HOTEL,
                "interventionTypes",
                ListItem::new("normal", "Normal"),
                None,
                &admin,
            )
            .await?;

        Ok(Self {
            backend,
            system,
            admin,
        })
    }

    pub async fn version(&self) -> anyhow::Result<u64> {
        Ok(self.system.store.get(HOTEL).await?.version)
    }

    /// Insert `count` interventions of the given type; ids are zero-padded so id order
    /// matches creation order.
    pub async fn seed_interventions(
        &self,
        prefix: &str,
        count: usize,
        intervention_type: &str,
    ) -> anyhow::Result<Vec<RecordRef>> {
        let mut refs = Vec::with_capacity(count);
        for n in 0..count {
            let id = format!("{}-{:04}", prefix, n);
            let record = DomainRecord::new(
                HOTEL,
                "interventions",
                id.clone(),
                json!({
                    "title": format!("Intervention {}", n),
                    "type": intervention_type,
                    "status": "todo",
                }),
            );
            self.backend.put_record(&record).await?;
            refs.push(RecordRef::new("interventions", id));
        }
        Ok(refs)
    }

    pub async fn put(&self, record_type: &str, id: &str, data: JsonValue) -> anyhow::Result<()> {
        self.backend
            .put_record(&DomainRecord::new(HOTEL, record_type, id, data))
            .await?;
        Ok(())
    }

    pub async fn field(
        &self,
        record_type: &str,
        id: &str,
        field: &str,
    ) -> anyhow::Result<Option<JsonValue>> {
        let record = self
            .backend
            .get_record(HOTEL, &RecordRef::new(record_type, id))
            .await?;
        Ok(record.and_then(|r| r.data.get(field).cloned()))
    }

    pub async fn count_type(&self, intervention_type: &str) -> anyhow::Result<usize> {
        Ok(self
            .backend
            .query_records(HOTEL, "interventions", "type", intervention_type, false)
            .await?
            .len())
    }
}
