//! # GestiHotel reference lists
//!
//! Administrator-editable taxonomies (intervention types, room statuses, skills, ...)
//! shared by every record of an establishment, and the machinery that keeps those
//! records consistent when a list entry changes.
//!
//! - `db/` - document store port and its in-memory / PostgreSQL backends
//! - `services/reference_lists` - versioned list document with optimistic concurrency
//! - `services/access` - cached reads and change subscriptions for consumers
//! - `services/cascade` - the single write path: list edits plus record rewrites
//! - `listener` - cross-process cache invalidation via PostgreSQL LISTEN/NOTIFY
//!
//! ## Usage
//!
//! ```rust,ignore
//! use gestihotel_reference_lists::{Actor, InMemoryDocumentStore, ReferenceListsConfig, ReferenceListSystem};
//!
//! let system = ReferenceListSystem::new(
//!     std::sync::Arc::new(InMemoryDocumentStore::new()),
//!     ReferenceListsConfig::default(),
//! );
//! let admin = Actor::new("admin-1");
//! system.store.initialize("hotel-paris", &admin).await?;
//! let report = system
//!     .cascade
//!     .rekey_item("hotel-paris", "interventionTypes", "urgent", "high", &admin)
//!     .await?;
//! ```

pub mod config;
pub mod db;
pub mod defaults;
pub mod error;
pub mod hooks;
pub mod listener;
pub mod models;
pub mod services;

pub use config::{CacheConfig, CascadeConfig, RecordBinding, ReferenceListsConfig};
pub use db::{DocumentStore, InMemoryDocumentStore, PostgresDocumentStore, RecordWrite};
pub use error::{Error, Result};
pub use hooks::ReferenceListHook;
pub use models::{
    Actor, AuditAction, AuditEntry, DomainRecord, ItemChanges, ListItem, RecordRef,
    ReferenceListDocument, ReferenceLists,
};
pub use services::{
    CascadeEngine, CascadeReport, DeletePolicy, FailedBatch, ListCommit, ListSnapshot, Mutation,
    ReferenceListAccess, ReferenceListStore, StrayReference, SubscriptionId,
};

use std::sync::Arc;

/// Fully wired subsystem: store, access layer and cascade engine sharing one backend.
///
/// The access layer is registered as a commit hook on the store so that every
/// in-process commit refreshes the cache before subscribers are notified.
#[derive(Clone)]
pub struct ReferenceListSystem {
    pub backend: Arc<dyn DocumentStore>,
    pub store: Arc<ReferenceListStore>,
    pub access: Arc<ReferenceListAccess>,
    pub cascade: Arc<CascadeEngine>,
}

impl ReferenceListSystem {
    pub fn new(backend: Arc<dyn DocumentStore>, config: ReferenceListsConfig) -> Self {
        let access = Arc::new(ReferenceListAccess::new(
            backend.clone(),
            config.cache.capacity,
        ));
        let store = Arc::new(
            ReferenceListStore::new(backend.clone())
                .with_hooks(vec![access.clone() as Arc<dyn ReferenceListHook>]),
        );
        let cascade = Arc::new(CascadeEngine::new(
            store.clone(),
            backend.clone(),
            config.bindings,
            config.cascade,
        ));

        Self {
            backend,
            store,
            access,
            cascade,
        }
    }
}
