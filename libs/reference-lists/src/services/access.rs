//! Reference list access layer - cached reads and change subscriptions
//!
//! Consumers (pickers, badges) read lists through this layer and never write to the store.
//! Cached entries are stamped with the document version they were built from; an entry is
//! only ever replaced by an equal or newer version, and it is replaced *before* subscribers
//! are notified so no consumer can observe a cache older than its notification.
//!
//! The cache also remembers the newest version seen per establishment. A cache miss that
//! loaded an older document (a commit landed while it was reading) is never stored; the
//! read is retried instead.

use crate::{
    db::DocumentStore,
    hooks::ReferenceListHook,
    models::{ListItem, ReferenceListDocument},
    Error, Result,
};
use async_trait::async_trait;
use lru::LruCache;
use std::{
    collections::HashMap,
    fmt,
    num::NonZeroUsize,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
};

/// Handle returned by [`ReferenceListAccess::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// One list as of a given document version, in display order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListSnapshot {
    pub establishment_id: String,
    pub list_key: String,
    pub version: u64,
    pub items: Arc<Vec<ListItem>>,
}

type Callback = Arc<dyn Fn(&ListSnapshot) + Send + Sync>;
type CacheKey = (String, String);

/// Reloads attempted by a cache miss that keeps reading behind the newest known version.
const MISS_RELOAD_ATTEMPTS: usize = 3;

#[derive(Debug, Clone)]
struct CachedList {
    version: u64,
    items: Arc<Vec<ListItem>>,
}

struct ListCache {
    entries: LruCache<CacheKey, CachedList>,
    /// Newest document version seen per establishment.
    latest: HashMap<String, u64>,
}

impl ListCache {
    /// Record `version` as seen; returns false if a newer one is already known.
    fn observe(&mut self, establishment_id: &str, version: u64) -> bool {
        let latest = self
            .latest
            .entry(establishment_id.to_string())
            .or_insert(version);
        if version < *latest {
            return false;
        }
        *latest = version;
        true
    }
}

struct Subscriber {
    establishment_id: String,
    list_key: String,
    /// Highest version delivered so far; older or equal versions are dropped.
    last_delivered: u64,
    callback: Callback,
}

pub struct ReferenceListAccess {
    backend: Arc<dyn DocumentStore>,
    cache: Mutex<ListCache>,
    subscribers: Mutex<HashMap<SubscriptionId, Subscriber>>,
    next_subscription: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn cache_key(establishment_id: &str, list_key: &str) -> CacheKey {
    (establishment_id.to_string(), list_key.to_string())
}

impl ReferenceListAccess {
    pub fn new(backend: Arc<dyn DocumentStore>, cache_capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(cache_capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            backend,
            cache: Mutex::new(ListCache {
                entries: LruCache::new(capacity),
                latest: HashMap::new(),
            }),
            subscribers: Mutex::new(HashMap::new()),
            next_subscription: AtomicU64::new(1),
        }
    }

    /// A list in display order. Absent lists are empty; a missing document is `NotFound`.
    pub async fn get_list(&self, establishment_id: &str, list_key: &str) -> Result<Vec<ListItem>> {
        Ok(self
            .snapshot(establishment_id, list_key)
            .await?
            .items
            .to_vec())
    }

    /// Only the items selectable for new entries.
    pub async fn get_active_list(
        &self,
        establishment_id: &str,
        list_key: &str,
    ) -> Result<Vec<ListItem>> {
        let snapshot = self.snapshot(establishment_id, list_key).await?;
        Ok(snapshot
            .items
            .iter()
            .filter(|item| item.active)
            .cloned()
            .collect())
    }

    pub async fn find_item(
        &self,
        establishment_id: &str,
        list_key: &str,
        value: &str,
    ) -> Result<Option<ListItem>> {
        let snapshot = self.snapshot(establishment_id, list_key).await?;
        Ok(snapshot.items.iter().find(|item| item.value == value).cloned())
    }

    /// Resolve a stored value for display. Never fails: unknown values, missing lists or
    /// read errors all yield `fallback`.
    pub async fn get_item_by_value(
        &self,
        establishment_id: &str,
        list_key: &str,
        value: &str,
        fallback: ListItem,
    ) -> ListItem {
        match self.find_item(establishment_id, list_key, value).await {
            Ok(Some(item)) => item,
            Ok(None) | Err(Error::NotFound { .. }) => fallback,
            Err(e) => {
                tracing::warn!(
                    establishment_id = establishment_id,
                    list_key = list_key,
                    value = value,
                    "Falling back for reference value: {}",
                    e
                );
                fallback
            }
        }
    }

    /// Current snapshot of a list, served from cache when possible.
    pub async fn snapshot(&self, establishment_id: &str, list_key: &str) -> Result<ListSnapshot> {
        let key = cache_key(establishment_id, list_key);
        if let Some(hit) = lock(&self.cache).entries.get(&key).cloned() {
            tracing::debug!(
                establishment_id = establishment_id,
                list_key = list_key,
                version = hit.version,
                "Reference list cache hit"
            );
            return Ok(list_snapshot(establishment_id, list_key, hit));
        }

        tracing::debug!(
            establishment_id = establishment_id,
            list_key = list_key,
            "Reference list cache miss"
        );
        let mut attempt = 1;
        loop {
            let document = self
                .backend
                .load_reference_lists(establishment_id)
                .await?
                .ok_or_else(|| Error::NotFound {
                    establishment_id: establishment_id.to_string(),
                })?;

            let fresh = CachedList {
                version: document.version,
                items: Arc::new(document.lists.sorted(list_key)),
            };
            let served = {
                let mut guard = lock(&self.cache);
                let cache = &mut *guard;
                if !cache.observe(establishment_id, fresh.version) {
                    Err(fresh)
                } else {
                    match cache.entries.peek(&key) {
                        // A concurrent refresh already stored something newer.
                        Some(existing) if existing.version > fresh.version => {
                            Ok(existing.clone())
                        }
                        _ => {
                            cache.entries.put(key.clone(), fresh.clone());
                            Ok(fresh)
                        }
                    }
                }
            };

            match served {
                Ok(served) => return Ok(list_snapshot(establishment_id, list_key, served)),
                Err(behind) if attempt < MISS_RELOAD_ATTEMPTS => {
                    tracing::debug!(
                        establishment_id = establishment_id,
                        list_key = list_key,
                        version = behind.version,
                        attempt = attempt,
                        "Loaded list is behind the newest known version, reloading"
                    );
                    attempt += 1;
                }
                Err(behind) => {
                    tracing::warn!(
                        establishment_id = establishment_id,
                        list_key = list_key,
                        version = behind.version,
                        "Store keeps returning an outdated document; serving it uncached"
                    );
                    return Ok(list_snapshot(establishment_id, list_key, behind));
                }
            }
        }
    }

    /// Version of the cached entry, if any (does not touch LRU order).
    pub fn cached_version(&self, establishment_id: &str, list_key: &str) -> Option<u64> {
        lock(&self.cache)
            .entries
            .peek(&cache_key(establishment_id, list_key))
            .map(|entry| entry.version)
    }

    /// Drop every cached list of an establishment, and its newest known version.
    pub fn invalidate(&self, establishment_id: &str) {
        let mut cache = lock(&self.cache);
        cache.latest.remove(establishment_id);
        let keys: Vec<CacheKey> = cache
            .entries
            .iter()
            .filter(|(key, _)| key.0 == establishment_id)
            .map(|(key, _)| key.clone())
            .collect();
        for key in keys {
            cache.entries.pop(&key);
        }
    }

    /// Register `callback` for changes of one list.
    ///
    /// The current state is delivered right away when the document exists; afterwards the
    /// callback runs whenever the document version advances. Rapid successive versions may
    /// be coalesced, but the latest one is always delivered.
    pub async fn subscribe<F>(
        &self,
        establishment_id: &str,
        list_key: &str,
        callback: F,
    ) -> Result<SubscriptionId>
    where
        F: Fn(&ListSnapshot) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        lock(&self.subscribers).insert(
            id,
            Subscriber {
                establishment_id: establishment_id.to_string(),
                list_key: list_key.to_string(),
                last_delivered: 0,
                callback: Arc::new(callback),
            },
        );

        match self.snapshot(establishment_id, list_key).await {
            Ok(snapshot) => self.deliver(id, snapshot),
            Err(Error::NotFound { .. }) => {}
            Err(e) => {
                self.unsubscribe(id);
                return Err(e);
            }
        }

        tracing::debug!(
            establishment_id = establishment_id,
            list_key = list_key,
            subscription = %id,
            "Reference list subscription registered"
        );
        Ok(id)
    }

    /// Returns false if the handle was unknown (already unsubscribed).
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        lock(&self.subscribers).remove(&id).is_some()
    }

    pub fn subscription_count(&self) -> usize {
        lock(&self.subscribers).len()
    }

    /// Whether anything held for this establishment is older than `version`.
    pub fn needs_refresh(&self, establishment_id: &str, version: u64) -> bool {
        let cache_stale = {
            let cache = lock(&self.cache);
            cache
                .latest
                .get(establishment_id)
                .is_some_and(|latest| *latest < version)
                || cache
                    .entries
                    .iter()
                    .any(|(key, entry)| key.0 == establishment_id && entry.version < version)
        };
        cache_stale
            || lock(&self.subscribers).values().any(|sub| {
                sub.establishment_id == establishment_id && sub.last_delivered < version
            })
    }

    /// Re-read the document from the store and propagate it (used for changes committed
    /// by other processes).
    pub async fn refresh(&self, establishment_id: &str) -> Result<()> {
        match self.backend.load_reference_lists(establishment_id).await? {
            Some(document) => self.apply_document(&document),
            None => self.invalidate(establishment_id),
        }
        Ok(())
    }

    /// Replace cached entries with `document`, then notify subscribers that have not yet
    /// seen this version.
    pub fn apply_document(&self, document: &ReferenceListDocument) {
        let establishment_id = document.establishment_id.as_str();

        {
            let mut cache = lock(&self.cache);
            cache.observe(establishment_id, document.version);
            let stale: Vec<CacheKey> = cache
                .entries
                .iter()
                .filter(|(key, entry)| {
                    key.0 == establishment_id && entry.version < document.version
                })
                .map(|(key, _)| key.clone())
                .collect();
            for key in stale {
                let items = Arc::new(document.lists.sorted(&key.1));
                cache.entries.put(
                    key,
                    CachedList {
                        version: document.version,
                        items,
                    },
                );
            }
        }

        let deliveries: Vec<(Callback, ListSnapshot)> = {
            let mut subscribers = lock(&self.subscribers);
            subscribers
                .values_mut()
                .filter(|sub| {
                    sub.establishment_id == establishment_id
                        && sub.last_delivered < document.version
                })
                .map(|sub| {
                    sub.last_delivered = document.version;
                    let snapshot = ListSnapshot {
                        establishment_id: establishment_id.to_string(),
                        list_key: sub.list_key.clone(),
                        version: document.version,
                        items: Arc::new(document.lists.sorted(&sub.list_key)),
                    };
                    (sub.callback.clone(), snapshot)
                })
                .collect()
        };

        for (callback, snapshot) in deliveries {
            callback(&snapshot);
        }
    }

    fn deliver(&self, id: SubscriptionId, snapshot: ListSnapshot) {
        let callback = {
            let mut subscribers = lock(&self.subscribers);
            match subscribers.get_mut(&id) {
                Some(sub) if sub.last_delivered < snapshot.version => {
                    sub.last_delivered = snapshot.version;
                    Some(sub.callback.clone())
                }
                _ => None,
            }
        };
        if let Some(callback) = callback {
            callback(&snapshot);
        }
    }
}

fn list_snapshot(establishment_id: &str, list_key: &str, cached: CachedList) -> ListSnapshot {
    ListSnapshot {
        establishment_id: establishment_id.to_string(),
        list_key: list_key.to_string(),
        version: cached.version,
        items: cached.items,
    }
}

#[async_trait]
impl ReferenceListHook for ReferenceListAccess {
    async fn on_committed(&self, document: &ReferenceListDocument) -> Result<()> {
        self.apply_document(document);
        Ok(())
    }
}
