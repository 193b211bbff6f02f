//! Store views: lazily synced, path-projected windows onto cache slots.
//!
//! A `RecordStore` never owns data. It remembers the last projection it read
//! from the cache together with the entry epoch it saw; reads re-project only
//! when the epoch moved (or the view never synced). Child stores are memoized
//! per parent in a bounded LRU table so that repeated derivations hand back
//! the *same* `Arc` — downstream code relies on pointer identity to share
//! subscriptions and skip redundant re-renders.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use folio_core::{get_path, Pointer, Role};
use lru::LruCache;
use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;

use crate::cache::{CacheKey, RecordCacheStore};

/// Memo-table key for a derived store: which record, which sub-path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ChildKey {
    pointer: Pointer,
    path: Vec<String>,
}

/// Last projection read from the cache.
struct SyncedView {
    /// Entry epoch at sync time; `None` when the entry was absent.
    epoch: Option<u64>,
    value: Option<Value>,
    role: Role,
}

/// A shared, path-projected view over one cached record.
///
/// Always handled as `Arc<RecordStore>`; the `Arc` *is* the identity that
/// memoization preserves.
pub struct RecordStore {
    pointer: Pointer,
    user_id: String,
    path: Vec<String>,
    cache: Arc<RecordCacheStore>,
    synced: Mutex<Option<SyncedView>>,
    children: Mutex<LruCache<ChildKey, Arc<RecordStore>>>,
}

impl RecordStore {
    /// A root view over a whole record.
    pub fn new(
        cache: Arc<RecordCacheStore>,
        pointer: Pointer,
        user_id: impl Into<String>,
    ) -> Arc<Self> {
        Self::with_path(cache, pointer, user_id, Vec::new())
    }

    /// A view projected through `path` inside the record.
    pub fn with_path(
        cache: Arc<RecordCacheStore>,
        pointer: Pointer,
        user_id: impl Into<String>,
        path: Vec<String>,
    ) -> Arc<Self> {
        let capacity = cache.config().child_store_capacity;
        Arc::new(Self {
            pointer,
            user_id: user_id.into(),
            path,
            cache,
            synced: Mutex::new(None),
            children: Mutex::new(LruCache::new(capacity)),
        })
    }

    pub fn pointer(&self) -> &Pointer {
        &self.pointer
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn path(&self) -> &[String] {
        &self.path
    }

    pub fn cache(&self) -> &Arc<RecordCacheStore> {
        &self.cache
    }

    pub fn key(&self) -> CacheKey {
        CacheKey::new(&self.pointer, &self.user_id)
    }

    /// Re-read the projection from the cache unconditionally.
    pub fn sync(&self) {
        let view = match self
            .cache
            .record_with_epoch(&self.pointer, &self.user_id, false)
        {
            Some((record, epoch)) => SyncedView {
                epoch: Some(epoch),
                value: get_path(&record.value, &self.path).cloned(),
                role: record.role,
            },
            None => SyncedView {
                epoch: None,
                value: None,
                role: Role::None,
            },
        };
        *lock(&self.synced) = Some(view);
    }

    /// The projected value. `None` covers both "not yet loaded" and "path
    /// does not resolve" — never an error.
    pub fn get_value(&self) -> Option<Value> {
        self.ensure_synced();
        lock(&self.synced).as_ref().and_then(|v| v.value.clone())
    }

    /// The viewer's role on the underlying record (`Role::None` until the
    /// record is loaded).
    pub fn get_role(&self) -> Role {
        self.ensure_synced();
        lock(&self.synced).as_ref().map(|v| v.role).unwrap_or_default()
    }

    /// Derive the memoized child store for `path + [name]`.
    ///
    /// Repeated calls with the same name return the identical `Arc`.
    pub fn property_store(&self, name: &str) -> Arc<RecordStore> {
        let mut path = self.path.clone();
        path.push(name.to_string());
        self.derive(self.pointer.clone(), path)
    }

    /// Derive the memoized store for another record (for example, a child
    /// block named in a content list), homed in this store's memo table.
    pub fn store_for(&self, pointer: Pointer) -> Arc<RecordStore> {
        self.derive(pointer, Vec::new())
    }

    /// Re-home this view under another parent's memo table, as happens when
    /// a record moves to a different list. Idempotent: if the parent already
    /// memoizes an equivalent view, that one is reused.
    pub fn clone_with_new_parent(self: &Arc<Self>, parent: &Arc<RecordStore>) -> Arc<RecordStore> {
        let key = ChildKey {
            pointer: self.pointer.clone(),
            path: self.path.clone(),
        };
        let mut children = lock(&parent.children);
        children.get_or_insert(key, || self.clone()).clone()
    }

    /// Resolve as soon as this view projects a non-null value.
    ///
    /// Returns immediately when a value is already cached; otherwise waits
    /// for the first change event on this view's key that reveals one. The
    /// subscription is taken before the first check (no missed-wakeup
    /// window) and dropped as soon as the future resolves.
    pub async fn await_non_null_value(&self) -> Value {
        let mut rx = self.cache.subscribe_changed();
        if let Some(value) = self.non_null_value() {
            return value;
        }
        let key = self.key();
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if event.key == key {
                        if let Some(value) = self.non_null_value() {
                            return value;
                        }
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    log::warn!("change bus lagged by {skipped} events, re-checking value");
                    if let Some(value) = self.non_null_value() {
                        return value;
                    }
                }
                Err(RecvError::Closed) => {
                    // The cache holds the sender for as long as this store
                    // exists; a closed bus means shutdown.
                    std::future::pending::<()>().await;
                }
            }
        }
    }

    fn non_null_value(&self) -> Option<Value> {
        match self.get_value() {
            Some(Value::Null) | None => None,
            some => some,
        }
    }

    fn ensure_synced(&self) {
        let current = self.cache.entry_epoch(&self.key());
        let stale = match lock(&self.synced).as_ref() {
            None => true,
            Some(view) => view.epoch != current,
        };
        if stale {
            self.sync();
        }
    }

    fn derive(&self, pointer: Pointer, path: Vec<String>) -> Arc<RecordStore> {
        let key = ChildKey {
            pointer: pointer.clone(),
            path: path.clone(),
        };
        let mut children = lock(&self.children);
        children
            .get_or_insert(key, || {
                RecordStore::with_path(self.cache.clone(), pointer, self.user_id.clone(), path)
            })
            .clone()
    }
}

fn lock<'a, T>(mutex: &'a Mutex<T>) -> MutexGuard<'a, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
