//! Process-wide record cache: the single authoritative home of every
//! `(pointer, user)` record.
//!
//! All mutations funnel through this type — direct writes into a record's
//! value tree from outside are never allowed. Writes deep-merge into the
//! cached value so targeted updates leave sibling fields intact, bump a
//! per-entry epoch counter that store views use for lazy re-sync, and emit
//! change events on the bus. A missing record is a valid "not yet loaded"
//! state, not an error; on a miss the cache fires a fire-and-forget
//! subscription request so an external collaborator can fetch the record.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use folio_core::{deep_merge, ensure_path_mut, Pointer, Record, Role, Table};
use rustc_hash::{FxHashMap, FxHashSet};
use serde_json::{Map, Value};
use tokio::sync::{broadcast, mpsc};

use crate::events::{BusStats, ChangeBus, RecordEvent};
use crate::transaction::{Command, Operation};

/// Composite cache key: table + record id + viewing user.
///
/// A pure function of its inputs, so two independently constructed stores
/// addressing the same logical record converge on the same slot. The user id
/// is part of the key because the same pointer can carry a different value
/// and role per user.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub table: Table,
    pub id: String,
    pub user_id: String,
}

impl CacheKey {
    pub fn new(pointer: &Pointer, user_id: &str) -> Self {
        Self {
            table: pointer.table,
            id: pointer.id.clone(),
            user_id: user_id.to_string(),
        }
    }

    pub fn pointer(&self) -> Pointer {
        Pointer::new(self.table, self.id.clone())
    }
}

/// Interest registration for a record the cache does not own locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionRequest {
    pub user_id: String,
    pub pointer: Pointer,
}

/// Cache tuning knobs.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Buffered events per bus subscriber.
    pub event_capacity: usize,
    /// Capacity of each store's child-store memo table.
    pub child_store_capacity: NonZeroUsize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            event_capacity: 256,
            child_store_capacity: NonZeroUsize::new(64).unwrap_or(NonZeroUsize::MIN),
        }
    }
}

/// Counters for monitoring cache behavior.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub bus: BusStats,
}

struct CacheEntry {
    record: Record,
    /// Bumped on every value mutation; store views compare it to decide
    /// whether their memoized projection is stale.
    epoch: u64,
}

/// The authoritative record map.
pub struct RecordCacheStore {
    config: CacheConfig,
    entries: RwLock<FxHashMap<CacheKey, CacheEntry>>,
    bus: ChangeBus,
    subscription_tx: Mutex<Option<mpsc::UnboundedSender<SubscriptionRequest>>>,
    /// Keys already forwarded to the subscription sink, to keep the
    /// registration fire-and-forget *and* at-most-once per key.
    requested: Mutex<FxHashSet<CacheKey>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl RecordCacheStore {
    pub fn new(config: CacheConfig) -> Self {
        let bus = ChangeBus::new(config.event_capacity);
        Self {
            config,
            entries: RwLock::new(FxHashMap::default()),
            bus,
            subscription_tx: Mutex::new(None),
            requested: Mutex::new(FxHashSet::default()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Wire the fire-and-forget subscription channel. Replaces any earlier
    /// sink and resets the at-most-once bookkeeping.
    pub fn set_subscription_sink(&self, sink: mpsc::UnboundedSender<SubscriptionRequest>) {
        *lock(&self.subscription_tx) = Some(sink);
        lock(&self.requested).clear();
    }

    /// Read the cached record. `None` means "not yet loaded"; when a
    /// subscription sink is wired, a miss (or `force_refresh`) also fires an
    /// out-of-band fetch request and the caller re-reads once a change event
    /// arrives.
    pub fn get_record(
        &self,
        pointer: &Pointer,
        user_id: &str,
        force_refresh: bool,
    ) -> Option<Record> {
        self.record_with_epoch(pointer, user_id, force_refresh)
            .map(|(record, _)| record)
    }

    /// Like [`get_record`](Self::get_record), also exposing the entry epoch
    /// store views memoize against.
    pub fn record_with_epoch(
        &self,
        pointer: &Pointer,
        user_id: &str,
        force_refresh: bool,
    ) -> Option<(Record, u64)> {
        let key = CacheKey::new(pointer, user_id);
        let found = {
            let entries = read(&self.entries);
            entries.get(&key).map(|e| (e.record.clone(), e.epoch))
        };
        match &found {
            Some(_) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                if force_refresh {
                    self.request_subscription(key, true);
                }
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                self.request_subscription(key, force_refresh);
            }
        }
        found
    }

    /// Current epoch of an entry, `None` when the entry is absent. Cheap
    /// staleness probe; does not count as a hit or miss.
    pub fn entry_epoch(&self, key: &CacheKey) -> Option<u64> {
        read(&self.entries).get(key).map(|e| e.epoch)
    }

    /// Whether a record is present, regardless of value. Lets callers tell
    /// "cached as null" apart from "never loaded" when they need to.
    pub fn contains(&self, pointer: &Pointer, user_id: &str) -> bool {
        read(&self.entries).contains_key(&CacheKey::new(pointer, user_id))
    }

    /// Merge an incoming record into the cache. The value deep-merges into
    /// any existing value (unrelated sibling fields survive); the role is
    /// replaced outright.
    pub fn set_record(&self, pointer: &Pointer, user_id: &str, record: Record) {
        let key = CacheKey::new(pointer, user_id);
        {
            let mut entries = write(&self.entries);
            match entries.get_mut(&key) {
                Some(entry) => {
                    deep_merge(&mut entry.record.value, record.value);
                    entry.record.role = record.role;
                    entry.epoch += 1;
                }
                None => {
                    entries.insert(key.clone(), CacheEntry { record, epoch: 1 });
                }
            }
        }
        self.emit_changed(key);
    }

    /// Replace a cached record wholesale. Used when the server sends an
    /// authoritative snapshot that must win over local state.
    pub fn replace_record(&self, pointer: &Pointer, user_id: &str, record: Record) {
        let key = CacheKey::new(pointer, user_id);
        {
            let mut entries = write(&self.entries);
            let epoch = entries.get(&key).map(|e| e.epoch + 1).unwrap_or(1);
            entries.insert(key.clone(), CacheEntry { record, epoch });
        }
        self.emit_changed(key);
    }

    /// Light "touch": an acknowledgment that changes no rendered content.
    /// Emits on the touched channel only and leaves the epoch alone, so
    /// store projections are not invalidated.
    pub fn touch(&self, pointer: &Pointer, user_id: &str) {
        let key = CacheKey::new(pointer, user_id);
        self.bus.emit_touched(RecordEvent {
            pointer: key.pointer(),
            user_id: key.user_id.clone(),
            key,
        });
    }

    /// Evict a record from the local working set. Not a durable delete —
    /// that is the server's business.
    pub fn delete_record(&self, pointer: &Pointer, user_id: &str) {
        let key = CacheKey::new(pointer, user_id);
        let removed = write(&self.entries).remove(&key).is_some();
        lock(&self.requested).remove(&key);
        if removed {
            log::debug!("evicted {}/{} for {}", key.table.as_str(), key.id, key.user_id);
            self.emit_changed(key);
        }
    }

    /// Apply one command to the addressed record.
    ///
    /// Application never fails: absent records are vivified (the acting user
    /// authored them, so they start as editable), missing neighbors degrade
    /// to append/prepend, and removing an absent id is a no-op.
    pub fn apply(&self, user_id: &str, op: &Operation) {
        let key = CacheKey::new(&op.pointer(), user_id);
        {
            let mut entries = write(&self.entries);
            let entry = entries.entry(key.clone()).or_insert_with(|| CacheEntry {
                record: Record::new(Value::Object(Map::new()), Role::Editor),
                epoch: 0,
            });
            let slot = ensure_path_mut(&mut entry.record.value, &op.path);
            match &op.command {
                Command::Set(value) | Command::Update(value) => {
                    merge_fields(slot, value);
                }
                Command::ListAfter { id, after } => {
                    let list = coerce_list(slot);
                    match after.as_deref().and_then(|a| position(list, a)) {
                        Some(pos) => list.insert(pos + 1, Value::String(id.clone())),
                        None => list.push(Value::String(id.clone())),
                    }
                }
                Command::ListBefore { id, before } => {
                    let list = coerce_list(slot);
                    match before.as_deref().and_then(|b| position(list, b)) {
                        Some(pos) => list.insert(pos, Value::String(id.clone())),
                        None => list.insert(0, Value::String(id.clone())),
                    }
                }
                Command::ListRemove { id } => {
                    let list = coerce_list(slot);
                    if let Some(pos) = position(list, id) {
                        list.remove(pos);
                    }
                }
            }
            entry.epoch += 1;
        }
        self.emit_changed(key);
    }

    /// Subscribe to value mutations.
    pub fn subscribe_changed(&self) -> broadcast::Receiver<RecordEvent> {
        self.bus.subscribe_changed()
    }

    /// Subscribe to touch events.
    pub fn subscribe_touched(&self) -> broadcast::Receiver<RecordEvent> {
        self.bus.subscribe_touched()
    }

    pub fn len(&self) -> usize {
        read(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        read(&self.entries).is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            bus: self.bus.stats(),
        }
    }

    fn emit_changed(&self, key: CacheKey) {
        self.bus.emit_changed(RecordEvent {
            pointer: key.pointer(),
            user_id: key.user_id.clone(),
            key,
        });
    }

    fn request_subscription(&self, key: CacheKey, force: bool) {
        let sink = lock(&self.subscription_tx).clone();
        let Some(sink) = sink else { return };
        let first_time = lock(&self.requested).insert(key.clone());
        if first_time || force {
            log::debug!(
                "requesting remote subscription for {}/{} ({})",
                key.table.as_str(),
                key.id,
                key.user_id
            );
            let _ = sink.send(SubscriptionRequest {
                user_id: key.user_id,
                pointer: Pointer::new(key.table, key.id),
            });
        }
    }
}

/// Shallow field merge used by `Set`/`Update`: object payloads overwrite the
/// named fields of an object target, anything else replaces the slot.
fn merge_fields(slot: &mut Value, incoming: &Value) {
    match (slot, incoming) {
        (Value::Object(target), Value::Object(fields)) => {
            for (key, value) in fields {
                target.insert(key.clone(), value.clone());
            }
        }
        (slot, incoming) => *slot = incoming.clone(),
    }
}

/// View the slot as an ordered list, coercing anything else (null, scalar,
/// object) into a fresh empty list first.
fn coerce_list(slot: &mut Value) -> &mut Vec<Value> {
    if !slot.is_array() {
        *slot = Value::Array(Vec::new());
    }
    match slot {
        Value::Array(list) => list,
        _ => unreachable!(),
    }
}

fn position(list: &[Value], id: &str) -> Option<usize> {
    list.iter().position(|v| v.as_str() == Some(id))
}

// Poison recovery: a panicked writer must not wedge every later reader.
fn lock<'a, T>(mutex: &'a Mutex<T>) -> MutexGuard<'a, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn read<'a, T>(rwlock: &'a RwLock<T>) -> RwLockReadGuard<'a, T> {
    rwlock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<'a, T>(rwlock: &'a RwLock<T>) -> RwLockWriteGuard<'a, T> {
    rwlock.write().unwrap_or_else(PoisonError::into_inner)
}
