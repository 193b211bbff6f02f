//! Change notification bus scoped to one record cache.
//!
//! Two tokio broadcast channels carry two distinct signals: `changed` fires
//! whenever a cached value mutates (content edits), `touched` fires on light
//! acknowledgment events that leave rendered content untouched. Receivers see
//! events in send order; there is no ordering guarantee across different
//! cache keys. Unsubscribing is dropping the receiver.

use std::sync::atomic::{AtomicU64, Ordering};

use folio_core::Pointer;
use tokio::sync::broadcast;

use crate::cache::CacheKey;

/// One cache mutation or acknowledgment, addressed by cache key.
///
/// Consumers filter by [`CacheKey`]; the pointer and user id are carried so
/// subscribers do not need to reverse the key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordEvent {
    pub key: CacheKey,
    pub pointer: Pointer,
    pub user_id: String,
}

/// Snapshot of bus counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BusStats {
    pub changed_sent: u64,
    pub touched_sent: u64,
}

/// Lock-free event counters, read via [`ChangeBus::stats`].
struct AtomicBusStats {
    changed_sent: AtomicU64,
    touched_sent: AtomicU64,
}

impl AtomicBusStats {
    fn new() -> Self {
        Self {
            changed_sent: AtomicU64::new(0),
            touched_sent: AtomicU64::new(0),
        }
    }
}

/// Fan-out bus for cache events.
///
/// Every subscriber gets an independent receiver buffering up to `capacity`
/// events; lagging subscribers drop oldest events rather than blocking the
/// cache's write path.
pub struct ChangeBus {
    changed: broadcast::Sender<RecordEvent>,
    touched: broadcast::Sender<RecordEvent>,
    capacity: usize,
    stats: AtomicBusStats,
}

impl ChangeBus {
    pub fn new(capacity: usize) -> Self {
        let (changed, _) = broadcast::channel(capacity);
        let (touched, _) = broadcast::channel(capacity);
        Self {
            changed,
            touched,
            capacity,
            stats: AtomicBusStats::new(),
        }
    }

    /// Subscribe to value mutations.
    pub fn subscribe_changed(&self) -> broadcast::Receiver<RecordEvent> {
        self.changed.subscribe()
    }

    /// Subscribe to light touch events (server acks and the like).
    pub fn subscribe_touched(&self) -> broadcast::Receiver<RecordEvent> {
        self.touched.subscribe()
    }

    /// Emit a value-mutation event. Returns the number of receivers reached.
    pub fn emit_changed(&self, event: RecordEvent) -> usize {
        let count = self.changed.send(event).unwrap_or(0);
        self.stats.changed_sent.fetch_add(1, Ordering::Relaxed);
        count
    }

    /// Emit a touch event. Returns the number of receivers reached.
    pub fn emit_touched(&self, event: RecordEvent) -> usize {
        let count = self.touched.send(event).unwrap_or(0);
        self.stats.touched_sent.fetch_add(1, Ordering::Relaxed);
        count
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> BusStats {
        BusStats {
            changed_sent: self.stats.changed_sent.load(Ordering::Relaxed),
            touched_sent: self.stats.touched_sent.load(Ordering::Relaxed),
        }
    }
}
