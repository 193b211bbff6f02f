//! Fire-and-forget interest registration.
//!
//! When the cache misses a record it pushes a `SubscriptionRequest` down an
//! mpsc channel; this service drains that channel and forwards
//! registrations to the store-service collaborator. Registration is not a
//! request/response call — nothing waits on it. Duplicate interest for the
//! same `(user, pointer)` pair is swallowed here.

use std::sync::{Mutex, MutexGuard, PoisonError};

use folio_core::Pointer;
use folio_store::{RecordCacheStore, SubscriptionRequest};
use rustc_hash::FxHashSet;
use tokio::sync::mpsc;

/// Where registrations land — the injected store-service collaborator.
pub trait SubscriptionSink {
    fn add_subscription(&self, user_id: &str, pointer: &Pointer);
}

/// Drains a cache's subscription-request channel into a sink.
pub struct SubscriptionService<S> {
    sink: S,
    seen: Mutex<FxHashSet<(String, Pointer)>>,
}

impl<S: SubscriptionSink> SubscriptionService<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            seen: Mutex::new(FxHashSet::default()),
        }
    }

    /// Wire a cache to a fresh channel and return the receiving end for
    /// [`run`](Self::run).
    pub fn channel_for(cache: &RecordCacheStore) -> mpsc::UnboundedReceiver<SubscriptionRequest> {
        let (tx, rx) = mpsc::unbounded_channel();
        cache.set_subscription_sink(tx);
        rx
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Forward one request. `false` when this interest was already
    /// registered earlier.
    pub fn register(&self, request: &SubscriptionRequest) -> bool {
        let fresh = lock(&self.seen)
            .insert((request.user_id.clone(), request.pointer.clone()));
        if fresh {
            log::debug!(
                "registering interest in {}/{} for {}",
                request.pointer.table.as_str(),
                request.pointer.id,
                request.user_id
            );
            self.sink.add_subscription(&request.user_id, &request.pointer);
        }
        fresh
    }

    /// Drain the channel until the cache side closes it.
    pub async fn run(&self, mut requests: mpsc::UnboundedReceiver<SubscriptionRequest>) {
        while let Some(request) = requests.recv().await {
            self.register(&request);
        }
    }
}

fn lock<'a, T>(mutex: &'a Mutex<T>) -> MutexGuard<'a, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
