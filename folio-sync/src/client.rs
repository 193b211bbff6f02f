//! Queueing sync client.
//!
//! Wraps a [`TransactionGateway`] with connection-state tracking and an
//! offline queue: while disconnected, committed payloads queue locally and
//! replay in FIFO order on reconnect. A gateway failure surfaces to the
//! caller; the cache keeps its optimistically applied state either way.

use std::collections::VecDeque;

use folio_store::TransactionPayload;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::gateway::{ApplyAck, GatewayError, TransactionGateway};

/// Client connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// The offline queue is at capacity; the payload was not stored.
    #[error("offline queue full ({0} transactions)")]
    QueueFull(usize),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    /// The collaborator acknowledged the call but refused the transaction.
    #[error("transaction {0} rejected by the server")]
    Rejected(Uuid),
}

/// How a submit was resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Stored for replay; nothing crossed the boundary yet.
    Queued,
    /// Accepted by the collaborator.
    Applied(ApplyAck),
}

/// Bounded FIFO of transaction payloads awaiting a connection.
pub struct OfflineQueue {
    queue: VecDeque<TransactionPayload>,
    max_size: usize,
}

impl OfflineQueue {
    pub fn new(max_size: usize) -> Self {
        Self {
            queue: VecDeque::with_capacity(max_size.min(1024)),
            max_size,
        }
    }

    /// Queue a payload for later replay. `false` when the queue is full.
    pub fn enqueue(&mut self, payload: TransactionPayload) -> bool {
        if self.queue.len() >= self.max_size {
            return false;
        }
        self.queue.push_back(payload);
        true
    }

    /// Drain all queued payloads for replay, oldest first.
    pub fn drain(&mut self) -> Vec<TransactionPayload> {
        self.queue.drain(..).collect()
    }

    /// Put a payload back at the front (replay interrupted mid-queue).
    pub fn requeue_front(&mut self, payload: TransactionPayload) {
        self.queue.push_front(payload);
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }

    /// Total operations across all queued payloads.
    pub fn total_operations(&self) -> usize {
        self.queue.iter().map(|p| p.operations.len()).sum()
    }
}

/// The sync client.
pub struct SyncClient<G> {
    gateway: G,
    state: RwLock<ConnectionState>,
    queue: Mutex<OfflineQueue>,
}

impl<G: TransactionGateway> SyncClient<G> {
    pub fn new(gateway: G) -> Self {
        Self::with_queue_capacity(gateway, 10_000)
    }

    pub fn with_queue_capacity(gateway: G, capacity: usize) -> Self {
        Self {
            gateway,
            state: RwLock::new(ConnectionState::Disconnected),
            queue: Mutex::new(OfflineQueue::new(capacity)),
        }
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub async fn connection_state(&self) -> ConnectionState {
        *self.state.read().await
    }

    pub async fn queued_len(&self) -> usize {
        self.queue.lock().await.len()
    }

    /// Mark the client connected and replay any queued payloads in order.
    ///
    /// If a replayed payload fails, it returns to the front of the queue
    /// (followed by the rest), the state drops back to `Reconnecting`, and
    /// the error surfaces.
    pub async fn connect(&self) -> Result<(), SyncError> {
        *self.state.write().await = ConnectionState::Connecting;

        let queued = self.queue.lock().await.drain();
        if !queued.is_empty() {
            log::info!("replaying {} queued transactions", queued.len());
        }
        for (index, payload) in queued.iter().enumerate() {
            match self.gateway.apply_transaction(payload.clone()).await {
                Ok(ack) if ack.success => {}
                outcome => {
                    let mut queue = self.queue.lock().await;
                    for unsent in queued[index..].iter().rev() {
                        queue.requeue_front(unsent.clone());
                    }
                    drop(queue);
                    *self.state.write().await = ConnectionState::Reconnecting;
                    return Err(match outcome {
                        Err(e) => SyncError::Gateway(e),
                        _ => SyncError::Rejected(payload.id),
                    });
                }
            }
        }

        *self.state.write().await = ConnectionState::Connected;
        Ok(())
    }

    pub async fn disconnect(&self) {
        *self.state.write().await = ConnectionState::Disconnected;
    }

    /// Send a committed payload to the collaborator, or queue it while
    /// disconnected.
    pub async fn submit(&self, payload: TransactionPayload) -> Result<SubmitOutcome, SyncError> {
        let state = *self.state.read().await;
        if state != ConnectionState::Connected {
            let mut queue = self.queue.lock().await;
            if !queue.enqueue(payload) {
                return Err(SyncError::QueueFull(queue.len()));
            }
            log::debug!("queued transaction while {:?} ({} pending)", state, queue.len());
            return Ok(SubmitOutcome::Queued);
        }

        let id = payload.id;
        let ack = self.gateway.apply_transaction(payload).await?;
        if !ack.success {
            return Err(SyncError::Rejected(id));
        }
        Ok(SubmitOutcome::Applied(ack))
    }
}
