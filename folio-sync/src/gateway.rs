//! The "apply transactions" gateway.
//!
//! A committed transaction's payload is the request body; the collaborator
//! answers with a trace id and a success flag. On success nothing further
//! happens locally (the cache already holds the optimistic state); on
//! failure the caller decides on recovery.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use folio_store::TransactionPayload;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// The collaborator's answer to an "apply transactions" call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyAck {
    pub trace_id: Uuid,
    pub success: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// The collaborator understood the payload and refused it.
    #[error("transaction rejected: {0}")]
    Rejected(String),
    /// The payload never made it across.
    #[error("transport failure: {0}")]
    Transport(String),
}

/// What a real transport (or an in-process fake) implements.
pub trait TransactionGateway {
    fn apply_transaction(
        &self,
        payload: TransactionPayload,
    ) -> impl std::future::Future<Output = Result<ApplyAck, GatewayError>> + Send;
}

/// In-process gateway that records every payload it accepts.
///
/// Doubles as the offline-first default and as the scriptable test gateway:
/// flip `fail_next` to have the next call report a transport failure.
#[derive(Default)]
pub struct RecordingGateway {
    applied: Mutex<Vec<TransactionPayload>>,
    fail_next: AtomicBool,
}

impl RecordingGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `apply_transaction` call fail with a transport error.
    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    /// Every payload accepted so far, in arrival order.
    pub fn applied(&self) -> Vec<TransactionPayload> {
        lock(&self.applied).clone()
    }

    pub fn applied_len(&self) -> usize {
        lock(&self.applied).len()
    }
}

impl TransactionGateway for RecordingGateway {
    async fn apply_transaction(
        &self,
        payload: TransactionPayload,
    ) -> Result<ApplyAck, GatewayError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(GatewayError::Transport("connection reset".into()));
        }
        log::debug!(
            "gateway accepted transaction {} ({} ops)",
            payload.id,
            payload.operations.len()
        );
        lock(&self.applied).push(payload);
        Ok(ApplyAck { trace_id: Uuid::new_v4(), success: true })
    }
}

fn lock<'a, T>(mutex: &'a Mutex<T>) -> MutexGuard<'a, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(user: &str) -> TransactionPayload {
        TransactionPayload {
            id: Uuid::new_v4(),
            user_id: user.to_string(),
            operations: Vec::new(),
            timestamp: 1,
        }
    }

    #[tokio::test]
    async fn test_recording_gateway_accepts_and_records() {
        let gateway = RecordingGateway::new();
        let p = payload("alice");
        let id = p.id;

        let ack = gateway.apply_transaction(p).await.unwrap();
        assert!(ack.success);

        let applied = gateway.applied();
        assert_eq!(applied.len(), 1);
        assert_eq!(applied[0].id, id);
    }

    #[tokio::test]
    async fn test_fail_next_fails_exactly_once() {
        let gateway = RecordingGateway::new();
        gateway.fail_next();

        assert!(gateway.apply_transaction(payload("alice")).await.is_err());
        assert!(gateway.apply_transaction(payload("alice")).await.is_ok());
        assert_eq!(gateway.applied_len(), 1);
    }

    #[test]
    fn test_ack_wire_format() {
        let ack = ApplyAck { trace_id: Uuid::nil(), success: true };
        let wire = serde_json::to_value(&ack).unwrap();
        assert!(wire.get("traceId").is_some());
        assert_eq!(wire["success"], true);
    }
}
