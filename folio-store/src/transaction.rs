//! The command layer: declarative mutations, batched per user gesture.
//!
//! A [`Transaction`] collects [`Operation`]s in order and applies each one to
//! the cache the moment it is added, so the UI reflects an edit before any
//! round trip. Committing is terminal: it seals the batch and hands the
//! serialized log to the sync layer. There is no rollback of already-applied
//! local operations on a failed flush; the cache keeps the optimistic state
//! and the payload can be retried.

use std::mem;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use folio_core::{Pointer, Table};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::cache::RecordCacheStore;
use crate::record::RecordStore;

/// One declarative mutation, tagged by command kind.
///
/// `Set` and `Update` both merge fields at the addressed path; the
/// distinction is intent (create/initialize vs. amend) and is preserved on
/// the wire for the server to interpret. List commands name the child id to
/// insert or remove, with an optional neighbor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", content = "args", rename_all = "camelCase")]
pub enum Command {
    Set(Value),
    Update(Value),
    ListBefore {
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        before: Option<String>,
    },
    ListAfter {
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        after: Option<String>,
    },
    ListRemove { id: String },
}

/// A command addressed at a record (and optionally a sub-path inside it).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub table: Table,
    pub id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub path: Vec<String>,
    #[serde(flatten)]
    pub command: Command,
}

impl Operation {
    pub fn pointer(&self) -> Pointer {
        Pointer::new(self.table, self.id.clone())
    }
}

/// Serialized form of a committed transaction — the request body of the
/// sync collaborator's "apply transactions" call. Ownership of the operation
/// log transfers here on commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionPayload {
    pub id: Uuid,
    pub user_id: String,
    pub operations: Vec<Operation>,
    pub timestamp: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Open,
    Committed,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransactionError {
    /// Programmer error: a committed transaction is terminal.
    #[error("transaction {0} is already committed")]
    AlreadyCommitted(Uuid),
}

/// An ordered batch of operations authored by one user.
///
/// Operations apply to the cache synchronously as they are added, in add
/// order. `Open → Committed` is the whole lifecycle; a committed transaction
/// rejects further operations.
pub struct Transaction {
    id: Uuid,
    user_id: String,
    cache: Arc<RecordCacheStore>,
    operations: Vec<Operation>,
    timestamp_ms: u64,
    state: TransactionState,
}

impl Transaction {
    pub fn begin(cache: Arc<RecordCacheStore>, user_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            cache,
            operations: Vec::new(),
            timestamp_ms: now_ms(),
            state: TransactionState::Open,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn cache(&self) -> &Arc<RecordCacheStore> {
        &self.cache
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    /// Append a command addressed at `store`'s slot and apply it to the
    /// cache immediately (optimistic local apply).
    pub fn add_operation(
        &mut self,
        store: &RecordStore,
        command: Command,
    ) -> Result<(), TransactionError> {
        let pointer = store.pointer().clone();
        self.add_operation_at(pointer, store.path().to_vec(), command)
    }

    /// Append a command addressed by raw pointer + path. Used by the edit
    /// façade for records that have no store derived yet.
    pub fn add_operation_at(
        &mut self,
        pointer: Pointer,
        path: Vec<String>,
        command: Command,
    ) -> Result<(), TransactionError> {
        if self.state == TransactionState::Committed {
            return Err(TransactionError::AlreadyCommitted(self.id));
        }
        let op = Operation {
            table: pointer.table,
            id: pointer.id,
            path,
            command,
        };
        self.cache.apply(&self.user_id, &op);
        self.operations.push(op);
        Ok(())
    }

    /// Seal the transaction and take the serialized batch.
    ///
    /// The local cache already reflects every operation; the returned payload
    /// is for transport. Committing twice is a programmer error.
    pub fn commit(&mut self) -> Result<TransactionPayload, TransactionError> {
        if self.state == TransactionState::Committed {
            return Err(TransactionError::AlreadyCommitted(self.id));
        }
        self.state = TransactionState::Committed;
        log::debug!(
            "committing transaction {} ({} ops) for {}",
            self.id,
            self.operations.len(),
            self.user_id
        );
        Ok(TransactionPayload {
            id: self.id,
            user_id: self.user_id.clone(),
            operations: mem::take(&mut self.operations),
            timestamp: self.timestamp_ms,
        })
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
