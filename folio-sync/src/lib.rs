//! # folio-sync — Boundary with the external sync collaborator
//!
//! The store layer is offline-first: transactions apply to the local cache
//! synchronously and only their serialized payloads cross this boundary.
//! This crate owns that boundary:
//!
//! - [`gateway`] — the `TransactionGateway` trait an actual transport
//!   implements ("apply transactions" call returning `{traceId, success}`),
//!   plus a recording in-process gateway for tests and local development
//! - [`client`] — a queueing sync client: submits payloads when connected,
//!   queues them while offline, replays the queue on reconnect
//! - [`subscriptions`] — fire-and-forget interest registration for records
//!   the cache does not hold locally
//!
//! A failed submit surfaces an error to the caller and leaves the
//! optimistically applied cache state in place; the payload stays available
//! for retry. No rollback is attempted here.

pub mod client;
pub mod gateway;
pub mod subscriptions;

pub use client::{ConnectionState, OfflineQueue, SubmitOutcome, SyncClient, SyncError};
pub use gateway::{ApplyAck, GatewayError, RecordingGateway, TransactionGateway};
pub use subscriptions::{SubscriptionService, SubscriptionSink};
