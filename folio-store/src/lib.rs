//! # folio-store — Block-document operational store
//!
//! A pointer-addressed, cache-backed data layer: many independent consumers
//! read and mutate a shared tree of blocks through small ordered commands,
//! while a single process-wide cache and reactive change events keep every
//! view consistent.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  expand into   ┌─────────────┐  apply    ┌──────────────────┐
//! │ edit façade  │ ─────────────► │ Transaction │ ────────► │ RecordCacheStore │
//! │ (gestures)   │                │ (op batch)  │           │ (authoritative)  │
//! └──────────────┘                └──────┬──────┘           └────────┬─────────┘
//!                                        │ commit                    │ changed /
//!                                        ▼                           │ touched
//!                              ┌──────────────────┐                  ▼
//!                              │ TransactionPayload│         ┌──────────────┐
//!                              │ (to sync layer)   │         │ RecordStore  │
//!                              └──────────────────┘          │ BlockStore   │
//!                                                            │ (projections)│
//!                                                            └──────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`events`] — change/touch broadcast bus scoped to one cache
//! - [`cache`] — the authoritative `(pointer, user)`-keyed record cache
//! - [`record`] — lazily synced, memoized store views over cache slots
//! - [`block`] — block-domain projections (content list, title, capability)
//! - [`transaction`] — ordered command batches with optimistic local apply
//! - [`edit`] — high-level document edits that expand into operations

pub mod block;
pub mod cache;
pub mod edit;
pub mod events;
pub mod record;
pub mod transaction;

pub use block::BlockStore;
pub use cache::{CacheConfig, CacheKey, CacheStats, RecordCacheStore, SubscriptionRequest};
pub use events::{BusStats, ChangeBus, RecordEvent};
pub use record::RecordStore;
pub use transaction::{
    Command, Operation, Transaction, TransactionError, TransactionPayload, TransactionState,
};
