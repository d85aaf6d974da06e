//! Commit queue: events, locks, durable storage and the manager tying them together
//!
//! - `CommitEvent`: one mutation report, identified by its fingerprint
//! - `LockRegistry`: echo suppression for changes applied from the hub
//! - `Store`: versioned, shared persistence of the waiting queue
//! - `CommitQueueManager`: immediate sends, deferred enqueue and drains

pub mod ids;
pub mod lock;
pub mod event;
pub mod persistence;
pub mod store;
mod manager;

pub use event::{Action, CommitEvent, CommitStruct, RetryState};
pub use ids::{to_object_ids, ObjectIds};
pub use lock::{LockRegistry, NEW_OBJECT};
pub use manager::{CommitOutcome, CommitQueueManager, DrainReport, ScopedLock};
pub use store::{FileStore, MemoryStore, Store, StoredQueue};
