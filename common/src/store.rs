//! The coordination-store abstraction.
//!
//! The fleet needs exactly one thing from its store: a linearizable,
//! revisioned, leased key-value space. `KvStore` captures that contract so
//! the job watcher and the distributed lock (its two consumers) never talk to
//! a concrete client directly. `MemoryStore` is the in-process
//! implementation used by tests and single-process development setups.

pub mod memory;

pub use memory::MemoryStore;

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::errors::StoreError;

/// Store revision; increases by one for every successful mutation.
pub type Revision = i64;

/// Opaque lease handle. Keys bound to a lease disappear when it expires or
/// is revoked.
pub type LeaseId = i64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    pub key: String,
    pub value: String,
}

/// One observed mutation on a watched prefix.
#[derive(Debug, Clone)]
pub enum WatchEvent {
    Put { kv: KeyValue, revision: Revision },
    Delete { key: String, revision: Revision },
}

/// Leased, revisioned key-value store.
///
/// Watch streams end (the receiver yields `None`) when the store drops the
/// watcher - connection loss, slow-consumer overrun, or shutdown. Consumers
/// treat that as fatal; there is no transparent resubscription.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// All current key-values under `prefix`, plus the revision they were
    /// read at. The revision anchors a subsequent `watch_prefix` call.
    async fn get_prefix(&self, prefix: &str) -> Result<(Vec<KeyValue>, Revision), StoreError>;

    /// Write a key, returning the previous key-value if any.
    async fn put(&self, key: &str, value: &str) -> Result<Option<KeyValue>, StoreError>;

    /// Write a key bound to a lease; the key is removed when the lease goes.
    async fn put_with_lease(
        &self,
        key: &str,
        value: &str,
        lease: LeaseId,
    ) -> Result<Option<KeyValue>, StoreError>;

    /// Delete a key, returning the previous key-value if any.
    async fn delete(&self, key: &str) -> Result<Option<KeyValue>, StoreError>;

    /// Stream every mutation under `prefix` with revision >= `from_revision`.
    async fn watch_prefix(
        &self,
        prefix: &str,
        from_revision: Revision,
    ) -> Result<mpsc::Receiver<WatchEvent>, StoreError>;

    /// Create a lease with the given TTL.
    async fn grant_lease(&self, ttl: Duration) -> Result<LeaseId, StoreError>;

    /// Push a lease's expiry out by its full TTL again.
    async fn keep_alive(&self, lease: LeaseId) -> Result<(), StoreError>;

    /// Drop a lease immediately, removing every key bound to it.
    async fn revoke_lease(&self, lease: LeaseId) -> Result<(), StoreError>;

    /// Atomic create-if-absent: returns true and writes the key (optionally
    /// lease-bound) only when the key does not exist.
    async fn create_if_absent(
        &self,
        key: &str,
        value: &str,
        lease: Option<LeaseId>,
    ) -> Result<bool, StoreError>;
}
