//! In-process `KvStore` implementation.
//!
//! Single-process only: master and worker see the same store when they share
//! the same `MemoryStore` clone. Leases expire through a background sweep
//! task that lives as long as any clone of the store does.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;
use tracing::debug;

use crate::errors::StoreError;
use crate::store::{KeyValue, KvStore, LeaseId, Revision, WatchEvent};

/// Watch-stream buffer; a watcher that falls this far behind is dropped.
const WATCH_BUFFER: usize = 1024;

/// Mutations retained for watch replay; older revisions are compacted.
const HISTORY_CAPACITY: usize = 8192;

/// Lease expiry sweep interval.
const SWEEP_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    lease: Option<LeaseId>,
}

struct Lease {
    ttl: Duration,
    expires_at: Instant,
    keys: HashSet<String>,
}

struct Watcher {
    prefix: String,
    tx: mpsc::Sender<WatchEvent>,
}

struct Inner {
    revision: Revision,
    data: BTreeMap<String, Entry>,
    leases: HashMap<LeaseId, Lease>,
    next_lease_id: LeaseId,
    watchers: Vec<Watcher>,
    history: VecDeque<(Revision, WatchEvent)>,
}

impl Inner {
    fn new() -> Self {
        Self {
            revision: 0,
            data: BTreeMap::new(),
            leases: HashMap::new(),
            next_lease_id: 1,
            watchers: Vec::new(),
            history: VecDeque::new(),
        }
    }

    fn emit(&mut self, event: WatchEvent) {
        self.history.push_back((self.revision, event.clone()));
        while self.history.len() > HISTORY_CAPACITY {
            self.history.pop_front();
        }

        self.watchers.retain(|watcher| {
            let key = match &event {
                WatchEvent::Put { kv, .. } => kv.key.as_str(),
                WatchEvent::Delete { key, .. } => key.as_str(),
            };
            if !key.starts_with(&watcher.prefix) {
                return true;
            }
            // a full buffer means the consumer stopped keeping up; closing
            // the stream is how that surfaces
            watcher.tx.try_send(event.clone()).is_ok()
        });
    }

    fn detach_from_lease(&mut self, key: &str, lease: Option<LeaseId>) {
        if let Some(id) = lease {
            if let Some(lease) = self.leases.get_mut(&id) {
                lease.keys.remove(key);
            }
        }
    }

    fn insert(&mut self, key: &str, value: &str, lease: Option<LeaseId>) -> Option<KeyValue> {
        let previous = self.data.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                lease,
            },
        );
        if let Some(prev) = &previous {
            self.detach_from_lease(key, prev.lease);
        }
        if let Some(id) = lease {
            if let Some(lease) = self.leases.get_mut(&id) {
                lease.keys.insert(key.to_string());
            }
        }

        self.revision += 1;
        self.emit(WatchEvent::Put {
            kv: KeyValue {
                key: key.to_string(),
                value: value.to_string(),
            },
            revision: self.revision,
        });

        previous.map(|entry| KeyValue {
            key: key.to_string(),
            value: entry.value,
        })
    }

    fn remove(&mut self, key: &str) -> Option<KeyValue> {
        let previous = self.data.remove(key)?;
        self.detach_from_lease(key, previous.lease);

        self.revision += 1;
        self.emit(WatchEvent::Delete {
            key: key.to_string(),
            revision: self.revision,
        });

        Some(KeyValue {
            key: key.to_string(),
            value: previous.value,
        })
    }

    fn expire_leases(&mut self, now: Instant) {
        let expired: Vec<LeaseId> = self
            .leases
            .iter()
            .filter(|(_, lease)| lease.expires_at <= now)
            .map(|(id, _)| *id)
            .collect();

        for id in expired {
            debug!(lease = id, "lease expired");
            self.drop_lease(id);
        }
    }

    fn drop_lease(&mut self, id: LeaseId) {
        if let Some(lease) = self.leases.remove(&id) {
            for key in lease.keys {
                self.remove(&key);
            }
        }
    }
}

#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    /// Create a store and spawn its lease sweeper. Must be called from
    /// within a tokio runtime.
    pub fn new() -> Self {
        let inner = Arc::new(Mutex::new(Inner::new()));

        let weak = Arc::downgrade(&inner);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(SWEEP_INTERVAL);
            loop {
                interval.tick().await;
                let Some(inner) = weak.upgrade() else { break };
                inner.lock().await.expire_leases(Instant::now());
            }
        });

        Self { inner }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get_prefix(&self, prefix: &str) -> Result<(Vec<KeyValue>, Revision), StoreError> {
        let inner = self.inner.lock().await;
        let kvs = inner
            .data
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, entry)| KeyValue {
                key: key.clone(),
                value: entry.value.clone(),
            })
            .collect();
        Ok((kvs, inner.revision))
    }

    async fn put(&self, key: &str, value: &str) -> Result<Option<KeyValue>, StoreError> {
        let mut inner = self.inner.lock().await;
        Ok(inner.insert(key, value, None))
    }

    async fn put_with_lease(
        &self,
        key: &str,
        value: &str,
        lease: LeaseId,
    ) -> Result<Option<KeyValue>, StoreError> {
        let mut inner = self.inner.lock().await;
        if !inner.leases.contains_key(&lease) {
            return Err(StoreError::LeaseExpired { lease });
        }
        Ok(inner.insert(key, value, Some(lease)))
    }

    async fn delete(&self, key: &str) -> Result<Option<KeyValue>, StoreError> {
        let mut inner = self.inner.lock().await;
        Ok(inner.remove(key))
    }

    async fn watch_prefix(
        &self,
        prefix: &str,
        from_revision: Revision,
    ) -> Result<mpsc::Receiver<WatchEvent>, StoreError> {
        let mut inner = self.inner.lock().await;

        let oldest_retained = inner
            .history
            .front()
            .map(|(revision, _)| *revision)
            .unwrap_or(inner.revision + 1);
        if inner.revision > 0 && from_revision <= inner.revision && from_revision < oldest_retained {
            return Err(StoreError::Compacted {
                requested: from_revision,
                first_available: oldest_retained,
            });
        }

        let (tx, rx) = mpsc::channel(WATCH_BUFFER);
        for (revision, event) in inner.history.iter() {
            if *revision < from_revision {
                continue;
            }
            let key = match event {
                WatchEvent::Put { kv, .. } => kv.key.as_str(),
                WatchEvent::Delete { key, .. } => key.as_str(),
            };
            if key.starts_with(prefix) && tx.try_send(event.clone()).is_err() {
                return Err(StoreError::Connectivity {
                    reason: "watch replay overflow".to_string(),
                });
            }
        }

        inner.watchers.push(Watcher {
            prefix: prefix.to_string(),
            tx,
        });
        Ok(rx)
    }

    async fn grant_lease(&self, ttl: Duration) -> Result<LeaseId, StoreError> {
        let mut inner = self.inner.lock().await;
        let id = inner.next_lease_id;
        inner.next_lease_id += 1;
        inner.leases.insert(
            id,
            Lease {
                ttl,
                expires_at: Instant::now() + ttl,
                keys: HashSet::new(),
            },
        );
        Ok(id)
    }

    async fn keep_alive(&self, lease: LeaseId) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        match inner.leases.get_mut(&lease) {
            Some(state) => {
                state.expires_at = Instant::now() + state.ttl;
                Ok(())
            }
            None => Err(StoreError::LeaseExpired { lease }),
        }
    }

    async fn revoke_lease(&self, lease: LeaseId) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        if !inner.leases.contains_key(&lease) {
            return Err(StoreError::LeaseExpired { lease });
        }
        inner.drop_lease(lease);
        Ok(())
    }

    async fn create_if_absent(
        &self,
        key: &str,
        value: &str,
        lease: Option<LeaseId>,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        if inner.data.contains_key(key) {
            return Ok(false);
        }
        if let Some(id) = lease {
            if !inner.leases.contains_key(&id) {
                return Err(StoreError::LeaseExpired { lease: id });
            }
        }
        inner.insert(key, value, lease);
        Ok(true)
    }
}
