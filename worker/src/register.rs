//! Worker presence registration.
//!
//! Each live worker holds an ephemeral key under the workers prefix, bound to
//! a lease it keeps refreshing. The master lists that prefix to answer
//! "which workers are up". Unlike the core loops, registration retries after
//! store hiccups: re-advertising presence is always safe.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use common::constants::keys;
use common::errors::StoreError;
use common::store::KvStore;

const RETRY_DELAY: Duration = Duration::from_secs(1);

pub struct Register {
    store: Arc<dyn KvStore>,
    worker_id: String,
    ttl: Duration,
}

impl Register {
    pub fn new(store: Arc<dyn KvStore>, worker_id: String, ttl: Duration) -> Self {
        Self {
            store,
            worker_id,
            ttl,
        }
    }

    pub async fn run(self) {
        loop {
            if let Err(e) = self.register_and_keep_alive().await {
                warn!(worker = %self.worker_id, error = %e, "registration lost, re-registering");
            }
            tokio::time::sleep(RETRY_DELAY).await;
        }
    }

    async fn register_and_keep_alive(&self) -> Result<(), StoreError> {
        let lease = self.store.grant_lease(self.ttl).await?;
        self.store
            .put_with_lease(&keys::worker_key(&self.worker_id), &self.worker_id, lease)
            .await?;
        info!(worker = %self.worker_id, lease, "worker registered");

        let mut interval = tokio::time::interval(self.ttl / 3);
        interval.tick().await;
        loop {
            interval.tick().await;
            self.store.keep_alive(lease).await?;
        }
    }
}
