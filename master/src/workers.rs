//! Listing of live workers from their registration keys.

use std::sync::Arc;

use anyhow::Result;

use common::constants::keys;
use common::store::KvStore;

pub struct WorkerRegistry {
    store: Arc<dyn KvStore>,
}

impl WorkerRegistry {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    /// Ids of every currently registered worker. Registrations are
    /// lease-bound, so a listed worker was alive within its TTL.
    pub async fn list(&self) -> Result<Vec<String>> {
        let (kvs, _) = self.store.get_prefix(keys::WORKERS_PREFIX).await?;
        Ok(kvs
            .into_iter()
            .map(|kv| keys::extract_name(&kv.key, keys::WORKERS_PREFIX).to_string())
            .collect())
    }
}
