//! Worker registration: presence while alive, expiry after death.

use std::sync::Arc;
use std::time::Duration;

use common::constants::keys;
use common::store::{KvStore, MemoryStore};
use worker::register::Register;

#[tokio::test]
async fn registration_is_kept_alive_then_expires_with_the_worker() {
    let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
    let ttl = Duration::from_millis(600);

    let worker = tokio::spawn(
        Register::new(store.clone(), "worker-a".to_string(), ttl).run(),
    );

    tokio::time::sleep(Duration::from_millis(200)).await;
    let (kvs, _) = store.get_prefix(keys::WORKERS_PREFIX).await.unwrap();
    assert_eq!(kvs.len(), 1);
    assert_eq!(kvs[0].key, keys::worker_key("worker-a"));

    // well past the TTL: keep-alive holds the registration
    tokio::time::sleep(Duration::from_millis(1500)).await;
    let (kvs, _) = store.get_prefix(keys::WORKERS_PREFIX).await.unwrap();
    assert_eq!(kvs.len(), 1, "live worker must stay registered");

    // worker dies; its key lapses within one TTL
    worker.abort();
    tokio::time::sleep(Duration::from_millis(1000)).await;
    let (kvs, _) = store.get_prefix(keys::WORKERS_PREFIX).await.unwrap();
    assert!(kvs.is_empty(), "dead worker must drop off the registry");
}
