//! Distributed lock exclusivity and lease-expiry recovery.

use std::sync::Arc;
use std::time::Duration;

use common::errors::LockError;
use common::store::{KvStore, MemoryStore};
use worker::lock::JobLock;

fn store() -> Arc<dyn KvStore> {
    Arc::new(MemoryStore::new())
}

#[tokio::test]
async fn lock_is_exclusive_until_unlocked() {
    let store = store();
    let ttl = Duration::from_secs(5);

    let mut holder = JobLock::new(store.clone(), "job2", ttl);
    holder.try_lock().await.unwrap();

    let mut contender = JobLock::new(store.clone(), "job2", ttl);
    match contender.try_lock().await {
        Err(LockError::Busy { job }) => assert_eq!(job, "job2"),
        other => panic!("expected busy, got {other:?}"),
    }

    holder.unlock().await;
    contender
        .try_lock()
        .await
        .expect("lock must be free after unlock");
    contender.unlock().await;
}

#[tokio::test]
async fn locks_for_different_jobs_are_independent() {
    let store = store();
    let ttl = Duration::from_secs(5);

    let mut a = JobLock::new(store.clone(), "job-a", ttl);
    let mut b = JobLock::new(store.clone(), "job-b", ttl);
    a.try_lock().await.unwrap();
    b.try_lock().await.unwrap();

    a.unlock().await;
    b.unlock().await;
}

#[tokio::test]
async fn crashed_holder_lock_expires_within_one_ttl() {
    let store = store();
    let ttl = Duration::from_millis(500);

    let mut holder = JobLock::new(store.clone(), "job2", ttl);
    holder.try_lock().await.unwrap();
    // crash: the lock is dropped without unlock, so the keep-alive stops and
    // the lease is left to lapse
    drop(holder);

    let mut contender = JobLock::new(store.clone(), "job2", ttl);
    assert!(matches!(
        contender.try_lock().await,
        Err(LockError::Busy { .. })
    ));

    tokio::time::sleep(Duration::from_millis(900)).await;
    contender
        .try_lock()
        .await
        .expect("expired lock must become acquirable");
    contender.unlock().await;
}

#[tokio::test]
async fn keep_alive_outlives_the_ttl_while_held() {
    let store = store();
    let ttl = Duration::from_millis(500);

    let mut holder = JobLock::new(store.clone(), "job2", ttl);
    holder.try_lock().await.unwrap();

    tokio::time::sleep(Duration::from_millis(1300)).await;

    let mut contender = JobLock::new(store.clone(), "job2", ttl);
    assert!(
        matches!(contender.try_lock().await, Err(LockError::Busy { .. })),
        "held lock must stay held well past its TTL"
    );
    holder.unlock().await;
}

#[tokio::test]
async fn losing_a_race_leaves_no_stray_lease_keys() {
    let store = store();
    let ttl = Duration::from_secs(5);

    let mut holder = JobLock::new(store.clone(), "job2", ttl);
    holder.try_lock().await.unwrap();

    let mut loser = JobLock::new(store.clone(), "job2", ttl);
    let _ = loser.try_lock().await;
    holder.unlock().await;

    let (kvs, _) = store.get_prefix("/cron/lock/").await.unwrap();
    assert!(kvs.is_empty(), "no lock keys should remain: {kvs:?}");
}
