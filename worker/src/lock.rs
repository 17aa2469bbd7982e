//! Fleet-wide per-job mutual exclusion.
//!
//! A lock is a store key under the lock prefix, bound to a short-TTL lease.
//! Holding the key means holding the lock; a keep-alive task refreshes the
//! lease while held, and a crashed holder's key self-expires within one TTL.
//! A busy lock is never waited on or retried - the caller skips its run.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use common::constants::keys;
use common::errors::LockError;
use common::store::{KvStore, LeaseId};

pub struct JobLock {
    store: Arc<dyn KvStore>,
    job_name: String,
    ttl: Duration,
    lease: Option<LeaseId>,
    keep_alive: Option<JoinHandle<()>>,
}

impl JobLock {
    pub fn new(store: Arc<dyn KvStore>, job_name: &str, ttl: Duration) -> Self {
        Self {
            store,
            job_name: job_name.to_string(),
            ttl,
            lease: None,
            keep_alive: None,
        }
    }

    /// Attempt to take the lock. `LockError::Busy` means another worker holds
    /// it; the unused lease is given back and the caller moves on.
    pub async fn try_lock(&mut self) -> Result<(), LockError> {
        let lease = self.store.grant_lease(self.ttl).await?;
        let key = keys::lock_key(&self.job_name);

        let created = match self.store.create_if_absent(&key, "", Some(lease)).await {
            Ok(created) => created,
            Err(e) => {
                let _ = self.store.revoke_lease(lease).await;
                return Err(e.into());
            }
        };
        if !created {
            let _ = self.store.revoke_lease(lease).await;
            return Err(LockError::Busy {
                job: self.job_name.clone(),
            });
        }

        debug!(job = %self.job_name, lease, "lock acquired");
        self.lease = Some(lease);
        self.keep_alive = Some(self.spawn_keep_alive(lease));
        Ok(())
    }

    fn spawn_keep_alive(&self, lease: LeaseId) -> JoinHandle<()> {
        let store = self.store.clone();
        let job_name = self.job_name.clone();
        let refresh = self.ttl / 3;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(refresh);
            interval.tick().await;
            loop {
                interval.tick().await;
                if let Err(e) = store.keep_alive(lease).await {
                    // the lease will lapse and the lock release itself
                    warn!(job = %job_name, lease, error = %e, "lock keep-alive failed");
                    break;
                }
            }
        })
    }

    /// Release the lock. Revoking the lease removes the lock key.
    pub async fn unlock(&mut self) {
        if let Some(handle) = self.keep_alive.take() {
            handle.abort();
        }
        if let Some(lease) = self.lease.take() {
            if let Err(e) = self.store.revoke_lease(lease).await {
                warn!(job = %self.job_name, lease, error = %e, "lock release failed; lease will expire");
            } else {
                debug!(job = %self.job_name, lease, "lock released");
            }
        }
    }
}

impl Drop for JobLock {
    fn drop(&mut self) {
        // a lock dropped while held stops refreshing; the lease expiry
        // releases it within one TTL
        if let Some(handle) = self.keep_alive.take() {
            handle.abort();
        }
    }
}
