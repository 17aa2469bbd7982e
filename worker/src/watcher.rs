//! Store-driven job synchronization.
//!
//! On start the watcher lists every current job definition at the store's
//! revision, synthesizes a save event per job, then watches the job and kill
//! prefixes from that revision forward. The scheduler consumes the resulting
//! typed event stream and never talks to the store itself.
//!
//! A broken watch stream (store failure, compaction, slow-consumer overrun)
//! is fatal to its watcher task: the task logs and exits, which closes the
//! scheduler's event channel and stops the worker. Restarting the process is
//! an operational concern, not handled here.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{error, info, warn};

use common::constants::keys;
use common::errors::StoreError;
use common::job::{Job, JobEvent};
use common::store::{KvStore, WatchEvent};

pub struct JobWatcher {
    store: Arc<dyn KvStore>,
}

impl JobWatcher {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    /// List current jobs, emit a save per job, then hand the sender halves to
    /// the two watch tasks. When both tasks die the event channel closes.
    pub async fn start(self, events: mpsc::Sender<JobEvent>) -> Result<(), StoreError> {
        let (current, revision) = self.store.get_prefix(keys::JOBS_PREFIX).await?;
        info!(jobs = current.len(), revision, "synchronized job definitions");

        for kv in current {
            match Job::from_json(&kv.value) {
                Ok(job) => {
                    if events.send(JobEvent::Save(job)).await.is_err() {
                        return Err(StoreError::Closed);
                    }
                }
                Err(e) => warn!(key = %kv.key, error = %e, "skipping undecodable job definition"),
            }
        }

        let job_watch = self
            .store
            .watch_prefix(keys::JOBS_PREFIX, revision + 1)
            .await?;
        let kill_watch = self
            .store
            .watch_prefix(keys::KILL_PREFIX, revision + 1)
            .await?;

        tokio::spawn(watch_jobs(job_watch, events.clone()));
        tokio::spawn(watch_kills(kill_watch, events));
        Ok(())
    }
}

async fn watch_jobs(mut watch: mpsc::Receiver<WatchEvent>, events: mpsc::Sender<JobEvent>) {
    while let Some(event) = watch.recv().await {
        let job_event = match event {
            WatchEvent::Put { kv, .. } => match Job::from_json(&kv.value) {
                Ok(job) => JobEvent::Save(job),
                Err(e) => {
                    warn!(key = %kv.key, error = %e, "skipping undecodable job definition");
                    continue;
                }
            },
            WatchEvent::Delete { key, .. } => {
                JobEvent::Delete(keys::extract_name(&key, keys::JOBS_PREFIX).to_string())
            }
        };
        if events.send(job_event).await.is_err() {
            return;
        }
    }
    error!("job watch stream ended, worker requires restart");
}

async fn watch_kills(mut watch: mpsc::Receiver<WatchEvent>, events: mpsc::Sender<JobEvent>) {
    while let Some(event) = watch.recv().await {
        // kill markers are short-lived; only their appearance matters and
        // their lease-expiry deletes are ignored
        if let WatchEvent::Put { kv, .. } = event {
            let name = keys::extract_name(&kv.key, keys::KILL_PREFIX).to_string();
            if events.send(JobEvent::Kill(name)).await.is_err() {
                return;
            }
        }
    }
    error!("kill watch stream ended, worker requires restart");
}
