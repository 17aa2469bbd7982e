//! Job CRUD over the coordination store.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use tracing::{info, warn};

use common::constants::{defaults, keys};
use common::cronexpr;
use common::job::Job;
use common::store::KvStore;

pub struct JobManager {
    store: Arc<dyn KvStore>,
}

impl JobManager {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    /// Publish (create or replace) a job definition. Returns the previous
    /// definition when the save replaced one.
    pub async fn save(&self, job: &Job) -> Result<Option<Job>> {
        if job.name.is_empty() {
            return Err(anyhow!("job name must not be empty"));
        }
        // reject bad expressions at the boundary; workers re-validate on
        // watch since other clients can write the store too
        cronexpr::parse(&job.cron_expr)?;

        let value = job.to_json()?;
        let previous = self.store.put(&keys::job_key(&job.name), &value).await?;
        info!(job = %job.name, "job definition saved");
        Ok(previous.and_then(|kv| Job::from_json(&kv.value).ok()))
    }

    /// Remove a job definition, returning it if it existed.
    pub async fn delete(&self, name: &str) -> Result<Option<Job>> {
        let previous = self.store.delete(&keys::job_key(name)).await?;
        if previous.is_some() {
            info!(job = %name, "job definition deleted");
        }
        Ok(previous.and_then(|kv| Job::from_json(&kv.value).ok()))
    }

    pub async fn list(&self) -> Result<Vec<Job>> {
        let (kvs, _) = self.store.get_prefix(keys::JOBS_PREFIX).await?;
        let jobs = kvs
            .into_iter()
            .filter_map(|kv| match Job::from_json(&kv.value) {
                Ok(job) => Some(job),
                Err(e) => {
                    warn!(key = %kv.key, error = %e, "skipping undecodable job definition");
                    None
                }
            })
            .collect();
        Ok(jobs)
    }

    /// Drop a kill marker for the named job. The marker is bound to a short
    /// lease, so it cleans itself up once the workers have seen it.
    pub async fn kill(&self, name: &str) -> Result<()> {
        let lease = self
            .store
            .grant_lease(Duration::from_secs(defaults::KILL_MARKER_TTL_SECONDS))
            .await?;
        self.store
            .put_with_lease(&keys::kill_key(name), "", lease)
            .await?;
        info!(job = %name, "kill marker written");
        Ok(())
    }
}
