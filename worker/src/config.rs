//! Worker configuration, loaded from a TOML file with defaults for every
//! field so a missing file still yields a runnable worker.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use common::constants::defaults;

#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    /// Identity under the workers prefix; generated when not configured.
    #[serde(default = "default_worker_id")]
    pub id: String,

    /// SQLite database the log sink writes to.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    #[serde(default = "default_log_batch_size")]
    pub log_batch_size: usize,

    #[serde(default = "default_log_commit_timeout_ms")]
    pub log_commit_timeout_ms: u64,

    #[serde(default = "default_lock_ttl_seconds")]
    pub lock_ttl_seconds: u64,

    #[serde(default = "default_register_ttl_seconds")]
    pub register_ttl_seconds: u64,

    /// Upper bound of the random sleep before each lock attempt.
    #[serde(default = "default_execute_jitter_ms")]
    pub execute_jitter_ms: u64,
}

fn default_worker_id() -> String {
    format!("worker-{}", Uuid::new_v4())
}

fn default_database_path() -> String {
    "data/cron.db".to_string()
}

fn default_log_batch_size() -> usize {
    defaults::LOG_BATCH_SIZE
}

fn default_log_commit_timeout_ms() -> u64 {
    defaults::LOG_COMMIT_TIMEOUT_MS
}

fn default_lock_ttl_seconds() -> u64 {
    defaults::LOCK_TTL_SECONDS
}

fn default_register_ttl_seconds() -> u64 {
    defaults::REGISTER_TTL_SECONDS
}

fn default_execute_jitter_ms() -> u64 {
    defaults::EXECUTE_JITTER_MS
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            id: default_worker_id(),
            database_path: default_database_path(),
            log_batch_size: default_log_batch_size(),
            log_commit_timeout_ms: default_log_commit_timeout_ms(),
            lock_ttl_seconds: default_lock_ttl_seconds(),
            register_ttl_seconds: default_register_ttl_seconds(),
            execute_jitter_ms: default_execute_jitter_ms(),
        }
    }
}

impl WorkerConfig {
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading worker config from '{}'", path))?;
        toml::from_str(&content).with_context(|| format!("parsing worker config '{}'", path))
    }

    pub fn load_or_default(path: &str) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                info!("{:#}; using default worker configuration", e);
                Self::default()
            }
        }
    }

    pub fn lock_ttl(&self) -> Duration {
        Duration::from_secs(self.lock_ttl_seconds)
    }

    pub fn register_ttl(&self) -> Duration {
        Duration::from_secs(self.register_ttl_seconds)
    }

    pub fn log_commit_timeout(&self) -> Duration {
        Duration::from_millis(self.log_commit_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_gets_full_defaults() {
        let config: WorkerConfig = toml::from_str("").unwrap();
        assert_eq!(config.log_batch_size, defaults::LOG_BATCH_SIZE);
        assert_eq!(config.lock_ttl_seconds, defaults::LOCK_TTL_SECONDS);
        assert!(config.id.starts_with("worker-"));
    }

    #[test]
    fn configured_values_override_defaults() {
        let config: WorkerConfig = toml::from_str(
            r#"
            id = "worker-a"
            log_batch_size = 7
            log_commit_timeout_ms = 250
            "#,
        )
        .unwrap();
        assert_eq!(config.id, "worker-a");
        assert_eq!(config.log_batch_size, 7);
        assert_eq!(config.log_commit_timeout(), Duration::from_millis(250));
        assert_eq!(config.register_ttl_seconds, defaults::REGISTER_TTL_SECONDS);
    }
}
