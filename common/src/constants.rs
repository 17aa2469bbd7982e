//! Key-space layout and tunable defaults shared across master and workers.

/// Coordination-store key namespaces.
///
/// Every key the system writes lives under one of these prefixes. The job
/// name (or worker id) is appended verbatim, so `extract_name` is the inverse
/// of the `*_key` builders.
pub mod keys {
    /// Job definitions, one key per job name.
    pub const JOBS_PREFIX: &str = "/cron/jobs/";

    /// Short-lived kill markers; existence of a key requests cancellation.
    pub const KILL_PREFIX: &str = "/cron/kill/";

    /// Fleet-wide job locks; existence of a key means the lock is held.
    pub const LOCK_PREFIX: &str = "/cron/lock/";

    /// Worker registrations, one ephemeral key per live worker.
    pub const WORKERS_PREFIX: &str = "/cron/workers/";

    pub fn job_key(name: &str) -> String {
        format!("{JOBS_PREFIX}{name}")
    }

    pub fn kill_key(name: &str) -> String {
        format!("{KILL_PREFIX}{name}")
    }

    pub fn lock_key(name: &str) -> String {
        format!("{LOCK_PREFIX}{name}")
    }

    pub fn worker_key(id: &str) -> String {
        format!("{WORKERS_PREFIX}{id}")
    }

    /// Strip a namespace prefix from a key, yielding the job name / worker id.
    pub fn extract_name<'a>(key: &'a str, prefix: &str) -> &'a str {
        key.strip_prefix(prefix).unwrap_or(key)
    }
}

/// Default tunables; each has a matching config field on the owning binary.
pub mod defaults {
    /// TTL of the lease backing a job lock.
    pub const LOCK_TTL_SECONDS: u64 = 5;

    /// TTL of the lease backing a worker registration.
    pub const REGISTER_TTL_SECONDS: u64 = 10;

    /// TTL of the lease backing a kill marker; markers self-expire.
    pub const KILL_MARKER_TTL_SECONDS: u64 = 1;

    /// Records per log batch before an immediate commit.
    pub const LOG_BATCH_SIZE: usize = 100;

    /// Milliseconds an open log batch may wait before a timeout commit.
    pub const LOG_COMMIT_TIMEOUT_MS: u64 = 1000;

    /// Capacity of the log append queue; `append` drops when full.
    pub const LOG_QUEUE_CAPACITY: usize = 1000;

    /// Capacity of the scheduler's job/kill event queue.
    pub const EVENT_QUEUE_CAPACITY: usize = 1000;

    /// Upper bound of the random pre-lock jitter sleep.
    pub const EXECUTE_JITTER_MS: u64 = 1000;

    /// Scheduler wait when no jobs are planned.
    pub const IDLE_WAIT_MS: u64 = 1000;
}

/// Query limits for the log API.
pub mod limits {
    pub const DEFAULT_LOG_PAGE_SIZE: i64 = 20;
    pub const MAX_LOG_PAGE_SIZE: i64 = 1000;
}
