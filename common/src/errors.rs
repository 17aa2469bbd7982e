//! Structured error types for the cron fleet.
//!
//! Failures scoped to a single job (bad cron expression, lost lock race,
//! failed command) never escalate; only store connectivity problems are fatal
//! to the loop that hits them.

use std::fmt;

/// Coordination-store failures.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreError {
    /// The store is unreachable or an operation failed in transit.
    Connectivity { reason: String },

    /// The store handle or a watch stream has been closed.
    Closed,

    /// A watch was requested from a revision the store no longer retains.
    Compacted {
        requested: i64,
        first_available: i64,
    },

    /// A lease id is unknown to the store (expired or revoked).
    LeaseExpired { lease: i64 },
}

/// Distributed-lock failures.
#[derive(Debug)]
pub enum LockError {
    /// Another worker holds the lock. Never retried.
    Busy { job: String },

    /// The store failed while acquiring or releasing.
    Store(StoreError),
}

/// Cron expression failures.
#[derive(Debug, Clone)]
pub enum ScheduleError {
    /// The expression did not parse or has no upcoming fire time.
    Parse { expr: String, reason: String },
}

/// Log persistence failures. Batches hitting these are dropped, not retried.
#[derive(Debug)]
pub enum LogStoreError {
    Commit { reason: String },
    Query { reason: String },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Connectivity { reason } => {
                write!(f, "store connectivity failure: {}", reason)
            }
            StoreError::Closed => write!(f, "store closed"),
            StoreError::Compacted {
                requested,
                first_available,
            } => {
                write!(
                    f,
                    "watch revision {} compacted away, oldest available is {}",
                    requested, first_available
                )
            }
            StoreError::LeaseExpired { lease } => write!(f, "lease {} expired", lease),
        }
    }
}

impl fmt::Display for LockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockError::Busy { job } => write!(f, "lock for '{}' already held", job),
            LockError::Store(e) => write!(f, "lock store failure: {}", e),
        }
    }
}

impl fmt::Display for ScheduleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduleError::Parse { expr, reason } => {
                write!(f, "invalid cron expression '{}': {}", expr, reason)
            }
        }
    }
}

impl fmt::Display for LogStoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogStoreError::Commit { reason } => write!(f, "log batch commit failed: {}", reason),
            LogStoreError::Query { reason } => write!(f, "log query failed: {}", reason),
        }
    }
}

impl std::error::Error for StoreError {}
impl std::error::Error for LockError {}
impl std::error::Error for ScheduleError {}
impl std::error::Error for LogStoreError {}

impl From<StoreError> for LockError {
    fn from(err: StoreError) -> Self {
        LockError::Store(err)
    }
}

impl From<sqlx::Error> for LogStoreError {
    fn from(err: sqlx::Error) -> Self {
        LogStoreError::Commit {
            reason: err.to_string(),
        }
    }
}
