//! Persisted record types.

use serde::{Deserialize, Serialize};

/// One finished (or skipped) job run, as persisted by the worker log sink and
/// served by the master log API.
///
/// All timestamps are millisecond epoch. `planned_time` is the cron instant
/// the run was computed for, `scheduled_time` when the scheduler dispatched
/// it, `start_time`/`end_time` bracket the actual command execution (equal
/// when the run was skipped on a lost lock race).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord {
    pub job_name: String,
    pub command: String,
    pub error: String,
    pub output: String,
    pub planned_time: i64,
    pub scheduled_time: i64,
    pub start_time: i64,
    pub end_time: i64,
}
