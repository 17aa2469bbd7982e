//! Scheduling and execution state types.

use chrono::{DateTime, Utc};
use cron::Schedule;
use tokio_util::sync::CancellationToken;

use common::cronexpr;
use common::errors::ScheduleError;
use common::job::Job;
use common::records::LogRecord;

/// One known job plus its parsed schedule and precomputed next fire time.
#[derive(Debug, Clone)]
pub struct SchedulePlan {
    pub job: Job,
    pub schedule: Schedule,
    pub next_fire: DateTime<Utc>,
}

impl SchedulePlan {
    pub fn new(job: Job, now: DateTime<Utc>) -> Result<Self, ScheduleError> {
        let schedule = cronexpr::parse(&job.cron_expr)?;
        let next_fire =
            cronexpr::next_after(&schedule, now).ok_or_else(|| ScheduleError::Parse {
                expr: job.cron_expr.clone(),
                reason: "no upcoming fire time".to_string(),
            })?;
        Ok(Self {
            job,
            schedule,
            next_fire,
        })
    }

    /// Move `next_fire` past `now`. False when the schedule has run out of
    /// future occurrences.
    pub fn advance(&mut self, now: DateTime<Utc>) -> bool {
        match cronexpr::next_after(&self.schedule, now) {
            Some(next) => {
                self.next_fire = next;
                true
            }
            None => false,
        }
    }
}

/// A dispatched run, tracked in the executing table until its result lands.
#[derive(Debug, Clone)]
pub struct ExecuteInfo {
    pub job: Job,
    /// The cron instant this run was computed for.
    pub planned_time: DateTime<Utc>,
    /// When the scheduler actually dispatched it.
    pub scheduled_time: DateTime<Utc>,
    /// Cooperative cancellation handle, fired by kill events.
    pub cancel: CancellationToken,
}

impl ExecuteInfo {
    pub fn new(job: Job, planned_time: DateTime<Utc>, scheduled_time: DateTime<Utc>) -> Self {
        Self {
            job,
            planned_time,
            scheduled_time,
            cancel: CancellationToken::new(),
        }
    }
}

/// Why a run produced no clean output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunError {
    /// Another worker held the job lock; the run was skipped.
    LockBusy,

    /// The lock could not be taken for store-side reasons.
    Lock(String),

    /// The command failed to spawn, exited nonzero, or was killed.
    Command(String),
}

impl std::fmt::Display for RunError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunError::LockBusy => write!(f, "lock already held by another worker"),
            RunError::Lock(reason) => write!(f, "lock acquisition failed: {}", reason),
            RunError::Command(reason) => write!(f, "{}", reason),
        }
    }
}

/// The single result every dispatched run reports back, whatever happened.
#[derive(Debug)]
pub struct ExecuteResult {
    pub info: ExecuteInfo,
    pub output: String,
    pub error: Option<RunError>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl ExecuteResult {
    pub fn to_log_record(&self) -> LogRecord {
        LogRecord {
            job_name: self.info.job.name.clone(),
            command: self.info.job.command.clone(),
            error: self
                .error
                .as_ref()
                .map(|e| e.to_string())
                .unwrap_or_default(),
            output: self.output.clone(),
            planned_time: self.info.planned_time.timestamp_millis(),
            scheduled_time: self.info.scheduled_time.timestamp_millis(),
            start_time: self.start.timestamp_millis(),
            end_time: self.end.timestamp_millis(),
        }
    }
}
