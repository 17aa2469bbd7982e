//! The scheduling control loop.
//!
//! Single task, exclusive owner of the schedule table (job name -> plan) and
//! the executing table (job name -> in-flight run). Everything that touches
//! those tables - definition changes, kill requests, fire ticks, run results
//! - arrives through this loop one event at a time, so no locking is needed
//! and updates never interleave.
//!
//! Overlap policy: a tick for a job that is still executing is dropped
//! outright. No queueing, no catch-up; the next fire time advances normally.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use common::constants::defaults;
use common::job::{Job, JobEvent};

use crate::executor::Executor;
use crate::log_sink::LogAppender;
use crate::types::{ExecuteInfo, ExecuteResult, RunError, SchedulePlan};

pub struct Scheduler {
    plans: HashMap<String, SchedulePlan>,
    executing: HashMap<String, ExecuteInfo>,
    events: mpsc::Receiver<JobEvent>,
    results: mpsc::Receiver<ExecuteResult>,
    result_tx: mpsc::Sender<ExecuteResult>,
    executor: Executor,
    logs: LogAppender,
    idle_wait: Duration,
}

impl Scheduler {
    pub fn new(events: mpsc::Receiver<JobEvent>, executor: Executor, logs: LogAppender) -> Self {
        let (result_tx, results) = mpsc::channel(defaults::EVENT_QUEUE_CAPACITY);
        Self {
            plans: HashMap::new(),
            executing: HashMap::new(),
            events,
            results,
            result_tx,
            executor,
            logs,
            idle_wait: Duration::from_millis(defaults::IDLE_WAIT_MS),
        }
    }

    /// Run until the event stream closes (which means the watcher lost the
    /// store - fatal; restarting the process is an operational concern).
    pub async fn run(mut self) {
        info!("scheduler loop started");
        loop {
            let wait = self.next_wait(Utc::now());
            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                event = self.events.recv() => match event {
                    Some(event) => self.handle_event(event),
                    None => {
                        error!("job event stream closed, stopping scheduler");
                        break;
                    }
                },
                result = self.results.recv() => {
                    if let Some(result) = result {
                        self.handle_result(result);
                    }
                }
            }
            self.fire_due(Utc::now());
        }
    }

    /// Time until the earliest planned fire, or the idle default.
    fn next_wait(&self, now: DateTime<Utc>) -> Duration {
        match self.plans.values().map(|plan| plan.next_fire).min() {
            Some(earliest) if earliest <= now => Duration::ZERO,
            Some(earliest) => (earliest - now).to_std().unwrap_or(Duration::ZERO),
            None => self.idle_wait,
        }
    }

    /// Start every due plan and advance its next fire time.
    fn fire_due(&mut self, now: DateTime<Utc>) {
        let due: Vec<String> = self
            .plans
            .iter()
            .filter(|(_, plan)| plan.next_fire <= now)
            .map(|(name, _)| name.clone())
            .collect();

        for name in due {
            let (job, planned) = match self.plans.get(&name) {
                Some(plan) => (plan.job.clone(), plan.next_fire),
                None => continue,
            };
            self.try_start(job, planned, now);

            if let Some(plan) = self.plans.get_mut(&name) {
                if !plan.advance(now) {
                    warn!(job = %name, "schedule has no future occurrence, dropping plan");
                    self.plans.remove(&name);
                }
            }
        }
    }

    fn try_start(&mut self, job: Job, planned: DateTime<Utc>, now: DateTime<Utc>) {
        if self.executing.contains_key(&job.name) {
            debug!(job = %job.name, "previous run still executing, tick dropped");
            return;
        }

        let info = ExecuteInfo::new(job, planned, now);
        info!(job = %info.job.name, planned = %info.planned_time, "starting job");
        self.executing.insert(info.job.name.clone(), info.clone());
        self.executor.dispatch(info, self.result_tx.clone());
    }

    fn handle_event(&mut self, event: JobEvent) {
        match event {
            JobEvent::Save(job) => match SchedulePlan::new(job.clone(), Utc::now()) {
                Ok(plan) => {
                    info!(job = %job.name, next = %plan.next_fire, "job schedule updated");
                    self.plans.insert(job.name.clone(), plan);
                }
                Err(e) => {
                    // keep whatever plan we had; a bad update must not take
                    // a working job off the schedule
                    warn!(job = %job.name, error = %e, "ignoring job update");
                }
            },
            JobEvent::Delete(name) => {
                if self.plans.remove(&name).is_some() {
                    info!(job = %name, "job unscheduled");
                }
                // an in-flight run of the deleted job finishes normally
            }
            JobEvent::Kill(name) => match self.executing.get(&name) {
                Some(info) => {
                    warn!(job = %name, "kill requested, cancelling run");
                    info.cancel.cancel();
                }
                None => debug!(job = %name, "kill requested but job not running"),
            },
        }
    }

    fn handle_result(&mut self, result: ExecuteResult) {
        self.executing.remove(&result.info.job.name);

        match &result.error {
            Some(RunError::LockBusy) => {
                // lost the fleet-wide race; the run happened elsewhere and
                // leaves no record here
                debug!(job = %result.info.job.name, "run skipped, lock held elsewhere");
            }
            Some(e) => {
                warn!(job = %result.info.job.name, error = %e, "job run failed");
                self.logs.append(result.to_log_record());
            }
            None => {
                info!(
                    job = %result.info.job.name,
                    duration_ms = (result.end - result.start).num_milliseconds(),
                    "job run finished"
                );
                self.logs.append(result.to_log_record());
            }
        }
    }
}
