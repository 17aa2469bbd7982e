//! Job command execution.
//!
//! Every dispatch runs on its own task so the scheduler loop never blocks.
//! The sequence per run: random jitter sleep (levels the lock race between
//! workers with skewed clocks), take the distributed lock, run the command
//! under the run's cancellation token, release the lock, and push exactly one
//! result back to the scheduler - the result is what clears the executing
//! table, so it is produced on every path.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::warn;

use common::errors::LockError;
use common::store::KvStore;

use crate::lock::JobLock;
use crate::types::{ExecuteInfo, ExecuteResult, RunError};

#[derive(Clone)]
pub struct Executor {
    store: Arc<dyn KvStore>,
    lock_ttl: Duration,
    jitter_ms: u64,
}

impl Executor {
    pub fn new(store: Arc<dyn KvStore>, lock_ttl: Duration, jitter_ms: u64) -> Self {
        Self {
            store,
            lock_ttl,
            jitter_ms,
        }
    }

    /// Run `info` on a fresh task, reporting the result on `results`.
    pub fn dispatch(&self, info: ExecuteInfo, results: mpsc::Sender<ExecuteResult>) {
        let executor = self.clone();
        tokio::spawn(async move {
            let job_name = info.job.name.clone();
            let result = executor.execute(info).await;
            if results.send(result).await.is_err() {
                warn!(job = %job_name, "scheduler gone, execute result dropped");
            }
        });
    }

    async fn execute(&self, info: ExecuteInfo) -> ExecuteResult {
        if self.jitter_ms > 0 {
            let jitter = rand::rng().random_range(0..self.jitter_ms);
            tokio::time::sleep(Duration::from_millis(jitter)).await;
        }

        let mut lock = JobLock::new(self.store.clone(), &info.job.name, self.lock_ttl);
        match lock.try_lock().await {
            Err(LockError::Busy { .. }) => {
                let now = Utc::now();
                ExecuteResult {
                    info,
                    output: String::new(),
                    error: Some(RunError::LockBusy),
                    start: now,
                    end: now,
                }
            }
            Err(LockError::Store(e)) => {
                let now = Utc::now();
                ExecuteResult {
                    info,
                    output: String::new(),
                    error: Some(RunError::Lock(e.to_string())),
                    start: now,
                    end: now,
                }
            }
            Ok(()) => {
                // holding the lock; restart the clock so the record reflects
                // actual execution, not the lock wait
                let start = Utc::now();
                let (output, error) = run_command(&info).await;
                let end = Utc::now();
                lock.unlock().await;
                ExecuteResult {
                    info,
                    output,
                    error,
                    start,
                    end,
                }
            }
        }
    }
}

/// Run the job's shell command, cancellable through the run's token.
async fn run_command(info: &ExecuteInfo) -> (String, Option<RunError>) {
    let mut command = Command::new("sh");
    command
        .arg("-c")
        .arg(&info.job.command)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    command.process_group(0);

    let child = match command.spawn() {
        Ok(child) => child,
        Err(e) => {
            return (
                String::new(),
                Some(RunError::Command(format!("spawn failed: {}", e))),
            )
        }
    };
    let pid = child.id();

    let wait = child.wait_with_output();
    tokio::pin!(wait);

    let output = tokio::select! {
        output = &mut wait => output,
        _ = info.cancel.cancelled() => {
            kill_process_group(pid);
            // reap the child and keep whatever output it produced
            let output = wait.await;
            let partial = output
                .as_ref()
                .map(combined_output)
                .unwrap_or_default();
            return (partial, Some(RunError::Command("killed".to_string())));
        }
    };

    match output {
        Ok(output) if output.status.success() => (combined_output(&output), None),
        Ok(output) => {
            let status = output.status;
            (
                combined_output(&output),
                Some(RunError::Command(status.to_string())),
            )
        }
        Err(e) => (String::new(), Some(RunError::Command(e.to_string()))),
    }
}

fn combined_output(output: &std::process::Output) -> String {
    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));
    text
}

/// SIGKILL the command's whole process group so shell children die with it.
#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    if let Some(pid) = pid {
        unsafe {
            libc::kill(-(pid as libc::pid_t), libc::SIGKILL);
        }
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) {}
