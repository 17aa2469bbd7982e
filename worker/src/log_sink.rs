//! Batched persistence of finished-run records.
//!
//! The sink is its own single-threaded loop and the sole owner of the open
//! batch. A batch commits when it reaches the size threshold or when its
//! timer fires, whichever comes first. The timer never commits directly: it
//! posts the batch id back into the loop, and the loop ignores the
//! notification if that batch was already committed by size - the stale
//! notification must not commit a second time.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use common::logstore::LogStore;
use common::records::LogRecord;

/// Cheap cloneable handle for submitting records to the sink.
#[derive(Clone)]
pub struct LogAppender {
    tx: mpsc::Sender<LogRecord>,
}

impl LogAppender {
    pub fn new(tx: mpsc::Sender<LogRecord>) -> Self {
        Self { tx }
    }

    /// Non-blocking; a full queue drops the record. Logging must never stall
    /// job execution.
    pub fn append(&self, record: LogRecord) {
        let _ = self.tx.try_send(record);
    }
}

struct Batch {
    id: u64,
    records: Vec<LogRecord>,
}

pub struct LogSink {
    store: LogStore,
    batch_size: usize,
    commit_timeout: Duration,
    records: mpsc::Receiver<LogRecord>,
    commit_tx: mpsc::Sender<u64>,
    commit_rx: mpsc::Receiver<u64>,
    open: Option<Batch>,
    next_batch_id: u64,
    timer: Option<JoinHandle<()>>,
}

impl LogSink {
    pub fn new(
        store: LogStore,
        batch_size: usize,
        commit_timeout: Duration,
        queue_capacity: usize,
    ) -> (LogAppender, Self) {
        let (tx, records) = mpsc::channel(queue_capacity);
        let (commit_tx, commit_rx) = mpsc::channel(16);
        let sink = Self {
            store,
            batch_size,
            commit_timeout,
            records,
            commit_tx,
            commit_rx,
            open: None,
            next_batch_id: 1,
            timer: None,
        };
        (LogAppender::new(tx), sink)
    }

    /// Run until every appender is dropped, then flush the open batch.
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                record = self.records.recv() => match record {
                    Some(record) => self.on_record(record).await,
                    None => break,
                },
                Some(batch_id) = self.commit_rx.recv() => {
                    self.on_commit_timeout(batch_id).await;
                }
            }
        }
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        if let Some(batch) = self.open.take() {
            self.commit(batch).await;
        }
        info!("log sink stopped");
    }

    async fn on_record(&mut self, record: LogRecord) {
        let mut batch = match self.open.take() {
            Some(batch) => batch,
            None => self.open_batch(),
        };

        batch.records.push(record);
        if batch.records.len() >= self.batch_size {
            if let Some(timer) = self.timer.take() {
                timer.abort();
            }
            debug!(batch = batch.id, "batch full, committing");
            self.commit(batch).await;
        } else {
            self.open = Some(batch);
        }
    }

    fn open_batch(&mut self) -> Batch {
        let id = self.next_batch_id;
        self.next_batch_id += 1;

        // the timer only posts a notification; committing stays serialized
        // in this loop where it can be checked against the open batch
        let commit_tx = self.commit_tx.clone();
        let timeout = self.commit_timeout;
        self.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let _ = commit_tx.send(id).await;
        }));

        Batch {
            id,
            records: Vec::with_capacity(self.batch_size),
        }
    }

    async fn on_commit_timeout(&mut self, batch_id: u64) {
        match self.open.take() {
            Some(batch) if batch.id == batch_id => {
                debug!(batch = batch_id, "commit timeout reached");
                self.timer = None;
                self.commit(batch).await;
            }
            still_open => {
                // the referenced batch was already committed by size
                debug!(batch = batch_id, "stale commit notification ignored");
                self.open = still_open;
            }
        }
    }

    async fn commit(&mut self, batch: Batch) {
        if let Err(e) = self.store.insert_batch(&batch.records).await {
            // best effort: the records are lost, job execution is unaffected
            error!(batch = batch.id, records = batch.records.len(), error = %e, "log batch dropped");
            return;
        }
        debug!(batch = batch.id, records = batch.records.len(), "log batch committed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(i: i64) -> LogRecord {
        LogRecord {
            job_name: "job1".to_string(),
            command: "echo hi".to_string(),
            error: String::new(),
            output: String::new(),
            planned_time: i,
            scheduled_time: i,
            start_time: i,
            end_time: i,
        }
    }

    async fn sink(dir: &TempDir, batch_size: usize) -> (LogSink, LogStore) {
        let path = dir.path().join("logs.db");
        let store = LogStore::connect(path.to_str().unwrap()).await.unwrap();
        let (_appender, sink) =
            LogSink::new(store.clone(), batch_size, Duration::from_secs(30), 16);
        (sink, store)
    }

    #[tokio::test]
    async fn commit_notifications_are_matched_by_batch_identity() {
        let dir = TempDir::new().unwrap();
        let (mut sink, store) = sink(&dir, 2).await;

        // batch 1 fills and commits by size
        sink.on_record(record(0)).await;
        sink.on_record(record(1)).await;
        assert!(sink.open.is_none());

        // batch 2 opens; batch 1's late timer notification must not touch it
        sink.on_record(record(2)).await;
        sink.on_commit_timeout(1).await;
        assert!(
            sink.open.is_some(),
            "a stale notification must not commit the open batch"
        );

        // batch 2's own notification commits it
        sink.on_commit_timeout(2).await;
        assert!(sink.open.is_none());

        let logs = store.list_logs("job1", 0, 100).await.unwrap();
        assert_eq!(logs.len(), 3, "every record committed exactly once");
    }

    #[tokio::test]
    async fn notification_for_an_unknown_batch_is_a_no_op() {
        let dir = TempDir::new().unwrap();
        let (mut sink, store) = sink(&dir, 10).await;

        sink.on_commit_timeout(7).await;
        sink.on_record(record(0)).await;
        sink.on_commit_timeout(99).await;
        assert!(sink.open.is_some());

        let logs = store.list_logs("job1", 0, 100).await.unwrap();
        assert!(logs.is_empty());
    }
}
