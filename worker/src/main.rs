use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use common::constants::defaults;
use common::logstore::LogStore;
use common::store::{KvStore, MemoryStore};
use worker::config::WorkerConfig;
use worker::executor::Executor;
use worker::log_sink::LogSink;
use worker::register::Register;
use worker::scheduler::Scheduler;
use worker::watcher::JobWatcher;

#[tokio::main]
async fn main() -> Result<()> {
    let env_filter = EnvFilter::from_default_env()
        .add_directive("worker=info".parse()?)
        .add_directive("common=info".parse()?)
        .add_directive("sqlx=warn".parse()?);
    fmt().with_env_filter(env_filter).init();

    info!("Starting cron worker");

    let config_path =
        std::env::var("WORKER_CONFIG").unwrap_or_else(|_| "config/worker.toml".to_string());
    let config = WorkerConfig::load_or_default(&config_path);
    info!(worker = %config.id, "configuration loaded");

    // Single-process development wiring; a deployment implements KvStore
    // against its coordination service and swaps it in here.
    let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
    warn!("using embedded in-process coordination store");

    let log_store = LogStore::connect(&config.database_path).await?;
    let (appender, sink) = LogSink::new(
        log_store,
        config.log_batch_size,
        config.log_commit_timeout(),
        defaults::LOG_QUEUE_CAPACITY,
    );
    tokio::spawn(sink.run());
    info!("log sink started");

    tokio::spawn(Register::new(store.clone(), config.id.clone(), config.register_ttl()).run());

    let (event_tx, event_rx) = mpsc::channel(defaults::EVENT_QUEUE_CAPACITY);
    JobWatcher::new(store.clone()).start(event_tx).await?;
    info!("job watcher started");

    let executor = Executor::new(store.clone(), config.lock_ttl(), config.execute_jitter_ms);
    let scheduler = Scheduler::new(event_rx, executor, appender);

    tokio::select! {
        _ = scheduler.run() => {
            error!("scheduler stopped, exiting");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
    }

    Ok(())
}
