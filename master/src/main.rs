use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use common::logstore::LogStore;
use common::store::{KvStore, MemoryStore};
use master::api::{self, AppState};
use master::config::MasterConfig;
use master::jobs::JobManager;
use master::workers::WorkerRegistry;

#[tokio::main]
async fn main() -> Result<()> {
    let env_filter = EnvFilter::from_default_env()
        .add_directive("master=info".parse()?)
        .add_directive("common=info".parse()?)
        .add_directive("tower_http=warn".parse()?)
        .add_directive("sqlx=warn".parse()?);
    fmt().with_env_filter(env_filter).init();

    info!("Starting cron master");

    let config_path =
        std::env::var("MASTER_CONFIG").unwrap_or_else(|_| "config/master.toml".to_string());
    let config = MasterConfig::load_or_default(&config_path);

    // Single-process development wiring; a deployment implements KvStore
    // against its coordination service and swaps it in here.
    let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
    warn!("using embedded in-process coordination store");

    let logs = LogStore::connect(&config.database_path).await?;

    let state = Arc::new(AppState {
        jobs: JobManager::new(store.clone()),
        workers: WorkerRegistry::new(store.clone()),
        logs,
    });

    api::serve(state, &config.bind_addr()).await
}
