//! SQLite-backed job-run log store.
//!
//! The worker log sink writes whole batches with a single bulk INSERT; the
//! master serves paginated queries sorted by start time descending. Both
//! sides open the store through this type so the schema has one source of
//! truth.

use std::path::Path;

use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::info;

use crate::errors::LogStoreError;
use crate::records::LogRecord;

#[derive(Debug, Clone)]
pub struct LogStore {
    pool: SqlitePool,
}

impl LogStore {
    /// Open (creating if needed) the log database at `database_path`.
    pub async fn connect(database_path: &str) -> Result<Self, LogStoreError> {
        if let Some(parent) = Path::new(database_path).parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| LogStoreError::Commit {
                        reason: format!("creating {}: {}", parent.display(), e),
                    })?;
            }
        }

        let database_url = format!("sqlite:{}?mode=rwc", database_path);
        let pool = SqlitePool::connect(&database_url).await?;

        let store = Self { pool };
        store.initialize_tables().await?;
        info!("Log store ready at {}", database_path);
        Ok(store)
    }

    /// Expose the pool for integration test queries.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn initialize_tables(&self) -> Result<(), LogStoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS job_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                job_name TEXT NOT NULL,
                command TEXT NOT NULL,
                error TEXT NOT NULL,
                output TEXT NOT NULL,
                planned_time INTEGER NOT NULL,
                scheduled_time INTEGER NOT NULL,
                start_time INTEGER NOT NULL,
                end_time INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_job_logs_name_start \
             ON job_logs(job_name, start_time DESC)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Persist a batch of records with one bulk INSERT.
    pub async fn insert_batch(&self, records: &[LogRecord]) -> Result<(), LogStoreError> {
        if records.is_empty() {
            return Ok(());
        }

        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
            "INSERT INTO job_logs \
             (job_name, command, error, output, planned_time, scheduled_time, start_time, end_time) ",
        );
        builder.push_values(records, |mut row, record| {
            row.push_bind(&record.job_name)
                .push_bind(&record.command)
                .push_bind(&record.error)
                .push_bind(&record.output)
                .push_bind(record.planned_time)
                .push_bind(record.scheduled_time)
                .push_bind(record.start_time)
                .push_bind(record.end_time);
        });

        builder.build().execute(&self.pool).await?;
        Ok(())
    }

    /// Records for one job, newest start time first.
    pub async fn list_logs(
        &self,
        job_name: &str,
        skip: i64,
        limit: i64,
    ) -> Result<Vec<LogRecord>, LogStoreError> {
        let records = sqlx::query_as::<_, LogRecord>(
            "SELECT job_name, command, error, output, \
                    planned_time, scheduled_time, start_time, end_time \
             FROM job_logs WHERE job_name = ? \
             ORDER BY start_time DESC LIMIT ? OFFSET ?",
        )
        .bind(job_name)
        .bind(limit)
        .bind(skip)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| LogStoreError::Query {
            reason: e.to_string(),
        })?;

        Ok(records)
    }
}
