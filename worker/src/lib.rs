//! Worker-side scheduling engine.
//!
//! A worker process keeps an in-memory schedule synchronized with the
//! coordination store, fires jobs at their cron instants, and guarantees that
//! no job runs on two workers at once through a lease-backed distributed
//! lock. Finished runs are batched into the log store.
//!
//! Component wiring (see `main.rs`):
//! - `watcher` feeds job save/delete and kill events to `scheduler`
//! - `scheduler` owns the schedule and executing tables and dispatches runs
//!   to `executor`
//! - `executor` takes the per-job lock, runs the command, and reports exactly
//!   one result per dispatch
//! - `log_sink` persists results in batches
//! - `register` advertises the worker's presence under an ephemeral key

pub mod config;
pub mod executor;
pub mod lock;
pub mod log_sink;
pub mod register;
pub mod scheduler;
pub mod types;
pub mod watcher;
