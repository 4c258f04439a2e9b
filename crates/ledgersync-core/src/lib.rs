//! Core library for ledgersync.
//!
//! An offline-first personal-finance ledger whose source of truth is a single
//! JSON blob in a Git repository. Every change lands in a durable local cache
//! first and is then pushed with an optimistic-concurrency write; pulls
//! replace local datasets with whatever the remote blob holds.
//!
//! - `models`: ledger entries, quick entries and the cache aggregate
//! - `cache`: the durable local cache store
//! - `remote`: the versioned blob transport
//! - `sync`: the orchestrator, scheduler and status bus
//! - `backup`: portable snapshots for export and import
//! - `config`, `auth`: configuration and write-credential storage

pub mod auth;
pub mod backup;
pub mod cache;
pub mod config;
pub mod models;
pub mod remote;
pub mod sync;
pub mod utils;

pub use config::Config;
pub use sync::{PushOutcome, Scheduler, SchedulerHandle, SyncError, SyncManager, SyncOptions, SyncStatus};
