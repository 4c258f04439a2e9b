//! Durable local cache for offline ledger access.
//!
//! This module provides the `CacheStore` trait and two implementations:
//! - `FileCacheStore`: one JSON file per dataset, survives restarts
//! - `MemoryCacheStore`: process-local, used by tests and throwaway sessions
//!
//! Stored keys:
//! - Incomes, expenses, budgets, prior balances, quick entries
//! - The last-sync marker

pub mod file;
pub mod memory;
pub mod store;

pub use file::{CacheAges, CachedData, FileCacheStore};
pub use memory::MemoryCacheStore;
pub use store::{load_cache, persist_cache, CacheStore, StoreKey};
