//! Offline-first synchronization of the ledger with its remote blob.
//!
//! - `SyncManager`: owns the in-memory ledger and runs the pull and push protocols
//! - `Scheduler`: periodic and focus-triggered pulls on a background task
//! - `StatusBus`: connectivity status with synchronous observers
//! - `IdGenerator`: strictly increasing entry identifiers

pub mod error;
pub mod ids;
pub mod manager;
pub mod scheduler;
pub mod status;

pub use error::SyncError;
pub use ids::IdGenerator;
pub use manager::{PushOutcome, SyncManager, SyncOptions, DEFAULT_REQUEST_TIMEOUT, MAX_QUICK_ENTRIES};
pub use scheduler::{Scheduler, SchedulerHandle, DEFAULT_SYNC_INTERVAL};
pub use status::{StatusBus, Subscription, SyncStatus};
