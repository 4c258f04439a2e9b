//! Remote blob store access.
//!
//! This module provides the `RemoteBlobStore` trait, a stateless transport
//! for reading a versioned JSON blob and writing it back with optimistic
//! concurrency, plus two implementations:
//!
//! - `GitHubBlobClient`: the repository contents API (version token = blob SHA)
//! - `MemoryBlobStore`: an in-process store with the same conditional-write rules
//!
//! Clients never retry; retry policy belongs to the sync orchestrator.

pub mod error;
pub mod github;
pub mod memory;
pub mod store;

pub use error::RemoteError;
pub use github::{BlobLocation, GitHubBlobClient};
pub use memory::{MemoryBlobStore, WriteAttempt};
pub use store::{RemoteBlobStore, VersionToken};
