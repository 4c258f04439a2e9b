use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::RemoteError;

/// Opaque, store-assigned identifier of one revision of a blob.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VersionToken(String);

impl VersionToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VersionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A versioned blob store supporting conditional writes.
///
/// Implementations hold no sync state and never retry. Retrying a
/// `conditional_write` with the same expected token either succeeds or
/// fails the same way.
#[async_trait]
pub trait RemoteBlobStore: Send + Sync {
    /// Read the blob at `path`. `Ok(None)` means the blob does not exist yet.
    async fn fetch(&self, path: &str) -> Result<Option<String>, RemoteError>;

    /// Current version token of `path`, or `None` if nothing is stored there.
    async fn fetch_version_token(&self, path: &str) -> Result<Option<VersionToken>, RemoteError>;

    /// Write `content` only if the current token still equals `expected`
    /// (`None` = the path must not exist). Returns the new token.
    async fn conditional_write(
        &self,
        path: &str,
        content: &str,
        expected: Option<&VersionToken>,
        branch: &str,
        message: &str,
    ) -> Result<VersionToken, RemoteError>;

    /// Lightweight reachability probe. Never fails.
    async fn head_check(&self, path: &str) -> bool;
}
