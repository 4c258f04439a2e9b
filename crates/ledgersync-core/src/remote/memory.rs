use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use super::{RemoteBlobStore, RemoteError, VersionToken};

/// One recorded `conditional_write` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteAttempt {
    pub path: String,
    pub expected: Option<VersionToken>,
    pub branch: String,
    pub accepted: bool,
}

#[derive(Debug, Clone)]
struct StoredBlob {
    content: String,
    token: VersionToken,
}

#[derive(Debug, Default)]
struct State {
    blobs: HashMap<String, StoredBlob>,
    next_version: u64,
    unreachable: bool,
    latency: Duration,
    /// A write by "someone else" that lands right before our next write.
    interloper: Option<(String, String, VersionToken)>,
    attempts: Vec<WriteAttempt>,
    fetches: usize,
}

impl State {
    fn mint_token(&mut self) -> VersionToken {
        self.next_version += 1;
        VersionToken::new(format!("v{}", self.next_version))
    }
}

/// In-process versioned blob store with real compare-and-swap semantics.
///
/// Besides backing tests, it can stand in for the remote when the real one
/// must not be touched. Failure modes are switched on explicitly.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    state: Mutex<State>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A panic while holding the lock only happens inside a failing test
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Store `content` at `path` as an outside writer would. Returns the new token.
    pub fn put(&self, path: &str, content: &str) -> VersionToken {
        let mut state = self.lock();
        let token = state.mint_token();
        state.blobs.insert(
            path.to_string(),
            StoredBlob {
                content: content.to_string(),
                token: token.clone(),
            },
        );
        token
    }

    /// Store `content` at `path` under a caller-chosen token.
    pub fn put_with_token(&self, path: &str, content: &str, token: VersionToken) {
        self.lock().blobs.insert(
            path.to_string(),
            StoredBlob {
                content: content.to_string(),
                token,
            },
        );
    }

    /// Have another writer replace `path` after our token read but before our
    /// next conditional write.
    pub fn interleave_next_write(&self, path: &str, content: &str, token: VersionToken) {
        self.lock().interloper = Some((path.to_string(), content.to_string(), token));
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.lock().unreachable = !reachable;
    }

    /// Delay applied to every call, to widen race windows in tests.
    pub fn set_latency(&self, latency: Duration) {
        self.lock().latency = latency;
    }

    pub fn content(&self, path: &str) -> Option<String> {
        self.lock().blobs.get(path).map(|b| b.content.clone())
    }

    pub fn token(&self, path: &str) -> Option<VersionToken> {
        self.lock().blobs.get(path).map(|b| b.token.clone())
    }

    pub fn attempts(&self) -> Vec<WriteAttempt> {
        self.lock().attempts.clone()
    }

    pub fn fetch_count(&self) -> usize {
        self.lock().fetches
    }

    async fn simulate_transport(&self) -> Result<(), RemoteError> {
        let (latency, unreachable) = {
            let state = self.lock();
            (state.latency, state.unreachable)
        };
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if unreachable {
            return Err(RemoteError::Unreachable("memory store offline".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteBlobStore for MemoryBlobStore {
    async fn fetch(&self, path: &str) -> Result<Option<String>, RemoteError> {
        self.simulate_transport().await?;
        let mut state = self.lock();
        state.fetches += 1;
        Ok(state.blobs.get(path).map(|b| b.content.clone()))
    }

    async fn fetch_version_token(&self, path: &str) -> Result<Option<VersionToken>, RemoteError> {
        self.simulate_transport().await?;
        Ok(self.lock().blobs.get(path).map(|b| b.token.clone()))
    }

    async fn conditional_write(
        &self,
        path: &str,
        content: &str,
        expected: Option<&VersionToken>,
        branch: &str,
        _message: &str,
    ) -> Result<VersionToken, RemoteError> {
        self.simulate_transport().await?;
        let mut state = self.lock();

        if let Some((other_path, other_content, other_token)) = state.interloper.take() {
            state.blobs.insert(
                other_path,
                StoredBlob {
                    content: other_content,
                    token: other_token,
                },
            );
        }

        let current = state.blobs.get(path).map(|b| b.token.clone());
        let accepted = current.as_ref() == expected;
        state.attempts.push(WriteAttempt {
            path: path.to_string(),
            expected: expected.cloned(),
            branch: branch.to_string(),
            accepted,
        });
        if !accepted {
            return Err(RemoteError::Conflict(path.to_string()));
        }

        let token = state.mint_token();
        state.blobs.insert(
            path.to_string(),
            StoredBlob {
                content: content.to_string(),
                token: token.clone(),
            },
        );
        Ok(token)
    }

    async fn head_check(&self, _path: &str) -> bool {
        self.simulate_transport().await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PATH: &str = "data/gastos.json";

    #[tokio::test]
    async fn test_create_requires_absent_path() {
        let store = MemoryBlobStore::new();
        let token = store.conditional_write(PATH, "{}", None, "main", "m").await.unwrap();
        assert_eq!(store.token(PATH), Some(token.clone()));

        let err = store.conditional_write(PATH, "{}", None, "main", "m").await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_stale_token_is_rejected() {
        let store = MemoryBlobStore::new();
        let first = store.put(PATH, "one");
        let second = store.put(PATH, "two");
        assert_ne!(first, second);

        assert!(store
            .conditional_write(PATH, "three", Some(&first), "main", "m")
            .await
            .unwrap_err()
            .is_conflict());
        let third = store
            .conditional_write(PATH, "three", Some(&second), "main", "m")
            .await
            .unwrap();
        assert_eq!(store.content(PATH).as_deref(), Some("three"));
        assert_eq!(store.token(PATH), Some(third));
        assert_eq!(store.attempts().len(), 2);
    }

    #[tokio::test]
    async fn test_interleaved_writer_causes_conflict() {
        let store = MemoryBlobStore::new();
        store.put_with_token(PATH, "base", VersionToken::new("abc"));
        let observed = store.fetch_version_token(PATH).await.unwrap();
        store.interleave_next_write(PATH, "theirs", VersionToken::new("def"));

        let err = store
            .conditional_write(PATH, "ours", observed.as_ref(), "main", "m")
            .await
            .unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(store.content(PATH).as_deref(), Some("theirs"));
    }

    #[tokio::test]
    async fn test_unreachable() {
        let store = MemoryBlobStore::new();
        store.set_reachable(false);
        assert!(!store.head_check(PATH).await);
        assert!(store.fetch(PATH).await.is_err());
        assert!(store.fetch_version_token(PATH).await.is_err());

        store.set_reachable(true);
        assert!(store.head_check(PATH).await);
        assert_eq!(store.fetch(PATH).await.unwrap(), None);
    }
}
