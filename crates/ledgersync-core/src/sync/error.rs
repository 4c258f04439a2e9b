use thiserror::Error;

use crate::models::{DatasetKind, EntryId};
use crate::remote::RemoteError;

/// Errors surfaced by the sync orchestrator.
///
/// None of these are fatal: after `Transport`, `Conflict` and
/// `UnreadableRemote` the local mutation has still been applied and
/// persisted. After the other variants local state is untouched.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Transport error: {0}")]
    Transport(RemoteError),

    #[error("Remote blob changed concurrently: {0}")]
    Conflict(String),

    #[error("Invalid backup: {0}")]
    Validation(String),

    /// The remote blob exists but is not a ledger this crate can read.
    /// Nothing is written over it until a pull succeeds.
    #[error("Remote blob is unreadable, refusing to overwrite it: {0}")]
    UnreadableRemote(String),

    #[error("Amount {amount} in {dataset} is not a finite number")]
    InvalidAmount { dataset: DatasetKind, amount: f64 },

    #[error("No {dataset} entry with key {key}")]
    NotFound { dataset: DatasetKind, key: String },

    #[error("An entry with id {id} already exists in {dataset}")]
    DuplicateId { dataset: DatasetKind, id: EntryId },

    #[error("Cannot apply update to {dataset} entry {id}: {message}")]
    InvalidUpdate {
        dataset: DatasetKind,
        id: EntryId,
        message: String,
    },

    #[error("Failed to encode ledger: {0}")]
    Encode(#[from] serde_json::Error),
}

impl From<RemoteError> for SyncError {
    fn from(error: RemoteError) -> Self {
        match error {
            RemoteError::Conflict(path) => SyncError::Conflict(path),
            other => SyncError::Transport(other),
        }
    }
}

impl SyncError {
    pub fn not_found(dataset: DatasetKind, key: impl ToString) -> Self {
        SyncError::NotFound {
            dataset,
            key: key.to_string(),
        }
    }

    /// True when the local change was kept but could not reach the remote.
    pub fn kept_locally(&self) -> bool {
        matches!(
            self,
            SyncError::Transport(_) | SyncError::Conflict(_) | SyncError::UnreadableRemote(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_conflict_becomes_sync_conflict() {
        let err: SyncError = RemoteError::Conflict("data/gastos.json".into()).into();
        assert!(matches!(err, SyncError::Conflict(ref p) if p == "data/gastos.json"));
        assert!(err.kept_locally());

        let err: SyncError = RemoteError::Timeout.into();
        assert!(matches!(err, SyncError::Transport(RemoteError::Timeout)));
    }

    #[test]
    fn test_error_display() {
        let err = SyncError::not_found(DatasetKind::Expenses, 42);
        assert_eq!(err.to_string(), "No expenses entry with key 42");
        assert!(!err.kept_locally());

        let err = SyncError::InvalidAmount {
            dataset: DatasetKind::Expenses,
            amount: f64::NAN,
        };
        assert_eq!(err.to_string(), "Amount NaN in expenses is not a finite number");
        assert!(!err.kept_locally());
        assert!(SyncError::UnreadableRemote("entry 0".into()).kept_locally());
    }
}
