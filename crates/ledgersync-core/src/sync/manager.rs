//! The sync orchestrator.
//!
//! `SyncManager` owns the in-memory ledger and is the only writer of the
//! cache store. Every mutation goes memory -> cache store -> remote blob,
//! and the remote step is best effort: when it fails the mutation is kept
//! locally and the status moves to `error` until a later sync succeeds.
//!
//! Pulls and pushes never overlap. A single-flight lock covers each whole
//! protocol run, so concurrent callers queue behind it in arrival order
//! and no two conditional writes can race on the same stale token.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::{watch, Mutex as AsyncMutex};
use tracing::{debug, info, warn};

use crate::backup::{self, ImportSummary};
use crate::cache::{load_cache, persist_cache, CacheStore};
use crate::models::{
    merge_fields, CachePatch, DatasetKind, EntryId, EntryKind, Identified, LedgerCache,
    LedgerEntry, QuickEntry,
};
use crate::remote::{RemoteBlobStore, RemoteError, VersionToken};
use crate::utils::{iso_timestamp, local_timestamp};

use super::ids::IdGenerator;
use super::status::{StatusBus, Subscription, SyncStatus};
use super::SyncError;

// ============================================================================
// Constants
// ============================================================================

/// The quick-entry log keeps only this many of the most recent records.
pub const MAX_QUICK_ENTRIES: usize = 100;

/// Default deadline for a single transport call.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const MSG_LOADING: &str = "Loading data...";
const MSG_LOADED: &str = "Data loaded";
const MSG_LOCAL_FALLBACK: &str = "Using local data";
const MSG_SAVING: &str = "Saving data...";
const MSG_SAVED: &str = "Data saved";
const MSG_REMOTE_UNREADABLE: &str = "Remote data is unreadable";

/// Where the blob lives and how the orchestrator talks to it.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Path of the blob inside the repository.
    pub blob_path: String,
    pub branch: String,
    /// Whether a write credential is configured. Without one every mutation
    /// is local-only and the remote is never written.
    pub write_enabled: bool,
    pub request_timeout: Duration,
}

impl SyncOptions {
    pub fn new(blob_path: impl Into<String>, branch: impl Into<String>) -> Self {
        Self {
            blob_path: blob_path.into(),
            branch: branch.into(),
            write_enabled: false,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_write_enabled(mut self, enabled: bool) -> Self {
        self.write_enabled = enabled;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// How a successful push ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    /// The remote blob now holds the change, at this version.
    Synced(VersionToken),
    /// No write credential; the change was saved locally only.
    LocalOnly,
}

/// What the orchestrator knows about the remote blob's content.
#[derive(Debug, Clone, PartialEq, Eq)]
enum RemoteHealth {
    /// Not read since startup or since a conflicting write.
    Unverified,
    /// Absent, or parsed as a ledger.
    Readable,
    /// Present but not a ledger; holds the parse error.
    Unreadable(String),
}

/// Whether a push may replace a remote blob that does not parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Overwrite {
    IfReadable,
    /// Restoring a backup is how a user repairs a broken blob.
    Always,
}

/// The document written to the remote blob.
#[derive(Serialize)]
struct BlobDocument<'a> {
    #[serde(flatten)]
    cache: &'a LedgerCache,
    #[serde(rename = "lastUpdate")]
    last_update: String,
}

/// Offline-first orchestrator for one ledger blob.
///
/// Construct one per blob and share it behind an `Arc`; all methods take
/// `&self`.
pub struct SyncManager {
    options: SyncOptions,
    remote: Arc<dyn RemoteBlobStore>,
    store: Arc<dyn CacheStore>,
    cache: RwLock<LedgerCache>,
    flight: AsyncMutex<()>,
    status: StatusBus,
    ids: IdGenerator,
    last_token: Mutex<Option<VersionToken>>,
    remote_health: Mutex<RemoteHealth>,
    pull_generation: AtomicU64,
}

impl SyncManager {
    /// Create a manager, loading whatever the cache store already holds.
    pub fn new(
        options: SyncOptions,
        remote: Arc<dyn RemoteBlobStore>,
        store: Arc<dyn CacheStore>,
    ) -> Self {
        let cache = load_cache(store.as_ref());
        debug!(
            incomes = cache.incomes.len(),
            expenses = cache.expenses.len(),
            quick_entries = cache.quick_entries.len(),
            write_enabled = options.write_enabled,
            "Sync manager created from local cache"
        );
        let ids = IdGenerator::new(cache.max_entry_id());

        Self {
            options,
            remote,
            store,
            cache: RwLock::new(cache),
            flight: AsyncMutex::new(()),
            status: StatusBus::new(),
            ids,
            last_token: Mutex::new(None),
            remote_health: Mutex::new(RemoteHealth::Unverified),
            pull_generation: AtomicU64::new(0),
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// A copy of the current in-memory ledger.
    pub fn snapshot(&self) -> LedgerCache {
        self.read_cache().clone()
    }

    pub fn status(&self) -> SyncStatus {
        self.status.current()
    }

    pub fn watch_status(&self) -> watch::Receiver<SyncStatus> {
        self.status.watch()
    }

    /// Register a status observer; keep the returned handle to stay subscribed.
    pub fn on_status_change<F>(&self, handler: F) -> Subscription
    where
        F: Fn(SyncStatus, &str) + Send + Sync + 'static,
    {
        self.status.subscribe(handler)
    }

    pub fn has_write_credential(&self) -> bool {
        self.options.write_enabled
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    /// Version token returned by the last successful write.
    pub fn last_version_token(&self) -> Option<VersionToken> {
        self.last_token
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// True while a pull or push holds the single-flight lock.
    pub fn is_busy(&self) -> bool {
        self.flight.try_lock().is_err()
    }

    /// Probe the remote without touching the status.
    pub async fn check_connectivity(&self) -> bool {
        tokio::time::timeout(
            self.options.request_timeout,
            self.remote.head_check(&self.options.blob_path),
        )
        .await
        .unwrap_or(false)
    }

    /// Write the in-memory ledger to the cache store. Never contacts the remote.
    pub fn flush_local(&self) -> Result<()> {
        let cache = self.snapshot();
        persist_cache(self.store.as_ref(), &cache)
    }

    // =========================================================================
    // Pull
    // =========================================================================

    /// Fetch the remote blob and merge it into the local ledger.
    ///
    /// Each dataset present remotely replaces the local one; datasets the
    /// blob lacks are kept. If the blob is missing or unreachable the status
    /// goes `offline` and the local ledger is returned unchanged. A blob that
    /// exists but is not a ledger sets the status to `error`, and pushes are
    /// refused until a later pull reads it successfully. A call
    /// still waiting for the lock when a newer pull is requested is
    /// superseded and returns without fetching.
    pub async fn reconcile_from_remote(&self) -> LedgerCache {
        let ticket = self.pull_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let _flight = self.flight.lock().await;
        if self.pull_generation.load(Ordering::SeqCst) != ticket {
            debug!(ticket = ticket, "Pull superseded by a newer request");
            return self.snapshot();
        }
        self.pull_locked().await
    }

    /// Pull only if nothing is in flight. Returns `None` when skipped.
    pub async fn reconcile_if_idle(&self) -> Option<LedgerCache> {
        if self.status() == SyncStatus::Syncing {
            return None;
        }
        let _flight = self.flight.try_lock().ok()?;
        self.pull_generation.fetch_add(1, Ordering::SeqCst);
        Some(self.pull_locked().await)
    }

    async fn pull_locked(&self) -> LedgerCache {
        self.status.notify(SyncStatus::Syncing, MSG_LOADING);

        let fetched = self
            .with_deadline(self.remote.fetch(&self.options.blob_path))
            .await;

        let patch = match fetched {
            Ok(Some(content)) => match parse_blob(&content) {
                Ok(patch) => {
                    self.set_remote_health(RemoteHealth::Readable);
                    Some(patch)
                }
                Err(reason) => {
                    warn!(
                        error = %reason,
                        path = %self.options.blob_path,
                        "Remote blob is not a readable ledger, keeping local data and holding writes"
                    );
                    self.set_remote_health(RemoteHealth::Unreadable(reason.clone()));
                    self.status.notify(
                        SyncStatus::Error,
                        &format!("{}: {}", MSG_REMOTE_UNREADABLE, reason),
                    );
                    return self.snapshot();
                }
            },
            Ok(None) => {
                info!(path = %self.options.blob_path, "Remote blob does not exist yet");
                self.set_remote_health(RemoteHealth::Readable);
                None
            }
            Err(e) => {
                warn!(error = %e, "Failed to load remote blob");
                None
            }
        };

        let Some(patch) = patch else {
            self.status.notify(SyncStatus::Offline, MSG_LOCAL_FALLBACK);
            return self.snapshot();
        };

        let merged = {
            let mut cache = self.write_cache();
            let replaced = cache.apply(patch);
            cache.last_sync = Some(Utc::now());
            debug!(datasets = ?replaced, "Merged remote datasets");
            cache.clone()
        };
        self.ids.observe(merged.max_entry_id());
        self.persist(&merged);

        self.status.notify(SyncStatus::Connected, MSG_LOADED);
        merged
    }

    // =========================================================================
    // Push
    // =========================================================================

    /// Apply a partial update and push it. Every dataset in `patch` replaces
    /// the local one.
    pub async fn save_datasets(&self, patch: CachePatch) -> Result<PushOutcome, SyncError> {
        let _flight = self.flight.lock().await;
        self.push_locked(patch).await
    }

    /// The push protocol. Callers must hold the single-flight lock.
    async fn push_locked(&self, patch: CachePatch) -> Result<PushOutcome, SyncError> {
        self.push_with(patch, Overwrite::IfReadable).await
    }

    async fn push_with(&self, patch: CachePatch, overwrite: Overwrite) -> Result<PushOutcome, SyncError> {
        if let Some((dataset, amount)) = patch.non_finite_amount() {
            return Err(SyncError::InvalidAmount { dataset, amount });
        }

        if !self.options.write_enabled {
            debug!(datasets = ?patch.datasets(), "No write token configured - saving locally only");
            let cache = {
                let mut cache = self.write_cache();
                cache.apply(patch);
                cache.clone()
            };
            self.persist(&cache);
            return Ok(PushOutcome::LocalOnly);
        }

        self.status.notify(SyncStatus::Syncing, MSG_SAVING);

        match self.write_remote(&patch, overwrite).await {
            Ok((token, composed)) => {
                self.set_remote_health(RemoteHealth::Readable);
                *self
                    .last_token
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(token.clone());
                *self.write_cache() = composed.clone();
                self.persist(&composed);
                info!(token = %token, datasets = ?patch.datasets(), "Remote blob updated");
                self.status.notify(SyncStatus::Connected, MSG_SAVED);
                Ok(PushOutcome::Synced(token))
            }
            Err(e) => {
                warn!(error = %e, datasets = ?patch.datasets(), "Failed to sync, keeping change locally");
                if matches!(e, SyncError::Conflict(_)) {
                    self.set_remote_health(RemoteHealth::Unverified);
                }
                let cache = {
                    let mut cache = self.write_cache();
                    cache.apply(patch);
                    cache.clone()
                };
                self.persist(&cache);
                self.status
                    .notify(SyncStatus::Error, &format!("Sync failed: {}", e));
                Err(e)
            }
        }
    }

    /// Read the current token, compose the full blob and write it
    /// conditionally. Returns the new token and the composed ledger.
    async fn write_remote(
        &self,
        patch: &CachePatch,
        overwrite: Overwrite,
    ) -> Result<(VersionToken, LedgerCache), SyncError> {
        if overwrite == Overwrite::IfReadable {
            self.ensure_remote_readable().await?;
        }

        let path = &self.options.blob_path;
        let observed = self
            .with_deadline(self.remote.fetch_version_token(path))
            .await?;

        let mut composed = self.snapshot();
        composed.apply(patch.clone());

        let now = Utc::now();
        let document = BlobDocument {
            cache: &composed,
            last_update: iso_timestamp(now),
        };
        let content = serde_json::to_string_pretty(&document)?;
        let message = format!("Automatic update - {}", local_timestamp(now));

        debug!(expected = ?observed, path = %path, "Writing remote blob");
        let token = self
            .with_deadline(self.remote.conditional_write(
                path,
                &content,
                observed.as_ref(),
                &self.options.branch,
                &message,
            ))
            .await?;
        Ok((token, composed))
    }

    /// Read the remote blob once before the first write so an unreadable
    /// blob is never replaced by a local-only ledger.
    async fn ensure_remote_readable(&self) -> Result<(), SyncError> {
        match self.remote_health() {
            RemoteHealth::Readable => return Ok(()),
            RemoteHealth::Unreadable(reason) => return Err(SyncError::UnreadableRemote(reason)),
            RemoteHealth::Unverified => {}
        }

        let content = self
            .with_deadline(self.remote.fetch(&self.options.blob_path))
            .await?;
        match content.as_deref().map(parse_blob) {
            Some(Err(reason)) => {
                warn!(error = %reason, "Remote blob is not a readable ledger, not overwriting it");
                self.set_remote_health(RemoteHealth::Unreadable(reason.clone()));
                Err(SyncError::UnreadableRemote(reason))
            }
            _ => {
                self.set_remote_health(RemoteHealth::Readable);
                Ok(())
            }
        }
    }

    // =========================================================================
    // Ledger entries
    // =========================================================================

    pub async fn add_income(&self, entry: LedgerEntry) -> Result<LedgerEntry, SyncError> {
        self.add_entry(EntryKind::Incomes, entry).await
    }

    pub async fn add_expense(&self, entry: LedgerEntry) -> Result<LedgerEntry, SyncError> {
        self.add_entry(EntryKind::Expenses, entry).await
    }

    /// Add an entry, assigning an id when it has none and stamping the
    /// creation time. The month/year bucket is derived from the due date
    /// when the caller left both unset. On a sync error the entry is still
    /// kept locally.
    pub async fn add_entry(
        &self,
        kind: EntryKind,
        mut entry: LedgerEntry,
    ) -> Result<LedgerEntry, SyncError> {
        let _flight = self.flight.lock().await;
        let mut entries = self.read_cache().entries(kind).to_vec();

        if !entry.amount.is_finite() {
            return Err(SyncError::InvalidAmount {
                dataset: kind.dataset(),
                amount: entry.amount,
            });
        }
        self.assign_id(kind.dataset(), &mut entry, &entries)?;
        entry.derive_missing_period();
        entry.timestamp = Some(iso_timestamp(Utc::now()));
        entries.push(entry.clone());

        self.push_locked(CachePatch::entries(kind, entries)).await?;
        Ok(entry)
    }

    /// Shallow-merge `fields` into the entry with `id`; incoming fields win.
    pub async fn update_entry(
        &self,
        kind: EntryKind,
        id: EntryId,
        fields: Map<String, Value>,
    ) -> Result<LedgerEntry, SyncError> {
        let _flight = self.flight.lock().await;
        let mut entries = self.read_cache().entries(kind).to_vec();

        let updated = update_in(&mut entries, kind.dataset(), id, &fields)?;
        self.push_locked(CachePatch::entries(kind, entries)).await?;
        Ok(updated)
    }

    pub async fn remove_entry(&self, kind: EntryKind, id: EntryId) -> Result<PushOutcome, SyncError> {
        let _flight = self.flight.lock().await;
        let mut entries = self.read_cache().entries(kind).to_vec();

        remove_from(&mut entries, kind.dataset(), id)?;
        self.push_locked(CachePatch::entries(kind, entries)).await
    }

    // =========================================================================
    // Quick entries
    // =========================================================================

    /// Log a quick entry and record the matching paid expense, pushed
    /// together in one conditional write.
    pub async fn add_quick_entry(&self, mut quick: QuickEntry) -> Result<QuickEntry, SyncError> {
        let _flight = self.flight.lock().await;
        let (mut quick_entries, mut expenses) = {
            let cache = self.read_cache();
            (cache.quick_entries.clone(), cache.expenses.clone())
        };

        if !quick.amount.is_finite() {
            return Err(SyncError::InvalidAmount {
                dataset: DatasetKind::QuickEntries,
                amount: quick.amount,
            });
        }
        // The synthesized expense shares the quick entry's id
        if quick.has_id() && expenses.iter().any(|e| e.id == quick.id) {
            return Err(SyncError::DuplicateId {
                dataset: DatasetKind::Expenses,
                id: quick.id,
            });
        }
        self.assign_id(DatasetKind::QuickEntries, &mut quick, &quick_entries)?;
        if quick.timestamp.is_none() {
            quick.timestamp = Some(iso_timestamp(Utc::now()));
        }

        expenses.push(quick.to_expense());
        quick_entries.insert(0, quick.clone());
        quick_entries.truncate(MAX_QUICK_ENTRIES);

        let patch = CachePatch {
            expenses: Some(expenses),
            quick_entries: Some(quick_entries),
            ..CachePatch::default()
        };
        self.push_locked(patch).await?;
        Ok(quick)
    }

    pub async fn update_quick_entry(
        &self,
        id: EntryId,
        fields: Map<String, Value>,
    ) -> Result<QuickEntry, SyncError> {
        let _flight = self.flight.lock().await;
        let mut quick_entries = self.read_cache().quick_entries.clone();

        let updated = update_in(&mut quick_entries, DatasetKind::QuickEntries, id, &fields)?;
        let patch = CachePatch {
            quick_entries: Some(quick_entries),
            ..CachePatch::default()
        };
        self.push_locked(patch).await?;
        Ok(updated)
    }

    pub async fn remove_quick_entry(&self, id: EntryId) -> Result<PushOutcome, SyncError> {
        let _flight = self.flight.lock().await;
        let mut quick_entries = self.read_cache().quick_entries.clone();

        remove_from(&mut quick_entries, DatasetKind::QuickEntries, id)?;
        let patch = CachePatch {
            quick_entries: Some(quick_entries),
            ..CachePatch::default()
        };
        self.push_locked(patch).await
    }

    // =========================================================================
    // Budgets and prior balances
    // =========================================================================

    pub async fn set_budget(&self, key: impl Into<String>, limit: Value) -> Result<PushOutcome, SyncError> {
        let _flight = self.flight.lock().await;
        let mut budgets = self.read_cache().budgets.clone();
        budgets.insert(key.into(), limit);

        let patch = CachePatch {
            budgets: Some(budgets),
            ..CachePatch::default()
        };
        self.push_locked(patch).await
    }

    pub async fn remove_budget(&self, key: &str) -> Result<PushOutcome, SyncError> {
        let _flight = self.flight.lock().await;
        let mut budgets = self.read_cache().budgets.clone();
        if budgets.remove(key).is_none() {
            return Err(SyncError::not_found(DatasetKind::Budgets, key));
        }

        let patch = CachePatch {
            budgets: Some(budgets),
            ..CachePatch::default()
        };
        self.push_locked(patch).await
    }

    pub async fn set_prior_balance(
        &self,
        period: impl Into<String>,
        balance: f64,
    ) -> Result<PushOutcome, SyncError> {
        let _flight = self.flight.lock().await;
        let mut balances = self.read_cache().prior_balances.clone();
        balances.insert(period.into(), balance);

        let patch = CachePatch {
            prior_balances: Some(balances),
            ..CachePatch::default()
        };
        self.push_locked(patch).await
    }

    pub async fn remove_prior_balance(&self, period: &str) -> Result<PushOutcome, SyncError> {
        let _flight = self.flight.lock().await;
        let mut balances = self.read_cache().prior_balances.clone();
        if balances.remove(period).is_none() {
            return Err(SyncError::not_found(DatasetKind::PriorBalances, period));
        }

        let patch = CachePatch {
            prior_balances: Some(balances),
            ..CachePatch::default()
        };
        self.push_locked(patch).await
    }

    // =========================================================================
    // Backups
    // =========================================================================

    /// Snapshot of the whole ledger in the portable backup format.
    pub fn export_backup(&self) -> Result<Vec<u8>, SyncError> {
        backup::encode_snapshot(&self.snapshot(), Utc::now())
    }

    /// Dated file name for a backup taken now.
    pub fn suggested_backup_file_name(&self) -> String {
        backup::suggested_file_name(Utc::now())
    }

    /// Replace the whole ledger with a backup and push it.
    ///
    /// A snapshot that fails validation is rejected before anything changes.
    /// Once validated the import always succeeds locally; `pushed` in the
    /// summary says whether the remote blob was updated too.
    pub async fn import_backup(&self, bytes: &[u8]) -> Result<ImportSummary, SyncError> {
        let mut restored = backup::decode_snapshot(bytes)?;

        let _flight = self.flight.lock().await;
        restored.last_sync = Some(Utc::now());
        *self.write_cache() = restored.clone();
        self.ids.observe(restored.max_entry_id());

        let pushed = match self.push_with(CachePatch::full(&restored), Overwrite::Always).await {
            Ok(PushOutcome::Synced(_)) => true,
            Ok(PushOutcome::LocalOnly) => false,
            Err(e) => {
                warn!(error = %e, "Backup restored locally but not pushed");
                false
            }
        };
        info!(
            incomes = restored.incomes.len(),
            expenses = restored.expenses.len(),
            pushed = pushed,
            "Backup imported"
        );
        Ok(ImportSummary::new(&restored, pushed))
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn read_cache(&self) -> RwLockReadGuard<'_, LedgerCache> {
        self.cache.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_cache(&self) -> RwLockWriteGuard<'_, LedgerCache> {
        self.cache.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Persist to the cache store. Failures are logged, never propagated:
    /// memory stays the source of truth until the next successful persist.
    fn remote_health(&self) -> RemoteHealth {
        self.remote_health
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn set_remote_health(&self, health: RemoteHealth) {
        *self
            .remote_health
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = health;
    }

    fn persist(&self, cache: &LedgerCache) {
        if let Err(e) = persist_cache(self.store.as_ref(), cache) {
            warn!(error = %e, "Failed to persist local cache, continuing from memory");
        }
    }

    fn assign_id<T: Identified>(
        &self,
        dataset: DatasetKind,
        item: &mut T,
        existing: &[T],
    ) -> Result<(), SyncError> {
        if item.has_id() {
            let id = item.id();
            if existing.iter().any(|e| e.id() == id) {
                return Err(SyncError::DuplicateId { dataset, id });
            }
            self.ids.observe(id);
        } else {
            item.set_id(self.ids.next());
        }
        Ok(())
    }

    async fn with_deadline<T, F>(&self, call: F) -> Result<T, RemoteError>
    where
        F: Future<Output = Result<T, RemoteError>>,
    {
        match tokio::time::timeout(self.options.request_timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                warn!(timeout = ?self.options.request_timeout, "Remote call timed out");
                Err(RemoteError::Timeout)
            }
        }
    }
}

/// Parse a fetched blob. Field types are read leniently, so this only fails
/// when the document is not a JSON object or a dataset has the wrong shape.
fn parse_blob(content: &str) -> Result<CachePatch, String> {
    let value: Value = serde_json::from_str(content).map_err(|e| format!("not valid JSON: {}", e))?;
    if !value.is_object() {
        return Err("not a JSON object".to_string());
    }
    serde_json::from_value(value).map_err(|e| e.to_string())
}

fn update_in<T>(
    items: &mut [T],
    dataset: DatasetKind,
    id: EntryId,
    fields: &Map<String, Value>,
) -> Result<T, SyncError>
where
    T: Identified + Serialize + serde::de::DeserializeOwned + Clone,
{
    let item = items
        .iter_mut()
        .find(|item| item.id() == id)
        .ok_or_else(|| SyncError::not_found(dataset, id))?;

    let merged = merge_fields(&*item, fields).map_err(|e| SyncError::InvalidUpdate {
        dataset,
        id,
        message: e.to_string(),
    })?;
    *item = merged.clone();
    Ok(merged)
}

fn remove_from<T: Identified>(items: &mut Vec<T>, dataset: DatasetKind, id: EntryId) -> Result<(), SyncError> {
    let before = items.len();
    items.retain(|item| item.id() != id);
    if items.len() == before {
        return Err(SyncError::not_found(dataset, id));
    }
    Ok(())
}
