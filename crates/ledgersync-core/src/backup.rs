//! Portable backup snapshots of the whole ledger.
//!
//! A snapshot is the cache serialized with the same field names as the
//! remote blob, plus a `backupDate` and a format `version`. Readers accept
//! snapshots with missing optional datasets; `receitas` and `despesas` are
//! mandatory.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::models::{DatasetKind, LedgerCache};
use crate::sync::SyncError;
use crate::utils::iso_timestamp;

/// Format version written into every snapshot.
pub const BACKUP_FORMAT_VERSION: &str = "1.0";

/// Datasets a snapshot must contain to be restorable.
const MANDATORY_DATASETS: [DatasetKind; 2] = [DatasetKind::Incomes, DatasetKind::Expenses];

#[derive(Serialize)]
struct SnapshotDocument<'a> {
    #[serde(flatten)]
    cache: &'a LedgerCache,
    #[serde(rename = "backupDate")]
    backup_date: String,
    version: &'static str,
}

/// Summary of what an import restored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSummary {
    pub incomes: usize,
    pub expenses: usize,
    pub budgets: usize,
    pub prior_balances: usize,
    pub quick_entries: usize,
    /// Whether the restored ledger also reached the remote blob.
    pub pushed: bool,
}

impl ImportSummary {
    pub fn new(cache: &LedgerCache, pushed: bool) -> Self {
        Self {
            incomes: cache.len(DatasetKind::Incomes),
            expenses: cache.len(DatasetKind::Expenses),
            budgets: cache.len(DatasetKind::Budgets),
            prior_balances: cache.len(DatasetKind::PriorBalances),
            quick_entries: cache.len(DatasetKind::QuickEntries),
            pushed,
        }
    }
}

/// Serialize `cache` as a pretty-printed snapshot taken at `at`.
pub fn encode_snapshot(cache: &LedgerCache, at: DateTime<Utc>) -> Result<Vec<u8>, SyncError> {
    let document = SnapshotDocument {
        cache,
        backup_date: iso_timestamp(at),
        version: BACKUP_FORMAT_VERSION,
    };
    Ok(serde_json::to_vec_pretty(&document)?)
}

/// Parse and validate a snapshot. Nothing is applied here, so a rejected
/// snapshot never touches local state.
pub fn decode_snapshot(bytes: &[u8]) -> Result<LedgerCache, SyncError> {
    let value: Value = serde_json::from_slice(bytes)
        .map_err(|e| SyncError::Validation(format!("not valid JSON: {}", e)))?;

    let Some(document) = value.as_object() else {
        return Err(SyncError::Validation("snapshot is not a JSON object".into()));
    };

    for kind in MANDATORY_DATASETS {
        match document.get(kind.blob_key()) {
            Some(Value::Array(_)) => {}
            Some(_) => {
                return Err(SyncError::Validation(format!(
                    "`{}` must be a list",
                    kind.blob_key()
                )))
            }
            None => {
                return Err(SyncError::Validation(format!(
                    "missing mandatory dataset `{}`",
                    kind.blob_key()
                )))
            }
        }
    }

    if let Some(version) = document.get("version").and_then(Value::as_str) {
        if !version.starts_with("1.") {
            warn!(version = version, "Backup written by a newer format, reading known fields only");
        }
    }

    let mut cache: LedgerCache =
        serde_json::from_value(value).map_err(|e| SyncError::Validation(e.to_string()))?;
    cache.strip_transient();
    Ok(cache)
}

/// File name offered when saving a snapshot, e.g. `ledgersync-backup-2024-03-01.json`.
pub fn suggested_file_name(at: DateTime<Utc>) -> String {
    format!("ledgersync-backup-{}.json", at.format("%Y-%m-%d"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LedgerEntry;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_snapshot_carries_metadata() {
        let mut cache = LedgerCache::default();
        cache.incomes.push(LedgerEntry::new("Salario", 5000.0, "trabalho"));
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();

        let bytes = encode_snapshot(&cache, at).unwrap();
        let value: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["version"], BACKUP_FORMAT_VERSION);
        assert_eq!(value["backupDate"], "2024-03-01T09:00:00.000Z");
        assert_eq!(value["receitas"][0]["descricao"], "Salario");
        assert!(value["orcamentos"].is_object());

        assert_eq!(decode_snapshot(&bytes).unwrap(), cache);
    }

    #[test]
    fn test_missing_optional_datasets_default_to_empty() {
        let bytes = serde_json::to_vec(&json!({
            "receitas": [],
            "despesas": [{"id": 1, "descricao": "Luz", "valor": 80}],
            "backupDate": "2024-03-01T09:00:00.000Z",
            "version": "1.0"
        }))
        .unwrap();

        let cache = decode_snapshot(&bytes).unwrap();
        assert_eq!(cache.expenses.len(), 1);
        assert!(cache.budgets.is_empty());
        assert!(cache.prior_balances.is_empty());
        assert!(cache.quick_entries.is_empty());
    }

    #[test]
    fn test_mandatory_datasets() {
        let missing = serde_json::to_vec(&json!({"receitas": []})).unwrap();
        let err = decode_snapshot(&missing).unwrap_err();
        assert!(matches!(err, SyncError::Validation(ref m) if m.contains("despesas")));

        let wrong_type = serde_json::to_vec(&json!({"receitas": {}, "despesas": []})).unwrap();
        assert!(matches!(decode_snapshot(&wrong_type), Err(SyncError::Validation(_))));
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(matches!(decode_snapshot(b"not json"), Err(SyncError::Validation(_))));
        assert!(matches!(decode_snapshot(b"[1, 2]"), Err(SyncError::Validation(_))));
        let bad_entry = serde_json::to_vec(&json!({"receitas": [17], "despesas": []})).unwrap();
        assert!(matches!(decode_snapshot(&bad_entry), Err(SyncError::Validation(_))));
    }

    #[test]
    fn test_unknown_keys_survive_a_backup() {
        let bytes = serde_json::to_vec(&json!({
            "receitas": [],
            "despesas": [],
            "metas": ["viagem"],
            "backupDate": "2024-03-01T09:00:00.000Z",
            "version": "1.0"
        }))
        .unwrap();

        let cache = decode_snapshot(&bytes).unwrap();
        assert_eq!(cache.extra.len(), 1);
        assert_eq!(cache.extra.get("metas"), Some(&json!(["viagem"])));

        let again: Value = serde_json::from_slice(&encode_snapshot(&cache, Utc::now()).unwrap()).unwrap();
        assert_eq!(again["metas"], json!(["viagem"]));
    }

    #[test]
    fn test_suggested_file_name() {
        let at = Utc.with_ymd_and_hms(2024, 12, 31, 23, 0, 0).unwrap();
        assert_eq!(suggested_file_name(at), "ledgersync-backup-2024-12-31.json");
    }
}
