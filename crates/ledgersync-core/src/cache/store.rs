use std::fmt;

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::{debug, warn};

use crate::models::{CachePatch, DatasetKind, LedgerCache};

/// Names the values a `CacheStore` holds. The names are an internal contract
/// between the store and the orchestrator; they never reach the remote blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StoreKey {
    Dataset(DatasetKind),
    LastSync,
    /// Top-level blob keys this crate does not model.
    Extras,
}

impl StoreKey {
    pub const ALL: [StoreKey; 7] = [
        StoreKey::Dataset(DatasetKind::Incomes),
        StoreKey::Dataset(DatasetKind::Expenses),
        StoreKey::Dataset(DatasetKind::Budgets),
        StoreKey::Dataset(DatasetKind::PriorBalances),
        StoreKey::Dataset(DatasetKind::QuickEntries),
        StoreKey::LastSync,
        StoreKey::Extras,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            StoreKey::Dataset(DatasetKind::Incomes) => "receitas",
            StoreKey::Dataset(DatasetKind::Expenses) => "despesas",
            StoreKey::Dataset(DatasetKind::Budgets) => "orcamentos",
            StoreKey::Dataset(DatasetKind::PriorBalances) => "saldos_anteriores",
            StoreKey::Dataset(DatasetKind::QuickEntries) => "gastos_rapidos",
            StoreKey::LastSync => "last_sync",
            StoreKey::Extras => "extras",
        }
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Durable key-value storage for the local cache.
///
/// `load` returns `Ok(None)` for a key that was never saved. `save` must be
/// idempotent: saving the same value twice leaves the store unchanged.
pub trait CacheStore: Send + Sync {
    fn load(&self, key: StoreKey) -> Result<Option<Value>>;

    fn save(&self, key: StoreKey, value: &Value) -> Result<()>;
}

/// Read the whole cache. Missing or unreadable keys fall back to empty
/// containers so a damaged file never blocks startup.
pub fn load_cache(store: &dyn CacheStore) -> LedgerCache {
    let mut document = serde_json::Map::new();
    let mut extras = None;
    for key in StoreKey::ALL {
        match store.load(key) {
            Ok(Some(value)) => match key {
                StoreKey::Dataset(kind) => {
                    document.insert(kind.blob_key().to_string(), value);
                }
                StoreKey::LastSync => {
                    document.insert("lastSync".to_string(), value);
                }
                StoreKey::Extras => extras = Some(value),
            },
            Ok(None) => debug!(key = %key, "No cached value, using default"),
            Err(e) => warn!(key = %key, error = %e, "Failed to load cached value, using default"),
        }
    }

    let document = Value::Object(document);
    let mut cache = match serde_json::from_value::<LedgerCache>(document.clone()) {
        Ok(cache) => cache,
        Err(e) => {
            warn!(error = %e, "Cached ledger is malformed, loading datasets one by one");
            load_leniently(&document)
        }
    };

    match extras {
        Some(Value::Object(extra)) => {
            cache.extra = extra;
            cache.strip_transient();
        }
        Some(other) if !other.is_null() => warn!("Cached extra blob keys are not an object, ignoring"),
        _ => {}
    }
    cache
}

/// Keep whatever still parses when the aggregate does not. A list dataset
/// loses only the items that are not entries; any other damaged dataset
/// falls back to empty.
fn load_leniently(document: &Value) -> LedgerCache {
    let mut cache = LedgerCache::default();
    for kind in DatasetKind::ALL {
        let Some(value) = document.get(kind.blob_key()) else {
            continue;
        };
        match dataset_patch(kind, value.clone()) {
            Ok(patch) => {
                cache.apply(patch);
            }
            Err(e) => match salvage_entries(kind, value) {
                Some((patch, dropped)) => {
                    warn!(dataset = %kind, dropped = dropped, error = %e, "Dropping unreadable cached entries");
                    cache.apply(patch);
                }
                None => warn!(dataset = %kind, error = %e, "Dropping unreadable cached dataset"),
            },
        }
    }
    if let Some(marker) = document.get("lastSync") {
        let single = serde_json::json!({ "lastSync": marker });
        cache.last_sync = serde_json::from_value::<LedgerCache>(single)
            .ok()
            .and_then(|parsed| parsed.last_sync);
    }
    cache
}

fn dataset_patch(kind: DatasetKind, value: Value) -> serde_json::Result<CachePatch> {
    let mut single = serde_json::Map::new();
    single.insert(kind.blob_key().to_string(), value);
    serde_json::from_value(Value::Object(single))
}

/// Keep the object items of a list dataset. Returns the patch and how many
/// items were dropped, or `None` when the dataset is not a list.
fn salvage_entries(kind: DatasetKind, value: &Value) -> Option<(CachePatch, usize)> {
    if !kind.is_list() {
        return None;
    }
    let items = value.as_array()?;
    let kept: Vec<Value> = items.iter().filter(|item| item.is_object()).cloned().collect();
    let dropped = items.len() - kept.len();
    dataset_patch(kind, Value::Array(kept))
        .ok()
        .map(|patch| (patch, dropped))
}

/// Write every dataset and the sync marker. All keys are attempted even if
/// one fails; the first failure is returned.
pub fn persist_cache(store: &dyn CacheStore, cache: &LedgerCache) -> Result<()> {
    let mut first_error = None;
    for key in StoreKey::ALL {
        let value = match key {
            StoreKey::Dataset(DatasetKind::Incomes) => serde_json::to_value(&cache.incomes),
            StoreKey::Dataset(DatasetKind::Expenses) => serde_json::to_value(&cache.expenses),
            StoreKey::Dataset(DatasetKind::Budgets) => serde_json::to_value(&cache.budgets),
            StoreKey::Dataset(DatasetKind::PriorBalances) => {
                serde_json::to_value(&cache.prior_balances)
            }
            StoreKey::Dataset(DatasetKind::QuickEntries) => {
                serde_json::to_value(&cache.quick_entries)
            }
            StoreKey::LastSync => serde_json::to_value(cache.last_sync),
            StoreKey::Extras => serde_json::to_value(&cache.extra),
        };
        let result = value
            .with_context(|| format!("Failed to serialize {}", key))
            .and_then(|value| store.save(key, &value));
        if let Err(e) = result {
            warn!(key = %key, error = %e, "Failed to persist cached value");
            first_error.get_or_insert(e);
        }
    }
    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCacheStore;
    use crate::models::{LedgerEntry, QuickEntry};
    use chrono::Utc;
    use serde_json::json;

    #[test]
    fn test_round_trip_through_store() {
        let store = MemoryCacheStore::new();
        let mut cache = LedgerCache::default();
        cache.expenses.push(LedgerEntry::new("Aluguel", 1200.0, "moradia"));
        cache.quick_entries.push(QuickEntry::new("Cafe", 5.0, "alimentacao", "2024-01-02"));
        cache.prior_balances.insert("2024-02".into(), 350.0);
        cache.last_sync = Some(Utc::now());

        persist_cache(&store, &cache).unwrap();
        assert_eq!(load_cache(&store), cache);
    }

    #[test]
    fn test_empty_store_loads_defaults() {
        let store = MemoryCacheStore::new();
        assert_eq!(load_cache(&store), LedgerCache::default());
    }

    #[test]
    fn test_one_bad_dataset_does_not_lose_the_others() {
        let store = MemoryCacheStore::new();
        store
            .save(StoreKey::Dataset(DatasetKind::Incomes), &json!([{"descricao": "Bonus", "valor": 10}]))
            .unwrap();
        store
            .save(StoreKey::Dataset(DatasetKind::Expenses), &json!("not a list"))
            .unwrap();

        let cache = load_cache(&store);
        assert_eq!(cache.incomes.len(), 1);
        assert!(cache.expenses.is_empty());
    }

    #[test]
    fn test_unreadable_entries_do_not_lose_the_dataset() {
        let store = MemoryCacheStore::new();
        store
            .save(
                StoreKey::Dataset(DatasetKind::Expenses),
                &json!([
                    {"id": 1, "descricao": "Aluguel", "valor": 1200},
                    {"id": 2, "descricao": "Agua", "valor": null},
                    42,
                    "lixo"
                ]),
            )
            .unwrap();
        store.save(StoreKey::LastSync, &json!("2024-03-01T12:00:00Z")).unwrap();

        let cache = load_cache(&store);
        assert_eq!(cache.expenses.len(), 2);
        assert_eq!(cache.expenses[1].description, "Agua");
        assert_eq!(cache.expenses[1].amount, 0.0);
        assert!(cache.last_sync.is_some());
    }

    #[test]
    fn test_non_finite_amount_survives_restart() {
        // serde_json writes NaN as null; the entry must still load
        let store = MemoryCacheStore::new();
        let mut cache = LedgerCache::default();
        cache.expenses.push(LedgerEntry::new("Aluguel", 1200.0, "moradia"));
        cache.expenses.push(LedgerEntry::new("Agua", f64::NAN, "casa"));
        persist_cache(&store, &cache).unwrap();

        let loaded = load_cache(&store);
        assert_eq!(loaded.expenses.len(), 2);
        assert_eq!(loaded.expenses[0].amount, 1200.0);
        assert_eq!(loaded.expenses[1].amount, 0.0);
    }

    #[test]
    fn test_extras_round_trip() {
        let store = MemoryCacheStore::new();
        let mut cache = LedgerCache::default();
        cache.extra.insert("metas".into(), json!({"viagem": 3000}));
        persist_cache(&store, &cache).unwrap();

        assert_eq!(store.load(StoreKey::Extras).unwrap(), Some(json!({"metas": {"viagem": 3000}})));
        assert_eq!(load_cache(&store).extra.get("metas"), Some(&json!({"viagem": 3000})));
    }

    #[test]
    fn test_persist_reports_failure() {
        let store = MemoryCacheStore::new();
        store.set_failing(true);
        assert!(persist_cache(&store, &LedgerCache::default()).is_err());
    }
}
