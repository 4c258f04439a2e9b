use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::store::{CacheStore, StoreKey};

/// A stored value together with when it was written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedData<T> {
    pub data: T,
    pub cached_at: DateTime<Utc>,
}

impl<T> CachedData<T> {
    pub fn new(data: T) -> Self {
        Self {
            data,
            cached_at: Utc::now(),
        }
    }

    pub fn age_minutes(&self) -> i64 {
        let now = Utc::now();
        (now - self.cached_at).num_minutes()
    }

    pub fn age_display(&self) -> String {
        let minutes = self.age_minutes();
        if minutes < 1 {
            // Negative ages come from clock skew
            "just now".to_string()
        } else if minutes < 60 {
            format!("{}m ago", minutes)
        } else if minutes < 1440 {
            let hours = minutes / 60;
            let remaining_mins = minutes % 60;
            if remaining_mins >= 30 {
                format!("{}h ago", hours + 1)
            } else {
                format!("{}h ago", hours)
            }
        } else {
            let days = minutes / 1440;
            let remaining_hours = (minutes % 1440) / 60;
            if remaining_hours >= 12 {
                format!("{}d ago", days + 1)
            } else {
                format!("{}d ago", days)
            }
        }
    }
}

/// Cache store backed by one JSON file per key in a directory.
pub struct FileCacheStore {
    cache_dir: PathBuf,
}

impl FileCacheStore {
    pub fn new(cache_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&cache_dir)
            .with_context(|| format!("Failed to create cache directory {}", cache_dir.display()))?;
        Ok(Self { cache_dir })
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    fn cache_path(&self, key: StoreKey) -> PathBuf {
        self.cache_dir.join(format!("{}.json", key.name()))
    }

    fn load_entry(&self, key: StoreKey) -> Result<Option<CachedData<Value>>> {
        let path = self.cache_path(key);
        if !path.exists() {
            return Ok(None);
        }

        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read cache file: {}", key))?;

        let cached: CachedData<Value> = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse cache file: {}", key))?;

        Ok(Some(cached))
    }

    /// How long ago each stored key was written. Keys never written are
    /// absent; unreadable ones are logged and skipped.
    pub fn ages(&self) -> CacheAges {
        let mut ages = BTreeMap::new();
        for key in StoreKey::ALL {
            match self.load_entry(key) {
                Ok(Some(cached)) => {
                    ages.insert(key, cached.age_display());
                }
                Ok(None) => {}
                Err(e) => debug!(cache = %key, error = %e, "Failed to load cache for age display"),
            }
        }
        CacheAges { ages }
    }
}

impl CacheStore for FileCacheStore {
    fn load(&self, key: StoreKey) -> Result<Option<Value>> {
        Ok(self.load_entry(key)?.map(|cached| cached.data))
    }

    fn save(&self, key: StoreKey, value: &Value) -> Result<()> {
        let cached = CachedData::new(value);
        let path = self.cache_path(key);
        let tmp_path = path.with_extension("json.tmp");
        let contents = serde_json::to_string_pretty(&cached)?;

        // Write-then-rename so a crash never leaves a half-written file
        std::fs::write(&tmp_path, contents)
            .with_context(|| format!("Failed to write cache file: {}", key))?;
        std::fs::rename(&tmp_path, &path)
            .with_context(|| format!("Failed to replace cache file: {}", key))?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct CacheAges {
    ages: BTreeMap<StoreKey, String>,
}

impl CacheAges {
    pub fn get(&self, key: StoreKey) -> Option<&str> {
        self.ages.get(&key).map(String::as_str)
    }

    /// Age of the last-sync marker, which is rewritten on every persist.
    pub fn last_updated(&self) -> String {
        self.get(StoreKey::LastSync)
            .or_else(|| self.ages.values().next().map(String::as_str))
            .unwrap_or("never")
            .to_string()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DatasetKind;
    use chrono::Duration;
    use serde_json::json;

    #[test]
    fn test_cached_data_age_display_just_now() {
        let cached = CachedData::new(vec![1, 2, 3]);
        assert_eq!(cached.age_display(), "just now");
    }

    #[test]
    fn test_cached_data_age_display_rounding() {
        let mut cached = CachedData::new(());
        cached.cached_at = Utc::now() - Duration::minutes(95);
        assert_eq!(cached.age_display(), "2h ago");

        cached.cached_at = Utc::now() - Duration::minutes(5);
        assert_eq!(cached.age_display(), "5m ago");

        cached.cached_at = Utc::now() - Duration::hours(50);
        assert_eq!(cached.age_display(), "2d ago");
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let key = StoreKey::Dataset(DatasetKind::Expenses);
        {
            let store = FileCacheStore::new(dir.path().to_path_buf()).unwrap();
            store.save(key, &json!([{"id": 1, "descricao": "Luz"}])).unwrap();
        }

        let store = FileCacheStore::new(dir.path().to_path_buf()).unwrap();
        let loaded = store.load(key).unwrap().unwrap();
        assert_eq!(loaded[0]["descricao"], "Luz");
        assert!(store.load(StoreKey::LastSync).unwrap().is_none());
    }

    #[test]
    fn test_save_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCacheStore::new(dir.path().to_path_buf()).unwrap();
        let key = StoreKey::Dataset(DatasetKind::Budgets);
        let value = json!({"2024-03:moradia": 1500});

        store.save(key, &value).unwrap();
        store.save(key, &value).unwrap();
        assert_eq!(store.load(key).unwrap(), Some(value));
        assert!(!dir.path().join("orcamentos.json.tmp").exists());
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("receitas.json"), "{not json").unwrap();
        let store = FileCacheStore::new(dir.path().to_path_buf()).unwrap();
        assert!(store.load(StoreKey::Dataset(DatasetKind::Incomes)).is_err());
    }

    #[test]
    fn test_cache_ages() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCacheStore::new(dir.path().to_path_buf()).unwrap();
        assert_eq!(store.ages().last_updated(), "never");

        store.save(StoreKey::LastSync, &json!(null)).unwrap();
        let ages = store.ages();
        assert_eq!(ages.last_updated(), "just now");
        assert!(ages.get(StoreKey::Dataset(DatasetKind::Incomes)).is_none());
    }
}
