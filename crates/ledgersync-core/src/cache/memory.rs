use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use serde_json::Value;

use super::store::{CacheStore, StoreKey};

/// In-process cache store. Nothing survives the process; useful for tests
/// and for sessions that should never touch the disk.
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    values: Mutex<HashMap<StoreKey, Value>>,
    failing: AtomicBool,
    saves: AtomicUsize,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent save fail, simulating a full or read-only disk.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of successful saves so far.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

impl CacheStore for MemoryCacheStore {
    fn load(&self, key: StoreKey) -> Result<Option<Value>> {
        let values = self
            .values
            .lock()
            .map_err(|_| anyhow!("memory cache store lock poisoned"))?;
        Ok(values.get(&key).cloned())
    }

    fn save(&self, key: StoreKey, value: &Value) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(anyhow!("simulated storage failure for {}", key));
        }
        let mut values = self
            .values
            .lock()
            .map_err(|_| anyhow!("memory cache store lock poisoned"))?;
        values.insert(key, value.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
