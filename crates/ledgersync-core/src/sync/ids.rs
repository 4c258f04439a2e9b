use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;

use crate::models::EntryId;

/// Hands out time-derived identifiers that never repeat within a process:
/// each id is the current epoch millisecond, bumped past the last one issued.
#[derive(Debug, Default)]
pub struct IdGenerator {
    last: AtomicI64,
}

impl IdGenerator {
    /// Start above `seed`, usually the largest id already in the cache.
    pub fn new(seed: EntryId) -> Self {
        Self {
            last: AtomicI64::new(seed),
        }
    }

    pub fn next(&self) -> EntryId {
        let now = Utc::now().timestamp_millis();
        let mut last = self.last.load(Ordering::SeqCst);
        loop {
            let candidate = now.max(last + 1);
            match self
                .last
                .compare_exchange(last, candidate, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return candidate,
                Err(actual) => last = actual,
            }
        }
    }

    /// Make sure later ids land above an id that came from elsewhere.
    pub fn observe(&self, id: EntryId) {
        self.last.fetch_max(id, Ordering::SeqCst);
    }
}
