//! Run cache
//!
//! Memo store shared by every worker of one run. Keys are looked up at most
//! once: concurrent callers asking for the same key wait on a single fetch,
//! and later callers get the stored value without a remote call. Failed
//! fetches are not stored, so the next caller retries.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::OnceCell;

use strata_core::Result;

/// Stored outcome of a lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CachedValue {
    Found(String),
    /// The lookup completed and the value does not exist
    Missing,
}

/// Process-lifetime key/value memo store for one run
#[derive(Default)]
pub struct RunCache {
    entries: Mutex<HashMap<String, Arc<OnceCell<CachedValue>>>>,
}

impl RunCache {
    /// Creates an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, Arc<OnceCell<CachedValue>>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn cell(&self, key: &str) -> Option<Arc<OnceCell<CachedValue>>> {
        self.entries().get(key).cloned()
    }

    /// Whether a completed lookup is stored for `key`
    pub fn exists(&self, key: &str) -> bool {
        self.cell(key).is_some_and(|cell| cell.initialized())
    }

    /// Returns the stored value, if any
    pub fn get(&self, key: &str) -> Option<CachedValue> {
        self.cell(key).and_then(|cell| cell.get().cloned())
    }

    /// Stores a value, replacing any previous one
    pub fn add(&self, key: impl Into<String>, value: CachedValue) {
        let cell = OnceCell::new_with(Some(value));
        self.entries().insert(key.into(), Arc::new(cell));
    }

    /// Forgets a key
    pub fn remove(&self, key: &str) {
        self.entries().remove(key);
    }

    /// Number of completed lookups
    pub fn len(&self) -> usize {
        self.entries()
            .values()
            .filter(|cell| cell.initialized())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the stored value or runs `fetch` to produce it
    ///
    /// Only one fetch runs per key at a time; callers arriving while it is in
    /// flight wait for its result. An error is returned to the caller whose
    /// fetch failed and nothing is stored.
    pub async fn get_or_try_fetch<F, Fut>(&self, key: &str, fetch: F) -> Result<CachedValue>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<CachedValue>>,
    {
        let cell = {
            let mut entries = self.entries();
            Arc::clone(
                entries
                    .entry(key.to_string())
                    .or_insert_with(|| Arc::new(OnceCell::new())),
            )
        };

        cell.get_or_try_init(fetch).await.cloned()
    }
}
