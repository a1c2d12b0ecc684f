//! Process-wide, lazily populated caches injected into nodes.

use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use tokio::sync::RwLock;

use waypoint_types::{Result, WaypointError};

/// Keyed cache with concurrent reads and converging writes.
///
/// A miss runs the loader outside the lock. When several tasks miss the same
/// key at once, the first value inserted wins and every caller gets it.
pub struct Cache<V> {
    name: String,
    entries: RwLock<HashMap<String, Arc<V>>>,
}

impl<V: Send + Sync> Cache<V> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn get(&self, key: &str) -> Option<Arc<V>> {
        self.entries.read().await.get(key).cloned()
    }

    /// Return the cached value for `key`, running `loader` on a miss.
    pub async fn get_or_try_load<F, Fut>(&self, key: &str, loader: F) -> Result<Arc<V>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>>,
    {
        if let Some(hit) = self.get(key).await {
            return Ok(hit);
        }

        tracing::debug!(cache = %self.name, key = %key, "Cache miss");
        let loaded = loader().await?;

        let mut entries = self.entries.write().await;
        let value = entries
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(loaded))
            .clone();
        Ok(value)
    }

    pub async fn insert(&self, key: impl Into<String>, value: V) -> Arc<V> {
        let value = Arc::new(value);
        self.entries
            .write()
            .await
            .insert(key.into(), value.clone());
        value
    }

    /// Drop one entry so the next lookup reloads it.
    pub async fn invalidate(&self, key: &str) -> bool {
        let removed = self.entries.write().await.remove(key).is_some();
        if removed {
            tracing::debug!(cache = %self.name, key = %key, "Cache entry invalidated");
        }
        removed
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

// ---------------------------------------------------------------------------
// FileCache
// ---------------------------------------------------------------------------

/// File contents keyed by path.
pub type FileCache = Cache<String>;

impl Cache<String> {
    /// Read a UTF-8 file through the cache.
    pub async fn read_file(&self, path: impl AsRef<Path>) -> Result<Arc<String>> {
        let path = path.as_ref().to_path_buf();
        let key = path.display().to_string();
        self.get_or_try_load(&key, || async move {
            tokio::fs::read_to_string(&path)
                .await
                .map_err(WaypointError::from)
        })
        .await
    }
}

impl Default for Cache<String> {
    fn default() -> Self {
        Self::new("files")
    }
}
