use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Opaque validator (an entity tag) the server uses to confirm a cached
/// response is still current.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FreshnessToken(String);

impl FreshnessToken {
    pub fn new(token: impl Into<String>) -> Self {
        FreshnessToken(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry<V> {
    token: FreshnessToken,
    value: V,
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Memoized responses keyed by request, each guarded by a freshness token.
///
/// Safe to share between concurrently running query variants.
#[derive(Debug)]
pub struct ResponseCache<V> {
    entries: Mutex<BTreeMap<String, CacheEntry<V>>>,
}

impl<V> Default for ResponseCache<V> {
    fn default() -> Self {
        ResponseCache {
            entries: Mutex::new(BTreeMap::new()),
        }
    }
}

impl<V: Clone> ResponseCache<V> {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, CacheEntry<V>>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Token to send with a conditional request for `key`.
    pub fn freshness(&self, key: &str) -> Option<FreshnessToken> {
        self.lock().get(key).map(|entry| entry.token.clone())
    }

    /// Cached value for `key`, only if it was stored under `token`.
    pub fn lookup(&self, key: &str, token: &FreshnessToken) -> Option<V> {
        self.lock()
            .get(key)
            .filter(|entry| &entry.token == token)
            .map(|entry| entry.value.clone())
    }

    pub fn store(&self, key: impl Into<String>, value: V, token: FreshnessToken) {
        self.lock().insert(key.into(), CacheEntry { token, value });
    }

    pub fn invalidate(&self, key: &str) {
        self.lock().remove(key);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl<V> ResponseCache<V>
where
    V: Clone + Serialize + DeserializeOwned,
{
    /// Load a cache persisted by [`ResponseCache::save`]; a missing file is an
    /// empty cache.
    pub fn load(path: &Path) -> Result<Self, CacheError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let f = fs::File::open(path)?;
        let entries: BTreeMap<String, CacheEntry<V>> = serde_json::from_reader(f)?;
        Ok(ResponseCache {
            entries: Mutex::new(entries),
        })
    }

    /// Write atomically: temp file, then rename over the target.
    pub fn save(&self, path: &Path) -> Result<(), CacheError> {
        let snapshot = self.lock().clone();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let temp = path.with_extension("tmp");
        let f = fs::File::create(&temp)?;
        serde_json::to_writer(&f, &snapshot)?;
        f.sync_all()?;
        fs::rename(&temp, path)?;
        Ok(())
    }
}
