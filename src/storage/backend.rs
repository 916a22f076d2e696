use std::collections::HashMap as StdHashMap;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;

/// Failures of an underlying storage medium. `TokenStore` logs and swallows these;
/// only `Decode` ever reaches a caller, from `get_structured`.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("storage quota exceeded writing '{key}' ({needed} bytes, {limit} allowed)")]
    QuotaExceeded { key: String, needed: usize, limit: usize },
    #[error("storage i/o: {0}")]
    Io(#[from] std::io::Error),
    #[error("value under '{key}' does not decode as the requested type: {source}")]
    Decode { key: String, #[source] source: serde_json::Error },
    #[error("value for '{key}' could not be encoded: {source}")]
    Encode { key: String, #[source] source: serde_json::Error },
}

/// A flat string key/value medium backing one storage tier.
pub trait StorageBackend: Send + Sync {
    fn read(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn write(&self, key: &str, value: &str) -> Result<(), StoreError>;
    fn delete(&self, key: &str) -> Result<(), StoreError>;
}

/// Process-lifetime map; the session tier.
#[derive(Default)]
pub struct MemoryBackend {
    map: RwLock<StdHashMap<String, String>>,
    /// Total bytes (keys + values) the backend accepts, if limited.
    quota: Option<usize>,
}

impl MemoryBackend {
    pub fn new() -> Self { Self::default() }

    pub fn with_quota(limit: usize) -> Self { Self { map: RwLock::new(StdHashMap::new()), quota: Some(limit) } }

    pub fn len(&self) -> usize { self.map.read().len() }

    pub fn is_empty(&self) -> bool { self.map.read().is_empty() }
}

impl StorageBackend for MemoryBackend {
    fn read(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.map.read().get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut w = self.map.write();
        if let Some(limit) = self.quota {
            let used: usize = w.iter().filter(|(k, _)| k.as_str() != key).map(|(k, v)| k.len() + v.len()).sum();
            let needed = used + key.len() + value.len();
            if needed > limit {
                return Err(StoreError::QuotaExceeded { key: key.to_string(), needed, limit });
            }
        }
        w.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.map.write().remove(key);
        Ok(())
    }
}

/// JSON document on disk; the persistent tier. The whole map is rewritten on every
/// mutation through a temp file + rename so a crash never leaves a torn document.
pub struct FileBackend {
    path: PathBuf,
    map: RwLock<StdHashMap<String, String>>,
}

impl FileBackend {
    /// Open (or create) `<dir>/storage.json`. A corrupt document is logged and treated as empty.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let path = dir.join("storage.json");
        let mut map = StdHashMap::new();
        if let Ok(bytes) = std::fs::read(&path) {
            match serde_json::from_slice::<StdHashMap<String, String>>(&bytes) {
                Ok(m) => map = m,
                Err(e) => {
                    tracing::warn!(target: "hrportal::storage", "ignoring corrupt storage document '{}': {}", path.display(), e);
                }
            }
        }
        Ok(Self { path, map: RwLock::new(map) })
    }

    pub fn path(&self) -> &Path { &self.path }

    fn flush(&self, map: &StdHashMap<String, String>) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(map)
            .map_err(|e| StoreError::Encode { key: self.path.display().to_string(), source: e })?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, bytes)?;
        std::fs::rename(tmp, &self.path)?;
        Ok(())
    }
}

impl StorageBackend for FileBackend {
    fn read(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.map.read().get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut w = self.map.write();
        let prev = w.insert(key.to_string(), value.to_string());
        if let Err(e) = self.flush(&w) {
            // keep memory and disk in step
            match prev {
                Some(p) => { w.insert(key.to_string(), p); }
                None => { w.remove(key); }
            }
            return Err(e);
        }
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut w = self.map.write();
        if let Some(prev) = w.remove(key) {
            if let Err(e) = self.flush(&w) {
                // still on disk, so it must stay readable
                w.insert(key.to_string(), prev);
                return Err(e);
            }
        }
        Ok(())
    }
}
