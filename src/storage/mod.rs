//!
//! hrportal storage module
//! -----------------------
//! Two-tier key/value storage for credentials and session state. The session tier lives
//! for the process; the persistent tier survives restarts. Each tier is a `StorageBackend`.
//!
//! Writes store strings literally and anything else as JSON. Reads come in two explicit
//! flavours, `get_string` and `get_structured::<T>`, so the caller states what it expects.
//! Medium failures (quota, unavailable disk) are logged and behave as "absent"; callers
//! never handle them.

use std::path::Path;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

mod backend;

pub use backend::{FileBackend, MemoryBackend, StorageBackend, StoreError};

/// Storage scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    /// Cleared when the session ends.
    Session,
    /// Survives across sessions.
    Persistent,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Session => "session",
            Tier::Persistent => "persistent",
        }
    }
}

/// Logical key names shared by the session and token layers.
pub mod keys {
    pub const TOKEN: &str = "token";
    pub const USER: &str = "user";
    pub const SELECTED_DATABASE: &str = "selected_database";
    pub const HIDE_CHROME: &str = "hide_chrome";
    pub const PENDING_NAVIGATION: &str = "pending_navigation";
    pub const LANG: &str = "lang";
}

#[derive(Clone)]
pub struct TokenStore {
    session: Arc<dyn StorageBackend>,
    persistent: Arc<dyn StorageBackend>,
}

impl TokenStore {
    pub fn new(session: Arc<dyn StorageBackend>, persistent: Arc<dyn StorageBackend>) -> Self {
        Self { session, persistent }
    }

    /// Both tiers in memory. Used by tests and one-shot CLI invocations.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryBackend::new()), Arc::new(MemoryBackend::new()))
    }

    /// Session tier in memory, persistent tier on disk under `dir`.
    pub fn with_dir(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let file = FileBackend::open(dir)?;
        Ok(Self::new(Arc::new(MemoryBackend::new()), Arc::new(file)))
    }

    fn tier(&self, tier: Tier) -> &dyn StorageBackend {
        match tier {
            Tier::Session => self.session.as_ref(),
            Tier::Persistent => self.persistent.as_ref(),
        }
    }

    fn read_raw(&self, tier: Tier, key: &str) -> Option<String> {
        match self.tier(tier).read(key) {
            Ok(v) => v,
            Err(e) => {
                warn!(target: "hrportal::storage", "read {}:{} failed: {}", tier.as_str(), key, e);
                None
            }
        }
    }

    fn write_raw(&self, tier: Tier, key: &str, value: &str) {
        if let Err(e) = self.tier(tier).write(key, value) {
            warn!(target: "hrportal::storage", "write {}:{} failed: {}", tier.as_str(), key, e);
        }
    }

    /// Raw string under `key`. A value that was stored JSON-encoded as a string literal
    /// (`"\"abc\""`) is unquoted so both writer conventions read the same.
    pub fn get_string(&self, tier: Tier, key: &str) -> Option<String> {
        let raw = self.read_raw(tier, key)?;
        if raw.starts_with('"') {
            if let Ok(serde_json::Value::String(s)) = serde_json::from_str::<serde_json::Value>(&raw) {
                return Some(s);
            }
        }
        Some(raw)
    }

    /// Decode the value under `key` as `T`. Absent (or unreadable) is `Ok(None)`;
    /// a value that exists but does not decode is `Err(StoreError::Decode)`.
    pub fn get_structured<T: DeserializeOwned>(&self, tier: Tier, key: &str) -> Result<Option<T>, StoreError> {
        let Some(raw) = self.read_raw(tier, key) else { return Ok(None); };
        serde_json::from_str::<T>(&raw)
            .map(Some)
            .map_err(|e| StoreError::Decode { key: key.to_string(), source: e })
    }

    /// Untyped read: JSON when the stored text parses, otherwise the raw string.
    pub fn get_value(&self, tier: Tier, key: &str) -> Option<serde_json::Value> {
        let raw = self.read_raw(tier, key)?;
        Some(serde_json::from_str(&raw).unwrap_or(serde_json::Value::String(raw)))
    }

    pub fn set_string(&self, tier: Tier, key: &str, value: &str) {
        self.write_raw(tier, key, value);
    }

    pub fn set_structured<T: Serialize + ?Sized>(&self, tier: Tier, key: &str, value: &T) {
        match serde_json::to_string(value) {
            Ok(s) => self.write_raw(tier, key, &s),
            Err(e) => warn!(target: "hrportal::storage", "encode {}:{} failed: {}", tier.as_str(), key, e),
        }
    }

    pub fn remove(&self, tier: Tier, key: &str) {
        if let Err(e) = self.tier(tier).delete(key) {
            warn!(target: "hrportal::storage", "remove {}:{} failed: {}", tier.as_str(), key, e);
        }
    }

    /// Remove `key` from both tiers.
    pub fn remove_everywhere(&self, key: &str) {
        self.remove(Tier::Session, key);
        self.remove(Tier::Persistent, key);
    }
}

#[cfg(test)]
mod storage_tests;
