//! Portal configuration: backend location, request allow-lists, cache and retry constants.
//! Loaded from a JSON document; every field has a default so a partial file is fine.
//! A handful of environment variables override the file (see `apply_env`).

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Credential used instead of the user's session token for a few integration endpoints.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceCredential {
    #[serde(default)]
    pub token: String,
    /// Host names or path prefixes that receive `token`.
    #[serde(default)]
    pub targets: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PortalConfig {
    /// Absolute base URL every relative request path is joined onto.
    pub base_url: String,
    /// Local static asset prefix; matching requests bypass the pipeline.
    pub assets_prefix: String,
    /// Paths that must not be rewritten onto `base_url`.
    pub static_config_paths: Vec<String>,
    /// Extensions that mark a bare relative path (`i18n/th.json`) as a local file.
    pub static_file_extensions: Vec<String>,
    /// Paths that never carry the session bearer token.
    pub public_paths: Vec<String>,
    /// Credential-exchange endpoints; also sent without the session token.
    pub auth_paths: Vec<String>,
    pub login_path: String,
    pub logout_path: String,
    pub service_credential: ServiceCredential,
    /// Path substrings that mark a GET response cacheable.
    pub cacheable_paths: Vec<String>,
    pub cache_ttl_ms: u64,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    pub max_retries: u32,
    /// Login token read-back verification.
    pub readback_attempts: u32,
    pub readback_interval_ms: u64,
    /// Where the anonymous user lands (logout, failed route guard).
    pub anonymous_route: String,
    /// Directory of the persistent storage tier.
    pub storage_dir: Option<PathBuf>,
    /// Menu access policy document.
    pub policy_path: Option<PathBuf>,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/api".to_string(),
            assets_prefix: "assets/".to_string(),
            static_config_paths: vec!["/config/".to_string(), "assets/config".to_string()],
            static_file_extensions: ["json", "svg", "png", "jpg", "jpeg", "gif", "ico", "css", "js", "woff", "woff2", "ttf"]
                .iter()
                .map(|e| e.to_string())
                .collect(),
            public_paths: vec!["/public/".to_string(), "/health".to_string()],
            auth_paths: vec!["/auth/login".to_string(), "/auth/refresh".to_string()],
            login_path: "/auth/login".to_string(),
            logout_path: "/auth/logout".to_string(),
            service_credential: ServiceCredential::default(),
            cacheable_paths: vec!["/master/".to_string(), "/lookup/".to_string(), "/menu".to_string()],
            cache_ttl_ms: 5 * 60 * 1000,
            retry_base_delay_ms: 1_000,
            retry_max_delay_ms: 10_000,
            max_retries: 3,
            readback_attempts: 5,
            readback_interval_ms: 20,
            anonymous_route: "/login".to_string(),
            storage_dir: None,
            policy_path: None,
        }
    }
}

fn parse_u64_env(name: &str) -> Option<u64> {
    match env::var(name) {
        Ok(val) => val.trim().parse::<u64>().ok(),
        Err(_) => None,
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    env::var(name).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

impl PortalConfig {
    /// Read a config file. A missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!(target: "hrportal::config", "config '{}' not found; using defaults", path.display());
            return Ok(Self::default());
        }
        let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        let cfg: PortalConfig = serde_json::from_slice(&bytes).with_context(|| format!("parsing {}", path.display()))?;
        Ok(cfg)
    }

    /// Environment overrides: HRPORTAL_BASE_URL, HRPORTAL_SERVICE_TOKEN, HRPORTAL_STORAGE_DIR,
    /// HRPORTAL_POLICY, HRPORTAL_CACHE_TTL_MS.
    pub fn apply_env(mut self) -> Self {
        if let Some(v) = non_empty_env("HRPORTAL_BASE_URL") { self.base_url = v; }
        if let Some(v) = non_empty_env("HRPORTAL_SERVICE_TOKEN") { self.service_credential.token = v; }
        if let Some(v) = non_empty_env("HRPORTAL_STORAGE_DIR") { self.storage_dir = Some(PathBuf::from(v)); }
        if let Some(v) = non_empty_env("HRPORTAL_POLICY") { self.policy_path = Some(PathBuf::from(v)); }
        if let Some(v) = parse_u64_env("HRPORTAL_CACHE_TTL_MS") { self.cache_ttl_ms = v; }
        self
    }

    pub fn cache_ttl(&self) -> Duration { Duration::from_millis(self.cache_ttl_ms) }
    pub fn retry_base_delay(&self) -> Duration { Duration::from_millis(self.retry_base_delay_ms) }
    pub fn retry_max_delay(&self) -> Duration { Duration::from_millis(self.retry_max_delay_ms) }
    pub fn readback_interval(&self) -> Duration { Duration::from_millis(self.readback_interval_ms) }
}
