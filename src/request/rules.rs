//! Path rules applied before a request reaches the network: asset bypass, URL
//! normalization, credential selection and cache eligibility.

use reqwest::Url;

use crate::config::PortalConfig;

/// Which credential a request carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    /// Statically configured service-to-service token.
    Service(String),
    /// The user's session bearer token.
    Session,
    /// Public or credential-exchange endpoint.
    Anonymous,
}

#[derive(Debug, Clone)]
pub struct RequestRules {
    base_url: String,
    assets_prefix: String,
    static_config_paths: Vec<String>,
    file_extensions: Vec<String>,
    public_paths: Vec<String>,
    auth_paths: Vec<String>,
    service_token: String,
    service_targets: Vec<String>,
    cacheable_paths: Vec<String>,
}

fn is_absolute(path: &str) -> bool {
    let lower = path.trim_start().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

impl RequestRules {
    pub fn from_config(cfg: &PortalConfig) -> Self {
        Self {
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            assets_prefix: cfg.assets_prefix.trim_start_matches('/').to_string(),
            static_config_paths: cfg.static_config_paths.clone(),
            file_extensions: cfg
                .static_file_extensions
                .iter()
                .map(|e| e.trim().trim_start_matches('.').to_ascii_lowercase())
                .filter(|e| !e.is_empty())
                .collect(),
            public_paths: cfg.public_paths.clone(),
            auth_paths: cfg.auth_paths.clone(),
            service_token: cfg.service_credential.token.clone(),
            service_targets: cfg.service_credential.targets.clone(),
            cacheable_paths: cfg.cacheable_paths.clone(),
        }
    }

    /// Local static assets and relative file paths skip the whole pipeline.
    pub fn is_bypassed(&self, path: &str) -> bool {
        if is_absolute(path) {
            return false;
        }
        let p = path.trim();
        let stripped = p.trim_start_matches('/');
        if !self.assets_prefix.is_empty() && stripped.starts_with(&self.assets_prefix) {
            return true;
        }
        if p.starts_with("./") || p.starts_with("../") {
            return true;
        }
        // bare relative file reference with a known static extension, e.g. "i18n/en.json";
        // dotted endpoint segments such as "employees/john.doe" stay API calls
        if !p.starts_with('/') {
            let last = p.split(['?', '#']).next().unwrap_or("").rsplit('/').next().unwrap_or("");
            if let Some((stem, ext)) = last.rsplit_once('.') {
                return !stem.is_empty() && self.file_extensions.iter().any(|e| e.eq_ignore_ascii_case(ext));
            }
        }
        false
    }

    fn is_static_config(&self, path: &str) -> bool {
        self.static_config_paths.iter().any(|p| !p.is_empty() && path.starts_with(p.as_str()))
    }

    /// Absolute URLs and static-config paths stay as given; everything else is joined onto
    /// the backend base URL. `query` pairs are percent-encoded and appended.
    pub fn resolve_url(&self, path: &str, query: &[(String, String)]) -> String {
        let path = path.trim();
        let mut url = if is_absolute(path) || self.is_static_config(path) {
            path.to_string()
        } else {
            format!("{}/{}", self.base_url, path.trim_start_matches('/'))
        };
        if !query.is_empty() {
            let qs = query
                .iter()
                .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
                .collect::<Vec<_>>()
                .join("&");
            url.push(if url.contains('?') { '&' } else { '?' });
            url.push_str(&qs);
        }
        url
    }

    /// Path component used for allow-list matching: the URL path for absolute URLs,
    /// otherwise the given path with a leading '/' and without query or fragment.
    pub fn route_path(path: &str) -> String {
        if is_absolute(path) {
            if let Ok(u) = Url::parse(path.trim()) {
                return u.path().to_string();
            }
        }
        let p = path.trim().split(['?', '#']).next().unwrap_or("");
        format!("/{}", p.trim_start_matches('/'))
    }

    pub fn select_credential(&self, path: &str) -> Credential {
        let route = Self::route_path(path);
        if !self.service_token.is_empty() {
            let host = if is_absolute(path) {
                Url::parse(path.trim()).ok().and_then(|u| u.host_str().map(str::to_ascii_lowercase))
            } else {
                None
            };
            let hit = self.service_targets.iter().any(|t| {
                if t.starts_with('/') {
                    route.starts_with(t.as_str())
                } else {
                    host.as_deref() == Some(t.to_ascii_lowercase().as_str())
                }
            });
            if hit {
                return Credential::Service(self.service_token.clone());
            }
        }
        let matches = |list: &[String]| list.iter().any(|p| !p.is_empty() && route.starts_with(p.as_str()));
        if matches(&self.public_paths) || matches(&self.auth_paths) {
            return Credential::Anonymous;
        }
        Credential::Session
    }

    pub fn is_cacheable(&self, path: &str) -> bool {
        let route = Self::route_path(path);
        self.cacheable_paths.iter().any(|p| !p.is_empty() && route.contains(p.as_str()))
    }
}
