use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

/// Module code → roles allowed to see it. Codes and roles compare case-insensitively.
///
/// ```json
/// {
///   "wildcard_role": "ALL",
///   "open_modules": ["EMPVIEW"],
///   "modules": { "PAYROLL": ["HR", "PAYROLL_ADMIN"], "LEAVE": ["HR", "MANAGER"] }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AccessPolicy {
    /// Holding this role opens every module.
    pub wildcard_role: String,
    /// Modules any authenticated user may see.
    pub open_modules: BTreeSet<String>,
    pub modules: BTreeMap<String, Vec<String>>,
}

impl Default for AccessPolicy {
    fn default() -> Self {
        Self {
            wildcard_role: "ALL".to_string(),
            open_modules: BTreeSet::from(["EMPVIEW".to_string()]),
            modules: BTreeMap::new(),
        }
    }
}

impl AccessPolicy {
    pub fn from_json(text: &str) -> AppResult<Self> {
        let p: AccessPolicy = serde_json::from_str(text)
            .map_err(|e| AppError::config("policy_parse".to_string(), e.to_string()))?;
        Ok(p.normalized())
    }

    /// Read the policy document. Unlike the portal config a missing file is an error:
    /// an absent policy would silently open every module.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).with_context(|| format!("reading policy {}", path.display()))?;
        let p = Self::from_json(&text).with_context(|| format!("parsing policy {}", path.display()))?;
        tracing::info!(target: "hrportal::access", "loaded access policy: {} modules, {} open", p.modules.len(), p.open_modules.len());
        Ok(p)
    }

    fn normalized(self) -> Self {
        Self {
            wildcard_role: self.wildcard_role.trim().to_uppercase(),
            open_modules: self.open_modules.into_iter().map(|m| m.trim().to_uppercase()).collect(),
            modules: self
                .modules
                .into_iter()
                .map(|(k, roles)| (k.trim().to_uppercase(), roles.into_iter().map(|r| r.trim().to_uppercase()).collect()))
                .collect(),
        }
    }

    pub fn with_module<I, S>(mut self, code: &str, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.modules.insert(code.to_uppercase(), roles.into_iter().map(|r| r.into().to_uppercase()).collect());
        self
    }

    /// Whether a holder of `roles` may see `module`. Absent or unknown codes are open.
    pub fn allows<'a, I>(&self, module: Option<&str>, roles: I) -> bool
    where
        I: IntoIterator<Item = &'a String>,
    {
        let held: Vec<String> = roles.into_iter().map(|r| r.to_uppercase()).collect();
        if !self.wildcard_role.is_empty() && held.iter().any(|r| r.eq_ignore_ascii_case(&self.wildcard_role)) {
            return true;
        }
        let Some(code) = module.map(str::trim).filter(|m| !m.is_empty()) else { return true; };
        let code = code.to_uppercase();
        if self.open_modules.contains(&code) {
            return true;
        }
        match self.modules.get(&code) {
            None => true,
            Some(allowed) => allowed.iter().any(|a| held.iter().any(|h| h.eq_ignore_ascii_case(a))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roles(rs: &[&str]) -> Vec<String> { rs.iter().map(|s| s.to_string()).collect() }

    #[test]
    fn table_lookup_is_case_insensitive() {
        let p = AccessPolicy::from_json(r#"{"modules":{"payroll":["hr"]}}"#).unwrap();
        assert!(p.allows(Some("PAYROLL"), &roles(&["HR"])));
        assert!(p.allows(Some("Payroll"), &roles(&["hr"])));
        assert!(!p.allows(Some("PAYROLL"), &roles(&["EMP"])));
    }

    #[test]
    fn wildcard_and_open_modules() {
        let p = AccessPolicy::default().with_module("PAYROLL", ["HR"]).with_module("EMPVIEW", ["HR"]);
        assert!(p.allows(Some("PAYROLL"), &roles(&["all"])));
        // open modules win over the table
        assert!(p.allows(Some("EMPVIEW"), &roles(&[])));
    }

    #[test]
    fn unknown_or_missing_code_fails_open() {
        let p = AccessPolicy::default().with_module("PAYROLL", ["HR"]);
        assert!(p.allows(Some("TRAINING"), &roles(&[])));
        assert!(p.allows(None, &roles(&[])));
        assert!(p.allows(Some("  "), &roles(&[])));
    }

    #[test]
    fn bad_document_is_config_error() {
        let err = AccessPolicy::from_json("{\"modules\": 3}").unwrap_err();
        assert_eq!(err.code_str(), "policy_parse");
    }

    #[test]
    fn missing_file_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(AccessPolicy::load(tmp.path().join("nope.json")).is_err());
    }
}
