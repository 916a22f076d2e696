use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::token::Claims;
use crate::error::{AppError, AppResult};

/// Normalized profile of the authenticated principal.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub branch: Option<String>,
    /// Tenant database/schema the user is signed into.
    #[serde(default)]
    pub schema: Option<String>,
    #[serde(default)]
    pub roles: BTreeSet<String>,
    #[serde(default)]
    pub permissions: BTreeSet<String>,
    #[serde(default)]
    pub role_level: Option<i64>,
    #[serde(default)]
    pub lang: Option<String>,
    /// Claims with no dedicated field, stringified.
    #[serde(default)]
    pub extra_claims: BTreeMap<String, String>,
}

fn clean(v: &Option<String>) -> Option<String> {
    v.as_ref().map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

impl User {
    /// Build a user from decoded claims. The only hard requirement is an identity:
    /// `user_id` or `sub`.
    pub fn from_claims(claims: &Claims) -> AppResult<Self> {
        let id = clean(&claims.user_id)
            .or_else(|| clean(&claims.sub))
            .ok_or_else(|| AppError::token_malformed("token_no_subject", "token carries no subject or user id"))?;
        let username = clean(&claims.username).or_else(|| clean(&claims.sub)).unwrap_or_else(|| id.clone());
        let norm = |xs: &[String]| -> BTreeSet<String> {
            xs.iter().map(|x| x.trim()).filter(|x| !x.is_empty()).map(str::to_string).collect()
        };
        let extra_claims = claims
            .extra
            .iter()
            .map(|(k, v)| {
                let s = match v {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (k.clone(), s)
            })
            .collect();
        Ok(Self {
            id,
            username,
            company: clean(&claims.company),
            branch: clean(&claims.branch),
            schema: clean(&claims.schema),
            roles: norm(&claims.roles),
            permissions: norm(&claims.permissions),
            role_level: claims.role_level,
            lang: clean(&claims.lang),
            extra_claims,
        })
    }

    pub fn has_role(&self, role: &str) -> bool { self.roles.contains(role) }

    pub fn has_permission(&self, p: &str) -> bool { self.permissions.contains(p) }
}
