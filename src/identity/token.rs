use std::collections::BTreeMap;

use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, warn};

use crate::storage::{keys, Tier, TokenStore};

/// Decoded token payload. Known claim names are typed; everything else lands in `extra`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Claims {
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default, alias = "userId")]
    pub user_id: Option<String>,
    #[serde(default, alias = "userName", alias = "preferred_username")]
    pub username: Option<String>,
    #[serde(default, alias = "role", deserialize_with = "string_or_seq")]
    pub roles: Vec<String>,
    #[serde(default, deserialize_with = "string_or_seq")]
    pub permissions: Vec<String>,
    #[serde(default, alias = "roleLevel", deserialize_with = "lenient_i64")]
    pub role_level: Option<i64>,
    #[serde(default, alias = "compCode")]
    pub company: Option<String>,
    #[serde(default, alias = "branchCode")]
    pub branch: Option<String>,
    #[serde(default, alias = "dbName", alias = "tenant")]
    pub schema: Option<String>,
    /// Expiry, epoch seconds.
    #[serde(default, deserialize_with = "lenient_i64")]
    pub exp: Option<i64>,
    #[serde(default)]
    pub lang: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

fn string_or_seq<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
        Null,
    }
    Ok(match OneOrMany::deserialize(d)? {
        OneOrMany::One(s) => s.split(',').map(|p| p.trim()).filter(|p| !p.is_empty()).map(str::to_string).collect(),
        OneOrMany::Many(v) => v,
        OneOrMany::Null => Vec::new(),
    })
}

fn lenient_i64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
    let v = Option::<serde_json::Value>::deserialize(d)?;
    Ok(match v {
        Some(serde_json::Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Some(serde_json::Value::String(s)) => s.trim().parse::<i64>().ok(),
        _ => None,
    })
}

#[derive(Debug, thiserror::Error)]
pub enum TokenDecodeError {
    #[error("token is blank")]
    Blank,
    #[error("token has {0} segment(s); expected header.payload[.signature]")]
    Segments(usize),
    #[error("token payload is not base64url: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("token payload is not a claims object: {0}")]
    Json(#[from] serde_json::Error),
}

/// Decode a JWT-shaped token's payload without verifying its signature.
pub fn decode_claims(token: &str) -> Result<Claims, TokenDecodeError> {
    let token = token.trim();
    if token.is_empty() {
        return Err(TokenDecodeError::Blank);
    }
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() < 2 || parts.len() > 3 || parts[1].is_empty() {
        return Err(TokenDecodeError::Segments(parts.len()));
    }
    let payload = parts[1].trim_end_matches('=');
    let bytes = match base64::engine::general_purpose::URL_SAFE_NO_PAD.decode(payload) {
        Ok(b) => b,
        Err(_) => base64::engine::general_purpose::STANDARD_NO_PAD.decode(payload)?,
    };
    let claims: Claims = serde_json::from_slice(&bytes)?;
    Ok(claims)
}

/// Result of checking a token locally. Never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenValidation {
    pub is_valid: bool,
    pub is_expired: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub decoded: Option<Claims>,
}

impl TokenValidation {
    fn untrusted() -> Self {
        Self { is_valid: false, is_expired: true, expires_at: None, decoded: None }
    }
}

/// Evaluate `token` against `now_secs`. Total: every input yields a well-formed validation.
pub fn validate_at(token: &str, now_secs: i64) -> TokenValidation {
    if token.trim().is_empty() {
        return TokenValidation::untrusted();
    }
    match decode_claims(token) {
        Ok(claims) => {
            let is_expired = matches!(claims.exp, Some(exp) if exp < now_secs);
            let expires_at = claims.exp.and_then(|exp| DateTime::<Utc>::from_timestamp(exp, 0));
            TokenValidation { is_valid: !is_expired, is_expired, expires_at, decoded: Some(claims) }
        }
        Err(e) => {
            debug!(target: "hrportal::token", "token rejected: {}", e);
            TokenValidation::untrusted()
        }
    }
}

/// Owns the bearer token across both storage tiers.
///
/// The session tier is authoritative; the persistent tier is a mirror used to restore a
/// session after a restart. Validation is purely local (decode + expiry) and provides no
/// security guarantee; the backend is the actual gate.
#[derive(Clone)]
pub struct TokenAuthority {
    store: TokenStore,
}

impl TokenAuthority {
    pub fn new(store: TokenStore) -> Self { Self { store } }

    pub fn store(&self) -> &TokenStore { &self.store }

    /// Session tier first; persistent tier when the session copy is absent or blank.
    pub fn get_token(&self) -> Option<String> {
        let session = self.store.get_string(Tier::Session, keys::TOKEN).filter(|t| !t.trim().is_empty());
        if session.is_some() {
            return session;
        }
        self.store.get_string(Tier::Persistent, keys::TOKEN).filter(|t| !t.trim().is_empty())
    }

    /// Always writes the session tier; mirrors to the persistent tier when `persist`.
    pub fn set_token(&self, token: &str, persist: bool) {
        if token.trim().is_empty() {
            warn!(target: "hrportal::token", "refusing to store a blank token");
            return;
        }
        self.store.set_string(Tier::Session, keys::TOKEN, token);
        if persist {
            self.store.set_string(Tier::Persistent, keys::TOKEN, token);
        }
    }

    pub fn remove_token(&self) {
        self.store.remove_everywhere(keys::TOKEN);
    }

    /// Validate `token`, or the stored token when `None`.
    pub fn validate_token(&self, token: Option<&str>) -> TokenValidation {
        self.validate_token_at(token, Utc::now().timestamp())
    }

    pub fn validate_token_at(&self, token: Option<&str>, now_secs: i64) -> TokenValidation {
        match token {
            Some(t) => validate_at(t, now_secs),
            None => match self.get_token() {
                Some(t) => validate_at(&t, now_secs),
                None => TokenValidation::untrusted(),
            },
        }
    }

    pub fn is_token_expired(&self, token: Option<&str>) -> bool {
        self.validate_token(token).is_expired
    }
}
