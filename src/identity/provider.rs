use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::request::{ApiRequest, Envelope, RequestAuthority};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dbcomp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoginResponse {
    #[serde(alias = "accessToken")]
    pub access_token: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Network side of authentication: the credential exchange and the logout notification.
#[async_trait]
pub trait AuthBackend: Send + Sync {
    async fn login(&self, req: &LoginRequest) -> AppResult<LoginResponse>;
    async fn logout(&self, token: Option<&str>) -> AppResult<()>;
}

/// Credential exchange over the request pipeline, so login inherits URL rewriting and
/// retry classification like every other call.
pub struct ApiAuthBackend {
    api: Arc<RequestAuthority>,
    login_path: String,
    logout_path: String,
}

impl ApiAuthBackend {
    pub fn new(api: Arc<RequestAuthority>, login_path: impl Into<String>, logout_path: impl Into<String>) -> Self {
        Self { api, login_path: login_path.into(), logout_path: logout_path.into() }
    }
}

/// Accept both a bare `{accessToken, ...}` body and one wrapped in the response envelope.
fn parse_login_body(v: serde_json::Value) -> AppResult<LoginResponse> {
    let payload = if v.get("success").is_some_and(|s| s.is_boolean()) {
        serde_json::from_value::<Envelope<serde_json::Value>>(v)?.into_result()?
    } else {
        v
    };
    serde_json::from_value::<LoginResponse>(payload)
        .map_err(|e| AppError::auth("login_response".to_string(), format!("login response has no access token: {}", e)))
}

#[async_trait]
impl AuthBackend for ApiAuthBackend {
    async fn login(&self, req: &LoginRequest) -> AppResult<LoginResponse> {
        let body = serde_json::to_value(req)?;
        let v = self.api.send_value(&ApiRequest::post(self.login_path.clone(), body)).await?;
        parse_login_body(v)
    }

    async fn logout(&self, token: Option<&str>) -> AppResult<()> {
        // local state may already be gone by the time this runs, so the token is passed in
        let mut req = ApiRequest::post(self.logout_path.clone(), serde_json::json!({}));
        if let Some(t) = token {
            req = req.with_header("Authorization", format!("Bearer {}", t));
        }
        self.api.execute(&req).await?;
        Ok(())
    }
}
