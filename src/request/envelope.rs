use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnvelopeError {
    #[serde(default)]
    pub code: Option<serde_json::Value>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Backend response shape: `{success, data?, error?: {code, message}, message?}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(default = "Option::default")]
    pub data: Option<T>,
    #[serde(default)]
    pub error: Option<EnvelopeError>,
    #[serde(default)]
    pub message: Option<String>,
}

impl<T: DeserializeOwned> Envelope<T> {
    /// `data` on success; otherwise an application error carrying the server's message.
    pub fn into_result(self) -> AppResult<T> {
        if !self.success {
            let code = self
                .error
                .as_ref()
                .and_then(|e| e.code.as_ref())
                .map(|c| match c {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .unwrap_or_else(|| "application_error".to_string());
            let message = self
                .message
                .or_else(|| self.error.and_then(|e| e.message))
                .unwrap_or_else(|| "request failed".to_string());
            return Err(AppError::Application { code, message });
        }
        match self.data {
            Some(d) => Ok(d),
            // success without data: fine for unit-like targets
            None => serde_json::from_value(serde_json::Value::Null)
                .map_err(|_| AppError::application("empty_data", "response carried no data")),
        }
    }
}

/// Parse a response body as an envelope and unwrap it.
pub fn unwrap_body<T: DeserializeOwned>(body: &[u8]) -> AppResult<T> {
    let env: Envelope<T> = serde_json::from_slice(body)
        .map_err(|e| AppError::internal("bad_envelope".to_string(), format!("response is not an envelope: {}", e)))?;
    env.into_result()
}

/// Surface an envelope reporting `success: false` as its application error. Bodies that are
/// not envelopes, or not JSON at all, pass.
pub fn reject_failed(body: &[u8]) -> AppResult<()> {
    let Ok(v) = serde_json::from_slice::<serde_json::Value>(body) else { return Ok(()) };
    if v.get("success").and_then(|s| s.as_bool()) != Some(false) {
        return Ok(());
    }
    let env: Envelope<serde_json::Value> = serde_json::from_value(v)?;
    env.into_result().map(|_| ())
}
