//! Unified application error model.
//! Storage and token-decode failures are normally swallowed below this layer; what reaches
//! callers is one of the variants here, with transport errors keeping their HTTP status so UI
//! code can tell "permanently rejected" from "exhausted retries" from "business-rule failure".

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppError {
    Storage { code: String, message: String },
    TokenMalformed { code: String, message: String },
    /// HTTP or network failure. `status` is `None` when no response was received.
    Transport { code: String, message: String, status: Option<u16> },
    /// `success: false` in the response envelope despite a 2xx.
    Application { code: String, message: String },
    Auth { code: String, message: String },
    Config { code: String, message: String },
    Internal { code: String, message: String },
}

impl AppError {
    pub fn code_str(&self) -> &str {
        match self {
            AppError::Storage { code, .. }
            | AppError::TokenMalformed { code, .. }
            | AppError::Transport { code, .. }
            | AppError::Application { code, .. }
            | AppError::Auth { code, .. }
            | AppError::Config { code, .. }
            | AppError::Internal { code, .. } => code.as_str(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AppError::Storage { message, .. }
            | AppError::TokenMalformed { message, .. }
            | AppError::Transport { message, .. }
            | AppError::Application { message, .. }
            | AppError::Auth { message, .. }
            | AppError::Config { message, .. }
            | AppError::Internal { message, .. } => message.as_str(),
        }
    }

    pub fn storage<S: Into<String>>(code: S, msg: S) -> Self { AppError::Storage { code: code.into(), message: msg.into() } }
    pub fn token_malformed<S: Into<String>>(code: S, msg: S) -> Self { AppError::TokenMalformed { code: code.into(), message: msg.into() } }
    pub fn application<S: Into<String>>(code: S, msg: S) -> Self { AppError::Application { code: code.into(), message: msg.into() } }
    pub fn auth<S: Into<String>>(code: S, msg: S) -> Self { AppError::Auth { code: code.into(), message: msg.into() } }
    pub fn config<S: Into<String>>(code: S, msg: S) -> Self { AppError::Config { code: code.into(), message: msg.into() } }
    pub fn internal<S: Into<String>>(code: S, msg: S) -> Self { AppError::Internal { code: code.into(), message: msg.into() } }

    /// Transport failure with an HTTP status.
    pub fn http<S: Into<String>>(status: u16, msg: S) -> Self {
        AppError::Transport { code: format!("http_{}", status), message: msg.into(), status: Some(status) }
    }

    /// Transport failure where no response arrived (connect/reset/DNS).
    pub fn network<S: Into<String>>(msg: S) -> Self {
        AppError::Transport { code: "network".into(), message: msg.into(), status: None }
    }

    /// HTTP status carried by a transport error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            AppError::Transport { status, .. } => *status,
            _ => None,
        }
    }

    /// Map to an HTTP status code for display and logging.
    pub fn http_status(&self) -> u16 {
        match self {
            AppError::Transport { status: Some(s), .. } => *s,
            AppError::Transport { status: None, .. } => 503,
            AppError::Storage { .. } => 507,
            AppError::TokenMalformed { .. } | AppError::Auth { .. } => 401,
            AppError::Application { .. } => 422,
            AppError::Config { .. } | AppError::Internal { .. } => 500,
        }
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code_str(), self.message())
    }
}

impl std::error::Error for AppError {}

pub type AppResult<T> = Result<T, AppError>;

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal { code: "internal".into(), message: err.to_string() }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Internal { code: "json".into(), message: err.to_string() }
    }
}
