//! Outbound request pipeline.
//!
//! Every request passes, in order: asset bypass, URL normalization, credential selection,
//! cache check, then the retry loop. Bypassed requests go straight to the transport once.
//! Only successful GET/HEAD responses on cacheable paths are memoized (2xx and not an
//! envelope with `success: false`); the cache key is `METHOD full-url-with-query`.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::cache::{CacheStats, RequestCache};
use crate::config::PortalConfig;
use crate::error::{AppError, AppResult};
use crate::identity::TokenAuthority;

mod envelope;
mod retry;
mod rules;

pub use envelope::{reject_failed, unwrap_body, Envelope, EnvelopeError};
pub use retry::{Backoff, RetryDecision, RetryPolicy, TokioBackoff};
pub use rules::{Credential, RequestRules};

/// A request as call sites describe it: relative path, optional query and JSON body.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
    pub headers: Vec<(String, String)>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self { method, path: path.into(), query: Vec::new(), body: None, headers: Vec::new() }
    }

    pub fn get(path: impl Into<String>) -> Self { Self::new(Method::GET, path) }

    pub fn post(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self { body: Some(body), ..Self::new(Method::POST, path) }
    }

    pub fn put(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self { body: Some(body), ..Self::new(Method::PUT, path) }
    }

    pub fn delete(path: impl Into<String>) -> Self { Self::new(Method::DELETE, path) }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// What the transport is asked to send: fully resolved URL and final headers.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
}

impl OutboundRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter().find(|(k, _)| k.eq_ignore_ascii_case(name)).map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool { (200..300).contains(&self.status) }

    pub fn text(&self) -> String { String::from_utf8_lossy(&self.body).into_owned() }
}

/// Network boundary. Returns any HTTP response as `Ok`; `Err` only when no response arrived.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, req: &OutboundRequest) -> AppResult<ApiResponse>;
}

/// `reqwest`-backed transport.
#[derive(Clone, Default)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .build()
            .map_err(|e| AppError::config("http_client".to_string(), e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, req: &OutboundRequest) -> AppResult<ApiResponse> {
        let mut rb = self.client.request(req.method.clone(), &req.url);
        for (k, v) in &req.headers {
            rb = rb.header(k.as_str(), v.as_str());
        }
        if let Some(body) = &req.body {
            rb = rb.json(body);
        }
        let resp = rb.send().await.map_err(|e| AppError::network(e.to_string()))?;
        let status = resp.status().as_u16();
        let body = resp.bytes().await.map_err(|e| AppError::network(e.to_string()))?;
        Ok(ApiResponse { status, body: body.to_vec() })
    }
}

pub struct RequestAuthority {
    rules: RequestRules,
    tokens: TokenAuthority,
    transport: Arc<dyn Transport>,
    cache: RequestCache<ApiResponse>,
    retry: RetryPolicy,
    backoff: Arc<dyn Backoff>,
}

impl RequestAuthority {
    pub fn new(cfg: &PortalConfig, tokens: TokenAuthority, transport: Arc<dyn Transport>) -> Self {
        Self {
            rules: RequestRules::from_config(cfg),
            tokens,
            transport,
            cache: RequestCache::new(cfg.cache_ttl()),
            retry: RetryPolicy::from_config(cfg),
            backoff: Arc::new(TokioBackoff),
        }
    }

    /// Replace how the retry loop waits between attempts.
    pub fn with_backoff(mut self, backoff: Arc<dyn Backoff>) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn rules(&self) -> &RequestRules { &self.rules }

    pub fn retry_policy(&self) -> &RetryPolicy { &self.retry }

    pub fn cache_stats(&self) -> CacheStats { self.cache.stats() }

    pub fn clear_cache(&self) { self.cache.clear(); }

    /// Drop cached responses whose key starts with `METHOD <url prefix of path>`.
    pub fn invalidate(&self, method: &Method, path: &str) -> usize {
        let prefix = format!("{} {}", method.as_str(), self.rules.resolve_url(path, &[]));
        self.cache.remove_prefix(&prefix)
    }

    fn prepare(&self, req: &ApiRequest) -> OutboundRequest {
        let url = self.rules.resolve_url(&req.path, &req.query);
        let mut headers = req.headers.clone();
        if req.body.is_some() && !headers.iter().any(|(k, _)| k.eq_ignore_ascii_case("content-type")) {
            headers.push(("Content-Type".into(), "application/json".into()));
        }
        let has_auth = headers.iter().any(|(k, _)| k.eq_ignore_ascii_case("authorization"));
        match self.rules.select_credential(&req.path) {
            _ if has_auth => {}
            Credential::Service(tok) => headers.push(("Authorization".into(), format!("Bearer {}", tok))),
            Credential::Session => match self.tokens.get_token() {
                Some(tok) => headers.push(("Authorization".into(), format!("Bearer {}", tok))),
                None => warn!(target: "hrportal::request", "no session token for protected endpoint {}", req.path),
            },
            Credential::Anonymous => {}
        }
        OutboundRequest { method: req.method.clone(), url, headers, body: req.body.clone() }
    }

    async fn send_once(&self, out: &OutboundRequest) -> AppResult<ApiResponse> {
        let resp = self.transport.send(out).await?;
        if resp.is_success() {
            Ok(resp)
        } else {
            Err(AppError::http(resp.status, format!("{} {} -> HTTP {}: {}", out.method, out.url, resp.status, resp.text())))
        }
    }

    async fn send_with_retry(&self, out: &OutboundRequest) -> AppResult<ApiResponse> {
        self.retry.run(self.backoff.as_ref(), |_| self.send_once(out)).await
    }

    /// Run `req` through the full pipeline and return the raw 2xx response.
    pub async fn execute(&self, req: &ApiRequest) -> AppResult<ApiResponse> {
        if self.rules.is_bypassed(&req.path) {
            debug!(target: "hrportal::request", "bypass {}", req.path);
            let out = OutboundRequest {
                method: req.method.clone(),
                url: req.path.clone(),
                headers: req.headers.clone(),
                body: req.body.clone(),
            };
            return self.send_once(&out).await;
        }
        let out = self.prepare(req);
        let cacheable = (req.method == Method::GET || req.method == Method::HEAD) && self.rules.is_cacheable(&req.path);
        if !cacheable {
            return self.send_with_retry(&out).await;
        }
        let key = format!("{} {}", out.method.as_str(), out.url);
        // an envelope reporting failure is an error, not a result worth keeping
        let fetch = || async {
            let resp = self.send_with_retry(&out).await?;
            reject_failed(&resp.body)?;
            Ok::<_, AppError>(resp)
        };
        self.cache.cache_or_fetch(&key, fetch, None).await
    }

    /// GET and unwrap the response envelope.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> AppResult<T> {
        let resp = self.execute(&ApiRequest::get(path)).await?;
        unwrap_body(&resp.body)
    }

    /// POST a JSON body and unwrap the response envelope.
    pub async fn post_json<T: DeserializeOwned, B: Serialize + ?Sized>(&self, path: &str, body: &B) -> AppResult<T> {
        let resp = self.execute(&ApiRequest::post(path, serde_json::to_value(body)?)).await?;
        unwrap_body(&resp.body)
    }

    /// Run `req` and parse the body as JSON without envelope handling.
    pub async fn send_value(&self, req: &ApiRequest) -> AppResult<serde_json::Value> {
        let resp = self.execute(req).await?;
        if resp.body.is_empty() {
            return Ok(serde_json::Value::Null);
        }
        Ok(serde_json::from_slice(&resp.body)?)
    }
}

#[cfg(test)]
mod request_tests;
