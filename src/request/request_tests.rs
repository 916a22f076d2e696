use super::*;
use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::json;

use crate::config::ServiceCredential;
use crate::storage::TokenStore;

/// Scripted transport: pops one canned outcome per call and records what it was sent.
#[derive(Default)]
struct Scripted {
    outcomes: Mutex<VecDeque<AppResult<ApiResponse>>>,
    sent: Mutex<Vec<OutboundRequest>>,
}

impl Scripted {
    fn with(outcomes: Vec<AppResult<ApiResponse>>) -> Arc<Self> {
        Arc::new(Self { outcomes: Mutex::new(outcomes.into()), sent: Mutex::new(Vec::new()) })
    }
    fn calls(&self) -> usize { self.sent.lock().len() }
    fn last(&self) -> OutboundRequest { self.sent.lock().last().cloned().expect("no request sent") }
}

#[async_trait]
impl Transport for Scripted {
    async fn send(&self, req: &OutboundRequest) -> AppResult<ApiResponse> {
        self.sent.lock().push(req.clone());
        self.outcomes.lock().pop_front().unwrap_or_else(|| Ok(ok(json!({"success": true, "data": null}))))
    }
}

#[derive(Default)]
struct Recorded(Mutex<Vec<Duration>>);

#[async_trait]
impl Backoff for Recorded {
    async fn wait(&self, delay: Duration) { self.0.lock().push(delay); }
}

fn ok(v: serde_json::Value) -> ApiResponse { ApiResponse { status: 200, body: v.to_string().into_bytes() } }

fn status(s: u16) -> ApiResponse { ApiResponse { status: s, body: b"{}".to_vec() } }

fn config() -> PortalConfig {
    PortalConfig {
        base_url: "https://hr.example.com/api".into(),
        service_credential: ServiceCredential { token: "svc".into(), targets: vec!["/integration/".into()] },
        ..Default::default()
    }
}

fn authority(t: Arc<Scripted>) -> (RequestAuthority, TokenAuthority, Arc<Recorded>) {
    let tokens = TokenAuthority::new(TokenStore::in_memory());
    let rec = Arc::new(Recorded::default());
    let ra = RequestAuthority::new(&config(), tokens.clone(), t).with_backoff(rec.clone());
    (ra, tokens, rec)
}

#[tokio::test]
async fn session_token_is_injected() {
    let t = Scripted::with(vec![]);
    let (ra, tokens, _) = authority(t.clone());
    tokens.set_token("abc.def.ghi", true);
    ra.execute(&ApiRequest::get("/employees")).await.unwrap();
    let sent = t.last();
    assert_eq!(sent.url, "https://hr.example.com/api/employees");
    assert_eq!(sent.header("authorization"), Some("Bearer abc.def.ghi"));
}

#[tokio::test]
async fn missing_token_still_sends() {
    let t = Scripted::with(vec![]);
    let (ra, _, _) = authority(t.clone());
    ra.execute(&ApiRequest::get("/employees")).await.unwrap();
    assert_eq!(t.last().header("Authorization"), None);
}

#[tokio::test]
async fn service_and_public_credentials() {
    let t = Scripted::with(vec![]);
    let (ra, tokens, _) = authority(t.clone());
    tokens.set_token("user-token", true);
    ra.execute(&ApiRequest::post("/integration/sync", json!({}))).await.unwrap();
    assert_eq!(t.last().header("Authorization"), Some("Bearer svc"));
    assert_eq!(t.last().header("content-type"), Some("application/json"));
    ra.execute(&ApiRequest::post("/auth/login", json!({"username": "u"}))).await.unwrap();
    assert_eq!(t.last().header("Authorization"), None);
}

#[tokio::test]
async fn assets_bypass_everything() {
    let t = Scripted::with(vec![Ok(status(503))]);
    let (ra, tokens, rec) = authority(t.clone());
    tokens.set_token("user-token", true);
    let err = ra.execute(&ApiRequest::get("assets/i18n/en.json")).await.unwrap_err();
    assert_eq!(err.status(), Some(503));
    assert_eq!(t.calls(), 1);
    assert!(rec.0.lock().is_empty());
    let sent = t.last();
    assert_eq!(sent.url, "assets/i18n/en.json");
    assert_eq!(sent.header("Authorization"), None);
}

#[tokio::test]
async fn cacheable_get_hits_network_once() {
    let body = json!({"success": true, "data": [{"code": "D01", "name": "Finance"}]});
    let t = Scripted::with(vec![Ok(ok(body.clone())), Ok(ok(json!({"success": true, "data": []})))]);
    let (ra, _, _) = authority(t.clone());
    let a = ra.execute(&ApiRequest::get("/master/departments")).await.unwrap();
    let b = ra.execute(&ApiRequest::get("/master/departments")).await.unwrap();
    assert_eq!(t.calls(), 1);
    assert_eq!(a.body, b.body);
    assert_eq!(ra.cache_stats().hits, 1);
    // Different query is a different key.
    ra.execute(&ApiRequest::get("/master/departments").with_query("active", "1")).await.unwrap();
    assert_eq!(t.calls(), 2);
}

#[tokio::test]
async fn non_get_and_non_listed_paths_are_not_cached() {
    let t = Scripted::with(vec![]);
    let (ra, _, _) = authority(t.clone());
    ra.execute(&ApiRequest::post("/master/departments", json!({}))).await.unwrap();
    ra.execute(&ApiRequest::post("/master/departments", json!({}))).await.unwrap();
    ra.execute(&ApiRequest::get("/employees")).await.unwrap();
    ra.execute(&ApiRequest::get("/employees")).await.unwrap();
    assert_eq!(t.calls(), 4);
}

#[tokio::test]
async fn invalidate_forces_refetch() {
    let t = Scripted::with(vec![]);
    let (ra, _, _) = authority(t.clone());
    ra.execute(&ApiRequest::get("/lookup/positions")).await.unwrap();
    assert_eq!(ra.invalidate(&Method::GET, "/lookup/"), 1);
    ra.execute(&ApiRequest::get("/lookup/positions")).await.unwrap();
    assert_eq!(t.calls(), 2);
}

#[tokio::test]
async fn transient_failures_retry_then_succeed() {
    let t = Scripted::with(vec![Ok(status(503)), Ok(status(503)), Ok(status(503)), Ok(ok(json!({"success": true, "data": 5})))]);
    let (ra, _, rec) = authority(t.clone());
    let v: u32 = ra.get_json("/employees/count").await.unwrap();
    assert_eq!(v, 5);
    assert_eq!(t.calls(), 4);
    assert_eq!(*rec.0.lock(), vec![Duration::from_secs(1), Duration::from_secs(2), Duration::from_secs(4)]);
}

#[tokio::test]
async fn retries_are_exhausted_after_four_attempts() {
    let t = Scripted::with(vec![Err(AppError::network("reset")); 6]);
    let (ra, _, _) = authority(t.clone());
    let err = ra.execute(&ApiRequest::get("/employees")).await.unwrap_err();
    assert_eq!(err, AppError::network("reset"));
    assert_eq!(t.calls(), 4);
}

#[tokio::test]
async fn client_errors_fail_immediately() {
    let t = Scripted::with(vec![Ok(status(404)), Ok(status(200))]);
    let (ra, _, rec) = authority(t.clone());
    let err = ra.execute(&ApiRequest::get("/employees/999")).await.unwrap_err();
    assert_eq!(err.status(), Some(404));
    assert_eq!(t.calls(), 1);
    assert!(rec.0.lock().is_empty());
}

#[tokio::test]
async fn failed_cacheable_request_is_not_cached() {
    let t = Scripted::with(vec![Ok(status(400)), Ok(ok(json!({"success": true, "data": 1})))]);
    let (ra, _, _) = authority(t.clone());
    assert!(ra.execute(&ApiRequest::get("/master/x")).await.is_err());
    let v: u32 = ra.get_json("/master/x").await.unwrap();
    assert_eq!(v, 1);
    assert_eq!(t.calls(), 2);
}

#[tokio::test]
async fn application_failure_is_not_retried() {
    let t = Scripted::with(vec![Ok(ok(json!({"success": false, "message": "Payroll period closed"})))]);
    let (ra, _, rec) = authority(t.clone());
    let err = ra.post_json::<serde_json::Value, _>("/payroll/run", &json!({"period": "2026-09"})).await.unwrap_err();
    assert_eq!(err, AppError::Application { code: "application_error".into(), message: "Payroll period closed".into() });
    assert_eq!(t.calls(), 1);
    assert!(rec.0.lock().is_empty());
}

#[tokio::test]
async fn dotted_relative_endpoint_goes_through_pipeline() {
    let t = Scripted::with(vec![Ok(status(503)), Ok(ok(json!({"success": true, "data": null})))]);
    let (ra, tokens, rec) = authority(t.clone());
    tokens.set_token("user-token", true);
    ra.execute(&ApiRequest::get("employees/john.doe")).await.unwrap();
    let sent = t.last();
    assert_eq!(sent.url, "https://hr.example.com/api/employees/john.doe");
    assert_eq!(sent.header("Authorization"), Some("Bearer user-token"));
    assert_eq!(t.calls(), 2);
    assert_eq!(*rec.0.lock(), vec![Duration::from_secs(1)]);
}

#[tokio::test]
async fn application_failure_on_cacheable_path_is_not_cached() {
    let t = Scripted::with(vec![
        Ok(ok(json!({"success": false, "message": "Master data is being rebuilt"}))),
        Ok(ok(json!({"success": true, "data": 7}))),
    ]);
    let (ra, _, rec) = authority(t.clone());
    let err = ra.get_json::<u32>("/master/x").await.unwrap_err();
    assert!(matches!(err, AppError::Application { .. }));
    assert_eq!(err.message(), "Master data is being rebuilt");
    let v: u32 = ra.get_json("/master/x").await.unwrap();
    assert_eq!(v, 7);
    assert_eq!(t.calls(), 2);
    assert!(rec.0.lock().is_empty());
    // the successful reply is now the cached one
    assert_eq!(ra.get_json::<u32>("/master/x").await.unwrap(), 7);
    assert_eq!(t.calls(), 2);
}
