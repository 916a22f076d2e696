use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde_json::json;

use super::*;
use crate::config::PortalConfig;
use crate::error::{AppError, AppResult};
use crate::identity::{decode_claims, AuthBackend, LoginRequest, LoginResponse, TokenAuthority};
use crate::storage::TokenStore;

fn user(roles: &[&str]) -> User {
    User {
        id: "u1".into(),
        username: "somchai".into(),
        roles: roles.iter().map(|r| r.to_string()).collect(),
        ..Default::default()
    }
}

fn policy() -> AccessPolicy {
    AccessPolicy::default()
        .with_module("PAYROLL", ["HR", "PAYROLL_ADMIN"])
        .with_module("LEAVE", ["HR", "MANAGER"])
        .with_module("SETTINGS", ["ADMIN"])
}

fn menu() -> Vec<MenuNode> {
    vec![
        MenuNode::new("EMPVIEW", "My profile"),
        MenuNode::new("PAYROLL", "Payroll")
            .with_child(MenuNode::new("RUN", "Run payroll").with_module("SETTINGS"))
            .with_child(MenuNode::new("SLIP", "Pay slips")),
        MenuNode::new("LEAVE", "Leave"),
        MenuNode::new("SETTINGS", "Settings"),
        MenuNode::new("ANNOUNCE", "Announcements").with_route("/news"),
    ]
}

fn codes(nodes: &[MenuNode]) -> Vec<&str> { nodes.iter().map(|n| n.code.as_str()).collect() }

#[test]
fn filters_top_level_by_role_and_keeps_order() {
    let r = AccessResolver::new(policy());
    let out = r.resolve(&menu(), &user(&["HR"]));
    assert_eq!(codes(&out), vec!["EMPVIEW", "PAYROLL", "LEAVE", "ANNOUNCE"]);
    assert!(out.iter().all(|n| n.visible));

    let out = r.resolve(&menu(), &user(&["MANAGER"]));
    assert_eq!(codes(&out), vec!["EMPVIEW", "LEAVE", "ANNOUNCE"]);
}

#[test]
fn children_of_visible_category_are_emitted_verbatim() {
    let r = AccessResolver::new(policy());
    let out = r.resolve(&menu(), &user(&["HR"]));
    let payroll = &out[1];
    // RUN requires SETTINGS, which HR does not hold; children are not filtered.
    assert_eq!(codes(&payroll.children), vec!["RUN", "SLIP"]);
    assert_eq!(payroll.route.as_deref(), Some("/payroll"));
    assert_eq!(payroll.children[1].route.as_deref(), Some("/payroll/slip"));
    assert_eq!(out[3].route.as_deref(), Some("/news"));
}

#[test]
fn wildcard_role_sees_everything() {
    let out = AccessResolver::new(policy()).resolve(&menu(), &user(&["ALL"]));
    assert_eq!(out.len(), menu().len());
}

#[test]
fn no_roles_still_sees_open_and_unlisted_modules() {
    let out = AccessResolver::new(policy()).resolve(&menu(), &user(&[]));
    assert_eq!(codes(&out), vec!["EMPVIEW", "ANNOUNCE"]);
}

#[test]
fn resolution_is_pure() {
    let r = AccessResolver::new(policy());
    let m = menu();
    let u = user(&["HR"]);
    assert_eq!(r.resolve(&m, &u), r.resolve(&m, &u));
    assert_eq!(m, menu());
}

struct NoBackend;

#[async_trait]
impl AuthBackend for NoBackend {
    async fn login(&self, _req: &LoginRequest) -> AppResult<LoginResponse> { Err(AppError::network("unused")) }
    async fn logout(&self, _token: Option<&str>) -> AppResult<()> { Ok(()) }
}

fn token(claims: serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let body = URL_SAFE_NO_PAD.encode(claims.to_string().as_bytes());
    format!("{}.{}.sig", header, body)
}

#[test]
fn resolve_for_follows_session_state() {
    let session = SessionAuthority::new(&PortalConfig::default(), TokenAuthority::new(TokenStore::in_memory()), Arc::new(NoBackend));
    let r = AccessResolver::new(policy());
    assert!(r.resolve_for(&menu(), &session).is_empty());

    let exp = chrono::Utc::now().timestamp() + 600;
    let t = token(json!({"sub": "u1", "roles": "HR,MANAGER", "exp": exp}));
    session.set_user_from_token(&t, &decode_claims(&t).unwrap()).unwrap();
    assert_eq!(codes(&r.resolve_for(&menu(), &session)), vec!["EMPVIEW", "PAYROLL", "LEAVE", "ANNOUNCE"]);

    let stale = token(json!({"sub": "u1", "roles": ["HR"], "exp": exp - 1200}));
    session.tokens().set_token(&stale, true);
    assert!(r.resolve_for(&menu(), &session).is_empty());
}
