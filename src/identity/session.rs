use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use super::flags::SessionFlags;
use super::provider::{AuthBackend, LoginRequest};
use super::token::{decode_claims, validate_at, Claims, TokenAuthority};
use super::user::User;
use crate::config::PortalConfig;
use crate::error::{AppError, AppResult};
use crate::request::RequestAuthority;
use crate::storage::{keys, Tier};

/// Implicit session state, derived on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Anonymous,
    Authenticated,
    /// A user is held in memory but the token no longer validates.
    Expired,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginResult {
    pub user: User,
    pub token: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    pub to: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteAccess {
    Allowed,
    Denied(Redirect),
}

/// Why the anonymous entry point is being shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryReason {
    SignedOut,
    Expired,
    Invalid,
}

/// Owns the current user and every transition between session states: login, logout,
/// restoration at start-up and token-delivered entry. Constructed explicitly and shared
/// by reference; there is no global session.
pub struct SessionAuthority {
    tokens: TokenAuthority,
    backend: Arc<dyn AuthBackend>,
    current: RwLock<Option<User>>,
    anonymous_route: String,
    readback_attempts: u32,
    readback_interval: Duration,
    // responses cached under one user must not be served to the next
    request_cache: Option<Arc<RequestAuthority>>,
}

impl SessionAuthority {
    pub fn new(cfg: &PortalConfig, tokens: TokenAuthority, backend: Arc<dyn AuthBackend>) -> Self {
        Self {
            tokens,
            backend,
            current: RwLock::new(None),
            anonymous_route: cfg.anonymous_route.clone(),
            readback_attempts: cfg.readback_attempts.max(1),
            readback_interval: cfg.readback_interval(),
            request_cache: None,
        }
    }

    /// Drop `api`'s response cache whenever the local session is torn down.
    pub fn with_request_cache(mut self, api: Arc<RequestAuthority>) -> Self {
        self.request_cache = Some(api);
        self
    }

    pub fn tokens(&self) -> &TokenAuthority { &self.tokens }

    pub fn flags(&self) -> SessionFlags { SessionFlags::new(self.tokens.store().clone()) }

    pub fn current_user(&self) -> Option<User> { self.current.read().clone() }

    pub fn status(&self) -> SessionStatus {
        if self.current.read().is_none() {
            return SessionStatus::Anonymous;
        }
        if self.tokens.validate_token(None).is_valid {
            SessionStatus::Authenticated
        } else {
            SessionStatus::Expired
        }
    }

    /// Exchange credentials for a token and establish the session. On any failure nothing
    /// is mutated; a previously established session stays as it was.
    pub async fn login(&self, creds: &LoginRequest) -> AppResult<LoginResult> {
        let resp = match self.backend.login(creds).await {
            Ok(r) => r,
            Err(e) => {
                warn!(target: "hrportal::session", "login failed for '{}': {}", creds.username, e);
                return Err(e);
            }
        };
        let token = resp.access_token;
        let claims = decode_claims(&token)
            .map_err(|e| AppError::token_malformed("token_malformed".to_string(), format!("login returned an unusable token: {}", e)))?;
        let user = User::from_claims(&claims)?;

        self.tokens.set_token(&token, true);
        self.verify_readback(&token).await;
        self.persist_user(&user);
        *self.current.write() = Some(user.clone());

        let flags = self.flags();
        if let Some(db) = creds.dbcomp.as_deref().or(creds.tenant.as_deref()) {
            flags.set_selected_database(db);
        }
        if let Some(lang) = creds.lang.as_deref().or(user.lang.as_deref()) {
            flags.set_lang(lang);
        }
        info!(target: "hrportal::session", "login user={} roles={:?}", user.username, user.roles);
        Ok(LoginResult { user, token })
    }

    /// The very next request must carry the new token, so confirm the write landed
    /// before login resolves. Best effort: exhaustion is logged, not fatal.
    async fn verify_readback(&self, token: &str) {
        for attempt in 0..self.readback_attempts {
            if self.tokens.get_token().as_deref() == Some(token) {
                if attempt > 0 {
                    debug!(target: "hrportal::session", "token read-back confirmed after {} retries", attempt);
                }
                return;
            }
            self.tokens.set_token(token, true);
            tokio::time::sleep(self.readback_interval).await;
        }
        if self.tokens.get_token().as_deref() != Some(token) {
            warn!(target: "hrportal::session", "token read-back not confirmed after {} attempts", self.readback_attempts);
        }
    }

    fn persist_user(&self, user: &User) {
        let store = self.tokens.store();
        store.set_structured(Tier::Persistent, keys::USER, user);
        // older readers only look in the session tier
        store.set_structured(Tier::Session, keys::USER, user);
    }

    fn clear_local(&self) {
        self.tokens.remove_token();
        self.tokens.store().remove_everywhere(keys::USER);
        self.flags().clear();
        *self.current.write() = None;
        if let Some(api) = &self.request_cache {
            api.clear_cache();
        }
    }

    /// Tear down the local session and notify the backend in the background. Local
    /// teardown never waits on the network and never fails.
    pub async fn logout(&self) -> Redirect {
        let token = self.tokens.get_token();
        let backend = self.backend.clone();
        tokio::spawn(async move {
            if let Err(e) = backend.logout(token.as_deref()).await {
                debug!(target: "hrportal::session", "logout notification failed (ignored): {}", e);
            }
        });
        let who = self.current.read().as_ref().map(|u| u.username.clone());
        self.clear_local();
        info!(target: "hrportal::session", "logout user={}", who.as_deref().unwrap_or("<none>"));
        self.anonymous_redirect(EntryReason::SignedOut)
    }

    /// Promote a persisted user into memory when the stored token still validates;
    /// otherwise clear whatever partial state exists. Safe to call repeatedly.
    pub fn restore_session(&self) -> bool {
        let store = self.tokens.store();
        let mut user = match store.get_structured::<User>(Tier::Persistent, keys::USER) {
            Ok(u) => u,
            Err(e) => {
                warn!(target: "hrportal::session", "discarding unreadable persisted user: {}", e);
                None
            }
        };
        if user.is_none() {
            match store.get_structured::<User>(Tier::Session, keys::USER) {
                Ok(Some(u)) => {
                    info!(target: "hrportal::session", "migrating session-tier user '{}' to persistent tier", u.username);
                    store.set_structured(Tier::Persistent, keys::USER, &u);
                    user = Some(u);
                }
                Ok(None) => {}
                Err(e) => warn!(target: "hrportal::session", "discarding unreadable session-tier user: {}", e),
            }
        }
        let token = self.tokens.get_token();
        match (user, token) {
            (Some(u), Some(t)) if self.tokens.validate_token(Some(&t)).is_valid => {
                if store.get_string(Tier::Session, keys::TOKEN).as_deref() != Some(t.as_str()) {
                    self.tokens.set_token(&t, false);
                }
                debug!(target: "hrportal::session", "session restored for '{}'", u.username);
                *self.current.write() = Some(u);
                true
            }
            (u, t) => {
                if u.is_some() || t.is_some() {
                    info!(target: "hrportal::session", "stored session is incomplete or expired; clearing");
                }
                self.clear_local();
                false
            }
        }
    }

    /// Establish a session from an externally delivered token. Same normalization and
    /// persistence as login, without the credential exchange.
    pub fn set_user_from_token(&self, token: &str, claims: &Claims) -> AppResult<User> {
        let user = User::from_claims(claims)?;
        self.tokens.set_token(token, true);
        self.persist_user(&user);
        *self.current.write() = Some(user.clone());
        info!(target: "hrportal::session", "token entry user={}", user.username);
        Ok(user)
    }

    /// Token-delivered entry (e.g. a signed link). Returns where to navigate next: the
    /// target module, home, or the anonymous entry point flagged `expired`/`invalid`.
    pub fn enter_with_token(&self, token: &str, lang: Option<&str>, module: Option<&str>) -> Redirect {
        let claims = match decode_claims(token) {
            Ok(c) => c,
            Err(e) => {
                warn!(target: "hrportal::session", "token entry rejected: {}", e);
                return self.anonymous_redirect(EntryReason::Invalid);
            }
        };
        if validate_at(token, Utc::now().timestamp()).is_expired {
            return self.anonymous_redirect(EntryReason::Expired);
        }
        let user = match self.set_user_from_token(token, &claims) {
            Ok(u) => u,
            Err(e) => {
                warn!(target: "hrportal::session", "token entry rejected: {}", e);
                return self.anonymous_redirect(EntryReason::Invalid);
            }
        };
        let flags = self.flags();
        if let Some(l) = lang.filter(|l| !l.trim().is_empty()).or(user.lang.as_deref()) {
            flags.set_lang(l);
        }
        match module.map(str::trim).filter(|m| !m.is_empty()) {
            Some(m) => {
                flags.set_pending_navigation(m);
                Redirect { to: format!("/{}", m.to_lowercase()) }
            }
            None => Redirect { to: "/".to_string() },
        }
    }

    /// Route guard. An expired or invalid session collapses to anonymous and redirects with
    /// a flag the entry page uses to tailor its message.
    pub fn check_route_access(&self) -> RouteAccess {
        if self.is_authenticated() {
            return RouteAccess::Allowed;
        }
        let had_user = self.current.read().is_some();
        let reason = match self.tokens.get_token() {
            None if !had_user => EntryReason::SignedOut,
            None => EntryReason::Invalid,
            Some(t) => match decode_claims(&t) {
                Err(_) => EntryReason::Invalid,
                Ok(_) if validate_at(&t, Utc::now().timestamp()).is_expired => EntryReason::Expired,
                Ok(_) => EntryReason::SignedOut,
            },
        };
        if reason != EntryReason::SignedOut {
            self.clear_local();
        }
        RouteAccess::Denied(self.anonymous_redirect(reason))
    }

    fn anonymous_redirect(&self, reason: EntryReason) -> Redirect {
        let to = match reason {
            EntryReason::SignedOut => self.anonymous_route.clone(),
            EntryReason::Expired => format!("{}?expired=true", self.anonymous_route),
            EntryReason::Invalid => format!("{}?error=invalid", self.anonymous_route),
        };
        Redirect { to }
    }

    /// A user in memory and a currently valid token; re-checked on every call.
    pub fn is_authenticated(&self) -> bool {
        self.current.read().is_some() && self.tokens.validate_token(None).is_valid
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.current.read().as_ref().is_some_and(|u| u.has_role(role))
    }

    pub fn has_any_role(&self, roles: &[&str]) -> bool {
        self.current.read().as_ref().is_some_and(|u| roles.iter().any(|r| u.has_role(r)))
    }

    pub fn has_permission(&self, p: &str) -> bool {
        self.current.read().as_ref().is_some_and(|u| u.has_permission(p))
    }

    pub fn has_any_permission(&self, ps: &[&str]) -> bool {
        self.current.read().as_ref().is_some_and(|u| ps.iter().any(|p| u.has_permission(p)))
    }

    pub fn role_level(&self) -> Option<i64> {
        self.current.read().as_ref().and_then(|u| u.role_level)
    }
}

