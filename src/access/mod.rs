//! Menu access resolution.
//!
//! A static menu tree is filtered against the current user's roles using a swappable
//! [`AccessPolicy`]. Only top-level categories are checked; the children of a visible
//! category are emitted as declared. Declaration order is preserved.

mod menu;
mod policy;

pub use menu::{annotate_routes, load_menu, parse_menu, LocalizedName, MenuNode, DEFAULT_LANG};
pub use policy::AccessPolicy;

use tracing::debug;

use crate::identity::{SessionAuthority, User};

#[derive(Debug, Clone, Default)]
pub struct AccessResolver {
    policy: AccessPolicy,
}

impl AccessResolver {
    pub fn new(policy: AccessPolicy) -> Self { Self { policy } }

    pub fn policy(&self) -> &AccessPolicy { &self.policy }

    pub fn is_visible(&self, node: &MenuNode, user: &User) -> bool {
        self.policy.allows(node.required_module(), user.roles.iter())
    }

    /// Filter `menu` for `user`. Emitted nodes are marked visible and carry a route.
    pub fn resolve(&self, menu: &[MenuNode], user: &User) -> Vec<MenuNode> {
        let mut out: Vec<MenuNode> = menu
            .iter()
            .filter(|n| self.is_visible(n, user))
            .cloned()
            .map(|mut n| {
                n.visible = true;
                n
            })
            .collect();
        annotate_routes(&mut out, "");
        debug!(target: "hrportal::access", "menu for '{}': {} of {} categories", user.username, out.len(), menu.len());
        out
    }

    /// Resolve against the session's current user. An unauthenticated session sees nothing.
    pub fn resolve_for(&self, menu: &[MenuNode], session: &SessionAuthority) -> Vec<MenuNode> {
        if !session.is_authenticated() {
            return Vec::new();
        }
        match session.current_user() {
            Some(u) => self.resolve(menu, &u),
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod access_tests;
