use crate::storage::{keys, Tier, TokenStore};

/// Auxiliary session-tier flags: selected tenant database, chrome visibility, a pending
/// navigation hint and the display language. None of these survive the session.
#[derive(Clone)]
pub struct SessionFlags {
    store: TokenStore,
}

impl SessionFlags {
    pub fn new(store: TokenStore) -> Self { Self { store } }

    pub fn selected_database(&self) -> Option<String> {
        self.store.get_string(Tier::Session, keys::SELECTED_DATABASE)
    }

    pub fn set_selected_database(&self, name: &str) {
        self.store.set_string(Tier::Session, keys::SELECTED_DATABASE, name);
    }

    pub fn hide_chrome(&self) -> bool {
        self.store.get_structured::<bool>(Tier::Session, keys::HIDE_CHROME).ok().flatten().unwrap_or(false)
    }

    pub fn set_hide_chrome(&self, hide: bool) {
        self.store.set_structured(Tier::Session, keys::HIDE_CHROME, &hide);
    }

    pub fn pending_navigation(&self) -> Option<String> {
        self.store.get_string(Tier::Session, keys::PENDING_NAVIGATION)
    }

    pub fn set_pending_navigation(&self, target: &str) {
        self.store.set_string(Tier::Session, keys::PENDING_NAVIGATION, target);
    }

    /// Read and clear the pending navigation hint.
    pub fn take_pending_navigation(&self) -> Option<String> {
        let v = self.pending_navigation();
        if v.is_some() {
            self.store.remove(Tier::Session, keys::PENDING_NAVIGATION);
        }
        v
    }

    pub fn lang(&self) -> Option<String> { self.store.get_string(Tier::Session, keys::LANG) }

    pub fn set_lang(&self, lang: &str) { self.store.set_string(Tier::Session, keys::LANG, lang); }

    /// Drop everything tied to the signed-in user. Language is a display preference and stays.
    pub fn clear(&self) {
        for k in [keys::SELECTED_DATABASE, keys::HIDE_CHROME, keys::PENDING_NAVIGATION] {
            self.store.remove(Tier::Session, k);
        }
    }
}
