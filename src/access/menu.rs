use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

/// Language `LocalizedName::default` is written in.
pub const DEFAULT_LANG: &str = "en";

/// A display name in the default language plus an optional local rendering.
/// Deserializes from either a plain string or `{"default": .., "local": ..}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(from = "NameRepr")]
pub struct LocalizedName {
    pub default: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NameRepr {
    Plain(String),
    Pair {
        #[serde(alias = "en")]
        default: String,
        #[serde(default, alias = "th")]
        local: Option<String>,
    },
}

impl From<NameRepr> for LocalizedName {
    fn from(r: NameRepr) -> Self {
        match r {
            NameRepr::Plain(default) => Self { default, local: None },
            NameRepr::Pair { default, local } => Self { default, local },
        }
    }
}

impl LocalizedName {
    pub fn new(default: impl Into<String>, local: Option<&str>) -> Self {
        Self { default: default.into(), local: local.map(str::to_string) }
    }

    pub fn for_lang(&self, lang: Option<&str>) -> &str {
        match (lang.map(str::trim), self.local.as_deref()) {
            (Some(l), Some(local)) if !l.is_empty() && !l.eq_ignore_ascii_case(DEFAULT_LANG) => local,
            _ => &self.default,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MenuNode {
    pub code: String,
    /// Module code checked against the access policy; falls back to `code`.
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "moduleCode")]
    pub module: Option<String>,
    #[serde(alias = "displayName")]
    pub display_name: LocalizedName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route: Option<String>,
    #[serde(default)]
    pub children: Vec<MenuNode>,
    #[serde(default = "visible_default")]
    pub visible: bool,
}

fn visible_default() -> bool { true }

impl MenuNode {
    pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            module: None,
            display_name: LocalizedName::new(name, None),
            icon: None,
            route: None,
            children: Vec::new(),
            visible: true,
        }
    }

    pub fn with_module(mut self, module: impl Into<String>) -> Self {
        self.module = Some(module.into());
        self
    }

    pub fn with_route(mut self, route: impl Into<String>) -> Self {
        self.route = Some(route.into());
        self
    }

    pub fn with_child(mut self, child: MenuNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn required_module(&self) -> Option<&str> {
        self.module
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .or_else(|| Some(self.code.trim()).filter(|c| !c.is_empty()))
    }
}

/// Fill in missing routes as `<parent route>/<lower-case code>`, depth first.
pub fn annotate_routes(nodes: &mut [MenuNode], parent: &str) {
    for n in nodes.iter_mut() {
        if n.route.as_deref().map_or(true, |r| r.trim().is_empty()) {
            let base = parent.trim_end_matches('/');
            n.route = Some(format!("{}/{}", base, n.code.trim().to_lowercase()));
        }
        let own = n.route.clone().unwrap_or_default();
        annotate_routes(&mut n.children, &own);
    }
}

pub fn parse_menu(text: &str) -> AppResult<Vec<MenuNode>> {
    serde_json::from_str(text).map_err(|e| AppError::config("menu_parse".to_string(), e.to_string()))
}

pub fn load_menu(path: impl AsRef<Path>) -> Result<Vec<MenuNode>> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).with_context(|| format!("reading menu {}", path.display()))?;
    let nodes = parse_menu(&text).with_context(|| format!("parsing menu {}", path.display()))?;
    tracing::debug!(target: "hrportal::access", "loaded {} menu categories from {}", nodes.len(), path.display());
    Ok(nodes)
}
