//!
//! hrportal CLI
//! ------------
//! Drives the session and request layer from a terminal: validate a token, sign in and
//! out, issue authenticated requests and print the menu a token's holder would see.
//! The persistent storage tier lives under `--storage-dir` so a login survives between
//! invocations.

use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use hrportal::access::{load_menu, AccessPolicy, AccessResolver};
use hrportal::config::PortalConfig;
use hrportal::identity::{ApiAuthBackend, LoginRequest, SessionAuthority, TokenAuthority};
use hrportal::request::{ApiRequest, HttpTransport, RequestAuthority};
use hrportal::storage::TokenStore;

fn print_usage(program: &str) {
    eprintln!(
        "Usage:\n  {program} [--config <file>] [--storage-dir <dir>] <command> [args]\n\nCommands:\n  validate <token>                          decode a token and report expiry\n  menu --menu <file> [--policy <file>] [--token <token>]\n                                            print the menu visible to the token's holder\n  login --user <u> --password <p> [--tenant <t>] [--lang <l>]\n                                            exchange credentials and persist the session\n  get <path>                                authenticated GET through the request pipeline\n  logout                                    clear the stored session\n\nFlags:\n  --config <file>        Portal config JSON (default: hrportal.json, missing file = defaults)\n  --storage-dir <dir>    Persistent tier directory (env HRPORTAL_STORAGE_DIR)\n  -h, --help             Show this help\n\nEnvironment:\n  HRPORTAL_BASE_URL, HRPORTAL_SERVICE_TOKEN, HRPORTAL_STORAGE_DIR, HRPORTAL_POLICY, HRPORTAL_CACHE_TTL_MS\n  RUST_LOG (default: info)"
    );
}

/// Flags after the command name, plus positionals in order.
struct CommandArgs {
    positional: Vec<String>,
    flags: Vec<(String, String)>,
}

impl CommandArgs {
    fn parse(args: &[String]) -> Result<Self> {
        let mut positional = Vec::new();
        let mut flags = Vec::new();
        let mut i = 0;
        while i < args.len() {
            let a = &args[i];
            if let Some(name) = a.strip_prefix("--") {
                let v = args.get(i + 1).ok_or_else(|| anyhow!("--{} requires a value", name))?;
                flags.push((name.to_string(), v.clone()));
                i += 2;
            } else {
                positional.push(a.clone());
                i += 1;
            }
        }
        Ok(Self { positional, flags })
    }

    fn flag(&self, name: &str) -> Option<&str> {
        self.flags.iter().rev().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
    }

    fn required(&self, name: &str) -> Result<&str> {
        self.flag(name).ok_or_else(|| anyhow!("--{} is required", name))
    }
}

struct Portal {
    cfg: PortalConfig,
    api: Arc<RequestAuthority>,
    session: SessionAuthority,
}

fn build_portal(cfg: PortalConfig) -> Result<Portal> {
    let store = match &cfg.storage_dir {
        Some(dir) => TokenStore::with_dir(dir).with_context(|| format!("opening storage at {}", dir.display()))?,
        None => TokenStore::in_memory(),
    };
    let tokens = TokenAuthority::new(store);
    let transport = Arc::new(HttpTransport::new()?);
    let api = Arc::new(RequestAuthority::new(&cfg, tokens.clone(), transport));
    let backend = Arc::new(ApiAuthBackend::new(api.clone(), cfg.login_path.clone(), cfg.logout_path.clone()));
    let session = SessionAuthority::new(&cfg, tokens, backend).with_request_cache(api.clone());
    Ok(Portal { cfg, api, session })
}

fn cmd_validate(portal: &Portal, args: &CommandArgs) -> Result<()> {
    let token = args.positional.first().ok_or_else(|| anyhow!("validate requires a token"))?;
    let v = portal.session.tokens().validate_token(Some(token));
    let out = serde_json::json!({
        "is_valid": v.is_valid,
        "is_expired": v.is_expired,
        "expires_at": v.expires_at.map(|t| t.to_rfc3339()),
        "seconds_left": v.expires_at.map(|t| (t - Utc::now()).num_seconds()),
        "claims": v.decoded,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

fn cmd_menu(portal: &Portal, args: &CommandArgs) -> Result<()> {
    let menu = load_menu(args.required("menu")?)?;
    let policy_path = args.flag("policy").map(PathBuf::from).or_else(|| portal.cfg.policy_path.clone());
    let policy = match policy_path {
        Some(p) => AccessPolicy::load(&p)?,
        None => {
            info!(target: "hrportal::access", "no policy configured; every module is open");
            AccessPolicy::default()
        }
    };
    match args.flag("token") {
        Some(t) => {
            let r = portal.session.enter_with_token(t, None, None);
            if !portal.session.is_authenticated() {
                return Err(anyhow!("token rejected; would redirect to {}", r.to));
            }
        }
        None => {
            if !portal.session.restore_session() {
                return Err(anyhow!("no stored session; pass --token or run login first"));
            }
        }
    }
    let lang = portal.session.flags().lang();
    let resolved = AccessResolver::new(policy).resolve_for(&menu, &portal.session);
    for node in &resolved {
        println!("{:<12} {:<28} {}", node.code, node.display_name.for_lang(lang.as_deref()), node.route.as_deref().unwrap_or(""));
        for child in &node.children {
            println!("  {:<10} {:<28} {}", child.code, child.display_name.for_lang(lang.as_deref()), child.route.as_deref().unwrap_or(""));
        }
    }
    Ok(())
}

async fn cmd_login(portal: &Portal, args: &CommandArgs) -> Result<()> {
    let req = LoginRequest {
        username: args.required("user")?.to_string(),
        password: args.required("password")?.to_string(),
        tenant: args.flag("tenant").map(str::to_string),
        dbcomp: args.flag("dbcomp").map(str::to_string),
        lang: args.flag("lang").map(str::to_string),
    };
    let res = portal.session.login(&req).await?;
    println!("{}", serde_json::to_string_pretty(&res.user)?);
    Ok(())
}

async fn cmd_get(portal: &Portal, args: &CommandArgs) -> Result<()> {
    let path = args.positional.first().ok_or_else(|| anyhow!("get requires a path"))?;
    if !portal.session.restore_session() {
        info!(target: "hrportal::session", "no stored session; sending without a session token");
    }
    let v = portal.api.send_value(&ApiRequest::get(path.clone())).await?;
    println!("{}", serde_json::to_string_pretty(&v)?);
    Ok(())
}

async fn cmd_logout(portal: &Portal) -> Result<()> {
    portal.session.restore_session();
    let r = portal.session.logout().await;
    // the notification runs in the background; give it a moment before the runtime exits
    tokio::time::sleep(Duration::from_millis(300)).await;
    println!("signed out; next: {}", r.to);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let mut args: Vec<String> = env::args().collect();
    let program = args.remove(0);
    let mut config_path = PathBuf::from("hrportal.json");
    let mut storage_dir: Option<PathBuf> = None;
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                if i + 1 >= args.len() { eprintln!("--config requires a value"); print_usage(&program); std::process::exit(2); }
                config_path = PathBuf::from(&args[i + 1]);
                i += 2;
            }
            "--storage-dir" => {
                if i + 1 >= args.len() { eprintln!("--storage-dir requires a value"); print_usage(&program); std::process::exit(2); }
                storage_dir = Some(PathBuf::from(&args[i + 1]));
                i += 2;
            }
            "-h" | "--help" => { print_usage(&program); return Ok(()); }
            _ => break,
        }
    }
    let Some(command) = args.get(i).cloned() else {
        print_usage(&program);
        std::process::exit(2);
    };
    let rest = CommandArgs::parse(&args[i + 1..])?;

    let mut cfg = PortalConfig::load(&config_path)?.apply_env();
    if storage_dir.is_some() {
        cfg.storage_dir = storage_dir;
    }
    info!(
        target: "hrportal",
        "hrportal starting: base_url='{}', storage_dir={:?}, command={}",
        cfg.base_url, cfg.storage_dir, command
    );
    let portal = build_portal(cfg)?;

    match command.as_str() {
        "validate" => cmd_validate(&portal, &rest),
        "menu" => cmd_menu(&portal, &rest),
        "login" => cmd_login(&portal, &rest).await,
        "get" => cmd_get(&portal, &rest).await,
        "logout" => cmd_logout(&portal).await,
        other => {
            eprintln!("unknown command '{}'", other);
            print_usage(&program);
            std::process::exit(2);
        }
    }
}
