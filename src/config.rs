//!
//! Environment-driven configuration
//! --------------------------------
//! The same option surface feeds the gateway server and the client session layer.
//! Binaries layer CLI flags on top of these values.

use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::client::visibility::FeatureRules;

pub const DEFAULT_GATEWAY_ROUTE: &str = "/api/check-allowed";
pub const DEFAULT_SESSION_TTL_SECS: u64 = 900;
pub const DEFAULT_HTTP_PORT: u16 = 8787;
pub const PRODUCTION_HOST: &str = "harrisonfamily.us";

pub fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub fn parse_bool_env(name: &str) -> Option<bool> {
    env::var(name).ok().and_then(|v| parse_bool(&v))
}

fn non_empty_env(name: &str) -> Option<String> {
    env::var(name).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Split a comma separated origin list, trimming entries and dropping empties.
pub fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',').map(|v| v.trim()).filter(|v| !v.is_empty()).map(|v| v.to_string()).collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretSource {
    Value(String),
    File(PathBuf),
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Expected `aud` of incoming identity credentials.
    pub audience: String,
    pub allowed_origins: Vec<String>,
    pub session_ttl_secs: u64,
    pub hashes_path: PathBuf,
    pub mapping_path: PathBuf,
    pub secret: Option<SecretSource>,
    pub http_port: u16,
    pub route: String,
    /// HS256 key used instead of Google JWKS in local development.
    pub dev_verifier_secret: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            audience: String::new(),
            allowed_origins: Vec::new(),
            session_ttl_secs: DEFAULT_SESSION_TTL_SECS,
            hashes_path: PathBuf::from("config/allowed_hashes.json"),
            mapping_path: PathBuf::from("config/userGrampsID.json"),
            secret: None,
            http_port: DEFAULT_HTTP_PORT,
            route: DEFAULT_GATEWAY_ROUTE.to_string(),
            dev_verifier_secret: None,
        }
    }
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self> {
        let mut cfg = GatewayConfig::default();
        if let Some(aud) = non_empty_env("GOOGLE_CLIENT_ID") { cfg.audience = aud; }
        if let Ok(raw) = env::var("ALLOWED_ORIGINS") { cfg.allowed_origins = parse_origins(&raw); }
        if let Some(ttl) = non_empty_env("SESSION_TTL_SECONDS") {
            cfg.session_ttl_secs = ttl.parse::<u64>()
                .with_context(|| format!("SESSION_TTL_SECONDS is not a number: {}", ttl))?;
        }
        if let Some(p) = non_empty_env("HFY_HASHES_PATH") { cfg.hashes_path = PathBuf::from(p); }
        if let Some(p) = non_empty_env("HFY_MAPPING_PATH") { cfg.mapping_path = PathBuf::from(p); }
        cfg.secret = match (non_empty_env("HFY_ALLOWLIST_HMAC_SECRET"), non_empty_env("HFY_ALLOWLIST_HMAC_SECRET_FILE")) {
            (Some(v), _) => Some(SecretSource::Value(v)),
            (None, Some(f)) => Some(SecretSource::File(PathBuf::from(f))),
            (None, None) => None,
        };
        if let Some(port) = non_empty_env("HFY_HTTP_PORT") {
            cfg.http_port = port.parse::<u16>()
                .with_context(|| format!("HFY_HTTP_PORT is not a port: {}", port))?;
        }
        if let Some(route) = non_empty_env("HFY_GATEWAY_ROUTE") { cfg.route = route; }
        cfg.dev_verifier_secret = non_empty_env("HFY_DEV_VERIFIER_SECRET");
        Ok(cfg)
    }
}

/// Client-side feature flag and gateway settings.
#[derive(Debug, Clone)]
pub struct FlagsConfig {
    /// Absolute gateway URL; `None` means anonymous mode (no verification at all).
    pub endpoint: Option<String>,
    pub context: String,
    pub enforce_assets: bool,
    pub debug: bool,
    pub components: FeatureRules,
}

impl Default for FlagsConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            context: "site".to_string(),
            enforce_assets: false,
            debug: false,
            components: FeatureRules::site_defaults(),
        }
    }
}

impl FlagsConfig {
    pub fn from_env() -> Result<Self> {
        let mut cfg = FlagsConfig::default();
        cfg.endpoint = match non_empty_env("HFY_FEATURE_FLAGS__GATEWAY__ENDPOINT") {
            Some(ep) => Some(ep),
            None => non_empty_env("HFY_SITE_BASE")
                .map(|base| format!("{}{}", base.trim_end_matches('/'), DEFAULT_GATEWAY_ROUTE)),
        };
        if let Some(ctx) = non_empty_env("HFY_FEATURE_FLAGS__GATEWAY__CONTEXT") { cfg.context = ctx; }
        // An explicit flag wins; otherwise enforcement follows the runtime environment.
        cfg.enforce_assets = match env::var("HFY_FEATURE_FLAGS__GATEWAY__ENFORCE_ASSETS") {
            Ok(v) => v == "true",
            Err(_) => {
                let runtime = non_empty_env("HFY_ENV").unwrap_or_else(|| "dev".to_string());
                runtime == "prod"
            }
        };
        cfg.debug = parse_bool_env("HFY_FEATURE_FLAGS__DEBUG").unwrap_or(false)
            || parse_bool_env("HFY_DEBUG_FEATURES").unwrap_or(false);
        if let Some(path) = non_empty_env("HFY_FEATURE_FLAGS__COMPONENTS_FILE") {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("While reading component rules from {}", path))?;
            cfg.components = FeatureRules::from_json(&text)
                .with_context(|| format!("While parsing component rules from {}", path))?;
        }
        Ok(cfg)
    }
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub client_id: Option<String>,
    pub logout_redirect: String,
    pub login_path: String,
    pub person_url_base: String,
    pub debug: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            logout_redirect: "/logged-out/".to_string(),
            login_path: "/family-login/".to_string(),
            person_url_base: "/person/?id=".to_string(),
            debug: false,
        }
    }
}

impl AuthConfig {
    pub fn from_env() -> Self {
        let mut cfg = AuthConfig::default();
        cfg.client_id = non_empty_env("HFY_AUTH__CLIENT_ID");
        // An empty redirect is meaningful: sign-out then stays on the current page.
        if let Ok(v) = env::var("HFY_AUTH__LOGOUT_REDIRECT") { cfg.logout_redirect = v.trim().to_string(); }
        if let Some(v) = non_empty_env("HFY_AUTH__LOGIN_PATH") { cfg.login_path = v; }
        if let Some(v) = non_empty_env("HFY_AUTH__PERSON_URL_BASE") { cfg.person_url_base = v; }
        cfg.debug = parse_bool_env("HFY_AUTH__DEBUG").unwrap_or(false)
            || parse_bool_env("HFY_DEBUG_AUTH").unwrap_or(false);
        cfg
    }
}

/// Where person records and their media are published.
#[derive(Debug, Clone)]
pub struct PersonConfig {
    pub data_base: String,
    pub media_base: String,
}

impl Default for PersonConfig {
    fn default() -> Self {
        Self { data_base: "/person/".to_string(), media_base: "/media/".to_string() }
    }
}

impl PersonConfig {
    pub fn from_env() -> Self {
        let mut cfg = PersonConfig::default();
        if let Some(v) = non_empty_env("HFY_PERSON__DATA_BASE") { cfg.data_base = v; }
        if let Some(v) = non_empty_env("HFY_PERSON__MEDIA_BASE") { cfg.media_base = v; }
        cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_parsing_accepts_common_spellings() {
        for t in ["1", "true", "YES", " on "] { assert_eq!(parse_bool(t), Some(true), "{t}"); }
        for f in ["0", "false", "No", "off"] { assert_eq!(parse_bool(f), Some(false), "{f}"); }
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn origins_are_trimmed_and_empties_dropped() {
        let o = parse_origins(" https://harrisonfamily.us, ,https://www.harrisonfamily.us ,");
        assert_eq!(o, vec!["https://harrisonfamily.us".to_string(), "https://www.harrisonfamily.us".to_string()]);
        assert!(parse_origins("").is_empty());
    }

    #[test]
    fn defaults_match_deployed_values() {
        let g = GatewayConfig::default();
        assert_eq!(g.session_ttl_secs, 900);
        assert_eq!(g.route, "/api/check-allowed");
        let f = FlagsConfig::default();
        assert_eq!(f.context, "site");
        assert!(f.endpoint.is_none());
        assert!(f.components.get("myRecordLink").is_some());
        let a = AuthConfig::default();
        assert_eq!(a.logout_redirect, "/logged-out/");
        assert_eq!(a.login_path, "/family-login/");
    }
}
