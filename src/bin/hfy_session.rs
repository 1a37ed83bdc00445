//!
//! hfy session client
//! ------------------
//! Drives the client session layer from a terminal against a live gateway, with
//! the two storage areas kept as JSON files under a state directory.
//!
//! Commands: `verify <credential>`, `status`, `sign-out`, `search <query>`,
//! `person <id>`.

use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use serde_json::json;

use hfy_gate::client::{
    AuthController, ClientStorage, CredentialResponse, FeatureFlags, FileStorage, PageContext, ProtectedAssetClient,
    RecordingNavigator, AUTH_STORAGE_KEY,
};
use hfy_gate::config::{AuthConfig, FlagsConfig, PersonConfig};
use hfy_gate::person::{fetch_person, PersonPaths};
use hfy_gate::search::{results_summary, SearchIndex, DEFAULT_INDEX_URL, DEFAULT_MANIFEST_URL};

fn arg_value(args: &[String], flag: &str) -> Option<String> {
    args.iter().position(|a| a == flag).and_then(|i| args.get(i + 1)).cloned()
}

// Positional arguments after the command, skipping `--flag value` pairs.
fn positionals(args: &[String]) -> Vec<String> {
    let mut out = Vec::new();
    let mut i = 2;
    while i < args.len() {
        if args[i] == "--all" {
            i += 1;
            continue;
        }
        if args[i].starts_with("--") {
            i += 2;
            continue;
        }
        out.push(args[i].clone());
        i += 1;
    }
    out
}

struct Session {
    flags: Arc<FeatureFlags>,
    auth: Arc<AuthController>,
    navigator: Arc<RecordingNavigator>,
    local: Arc<FileStorage>,
}

fn build(args: &[String]) -> Result<Session> {
    let state_dir = PathBuf::from(arg_value(args, "--state-dir").unwrap_or_else(|| ".hfy_session".to_string()));
    let host = arg_value(args, "--host").unwrap_or_else(|| "localhost".to_string());
    let path = arg_value(args, "--path").unwrap_or_else(|| "/".to_string());
    let page = PageContext::new(host, path);

    let mut flags_cfg = FlagsConfig::from_env().context("While reading feature flag configuration")?;
    if let Some(ep) = arg_value(args, "--endpoint") { flags_cfg.endpoint = Some(ep); }
    let auth_cfg = AuthConfig::from_env();

    let local = Arc::new(FileStorage::new(state_dir.join("local.json")));
    let session = Arc::new(FileStorage::new(state_dir.join("session.json")));
    let flags = FeatureFlags::from_config(flags_cfg, &page, session)?;
    let navigator = Arc::new(RecordingNavigator::new());
    let auth = AuthController::new(auth_cfg, flags.clone(), local.clone(), page, navigator.clone(), None);
    Ok(Session { flags, auth, navigator, local })
}

// Restores the stored credential and builds an asset client for a signed-in visitor.
async fn gated_assets(s: &Session, args: &[String], command: &str) -> Result<ProtectedAssetClient> {
    let site = arg_value(args, "--site")
        .or_else(|| env::var("HFY_SITE_BASE").ok())
        .ok_or_else(|| anyhow!("{} needs --site or HFY_SITE_BASE", command))?;
    if let Some(handle) = s.auth.restore_stored_session() {
        handle.await.context("Verification task failed")?;
    }
    if !s.auth.require_authenticated().await {
        bail!("not signed in; sign in at {}", s.navigator.last().unwrap_or_default());
    }
    Ok(ProtectedAssetClient::new(site, s.flags.clone(), Some(s.auth.clone()))?)
}

fn print_state(s: &Session) -> Result<()> {
    let out = json!({
        "auth": s.auth.snapshot(),
        "session": s.flags.state(),
        "visibility": s.flags.visibility(),
        "navigations": s.navigator.visits(),
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .or_else(|_| tracing_subscriber::EnvFilter::try_new("warn"))
                .context("While building the log filter")?,
        )
        .with_writer(std::io::stderr)
        .try_init();

    let args: Vec<String> = env::args().collect();
    let command = args.get(1).map(String::as_str).unwrap_or("--help");
    if command == "--help" || command == "-h" {
        println!("hfy session\n\nUSAGE:\n  hfy_session verify <credential> [OPTIONS]\n  hfy_session status [OPTIONS]\n  hfy_session sign-out [OPTIONS]\n  hfy_session search <query> [--site URL] [--all] [OPTIONS]\n  hfy_session person <id> [--site URL] [OPTIONS]\n\nOPTIONS:\n  --state-dir PATH   Storage directory (default .hfy_session)\n  --endpoint URL     Gateway endpoint (env: HFY_FEATURE_FLAGS__GATEWAY__ENDPOINT or HFY_SITE_BASE)\n  --host NAME        Page hostname (default localhost)\n  --path PATH        Page path (default /)\n");
        return Ok(());
    }

    let s = build(&args)?;
    match command {
        "verify" => {
            let credential = positionals(&args).into_iter().next().ok_or_else(|| anyhow!("verify needs a credential"))?;
            if let Some(handle) = s.auth.handle_credential_response(CredentialResponse::new(credential)) {
                handle.await.context("Verification task failed")?;
            }
            print_state(&s)?;
        }
        "status" => {
            let stored = s.local.get(AUTH_STORAGE_KEY).is_some();
            println!("stored credential record: {}", if stored { "present" } else { "absent" });
            print_state(&s)?;
        }
        "sign-out" => {
            s.auth.sign_out();
            print_state(&s)?;
        }
        "search" => {
            let query = positionals(&args).join(" ");
            let assets = gated_assets(&s, &args, "search").await?;
            let base = AuthConfig::from_env().person_url_base;
            let index = SearchIndex::load(&assets, DEFAULT_MANIFEST_URL, DEFAULT_INDEX_URL, &base).await?;
            let limit = if args.iter().any(|a| a == "--all") { None } else { Some(hfy_gate::search::AUTOCOMPLETE_LIMIT) };
            let matches = index.search(&query, limit);
            println!("{}", results_summary(&query, matches.len()));
            for m in matches {
                println!("  [{}] {} {} {}", m.score, m.gramps_id, m.display_name, m.url);
            }
        }
        "person" => {
            let id = positionals(&args).into_iter().next().ok_or_else(|| anyhow!("person needs a record id"))?;
            let assets = gated_assets(&s, &args, "person").await?;
            let paths = PersonPaths::from_config(&PersonConfig::from_env());
            let record = fetch_person(&assets, &paths, &id).await?;
            let out = json!({
                "url": paths.data_url(&id),
                "media": paths.gallery_urls(&record),
                "record": record,
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        other => bail!("unknown command: {} (try --help)", other),
    }
    Ok(())
}
