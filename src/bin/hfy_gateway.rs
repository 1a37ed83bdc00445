//!
//! hfy gateway binary
//! ------------------
//! Command-line entry point for the session gateway HTTP server. Configuration
//! comes from environment variables; CLI flags override them.

use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;

use hfy_gate::config::{parse_origins, GatewayConfig, SecretSource};

fn arg_value(args: &[String], flag: &str) -> Option<String> {
    let mut i = 0;
    while i < args.len() {
        if args[i] == flag && i + 1 < args.len() {
            return Some(args[i + 1].clone());
        }
        i += 1;
    }
    None
}

fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .or_else(|_| tracing_subscriber::EnvFilter::try_new("info"))
                .context("While building the log filter")?,
        )
        .try_init();

    let args: Vec<String> = env::args().collect();

    if has_flag(&args, "--help") || has_flag(&args, "-h") {
        println!("hfy gateway\n\nUSAGE:\n  hfy_gateway [--http-port N] [--route PATH] [--origins LIST] [--ttl SECS] [--hashes PATH] [--mapping PATH] [--secret-file PATH]\n\nOPTIONS:\n  --http-port N        HTTP port (env: HFY_HTTP_PORT, default 8787)\n  --route PATH         Gateway route (env: HFY_GATEWAY_ROUTE, default /api/check-allowed)\n  --origins LIST       Comma separated CORS origins (env: ALLOWED_ORIGINS)\n  --ttl SECS           Session lifetime in seconds (env: SESSION_TTL_SECONDS, default 900)\n  --hashes PATH        Allowlist hash file (env: HFY_HASHES_PATH)\n  --mapping PATH       E-mail to record mapping file (env: HFY_MAPPING_PATH)\n  --secret-file PATH   HMAC secret file (env: HFY_ALLOWLIST_HMAC_SECRET or HFY_ALLOWLIST_HMAC_SECRET_FILE)\n\nThe expected credential audience is read from GOOGLE_CLIENT_ID.\n");
        return Ok(());
    }

    let mut cfg = GatewayConfig::from_env().context("While reading gateway configuration")?;

    // CLI arguments override environment
    if let Some(port) = arg_value(&args, "--http-port") {
        cfg.http_port = port.parse::<u16>().with_context(|| format!("--http-port is not a port: {}", port))?;
    }
    if let Some(route) = arg_value(&args, "--route") { cfg.route = route; }
    if let Some(origins) = arg_value(&args, "--origins") { cfg.allowed_origins = parse_origins(&origins); }
    if let Some(ttl) = arg_value(&args, "--ttl") {
        cfg.session_ttl_secs = ttl.parse::<u64>().with_context(|| format!("--ttl is not a number: {}", ttl))?;
    }
    if let Some(p) = arg_value(&args, "--hashes") { cfg.hashes_path = PathBuf::from(p); }
    if let Some(p) = arg_value(&args, "--mapping") { cfg.mapping_path = PathBuf::from(p); }
    if let Some(p) = arg_value(&args, "--secret-file") { cfg.secret = Some(SecretSource::File(PathBuf::from(p))); }

    println!("hfy gateway starting: http={}, route={}", cfg.http_port, cfg.route);
    hfy_gate::server::run_with_config(cfg).await
}
