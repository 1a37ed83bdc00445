//!
//! hfy allowlist tool
//! ------------------
//! Hashes a plaintext e-mail list into the published allowlist document: a JSON
//! array of lowercase hex HMAC-SHA256 digests of the normalised addresses.
//!
//! Input is one address per line; blank lines and `#` comments are skipped.

use std::collections::BTreeSet;
use std::env;
use std::io::Read;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::info;

use hfy_gate::allowlist::{email_digest, normalize_email, read_secret};
use hfy_gate::config::{GatewayConfig, SecretSource};
use hfy_gate::identity::redact_email;

fn arg_value(args: &[String], flag: &str) -> Option<String> {
    args.iter().position(|a| a == flag).and_then(|i| args.get(i + 1)).cloned()
}

fn parse_addresses(text: &str) -> Vec<String> {
    text.lines()
        .map(|l| l.split('#').next().unwrap_or(""))
        .map(normalize_email)
        .filter(|l| !l.is_empty())
        .collect()
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .or_else(|_| tracing_subscriber::EnvFilter::try_new("info"))
                .context("While building the log filter")?,
        )
        .with_writer(std::io::stderr)
        .try_init();

    let args: Vec<String> = env::args().collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        println!("hfy allowlist\n\nUSAGE:\n  hfy_allowlist [--input PATH] [--output PATH] [--secret-file PATH]\n\nReads addresses from --input (default stdin) and writes the hash array to --output (default stdout).\nThe secret comes from --secret-file, HFY_ALLOWLIST_HMAC_SECRET or HFY_ALLOWLIST_HMAC_SECRET_FILE.\n");
        return Ok(());
    }

    let mut secret_source = GatewayConfig::from_env().context("While reading configuration")?.secret;
    if let Some(p) = arg_value(&args, "--secret-file") {
        secret_source = Some(SecretSource::File(PathBuf::from(p)));
    }
    let secret = read_secret(secret_source.as_ref()).await.context("While loading the HMAC secret")?;

    let text = match arg_value(&args, "--input") {
        Some(path) => std::fs::read_to_string(&path).with_context(|| format!("While reading {}", path))?,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf).context("While reading stdin")?;
            buf
        }
    };

    let mut digests = BTreeSet::new();
    for email in parse_addresses(&text) {
        let digest = email_digest(&secret, &email)?;
        info!(target: "hfy_allowlist", email_preview = %redact_email(&email), "Hashed address");
        digests.insert(digest);
    }
    let doc = serde_json::to_string_pretty(&digests.into_iter().collect::<Vec<_>>())?;

    match arg_value(&args, "--output") {
        Some(path) => {
            std::fs::write(&path, format!("{}\n", doc)).with_context(|| format!("While writing {}", path))?;
            info!(target: "hfy_allowlist", path = %path, "Wrote allowlist");
        }
        None => println!("{}", doc),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn addresses_are_normalised_and_comments_dropped() {
        let got = parse_addresses("Alice@Example.com\n\n# family\n bob@example.com  # cousin\n");
        assert_eq!(got, vec!["alice@example.com".to_string(), "bob@example.com".to_string()]);
    }
}
