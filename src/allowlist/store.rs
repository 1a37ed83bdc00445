use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use serde::Deserialize;

use super::digest::normalize_email;
use crate::config::SecretSource;
use crate::error::{AppError, AppResult};

/// Lowercased e-mail -> person-record id.
pub type EmailMapping = HashMap<String, String>;

/// Source of the published allowlist artefacts.
#[async_trait]
pub trait AllowlistStore: Send + Sync {
    async fn load_hashes(&self) -> AppResult<Vec<String>>;
    async fn load_mapping(&self) -> AppResult<EmailMapping>;
    async fn load_secret(&self) -> AppResult<String>;
}

// The hash list is published either as a bare array or wrapped as {"allowlist": [...]}.
#[derive(Deserialize)]
#[serde(untagged)]
enum HashDocument {
    Bare(Vec<String>),
    Wrapped { allowlist: Vec<String> },
}

fn normalize_mapping(raw: HashMap<String, String>) -> EmailMapping {
    raw.into_iter()
        .filter(|(_, id)| !id.trim().is_empty())
        .map(|(email, id)| (normalize_email(&email), id.trim().to_string()))
        .collect()
}

/// JSON files on disk plus a secret from the environment or a file.
#[derive(Debug, Clone)]
pub struct FileAllowlistStore {
    pub hashes_path: PathBuf,
    pub mapping_path: PathBuf,
    pub secret: Option<SecretSource>,
}

impl FileAllowlistStore {
    pub fn new(hashes_path: impl Into<PathBuf>, mapping_path: impl Into<PathBuf>, secret: Option<SecretSource>) -> Self {
        Self { hashes_path: hashes_path.into(), mapping_path: mapping_path.into(), secret }
    }

    async fn read(path: &Path) -> AppResult<String> {
        tokio::fs::read_to_string(path)
            .await
            .map_err(|e| AppError::storage("store_read", format!("{}: {}", path.display(), e)))
    }
}

#[async_trait]
impl AllowlistStore for FileAllowlistStore {
    async fn load_hashes(&self) -> AppResult<Vec<String>> {
        let text = Self::read(&self.hashes_path).await?;
        let doc: HashDocument = serde_json::from_str(&text)?;
        let hashes = match doc {
            HashDocument::Bare(v) | HashDocument::Wrapped { allowlist: v } => v,
        };
        Ok(hashes.into_iter().map(|h| h.trim().to_lowercase()).collect())
    }

    async fn load_mapping(&self) -> AppResult<EmailMapping> {
        let text = Self::read(&self.mapping_path).await?;
        let raw: HashMap<String, String> = serde_json::from_str(&text)?;
        Ok(normalize_mapping(raw))
    }

    async fn load_secret(&self) -> AppResult<String> {
        read_secret(self.secret.as_ref()).await
    }
}

/// Resolve the HMAC secret; a file's trailing newline is not part of the secret.
pub async fn read_secret(source: Option<&SecretSource>) -> AppResult<String> {
    let secret = match source {
        Some(SecretSource::Value(v)) => v.clone(),
        Some(SecretSource::File(p)) => FileAllowlistStore::read(p).await?.trim_end_matches(['\r', '\n']).to_string(),
        None => return Err(AppError::config("secret_missing", "allowlist HMAC secret is not configured")),
    };
    if secret.is_empty() {
        return Err(AppError::config("secret_empty", "allowlist HMAC secret is empty"));
    }
    Ok(secret)
}

/// In-process store; counts fetches so callers can observe memoisation.
#[derive(Debug, Default)]
pub struct MemoryAllowlistStore {
    hashes: Vec<String>,
    mapping: EmailMapping,
    secret: String,
    failing: AtomicBool,
    pub hash_loads: AtomicUsize,
    pub mapping_loads: AtomicUsize,
    pub secret_loads: AtomicUsize,
}

impl MemoryAllowlistStore {
    pub fn new(hashes: Vec<String>, mapping: EmailMapping, secret: impl Into<String>) -> Self {
        Self { hashes, mapping: normalize_mapping(mapping), secret: secret.into(), ..Default::default() }
    }

    /// Simulate the store being unreachable.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> AppResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(AppError::upstream("store_unreachable", "allowlist store unreachable"));
        }
        Ok(())
    }
}

#[async_trait]
impl AllowlistStore for MemoryAllowlistStore {
    async fn load_hashes(&self) -> AppResult<Vec<String>> {
        self.hash_loads.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        Ok(self.hashes.clone())
    }

    async fn load_mapping(&self) -> AppResult<EmailMapping> {
        self.mapping_loads.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        Ok(self.mapping.clone())
    }

    async fn load_secret(&self) -> AppResult<String> {
        self.secret_loads.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        Ok(self.secret.clone())
    }
}
