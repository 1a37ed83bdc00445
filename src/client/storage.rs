//! Key/value storage areas for client session data.
//!
//! A page has two areas: a long-lived one that survives restarts (browser
//! `localStorage`) and a short-lived one scoped to the browsing session
//! (`sessionStorage`). Callers treat write failures as non-fatal.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::error::{AppError, AppResult};
use crate::tprintln;

pub trait ClientStorage: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> AppResult<()>;
    fn remove(&self, key: &str) -> AppResult<()>;
}

#[derive(Debug, Default)]
pub struct MemoryStorage {
    items: Mutex<BTreeMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self { Self::default() }

    pub fn len(&self) -> usize { self.items.lock().len() }

    pub fn is_empty(&self) -> bool { self.items.lock().is_empty() }
}

impl ClientStorage for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.items.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> AppResult<()> {
        self.items.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> AppResult<()> {
        self.items.lock().remove(key);
        Ok(())
    }
}

/// One JSON object document on disk per storage area.
///
/// The document is re-read on every access so several processes sharing the
/// file observe each other's writes.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), lock: Mutex::new(()) }
    }

    pub fn path(&self) -> &Path { &self.path }

    fn load(&self) -> AppResult<BTreeMap<String, String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) if text.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, items: &BTreeMap<String, String>) -> AppResult<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        let text = serde_json::to_string_pretty(items)?;
        // write-then-rename so a reader never sees a torn document
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, text)?;
        tprintln!("[storage] wrote {} keys to {}", items.len(), self.path.display());
        std::fs::rename(&tmp, &self.path)
            .map_err(|e| AppError::storage("storage_rename", format!("{}: {}", self.path.display(), e)))
    }
}

impl ClientStorage for FileStorage {
    fn get(&self, key: &str) -> Option<String> {
        let _g = self.lock.lock();
        self.load().ok().and_then(|m| m.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> AppResult<()> {
        let _g = self.lock.lock();
        let mut items = self.load()?;
        items.insert(key.to_string(), value.to_string());
        self.save(&items)
    }

    fn remove(&self, key: &str) -> AppResult<()> {
        let _g = self.lock.lock();
        let mut items = self.load()?;
        if items.remove(key).is_some() {
            self.save(&items)?;
        }
        Ok(())
    }
}
