use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::info;

use super::store::{AllowlistStore, EmailMapping};
use crate::error::{AppError, AppResult};

/// Process-lifetime memo over an [`AllowlistStore`].
///
/// Each of the three artefacts is fetched at most once successfully; a failed
/// fetch leaves its cell empty so the next request retries. There is no refresh:
/// a new allowlist takes effect when the process restarts.
pub struct CachedAllowlist {
    store: Arc<dyn AllowlistStore>,
    hashes: OnceCell<HashSet<String>>,
    mapping: OnceCell<EmailMapping>,
    secret: OnceCell<String>,
}

impl CachedAllowlist {
    pub fn new(store: Arc<dyn AllowlistStore>) -> Self {
        Self { store, hashes: OnceCell::new(), mapping: OnceCell::new(), secret: OnceCell::new() }
    }

    pub async fn hashes(&self) -> AppResult<&HashSet<String>> {
        self.hashes
            .get_or_try_init(|| async {
                let list = self.store.load_hashes().await?;
                info!(target: "hfy_gateway", count = list.len(), "Loaded allowlist hashes");
                Ok::<_, AppError>(list.into_iter().collect())
            })
            .await
    }

    pub async fn mapping(&self) -> AppResult<&EmailMapping> {
        self.mapping
            .get_or_try_init(|| async {
                let map = self.store.load_mapping().await?;
                info!(target: "hfy_gateway", count = map.len(), "Loaded e-mail mapping");
                Ok::<_, AppError>(map)
            })
            .await
    }

    pub async fn secret(&self) -> AppResult<&str> {
        let s = self.secret.get_or_try_init(|| self.store.load_secret()).await?;
        Ok(s.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allowlist::MemoryAllowlistStore;
    use std::collections::HashMap;
    use std::sync::atomic::Ordering;

    fn store() -> Arc<MemoryAllowlistStore> {
        let mut mapping = HashMap::new();
        mapping.insert("alice@example.com".to_string(), "I0111".to_string());
        Arc::new(MemoryAllowlistStore::new(vec!["aa".into(), "bb".into()], mapping, "secret"))
    }

    #[tokio::test]
    async fn each_artefact_is_fetched_once() {
        let s = store();
        let cache = CachedAllowlist::new(s.clone());
        for _ in 0..3 {
            assert!(cache.hashes().await.unwrap().contains("aa"));
            assert_eq!(cache.mapping().await.unwrap().get("alice@example.com").unwrap(), "I0111");
            assert_eq!(cache.secret().await.unwrap(), "secret");
        }
        assert_eq!(s.hash_loads.load(Ordering::SeqCst), 1);
        assert_eq!(s.mapping_loads.load(Ordering::SeqCst), 1);
        assert_eq!(s.secret_loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failures_are_not_memoised() {
        let s = store();
        let cache = CachedAllowlist::new(s.clone());
        s.set_failing(true);
        assert!(cache.hashes().await.is_err());
        s.set_failing(false);
        assert_eq!(cache.hashes().await.unwrap().len(), 2);
        assert_eq!(s.hash_loads.load(Ordering::SeqCst), 2);
    }
}
