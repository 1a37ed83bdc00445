//! Person search over the published manifest and search index.
//!
//! Both documents are gated assets; [`SearchIndex::load`] fetches them through
//! the protected-asset client so the session header is attached.

use std::cmp::Ordering;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::client::{person_url, ProtectedAssetClient};
use crate::error::{AppError, AppResult};

pub const AUTOCOMPLETE_LIMIT: usize = 6;
pub const DEFAULT_MANIFEST_URL: &str = "/person/index.json";
pub const DEFAULT_INDEX_URL: &str = "/person/search-index.json";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonEntry {
    pub gramps_id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub is_living: Option<bool>,
    #[serde(default)]
    pub lifespan_summary: Option<String>,
    #[serde(default)]
    pub primary_photo: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchDocument {
    pub gramps_id: String,
    #[serde(default)]
    pub search_text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchMatch {
    pub gramps_id: String,
    pub display_name: String,
    pub is_living: Option<bool>,
    pub lifespan_summary: String,
    pub primary_photo: Option<String>,
    pub score: u32,
    pub url: String,
}

pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase().split_whitespace().map(str::to_string).collect()
}

/// +3 for each token the haystack starts with, +1 for each it merely contains.
pub fn score_document(search_text: &str, tokens: &[String]) -> u32 {
    let haystack = search_text.to_lowercase();
    tokens
        .iter()
        .map(|t| {
            if haystack.starts_with(t.as_str()) { 3 } else if haystack.contains(t.as_str()) { 1 } else { 0 }
        })
        .sum()
}

// Entries that do not parse are skipped rather than failing the whole index.
fn parse_entries<T: for<'de> Deserialize<'de>>(items: &[Value]) -> Vec<T> {
    items.iter().filter_map(|v| serde_json::from_value(v.clone()).ok()).collect()
}

#[derive(Debug, Clone, Default)]
pub struct SearchIndex {
    people: HashMap<String, PersonEntry>,
    documents: Vec<SearchDocument>,
    person_url_base: String,
}

impl SearchIndex {
    /// `manifest` is `{"people": [...]}` or a bare array; `index` is `{"documents": [...]}`.
    pub fn from_parts(manifest: &Value, index: &Value, person_url_base: &str) -> AppResult<Self> {
        let people = match manifest.get("people").and_then(Value::as_array).or_else(|| manifest.as_array()) {
            Some(items) => parse_entries::<PersonEntry>(items),
            None => return Err(AppError::upstream("manifest_malformed", "person manifest is not a list")),
        };
        let documents = index
            .get("documents")
            .and_then(Value::as_array)
            .map(|items| parse_entries::<SearchDocument>(items))
            .unwrap_or_default();
        Ok(Self {
            people: people.into_iter().map(|p| (p.gramps_id.clone(), p)).collect(),
            documents,
            person_url_base: person_url_base.to_string(),
        })
    }

    pub async fn load(
        assets: &ProtectedAssetClient,
        manifest_url: &str,
        index_url: &str,
        person_url_base: &str,
    ) -> AppResult<Self> {
        let (manifest, index) = tokio::try_join!(assets.fetch_json(manifest_url), assets.fetch_json(index_url))?;
        Self::from_parts(&manifest, &index, person_url_base)
    }

    pub fn len(&self) -> usize {
        self.people.len()
    }

    pub fn is_empty(&self) -> bool {
        self.people.is_empty()
    }

    /// Ranked matches for `query`; `limit` of `None` returns everything.
    pub fn search(&self, query: &str, limit: Option<usize>) -> Vec<SearchMatch> {
        let tokens = tokenize(query);
        if tokens.is_empty() || self.documents.is_empty() {
            return Vec::new();
        }
        let mut matches: Vec<SearchMatch> = self
            .documents
            .iter()
            .filter_map(|doc| {
                let score = score_document(&doc.search_text, &tokens);
                if score == 0 {
                    return None;
                }
                let entry = self.people.get(&doc.gramps_id)?;
                Some(SearchMatch {
                    gramps_id: entry.gramps_id.clone(),
                    display_name: entry.display_name.clone(),
                    is_living: entry.is_living,
                    lifespan_summary: entry.lifespan_summary.clone().unwrap_or_default(),
                    primary_photo: entry.primary_photo.clone(),
                    score,
                    url: person_url(&self.person_url_base, &entry.gramps_id),
                })
            })
            .collect();
        matches.sort_by(|a, b| match b.score.cmp(&a.score) {
            Ordering::Equal => a
                .display_name
                .to_lowercase()
                .cmp(&b.display_name.to_lowercase())
                .then_with(|| a.display_name.cmp(&b.display_name)),
            other => other,
        });
        if let Some(n) = limit {
            matches.truncate(n);
        }
        matches
    }

    pub fn autocomplete(&self, query: &str) -> Vec<SearchMatch> {
        self.search(query, Some(AUTOCOMPLETE_LIMIT))
    }
}

/// Status line for a results page.
pub fn results_summary(query: &str, count: usize) -> String {
    if query.trim().is_empty() {
        return "Enter a name to search the family records.".to_string();
    }
    match count {
        0 => format!("No results for \u{201c}{}\u{201d}.", query),
        1 => format!("1 result for \u{201c}{}\u{201d}.", query),
        n => format!("{} results for \u{201c}{}\u{201d}.", n, query),
    }
}
