//! Person profile records.
//!
//! Each person is published as a gated `<data base><id>.json` document, and
//! media items resolve to files under a separate media base. The record is
//! fetched through [`ProtectedAssetClient`] so the session header is attached.

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error};

use crate::client::ProtectedAssetClient;
use crate::config::PersonConfig;
use crate::error::{AppError, AppResult};

/// One entry of a record's `mediaGallery`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaItem {
    #[serde(default)]
    pub s3_key: Option<String>,
    #[serde(default)]
    pub handle: Option<String>,
    #[serde(default)]
    pub mime: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub placeholder_image: Option<String>,
}

/// Trailing slash always; leading slash unless the base is an absolute http(s) URL.
pub fn normalize_base(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return "/".to_string();
    }
    let mut base = trimmed.to_string();
    if !base.ends_with('/') {
        base.push('/');
    }
    if !is_absolute(&base) && !base.starts_with('/') {
        base.insert(0, '/');
    }
    base
}

fn is_absolute(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

pub fn mime_to_extension(mime: Option<&str>) -> &'static str {
    match mime {
        Some("image/png") => ".png",
        Some("image/webp") => ".webp",
        Some("image/gif") => ".gif",
        _ => ".jpg",
    }
}

/// Last segment of `s3Key`, else `handle` plus the MIME extension.
pub fn media_filename(media: &MediaItem) -> Option<String> {
    let from_key = media
        .s3_key
        .as_deref()
        .and_then(|key| key.rsplit('/').next())
        .filter(|name| !name.is_empty());
    if let Some(name) = from_key {
        return Some(name.to_string());
    }
    media
        .handle
        .as_deref()
        .filter(|h| !h.is_empty())
        .map(|h| format!("{}{}", h, mime_to_extension(media.mime.as_deref())))
}

/// Normalised data and media bases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersonPaths {
    data_base: String,
    media_base: String,
}

impl Default for PersonPaths {
    fn default() -> Self {
        Self::from_config(&PersonConfig::default())
    }
}

impl PersonPaths {
    pub fn new(data_base: &str, media_base: &str) -> Self {
        Self { data_base: normalize_base(data_base), media_base: normalize_base(media_base) }
    }

    pub fn from_config(cfg: &PersonConfig) -> Self {
        Self::new(&cfg.data_base, &cfg.media_base)
    }

    pub fn data_base(&self) -> &str {
        &self.data_base
    }

    pub fn media_base(&self) -> &str {
        &self.media_base
    }

    /// `<data base><encoded id>.json`
    pub fn data_url(&self, person_id: &str) -> String {
        format!("{}{}.json", self.data_base, urlencoding::encode(person_id))
    }

    pub fn media_url(&self, media: &MediaItem) -> Option<String> {
        media_filename(media).map(|name| format!("{}{}", self.media_base, name))
    }

    /// Media URLs for every gallery item in `record`, `None` where an item has no file.
    pub fn gallery_urls(&self, record: &Value) -> Vec<Option<String>> {
        let Some(items) = record.get("mediaGallery").and_then(Value::as_array) else {
            return Vec::new();
        };
        items
            .iter()
            .map(|item| {
                serde_json::from_value::<MediaItem>(item.clone())
                    .ok()
                    .and_then(|m| self.media_url(&m))
            })
            .collect()
    }
}

/// Fetch one person record through the gated asset client.
pub async fn fetch_person(
    assets: &ProtectedAssetClient,
    paths: &PersonPaths,
    person_id: &str,
) -> AppResult<Value> {
    let person_id = person_id.trim();
    if person_id.is_empty() {
        return Err(AppError::user(
            "person_id_required",
            "Missing required person id. Use ?id=<GRAMPS_ID> in the URL.",
        ));
    }
    let url = paths.data_url(person_id);
    debug!(target: "hfy_person", url = %url, "Fetching person record");
    let resp = assets.get_json(&url).await?;
    if !resp.is_success() {
        error!(target: "hfy_person", status = resp.status, person_id = %person_id, "Failed to load person record");
        return Err(not_found(person_id, resp.status));
    }
    if resp.body.is_null() {
        return Err(AppError::upstream("person_empty", "No person data returned."));
    }
    Ok(resp.body)
}

fn not_found(person_id: &str, status: u16) -> AppError {
    AppError::upstream(
        "person_not_found",
        format!("Person record {} not found (HTTP {}).", person_id, status),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bases_get_slashes() {
        assert_eq!(normalize_base(""), "/");
        assert_eq!(normalize_base("   "), "/");
        assert_eq!(normalize_base("person"), "/person/");
        assert_eq!(normalize_base(" /person "), "/person/");
        assert_eq!(normalize_base("https://cdn.example.com/media"), "https://cdn.example.com/media/");
        assert_eq!(normalize_base("http://cdn.example.com/"), "http://cdn.example.com/");
    }

    #[test]
    fn data_url_encodes_the_id() {
        let paths = PersonPaths::new("person", "media");
        assert_eq!(paths.data_url("I0111"), "/person/I0111.json");
        assert_eq!(paths.data_url("I 01/1"), "/person/I%2001%2F1.json");
        let remote = PersonPaths::new("https://data.example.com/p", "/media/");
        assert_eq!(remote.data_url("I0001"), "https://data.example.com/p/I0001.json");
    }

    #[test]
    fn media_prefers_s3_key_then_handle() {
        let keyed = MediaItem { s3_key: Some("gallery/2020/photo.png".into()), handle: Some("h1".into()), ..Default::default() };
        assert_eq!(media_filename(&keyed).as_deref(), Some("photo.png"));

        let trailing = MediaItem { s3_key: Some("gallery/".into()), handle: Some("h1".into()), mime: Some("image/webp".into()), ..Default::default() };
        assert_eq!(media_filename(&trailing).as_deref(), Some("h1.webp"));

        let bare = MediaItem { handle: Some("h2".into()), ..Default::default() };
        assert_eq!(media_filename(&bare).as_deref(), Some("h2.jpg"));

        assert_eq!(media_filename(&MediaItem::default()), None);
        assert_eq!(media_filename(&MediaItem { handle: Some(String::new()), ..Default::default() }), None);
    }

    #[test]
    fn unknown_mime_falls_back_to_jpg() {
        assert_eq!(mime_to_extension(Some("image/jpeg")), ".jpg");
        assert_eq!(mime_to_extension(Some("image/gif")), ".gif");
        assert_eq!(mime_to_extension(Some("image/tiff")), ".jpg");
        assert_eq!(mime_to_extension(None), ".jpg");
    }

    #[test]
    fn gallery_urls_follow_item_order() {
        let paths = PersonPaths::default();
        let record = json!({
            "mediaGallery": [
                {"s3Key": "a/b/c.gif"},
                {"title": "nothing to show"},
                {"handle": "m9", "mime": "image/png"}
            ]
        });
        assert_eq!(
            paths.gallery_urls(&record),
            vec![Some("/media/c.gif".to_string()), None, Some("/media/m9.png".to_string())]
        );
        assert!(paths.gallery_urls(&json!({})).is_empty());
    }

    #[test]
    fn not_found_names_the_record_and_status() {
        let err = not_found("I0404", 404);
        assert_eq!(err.message(), "Person record I0404 not found (HTTP 404).");
        assert_eq!(err.code_str(), "person_not_found");
    }
}
