//! CORS header computation for the gateway route.

pub const ALLOW_METHODS: &str = "POST,OPTIONS";
pub const ALLOW_HEADERS: &str = "Content-Type";

/// Resolve the `Access-Control-Allow-Origin` value.
///
/// The caller's origin is echoed only on an exact match; otherwise the first
/// configured origin is returned, and with nothing configured the wildcard.
pub fn resolve_origin<'a>(allowed: &'a [String], origin: &'a str) -> &'a str {
    if !origin.is_empty() && allowed.iter().any(|o| o == origin) {
        return origin;
    }
    allowed.first().map(String::as_str).unwrap_or("*")
}

pub fn cors_headers(allowed: &[String], origin: &str) -> Vec<(String, String)> {
    vec![
        ("Access-Control-Allow-Origin".to_string(), resolve_origin(allowed, origin).to_string()),
        ("Access-Control-Allow-Methods".to_string(), ALLOW_METHODS.to_string()),
        ("Access-Control-Allow-Headers".to_string(), ALLOW_HEADERS.to_string()),
        ("Vary".to_string(), "Origin".to_string()),
    ]
}
