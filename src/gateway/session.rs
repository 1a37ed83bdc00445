use base64::Engine;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::Serialize;

use crate::error::{AppError, AppResult};

/// A freshly minted gateway session.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionGrant {
    pub session_token: String,
    pub issued_at: String,
    pub expires_at: String,
    pub expires_in: u64,
}

fn gen_token() -> AppResult<String> {
    // 256-bit random token, base64url without padding
    let mut buf = [0u8; 32];
    getrandom::getrandom(&mut buf)
        .map_err(|e| AppError::internal("entropy_unavailable", e.to_string()))?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(buf))
}

/// ISO-8601 with millisecond precision and a `Z` suffix.
pub fn iso_millis(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Mint a new opaque session token valid for `ttl_secs` from now.
pub fn mint_session(ttl_secs: u64) -> AppResult<SessionGrant> {
    mint_session_at(Utc::now(), ttl_secs)
}

pub fn mint_session_at(now: DateTime<Utc>, ttl_secs: u64) -> AppResult<SessionGrant> {
    let expires = i64::try_from(ttl_secs)
        .ok()
        .and_then(Duration::try_seconds)
        .and_then(|ttl| now.checked_add_signed(ttl))
        .ok_or_else(|| AppError::config("ttl_range", format!("session TTL out of range: {}", ttl_secs)))?;
    Ok(SessionGrant {
        session_token: gen_token()?,
        issued_at: iso_millis(now),
        expires_at: iso_millis(expires),
        expires_in: ttl_secs,
    })
}
