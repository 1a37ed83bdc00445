use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{AppError, AppResult};

type HmacSha256 = Hmac<Sha256>;

/// Trim and lowercase; the form both the digest and the mapping lookup use.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Lowercase hex HMAC-SHA256 of an already-normalised e-mail.
pub fn email_digest(secret: &str, email: &str) -> AppResult<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::internal("hmac_key", e.to_string()))?;
    mac.update(email.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}
