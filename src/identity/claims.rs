use std::collections::HashMap;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Payload of a signed identity assertion (Google ID token).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IdentityClaims {
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    /// Kept as raw JSON: only a boolean `true` counts as verified.
    #[serde(default)]
    pub email_verified: Option<Value>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

impl IdentityClaims {
    pub fn is_email_verified(&self) -> bool {
        matches!(self.email_verified, Some(Value::Bool(true)))
    }

    pub fn email(&self) -> &str {
        self.email.as_deref().unwrap_or("")
    }
}

/// Decode the payload segment of a credential without checking its signature.
///
/// Display/profile use only. Returns `None` for anything that is not a
/// three-part token with a JSON object payload.
pub fn decode_unverified(credential: &str) -> Option<IdentityClaims> {
    let mut parts = credential.split('.');
    let (_header, payload) = (parts.next()?, parts.next()?);
    parts.next()?;
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    serde_json::from_slice::<IdentityClaims>(&bytes).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_token(payload: &Value) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none"}"#);
        let body = URL_SAFE_NO_PAD.encode(payload.to_string());
        format!("{header}.{body}.sig")
    }

    #[test]
    fn decodes_payload_without_signature_check() {
        let tok = fake_token(&serde_json::json!({
            "email": "alice@example.com",
            "email_verified": true,
            "name": "Alice Ré",
            "hd": "example.com"
        }));
        let claims = decode_unverified(&tok).expect("decodes");
        assert_eq!(claims.email(), "alice@example.com");
        assert!(claims.is_email_verified());
        assert_eq!(claims.name.as_deref(), Some("Alice Ré"));
        assert_eq!(claims.extra.get("hd"), Some(&Value::String("example.com".into())));
    }

    #[test]
    fn string_true_is_not_verified() {
        let tok = fake_token(&serde_json::json!({"email": "a@b.c", "email_verified": "true"}));
        assert!(!decode_unverified(&tok).unwrap().is_email_verified());
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(decode_unverified("").is_none());
        assert!(decode_unverified("only.two").is_none());
        assert!(decode_unverified("a.!!!.c").is_none());
        let not_object = format!("h.{}.s", URL_SAFE_NO_PAD.encode("[1,2]"));
        assert!(decode_unverified(&not_object).is_none());
    }
}
