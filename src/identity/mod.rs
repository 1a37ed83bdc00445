//! Identity credentials: claim model, local (unverified) decoding, signature
//! verification and log-safe e-mail redaction.
//! Keep the public surface thin and split implementation across sub-modules.

mod claims;
mod redact;
mod verifier;

pub use claims::{decode_unverified, IdentityClaims};
pub use redact::{redact_email, token_preview};
pub use verifier::{
    CredentialVerifier, GoogleIdTokenVerifier, StaticKeyVerifier, GOOGLE_ISSUERS, GOOGLE_JWKS_URI,
};
