//! Allowlist data: keyed e-mail digests, the e-mail to person-record mapping and
//! the HMAC secret, loaded from a store and memoised for the life of the process.

mod cache;
mod digest;
mod store;

pub use cache::CachedAllowlist;
pub use digest::{email_digest, normalize_email};
pub use store::{read_secret, AllowlistStore, EmailMapping, FileAllowlistStore, MemoryAllowlistStore};
