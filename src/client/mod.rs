//! Browser-side session management, expressed as explicit context objects.
//!
//! A page builds one [`FeatureFlags`] (session cache and visibility) and one
//! [`AuthController`] (credential lifecycle) and hands them their storage areas,
//! gateway transport and page capabilities at construction.

pub mod assets;
pub mod auth;
pub mod flags;
pub mod page;
pub mod state;
pub mod storage;
pub mod transport;
pub mod visibility;

pub use assets::{session_headers, ProtectedAssetClient, SESSION_HEADER};
pub use auth::{
    AuthController, AuthSnapshot, CredentialResponse, StoredAuthRecord, Subscription, AUTH_STORAGE_KEY,
    LEGACY_RECORD_KEY, LEGACY_TOKEN_KEY,
};
pub use flags::{parse_verification, FeatureFlags, VerifiedSession, SESSION_STORAGE_KEY};
pub use page::{login_redirect_url, person_url, CredentialSource, Navigator, PageContext, RecordingNavigator};
pub use state::{SessionState, StatePatch};
pub use storage::{ClientStorage, FileStorage, MemoryStorage};
pub use transport::{GatewayTransport, HttpGatewayTransport, TransportResponse, VerifyRequest};
pub use visibility::{FeatureRule, FeatureRules};
