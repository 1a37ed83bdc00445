//! Session gateway: stateless-per-request allowlist check that hands back a
//! short-lived session token.

mod cors;
mod handler;
mod session;

pub use cors::{cors_headers, resolve_origin, ALLOW_HEADERS, ALLOW_METHODS};
pub use handler::{GatewayRequest, GatewayResponse, SessionGateway};
pub use session::{iso_millis, mint_session, mint_session_at, SessionGrant};
