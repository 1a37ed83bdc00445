//! Feature flags and the client session cache.
//!
//! `FeatureFlags` is the single owner of [`SessionState`]. It hydrates from the
//! short-lived storage area at construction, performs the verification round
//! trip against the gateway, and re-evaluates feature visibility after every
//! state change.

use std::collections::{BTreeMap, HashMap};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::future::{BoxFuture, FutureExt, Shared, WeakShared};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{error, warn};

use super::state::{SessionState, StatePatch};
use super::storage::ClientStorage;
use super::transport::{GatewayTransport, HttpGatewayTransport, VerifyRequest};
use crate::config::{FlagsConfig, PRODUCTION_HOST};
use crate::client::page::PageContext;
use crate::error::AppResult;
use crate::identity::token_preview;

pub const SESSION_STORAGE_KEY: &str = "HFY_GATEWAY_SESSION_V1";

/// A successful gateway verification.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifiedSession {
    pub allowed: bool,
    pub gramps_id: Option<String>,
    pub session_token: String,
    pub issued_at: Option<String>,
    pub expires_at: Option<String>,
    pub expires_in: Option<f64>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersistedSession {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    gramps_id: Option<String>,
    #[serde(default)]
    expires_at: Option<i64>,
    #[serde(default)]
    verified_at: Option<i64>,
}

type VerifyFuture = BoxFuture<'static, Option<VerifiedSession>>;
type VisibilityHook = Arc<dyn Fn(&BTreeMap<String, bool>) + Send + Sync>;

fn truthy(v: Option<&Value>) -> bool {
    match v {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Some(_) => true,
    }
}

fn non_empty_str(v: Option<&Value>) -> Option<String> {
    v.and_then(Value::as_str).filter(|s| !s.is_empty()).map(str::to_string)
}

/// Interpret a gateway body; `None` unless it is allowed and carries a token.
pub fn parse_verification(body: &Value) -> Option<VerifiedSession> {
    if !truthy(body.get("allowed")) {
        return None;
    }
    let session_token = non_empty_str(body.get("sessionToken"))?;
    let expires_in = match body.get("expiresIn") {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    Some(VerifiedSession {
        allowed: true,
        gramps_id: non_empty_str(body.get("grampsId")),
        session_token,
        issued_at: non_empty_str(body.get("issuedAt")),
        expires_at: non_empty_str(body.get("expiresAt")),
        expires_in,
    })
}

/// Absolute expiry wins; otherwise `now + expiresIn` seconds.
///
/// A relative expiry that does not fit in epoch milliseconds means no expiry.
fn expiry_millis(v: &VerifiedSession, now_ms: i64) -> Option<i64> {
    let absolute = v
        .expires_at
        .as_deref()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc).timestamp_millis());
    absolute.or_else(|| relative_expiry(v.expires_in?, now_ms))
}

fn relative_expiry(secs: f64, now_ms: i64) -> Option<i64> {
    let millis = secs * 1000.0;
    if millis == 0.0 || !millis.is_finite() || millis.abs() >= i64::MAX as f64 {
        return None;
    }
    now_ms.checked_add(millis as i64)
}

/// Owns one in-flight map entry. Dropped when the shared verification finishes
/// or when its last waiter goes away; either way the entry is removed.
struct InFlightGuard {
    flags: Arc<FeatureFlags>,
    key: String,
    id: u64,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let idle = {
            let mut in_flight = self.flags.in_flight.lock();
            if in_flight.get(&self.key).map(|(id, _)| *id == self.id).unwrap_or(false) {
                in_flight.remove(&self.key);
            }
            in_flight.is_empty()
        };
        if idle {
            self.flags.state.write().verifying = false;
        }
    }
}

macro_rules! flags_debug {
    ($flags:expr, $($arg:tt)+) => {
        if $flags.config.debug {
            tracing::info!(target: "hfy_flags", $($arg)+)
        } else {
            tracing::debug!(target: "hfy_flags", $($arg)+)
        }
    };
}

pub struct FeatureFlags {
    config: FlagsConfig,
    state: RwLock<SessionState>,
    storage: Arc<dyn ClientStorage>,
    transport: Arc<dyn GatewayTransport>,
    in_flight: Mutex<HashMap<String, (u64, WeakShared<VerifyFuture>)>>,
    next_flight: AtomicU64,
    hooks: RwLock<Vec<VisibilityHook>>,
}

impl FeatureFlags {
    /// Build and hydrate from `session_storage`.
    pub fn new(
        mut config: FlagsConfig,
        page: &PageContext,
        session_storage: Arc<dyn ClientStorage>,
        transport: Arc<dyn GatewayTransport>,
    ) -> Arc<Self> {
        if page.hostname == PRODUCTION_HOST && !config.enforce_assets {
            error!(target: "hfy_flags", host = %page.hostname,
                "Production domain detected but asset enforcement was off; forcing it on to protect gated assets");
            config.enforce_assets = true;
        }
        let flags = Arc::new(Self {
            config,
            state: RwLock::new(SessionState::default()),
            storage: session_storage,
            transport,
            in_flight: Mutex::new(HashMap::new()),
            next_flight: AtomicU64::new(0),
            hooks: RwLock::new(Vec::new()),
        });
        flags.hydrate();
        flags
    }

    /// Same as [`FeatureFlags::new`] with the reqwest transport.
    pub fn from_config(
        config: FlagsConfig,
        page: &PageContext,
        session_storage: Arc<dyn ClientStorage>,
    ) -> AppResult<Arc<Self>> {
        let transport = Arc::new(HttpGatewayTransport::new()?);
        Ok(Self::new(config, page, session_storage, transport))
    }

    pub fn config(&self) -> &FlagsConfig {
        &self.config
    }

    pub fn enforce_assets(&self) -> bool {
        self.config.enforce_assets
    }

    pub fn state(&self) -> SessionState {
        self.state.read().clone()
    }

    pub fn person_record_id(&self) -> Option<String> {
        self.state.read().person_record_id.clone()
    }

    /// The cached session token, if any. Never triggers verification.
    pub fn require_session_token(&self) -> Option<String> {
        self.state.read().session_token.clone()
    }

    fn hydrate(&self) {
        let Some(raw) = self.storage.get(SESSION_STORAGE_KEY) else { return; };
        let parsed: PersistedSession = match serde_json::from_str(&raw) {
            Ok(p) => p,
            Err(e) => {
                warn!(target: "hfy_flags", error = %e, "Unable to hydrate session cache; discarding it");
                self.clear_persisted();
                return;
            }
        };
        let Some(token) = parsed.token.filter(|t| !t.is_empty()) else {
            self.clear_persisted();
            return;
        };
        if parsed.expires_at.map(|exp| exp < Utc::now().timestamp_millis()).unwrap_or(false) {
            flags_debug!(self, "Stored session token expired; discarding it");
            self.clear_persisted();
            return;
        }
        {
            let mut s = self.state.write();
            s.logged_in = true;
            s.session_token = Some(token);
            s.has_record = parsed.gramps_id.is_some();
            s.person_record_id = parsed.gramps_id;
            s.expires_at = parsed.expires_at;
            s.verified_at = parsed.verified_at;
        }
        flags_debug!(self, has_record = self.state.read().has_record, "Restored session token from storage");
    }

    fn persist(&self) {
        let s = self.state.read().clone();
        let Some(token) = s.session_token else { return; };
        let entry = PersistedSession {
            token: Some(token),
            gramps_id: s.person_record_id,
            expires_at: s.expires_at,
            verified_at: s.verified_at,
        };
        let result = serde_json::to_string(&entry)
            .map_err(Into::into)
            .and_then(|text| self.storage.set(SESSION_STORAGE_KEY, &text));
        if let Err(e) = result {
            warn!(target: "hfy_flags", error = %e, "Unable to persist session cache");
        }
    }

    fn clear_persisted(&self) {
        if let Err(e) = self.storage.remove(SESSION_STORAGE_KEY) {
            warn!(target: "hfy_flags", error = %e, "Unable to clear session cache");
        }
    }

    /// Merge a partial update; an explicit `null` token also clears the persisted cache.
    pub fn update_state(&self, patch: StatePatch) {
        let clear = {
            let mut s = self.state.write();
            patch.apply(&mut s)
        };
        if clear {
            self.clear_persisted();
        }
        self.apply_visibility();
    }

    /// Visibility of `feature` against the current state with `overrides` layered on top.
    pub fn should_show(&self, feature: &str, overrides: &Map<String, Value>) -> bool {
        let mut fields = self.state.read().as_fields();
        for (k, v) in overrides {
            fields.insert(k.clone(), v.clone());
        }
        self.config.components.should_show(feature, &fields)
    }

    /// Visibility of every configured feature.
    pub fn visibility(&self) -> BTreeMap<String, bool> {
        let fields = self.state.read().as_fields();
        self.config
            .components
            .keys()
            .map(|k| (k.clone(), self.config.components.should_show(k, &fields)))
            .collect()
    }

    /// Register a callback run each time visibility is re-applied.
    pub fn on_visibility<F>(&self, hook: F)
    where
        F: Fn(&BTreeMap<String, bool>) + Send + Sync + 'static,
    {
        self.hooks.write().push(Arc::new(hook));
    }

    /// Re-apply visibility without a state change.
    pub fn refresh(&self) {
        self.apply_visibility();
    }

    fn apply_visibility(&self) {
        let hooks: Vec<VisibilityHook> = self.hooks.read().clone();
        if hooks.is_empty() {
            return;
        }
        let map = self.visibility();
        for hook in hooks {
            if catch_unwind(AssertUnwindSafe(|| hook(&map))).is_err() {
                error!(target: "hfy_flags", "Visibility hook panicked");
            }
        }
    }

    /// Verify `credential` with the gateway.
    ///
    /// Returns `None` in anonymous mode (no endpoint) and on any failure or
    /// denial, in which case the session is reset to logged-out. Concurrent
    /// calls for the same credential share one request.
    pub async fn verify_session(self: &Arc<Self>, credential: Option<&str>) -> Option<VerifiedSession> {
        let Some(endpoint) = self.config.endpoint.clone() else {
            flags_debug!(self, "No gateway endpoint configured; treating session as anonymous");
            return None;
        };
        if credential.is_none() {
            flags_debug!(self, "verify_session called without a credential");
        }
        let key = credential.unwrap_or_default().to_string();
        let fut: Shared<VerifyFuture> = {
            let mut in_flight = self.in_flight.lock();
            let running = in_flight.get(&key).and_then(|(_, weak)| weak.upgrade());
            match running {
                Some(f) => {
                    flags_debug!(self, "Joining in-flight verification");
                    f
                }
                None => {
                    let id = self.next_flight.fetch_add(1, Ordering::Relaxed);
                    let guard = InFlightGuard { flags: Arc::clone(self), key: key.clone(), id };
                    let this = Arc::clone(self);
                    let credential = credential.map(str::to_string);
                    let f = async move {
                        let _guard = guard;
                        this.run_isolated(&endpoint, credential).await
                    }
                    .boxed()
                    .shared();
                    if let Some(weak) = f.downgrade() {
                        in_flight.insert(key, (id, weak));
                    }
                    f
                }
            }
        };
        fut.await
    }

    async fn run_isolated(&self, endpoint: &str, credential: Option<String>) -> Option<VerifiedSession> {
        match AssertUnwindSafe(self.run_verification(endpoint, credential)).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(_) => {
                error!(target: "hfy_flags", "Verification panicked; resetting session");
                self.state.write().reset();
                self.clear_persisted();
                None
            }
        }
    }

    async fn run_verification(&self, endpoint: &str, credential: Option<String>) -> Option<VerifiedSession> {
        self.state.write().verifying = true;
        flags_debug!(self, endpoint = %endpoint, context = %self.config.context,
            has_id_token = credential.is_some(), "POSTing to gateway endpoint");
        let request = VerifyRequest { id_token: credential, context: self.config.context.clone() };
        let outcome = match self.transport.post(endpoint, &request).await {
            Err(e) => {
                error!(target: "hfy_flags", error = %e, "Verification failed");
                None
            }
            Ok(resp) if !resp.is_success() => {
                error!(target: "hfy_flags", status = resp.status,
                    "Verification failed: gateway response {}", resp.status);
                None
            }
            Ok(resp) => {
                let verified = parse_verification(&resp.body);
                if verified.is_none() {
                    flags_debug!(self, "Gateway denied access or omitted session token");
                }
                verified
            }
        };

        match &outcome {
            Some(v) => self.accept(v),
            None => {
                self.state.write().reset();
                self.clear_persisted();
            }
        }
        self.state.write().verifying = false;
        self.apply_visibility();
        outcome
    }

    fn accept(&self, v: &VerifiedSession) {
        let now = Utc::now().timestamp_millis();
        let expires_at = expiry_millis(v, now);
        {
            let mut s = self.state.write();
            s.logged_in = true;
            s.session_token = Some(v.session_token.clone());
            s.person_record_id = v.gramps_id.clone();
            s.has_record = v.gramps_id.is_some();
            s.expires_at = expires_at;
            s.verified_at = Some(now);
        }
        flags_debug!(self, session_token_preview = %token_preview(&v.session_token),
            grampsId = ?v.gramps_id, "Session verified via gateway");
        self.persist();
    }
}
