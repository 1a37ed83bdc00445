//! Identity credential lifecycle.
//!
//! `AuthController` owns the raw credential, persists it with the person-record
//! association as one versioned record in the long-lived storage area, drives
//! gateway verification through [`FeatureFlags`] and tells subscribers about
//! changes with redacted snapshots.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{error, warn};

use super::flags::{FeatureFlags, VerifiedSession};
use super::page::{login_redirect_url, person_url, CredentialSource, Navigator, PageContext};
use super::state::StatePatch;
use super::storage::ClientStorage;
use crate::config::AuthConfig;
use crate::identity::{decode_unverified, redact_email, IdentityClaims};

pub const AUTH_STORAGE_KEY: &str = "HFY_AUTH_SESSION_V2";
pub const LEGACY_TOKEN_KEY: &str = "HFY_AUTH_ID_TOKEN";
pub const LEGACY_RECORD_KEY: &str = "HFY_AUTH_USER_GRAMPS_ID";
const RECORD_VERSION: u32 = 2;

/// What the identity widget hands back after a sign-in.
#[derive(Debug, Clone, Default)]
pub struct CredentialResponse {
    pub credential: Option<String>,
    pub select_by: Option<String>,
}

impl CredentialResponse {
    pub fn new(credential: impl Into<String>) -> Self {
        Self { credential: Some(credential.into()), select_by: None }
    }
}

/// Redacted view delivered to subscribers. Never carries the raw credential.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthSnapshot {
    pub signed_in: bool,
    pub profile: Option<IdentityClaims>,
    pub id_token: Option<&'static str>,
    #[serde(rename = "userGrampsID")]
    pub user_gramps_id: Option<String>,
}

/// Long-lived credential plus record association, stored as one document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredAuthRecord {
    pub version: u32,
    #[serde(default)]
    pub id_token: Option<String>,
    #[serde(default)]
    pub gramps_id: Option<String>,
    #[serde(default)]
    pub stored_at: i64,
}

#[derive(Debug, Default)]
struct AuthState {
    id_token: Option<String>,
    profile: Option<IdentityClaims>,
    signed_in: bool,
    gramps_id: Option<String>,
}

type Listener = Arc<dyn Fn(&AuthSnapshot) + Send + Sync>;

/// Handle returned by [`AuthController::on_change`].
pub struct Subscription {
    id: u64,
    controller: Weak<AuthController>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        if let Some(c) = self.controller.upgrade() {
            c.listeners.lock().retain(|(id, _)| *id != self.id);
        }
    }
}

macro_rules! auth_debug {
    ($auth:expr, $($arg:tt)+) => {
        if $auth.config.debug {
            tracing::info!(target: "hfy_auth", $($arg)+)
        } else {
            tracing::debug!(target: "hfy_auth", $($arg)+)
        }
    };
}

pub struct AuthController {
    config: AuthConfig,
    flags: Arc<FeatureFlags>,
    storage: Arc<dyn ClientStorage>,
    page: PageContext,
    navigator: Arc<dyn Navigator>,
    credential_source: Option<Arc<dyn CredentialSource>>,
    state: RwLock<AuthState>,
    redirected: AtomicBool,
    listeners: Mutex<Vec<(u64, Listener)>>,
    next_listener: AtomicU64,
}

impl AuthController {
    pub fn new(
        config: AuthConfig,
        flags: Arc<FeatureFlags>,
        local_storage: Arc<dyn ClientStorage>,
        page: PageContext,
        navigator: Arc<dyn Navigator>,
        credential_source: Option<Arc<dyn CredentialSource>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            flags,
            storage: local_storage,
            page,
            navigator,
            credential_source,
            state: RwLock::new(AuthState::default()),
            redirected: AtomicBool::new(false),
            listeners: Mutex::new(Vec::new()),
            next_listener: AtomicU64::new(1),
        })
    }

    /// Page start-up: restore any stored session unless sign-in is unconfigured.
    pub fn init(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        if self.config.client_id.as_deref().map(str::is_empty).unwrap_or(true) {
            auth_debug!(self, "No client ID configured; skipping auth initialization");
            return None;
        }
        self.restore_stored_session()
    }

    pub fn flags(&self) -> &Arc<FeatureFlags> {
        &self.flags
    }

    pub fn is_signed_in(&self) -> bool {
        self.state.read().signed_in
    }

    pub fn latest_id_token(&self) -> Option<String> {
        self.state.read().id_token.clone()
    }

    pub fn user_gramps_id(&self) -> Option<String> {
        self.state.read().gramps_id.clone()
    }

    pub fn snapshot(&self) -> AuthSnapshot {
        let s = self.state.read();
        AuthSnapshot {
            signed_in: s.signed_in,
            profile: s.profile.clone(),
            id_token: s.id_token.as_ref().map(|_| "[redacted]"),
            user_gramps_id: s.gramps_id.clone(),
        }
    }

    /// Register a change listener.
    pub fn on_change<F>(self: &Arc<Self>, listener: F) -> Subscription
    where
        F: Fn(&AuthSnapshot) + Send + Sync + 'static,
    {
        let id = self.next_listener.fetch_add(1, Ordering::SeqCst);
        self.listeners.lock().push((id, Arc::new(listener)));
        Subscription { id, controller: Arc::downgrade(self) }
    }

    fn notify(&self) {
        let snapshot = self.snapshot();
        let listeners: Vec<Listener> = self.listeners.lock().iter().map(|(_, l)| l.clone()).collect();
        for l in listeners {
            if catch_unwind(AssertUnwindSafe(|| l(&snapshot))).is_err() {
                error!(target: "hfy_auth", "Change listener panicked");
            }
        }
    }

    fn load_record(&self) -> Option<StoredAuthRecord> {
        let raw = self.storage.get(AUTH_STORAGE_KEY)?;
        match serde_json::from_str::<StoredAuthRecord>(&raw) {
            Ok(r) if r.version == RECORD_VERSION => Some(r),
            Ok(r) => {
                warn!(target: "hfy_auth", version = r.version, "Ignoring stored session with unknown version");
                None
            }
            Err(e) => {
                warn!(target: "hfy_auth", error = %e, "Discarding unreadable stored session");
                self.remove_key(AUTH_STORAGE_KEY);
                None
            }
        }
    }

    /// Fold the two pre-versioned keys into the unified record, then drop them.
    fn migrate_legacy(&self, current: Option<StoredAuthRecord>) -> Option<StoredAuthRecord> {
        let token = self.storage.get(LEGACY_TOKEN_KEY).filter(|v| !v.is_empty());
        let record = self.storage.get(LEGACY_RECORD_KEY).filter(|v| !v.is_empty());
        if token.is_none() && record.is_none() {
            return current;
        }
        let mut merged = current.unwrap_or_default();
        if merged.id_token.is_none() { merged.id_token = token; }
        if merged.gramps_id.is_none() { merged.gramps_id = record; }
        auth_debug!(self, "Migrated legacy session keys");
        self.write_record(merged.id_token.clone(), merged.gramps_id.clone());
        self.remove_key(LEGACY_TOKEN_KEY);
        self.remove_key(LEGACY_RECORD_KEY);
        Some(merged)
    }

    fn write_record(&self, id_token: Option<String>, gramps_id: Option<String>) {
        if id_token.is_none() && gramps_id.is_none() {
            self.remove_key(AUTH_STORAGE_KEY);
            return;
        }
        let record = StoredAuthRecord { version: RECORD_VERSION, id_token, gramps_id, stored_at: Utc::now().timestamp_millis() };
        let result = serde_json::to_string(&record)
            .map_err(Into::into)
            .and_then(|text| self.storage.set(AUTH_STORAGE_KEY, &text));
        if let Err(e) = result {
            warn!(target: "hfy_auth", error = %e, "Unable to persist session");
        }
    }

    fn persist_current(&self) {
        let (token, record) = {
            let s = self.state.read();
            (s.id_token.clone(), s.gramps_id.clone())
        };
        self.write_record(token, record);
    }

    fn remove_key(&self, key: &str) {
        if let Err(e) = self.storage.remove(key) {
            warn!(target: "hfy_auth", key = key, error = %e, "Unable to clear stored value");
        }
    }

    // Mirrors the signed-in flag and record association into the flags state.
    fn reflect_sign_in(&self) {
        let (signed_in, record) = {
            let s = self.state.read();
            (s.signed_in, s.gramps_id.clone())
        };
        self.flags.update_state(StatePatch::new().logged_in(signed_in).record(record));
    }

    /// Handle a credential issued by the identity widget.
    ///
    /// Returns the handle of the background verification, or `None` when the
    /// response carried no credential.
    pub fn handle_credential_response(self: &Arc<Self>, response: CredentialResponse) -> Option<JoinHandle<()>> {
        let Some(credential) = response.credential.filter(|c| !c.is_empty()) else {
            auth_debug!(self, "Credential response missing payload");
            return None;
        };
        let profile = decode_unverified(&credential).unwrap_or_default();
        auth_debug!(self, select_by = ?response.select_by, email_preview = %redact_email(profile.email()),
            path = %self.page.pathname, "Received credential response");
        {
            let mut s = self.state.write();
            s.id_token = Some(credential);
            s.profile = Some(profile);
            s.signed_in = true;
        }
        self.persist_current();
        self.reflect_sign_in();
        let handle = self.spawn_verification();
        self.notify();
        Some(handle)
    }

    fn spawn_verification(self: &Arc<Self>) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.ensure_gateway_session().await;
        })
    }

    /// Verify the held credential and sync the record association from the result.
    pub async fn ensure_gateway_session(&self) -> Option<VerifiedSession> {
        let Some(token) = self.latest_id_token() else {
            auth_debug!(self, "Skipping gateway verification; no credential held");
            return None;
        };
        auth_debug!(self, "Verifying session with gateway");
        let result = self.flags.verify_session(Some(&token)).await;
        match &result {
            Some(v) => {
                auth_debug!(self, grampsId = ?v.gramps_id, "Gateway verification succeeded");
                self.sync_user_record(v.gramps_id.clone());
            }
            None => {
                auth_debug!(self, "Gateway verification returned a denied result");
                self.sync_user_record(None);
            }
        }
        self.notify();
        result
    }

    /// Set the person-record association, persist it and mirror it into the flags.
    ///
    /// Only the record fields are mirrored; the logged-in flag is left to the
    /// verification outcome.
    pub fn sync_user_record(&self, gramps_id: Option<String>) {
        let gramps_id = gramps_id.filter(|g| !g.is_empty());
        auth_debug!(self, grampsId = ?gramps_id, "Syncing user record");
        self.state.write().gramps_id = gramps_id.clone();
        self.persist_current();
        self.flags.update_state(StatePatch::new().record(gramps_id));
        self.maybe_redirect_to_record();
    }

    fn maybe_redirect_to_record(&self) {
        let Some(id) = self.user_gramps_id() else { return; };
        if self.redirected.load(Ordering::SeqCst) || !self.page.is_path(&self.config.login_path) {
            return;
        }
        if self.flags.require_session_token().is_none() {
            auth_debug!(self, "Deferring redirect; session token missing");
            return;
        }
        if self.redirected.swap(true, Ordering::SeqCst) {
            return;
        }
        let destination = person_url(&self.config.person_url_base, &id);
        auth_debug!(self, destination = %destination, "Redirecting to own record");
        self.navigator.assign(&destination);
    }

    pub fn sign_out(&self) {
        if let Some(source) = &self.credential_source {
            source.disable_auto_select();
        }
        *self.state.write() = AuthState::default();
        self.redirected.store(false, Ordering::SeqCst);
        self.remove_key(AUTH_STORAGE_KEY);
        self.remove_key(LEGACY_TOKEN_KEY);
        self.remove_key(LEGACY_RECORD_KEY);
        self.flags.update_state(
            StatePatch::new().logged_in(false).session_token(None).record(None),
        );
        self.notify();
        if !self.config.logout_redirect.is_empty() {
            self.navigator.assign(&self.config.logout_redirect);
        }
    }

    /// Restore from the long-lived record. Returns the verification handle when
    /// a credential was restored.
    pub fn restore_stored_session(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let current = self.load_record();
        let record = self.migrate_legacy(current).unwrap_or_default();

        let Some(token) = record.id_token.clone() else {
            auth_debug!(self, "No stored credential found");
            if record.gramps_id.is_some() {
                self.sync_user_record(record.gramps_id);
            }
            return None;
        };
        let Some(profile) = decode_unverified(&token) else {
            warn!(target: "hfy_auth", "Discarding undecodable stored credential");
            self.write_record(None, record.gramps_id);
            return None;
        };
        auth_debug!(self, has_gramps_id = record.gramps_id.is_some(), "Restoring stored session");
        {
            let mut s = self.state.write();
            s.id_token = Some(token);
            s.profile = Some(profile);
            s.signed_in = true;
        }
        self.sync_user_record(record.gramps_id);
        self.reflect_sign_in();
        let handle = self.spawn_verification();
        self.notify();
        Some(handle)
    }

    /// Gate a page on an established session.
    ///
    /// True when a session token is cached or the held credential verifies;
    /// otherwise navigates to the login page with a `next` back-link.
    pub async fn require_authenticated(&self) -> bool {
        let state = self.flags.state();
        if state.logged_in && state.session_token.is_some() {
            return true;
        }
        if let Some(token) = self.latest_id_token() {
            if self.flags.verify_session(Some(&token)).await.is_some() {
                return true;
            }
        }
        let next = format!("{}{}", self.page.pathname, self.page.search);
        self.navigator.assign(&login_redirect_url(&self.config.login_path, &next));
        false
    }
}
