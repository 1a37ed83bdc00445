use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Client-visible session state; one shared instance per page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub logged_in: bool,
    pub session_token: Option<String>,
    pub person_record_id: Option<String>,
    pub has_record: bool,
    /// Epoch milliseconds.
    pub expires_at: Option<i64>,
    pub verifying: bool,
    /// Epoch milliseconds.
    pub verified_at: Option<i64>,
}

impl SessionState {
    /// Logged out, no token, no record. Keeps `verifying`.
    pub fn reset(&mut self) {
        let verifying = self.verifying;
        *self = SessionState { verifying, ..Default::default() };
    }

    // a token implies logged in; a record flag implies a record id
    fn normalize(&mut self) -> bool {
        let mut dropped_token = false;
        if !self.logged_in && self.session_token.is_some() {
            self.session_token = None;
            self.expires_at = None;
            dropped_token = true;
        }
        if self.person_record_id.as_deref().map(str::is_empty).unwrap_or(false) {
            self.person_record_id = None;
        }
        if self.person_record_id.is_none() {
            self.has_record = false;
        }
        dropped_token
    }

    /// JSON object view used by visibility rules.
    pub fn as_fields(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(m)) => m,
            _ => Map::new(),
        }
    }
}

/// Partial update. `session_token: Some(None)` is an explicit clear, distinct
/// from leaving the token unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatePatch {
    pub logged_in: Option<bool>,
    pub session_token: Option<Option<String>>,
    pub person_record_id: Option<Option<String>>,
    pub has_record: Option<bool>,
}

impl StatePatch {
    pub fn new() -> Self { Self::default() }

    pub fn logged_in(mut self, v: bool) -> Self { self.logged_in = Some(v); self }

    pub fn session_token(mut self, v: Option<String>) -> Self { self.session_token = Some(v); self }

    /// Sets the record id and derives `has_record` from its presence.
    pub fn record(mut self, id: Option<String>) -> Self {
        self.has_record = Some(id.is_some());
        self.person_record_id = Some(id);
        self
    }

    pub fn has_record(mut self, v: bool) -> Self { self.has_record = Some(v); self }

    /// Merge into `state`; returns true when the persisted session cache must be cleared.
    pub fn apply(self, state: &mut SessionState) -> bool {
        let mut clear = false;
        if let Some(v) = self.logged_in { state.logged_in = v; }
        if let Some(tok) = self.session_token {
            if tok.is_none() {
                state.expires_at = None;
                clear = true;
            }
            state.session_token = tok;
        }
        if let Some(id) = self.person_record_id { state.person_record_id = id; }
        if let Some(v) = self.has_record { state.has_record = v; }
        state.normalize() || clear
    }
}
