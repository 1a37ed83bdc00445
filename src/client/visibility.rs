//! Declarative feature visibility rules.
//!
//! A rule maps state field names to allow-lists of acceptable values. Values are
//! compared as strings, a missing or null state field reads as `"unknown"`, and
//! an allow-list containing `"any"` (or a falsy rule value) matches everything.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

pub const ANY: &str = "any";
pub const UNKNOWN: &str = "unknown";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureAsset {
    #[serde(rename = "type")]
    pub kind: String,
    pub path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureRule {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub show_when: Option<Map<String, Value>>,
    #[serde(default)]
    pub assets: Vec<FeatureAsset>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureRules(pub BTreeMap<String, FeatureRule>);

#[derive(Deserialize)]
#[serde(untagged)]
enum RulesDocument {
    Wrapped { components: FeatureRules },
    Bare(FeatureRules),
}

// Field names written by older rule files.
fn canonical_field(name: &str) -> &str {
    match name {
        "userGrampsID" => "personRecordId",
        "sessionExpiresAt" => "expiresAt",
        other => other,
    }
}

/// String form used for comparisons: `null` -> "null", booleans and numbers
/// in their literal form, arrays comma-joined.
pub fn value_string(v: &Value) -> String {
    match v {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(value_string).collect::<Vec<_>>().join(","),
        Value::Object(_) => "[object Object]".to_string(),
    }
}

fn is_falsy(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64().map(|f| f == 0.0).unwrap_or(false),
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// Does a single state value satisfy an allow-list?
pub fn matches_condition(value: Option<&Value>, allowed: &Value) -> bool {
    let allowed: Vec<Value> = if is_falsy(allowed) {
        vec![Value::String(ANY.to_string())]
    } else if let Value::Array(items) = allowed {
        items.clone()
    } else {
        vec![allowed.clone()]
    };
    if allowed.iter().any(|a| a.as_str() == Some(ANY)) {
        return true;
    }
    let candidate = match value {
        None | Some(Value::Null) => UNKNOWN.to_string(),
        Some(v) => value_string(v),
    };
    allowed.iter().any(|a| value_string(a) == candidate)
}

static SITE_DEFAULTS: Lazy<FeatureRules> = Lazy::new(|| {
    let rules = json!({
        "navbarSearch": {
            "description": "Global navigation search (autocomplete and results entry point).",
            "showWhen": { "loggedIn": [true, "true"] },
            "assets": [
                { "type": "json", "path": "/person/index.json" },
                { "type": "json", "path": "/person/search-index.json" }
            ]
        },
        "familyLoginLink": {
            "description": "Navigation link to the family login page.",
            "showWhen": { "loggedIn": [false, "false", "unknown", null] }
        },
        "logoutLink": {
            "description": "Navigation link that signs the visitor out.",
            "showWhen": { "loggedIn": [true, "true"] }
        },
        "myRecordLink": {
            "description": "Link to the signed-in visitor's own person record.",
            "showWhen": { "loggedIn": [true, "true"], "hasRecord": [true, "true"] }
        }
    });
    serde_json::from_value(rules).unwrap_or_default()
});

impl FeatureRules {
    /// Rules for the site's navigation features.
    pub fn site_defaults() -> Self {
        SITE_DEFAULTS.clone()
    }

    /// Parse either a bare `{feature: rule}` map or `{"components": {...}}`.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        let doc: RulesDocument = serde_json::from_str(text)?;
        Ok(match doc {
            RulesDocument::Wrapped { components } | RulesDocument::Bare(components) => components,
        })
    }

    pub fn get(&self, feature: &str) -> Option<&FeatureRule> {
        self.0.get(feature)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    /// Evaluate `feature` against a field map. Unknown features are visible.
    pub fn should_show(&self, feature: &str, fields: &Map<String, Value>) -> bool {
        let Some(conditions) = self.get(feature).and_then(|r| r.show_when.as_ref()) else {
            return true;
        };
        conditions
            .iter()
            .all(|(field, allowed)| matches_condition(fields.get(canonical_field(field)), allowed))
    }
}
