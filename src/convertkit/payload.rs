//! Turns a submission plus the form's ConvertKit settings into a subscribe request.

use serde_json::map::Entry;
use serde_json::{Map, Value};

use super::SubscribeError;
use crate::forms::Submission;

/// Keys that only ever appear as top-level subscriber attributes.
pub const RESERVED_KEYS: &[&str] = &["email", "first_name"];

pub const DEFAULT_EMAIL_FIELD: &str = "email";
pub const DEFAULT_FIRST_NAME_FIELD: &str = "first_name";

fn is_reserved(key: &str) -> bool {
    RESERVED_KEYS.contains(&key)
}

// ── Settings ──────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldMapping {
    pub src: String,
    pub dest: String,
}

impl FieldMapping {
    pub fn new(src: &str, dest: &str) -> Self {
        FieldMapping {
            src: src.to_string(),
            dest: dest.to_string(),
        }
    }
}

/// Per-form ConvertKit configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionSettings {
    pub api_key: String,
    pub form_id: u64,
    pub email_src: String,
    pub fname_src: String,
    /// Comma-separated tag ids.
    pub tags: String,
    pub auto_include: bool,
    pub mappings: Vec<FieldMapping>,
}

impl Default for ActionSettings {
    fn default() -> Self {
        ActionSettings {
            api_key: String::new(),
            form_id: 0,
            email_src: String::new(),
            fname_src: String::new(),
            tags: String::new(),
            auto_include: true,
            mappings: Vec::new(),
        }
    }
}

impl ActionSettings {
    /// Read the `ck_*` keys of a form's settings object. Missing or
    /// malformed values fall back to their defaults.
    pub fn from_form_settings(settings: &Map<String, Value>) -> Self {
        let text = |key: &str| settings.get(key).map(value_text).unwrap_or_default();

        let mappings = match settings.get("ck_mappings") {
            Some(Value::Array(rows)) => rows
                .iter()
                .filter_map(|row| row.as_object())
                .map(|row| {
                    FieldMapping::new(
                        &row.get("src").map(value_text).unwrap_or_default(),
                        &row.get("dest").map(value_text).unwrap_or_default(),
                    )
                })
                .collect(),
            _ => Vec::new(),
        };

        ActionSettings {
            api_key: text("ck_api_key"),
            form_id: settings.get("ck_form_id").map(parse_form_id).unwrap_or(0),
            email_src: text("ck_email_field"),
            fname_src: text("ck_first_name_field"),
            tags: text("ck_tags"),
            auto_include: settings.get("ck_auto_include").map(switch_on).unwrap_or(true),
            mappings,
        }
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}

fn switch_on(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => matches!(s.trim(), "yes" | "true" | "1" | "on"),
        _ => false,
    }
}

fn parse_form_id(value: &Value) -> u64 {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_i64().map(|i| i.unsigned_abs()))
            .or_else(|| n.as_f64().map(|f| f.abs() as u64))
            .unwrap_or(0),
        Value::String(s) => leading_int(s.trim()).unsigned_abs(),
        _ => 0,
    }
}

/// Integer value of the leading `[+-]digits` of `s`, 0 when there are none.
/// Saturates instead of overflowing.
pub fn leading_int(s: &str) -> i64 {
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };

    let mut n: i64 = 0;
    for b in digits.bytes().take_while(|b| b.is_ascii_digit()) {
        let d = i64::from(b - b'0');
        n = match n.checked_mul(10).and_then(|v| v.checked_add(d)) {
            Some(v) => v,
            None => return if negative { i64::MIN } else { i64::MAX },
        };
    }

    if negative {
        -n
    } else {
        n
    }
}

/// Tag ids from a comma-separated list, in order. Pieces that are not
/// numeric or evaluate to zero are dropped.
pub fn parse_tags(csv: &str) -> Vec<i64> {
    csv.split(',')
        .map(|piece| leading_int(piece.trim()))
        .filter(|id| *id != 0)
        .collect()
}

// ── Payload ───────────────────────────────────────────

/// Custom subscriber fields, kept in insertion order.
///
/// Backed by `serde_json::Map`, which is an insertion-ordered hash map
/// with the `preserve_order` feature.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
#[serde(transparent)]
pub struct CustomFields {
    entries: Map<String, Value>,
}

impl CustomFields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace.
    pub fn set(&mut self, key: &str, value: String) {
        self.entries.insert(key.to_string(), Value::String(value));
    }

    /// Insert only when the key is not present yet. Returns whether it was inserted.
    pub fn insert_if_absent(&mut self, key: &str, value: String) -> bool {
        match self.entries.entry(key) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(Value::String(value));
                true
            }
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    #[cfg(test)]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).and_then(Value::as_str)
    }

    #[cfg(test)]
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(|k| k.as_str())
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Body of `POST forms/{id}/subscribe`.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Subscription {
    pub api_key: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "CustomFields::is_empty")]
    pub fields: CustomFields,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubscribeRequest {
    pub form_id: u64,
    pub payload: Subscription,
}

fn source_or<'a>(configured: &'a str, default: &'a str) -> &'a str {
    let configured = configured.trim();
    if configured.is_empty() {
        default
    } else {
        configured
    }
}

/// Resolve a submission against the form settings. Fails before any
/// network traffic when email, API key or form id are missing, checked
/// in that order.
pub fn build(
    submission: &Submission,
    settings: &ActionSettings,
    default_api_key: &str,
) -> Result<SubscribeRequest, SubscribeError> {
    let email_src = source_or(&settings.email_src, DEFAULT_EMAIL_FIELD);
    let email = submission.value_of(email_src);
    if email.is_empty() {
        return Err(SubscribeError::MissingEmail);
    }

    let fname_src = source_or(&settings.fname_src, DEFAULT_FIRST_NAME_FIELD);
    let first_name = submission.value_of(fname_src);

    let mut api_key = settings.api_key.trim();
    if api_key.is_empty() {
        api_key = default_api_key.trim();
    }
    if api_key.is_empty() {
        return Err(SubscribeError::MissingApiKey);
    }

    if settings.form_id == 0 {
        return Err(SubscribeError::MissingFormId);
    }

    let mut custom = CustomFields::new();

    // Explicit mappings. Reserved destinations are dropped without complaint.
    for mapping in &settings.mappings {
        let src = mapping.src.trim();
        let dest = mapping.dest.trim();
        if src.is_empty() || dest.is_empty() || is_reserved(dest) {
            continue;
        }
        let value = submission.value_of(src);
        if !value.is_empty() {
            custom.set(dest, value);
        }
    }

    // Everything else under its own id, never overwriting a mapping.
    if settings.auto_include {
        for field in submission.iter() {
            let id = field.id.as_str();
            if is_reserved(id) || id == email_src || id == fname_src {
                continue;
            }
            if custom.contains_key(id) {
                continue;
            }
            let value = field.value.normalized();
            if !value.is_empty() {
                custom.insert_if_absent(id, value);
            }
        }
    }

    Ok(SubscribeRequest {
        form_id: settings.form_id,
        payload: Subscription {
            api_key: api_key.to_string(),
            email,
            first_name: (!first_name.is_empty()).then_some(first_name),
            fields: custom,
            tags: parse_tags(&settings.tags),
        },
    })
}
