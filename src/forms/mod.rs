//! Form submissions and the actions that run on them.
//!
//! A host posts a [`FormRecord`] (the form's settings plus the submitted
//! fields). Every action named in `form_settings.submit_actions` is run in
//! order and reports problems to an [`ErrorSink`].

use serde::de::{Deserialize, Deserializer};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::models::settings::SiteOptions;

// ── Fields ────────────────────────────────────────────

/// Raw value of a submitted field. Checkboxes and multi-selects arrive as a list.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Single(String),
    Multi(Vec<String>),
}

impl FieldValue {
    /// Coerce an incoming JSON value. Numbers and booleans become strings,
    /// `null` becomes empty, nested objects are kept as their JSON text.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Array(items) => {
                FieldValue::Multi(items.iter().map(scalar_to_string).collect())
            }
            other => FieldValue::Single(scalar_to_string(other)),
        }
    }

    /// Lists are trimmed per element and joined with ", ", then the whole
    /// value is trimmed. An empty result means the field is absent.
    pub fn normalized(&self) -> String {
        match self {
            FieldValue::Single(s) => s.trim().to_string(),
            FieldValue::Multi(items) => items
                .iter()
                .map(|s| s.trim())
                .collect::<Vec<_>>()
                .join(", ")
                .trim()
                .to_string(),
        }
    }
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(true) => "1".to_string(),
        Value::Bool(false) => String::new(),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub id: String,
    pub value: FieldValue,
}

/// Submitted fields in the order the form sent them, indexed by id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Submission {
    fields: Vec<Field>,
    index: HashMap<String, usize>,
}

impl Submission {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field. A repeated id replaces the earlier value in place.
    pub fn push(&mut self, id: &str, value: FieldValue) {
        match self.index.get(id) {
            Some(&pos) => self.fields[pos].value = value,
            None => {
                self.index.insert(id.to_string(), self.fields.len());
                self.fields.push(Field {
                    id: id.to_string(),
                    value,
                });
            }
        }
    }

    #[cfg(test)]
    pub fn with(mut self, id: &str, value: &str) -> Self {
        self.push(id, FieldValue::Single(value.to_string()));
        self
    }

    pub fn get(&self, id: &str) -> Option<&Field> {
        self.index.get(id).map(|&pos| &self.fields[pos])
    }

    /// Normalized value of a field, empty when the field is missing.
    pub fn value_of(&self, id: &str) -> String {
        self.get(id).map(|f| f.value.normalized()).unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Build from a JSON object. Each entry is either the raw value or an
    /// object carrying it under `"value"` (the shape form builders send).
    pub fn from_map(map: &Map<String, Value>) -> Self {
        let mut submission = Submission {
            fields: Vec::with_capacity(map.len()),
            index: HashMap::with_capacity(map.len()),
        };
        for (id, entry) in map {
            let raw = match entry {
                Value::Object(obj) => obj.get("value").unwrap_or(&Value::Null),
                other => other,
            };
            submission.push(id, FieldValue::from_json(raw));
        }
        submission
    }
}

impl<'de> Deserialize<'de> for Submission {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let map = Map::<String, Value>::deserialize(deserializer)?;
        Ok(Submission::from_map(&map))
    }
}

/// One submission as posted by the form host.
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct FormRecord {
    #[serde(default)]
    pub form_settings: Map<String, Value>,
    #[serde(default)]
    pub fields: Submission,
}

impl FormRecord {
    /// Names listed in `submit_actions`. Accepts a list or a comma-separated string.
    pub fn submit_actions(&self) -> Vec<String> {
        match self.form_settings.get("submit_actions") {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str())
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            Some(Value::String(s)) => s
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            _ => Vec::new(),
        }
    }
}

// ── Error reporting ───────────────────────────────────

/// Collects the human-readable errors an action wants shown to the submitter.
pub trait ErrorSink {
    fn add_error_message(&mut self, message: &str);
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct SubmissionResponse {
    pub success: bool,
    pub errors: Vec<String>,
}

impl SubmissionResponse {
    pub fn new() -> Self {
        SubmissionResponse {
            success: true,
            errors: Vec::new(),
        }
    }

    pub fn failed(message: &str) -> Self {
        let mut resp = Self::new();
        resp.add_error_message(message);
        resp
    }
}

impl ErrorSink for SubmissionResponse {
    fn add_error_message(&mut self, message: &str) {
        self.success = false;
        self.errors.push(message.to_string());
    }
}

// ── Actions ───────────────────────────────────────────

pub trait FormAction: Send + Sync {
    /// Identifier used in `submit_actions`.
    fn name(&self) -> &'static str;
    fn label(&self) -> &'static str;
    fn run(&self, record: &FormRecord, options: &SiteOptions, sink: &mut dyn ErrorSink);
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ActionInfo {
    pub name: String,
    pub label: String,
}

#[derive(Default)]
pub struct ActionRegistry {
    actions: Vec<Box<dyn FormAction>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, action: Box<dyn FormAction>) -> Self {
        self.actions.push(action);
        self
    }

    pub fn get(&self, name: &str) -> Option<&dyn FormAction> {
        self.actions
            .iter()
            .find(|a| a.name() == name)
            .map(|a| a.as_ref())
    }

    pub fn list(&self) -> Vec<ActionInfo> {
        self.actions
            .iter()
            .map(|a| ActionInfo {
                name: a.name().to_string(),
                label: a.label().to_string(),
            })
            .collect()
    }

    /// Run every action the record asks for, in the order it lists them.
    pub fn process(&self, record: &FormRecord, options: &SiteOptions) -> SubmissionResponse {
        let mut response = SubmissionResponse::new();
        let names = record.submit_actions();
        log::debug!(
            "[forms] Processing {} field(s) for actions {:?}",
            record.fields.len(),
            names
        );

        for name in names {
            match self.get(&name) {
                Some(action) => action.run(record, options, &mut response),
                None => log::warn!("[forms] Unknown form action: {}", name),
            }
        }

        response
    }
}
