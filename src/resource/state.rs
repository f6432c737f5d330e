//! Resource State
//!
//! Flat attribute model shared by resources and data sources, plus the
//! diagnostics returned from lifecycle operations.

use serde::Serialize;
use serde_json::{Map, Value};

/// Attribute data for one resource or data source instance
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResourceData {
    id: Option<String>,
    attributes: Map<String, Value>,
}

impl ResourceData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a JSON object; non-object values give an empty instance
    pub fn from_value(value: Value) -> Self {
        let attributes = match value {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        let id = attributes
            .get("id")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .map(String::from);
        Self { id, attributes }
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn set_id(&mut self, id: impl Into<String>) {
        let id = id.into();
        self.attributes
            .insert("id".to_string(), Value::String(id.clone()));
        self.id = Some(id);
    }

    /// Forget the instance (it no longer exists remotely)
    pub fn clear_id(&mut self) {
        self.attributes.remove("id");
        self.id = None;
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// Return the value only when it is set to something other than its zero value
    pub fn get_ok(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key).filter(|v| !is_zero(v))
    }

    pub fn get_str(&self, key: &str) -> &str {
        self.attributes
            .get(key)
            .and_then(|v| v.as_str())
            .unwrap_or("")
    }

    pub fn get_bool(&self, key: &str) -> bool {
        self.attributes
            .get(key)
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    /// Required string attribute
    pub fn require_str(&self, key: &str) -> anyhow::Result<&str> {
        self.attributes
            .get(key)
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| anyhow::anyhow!("missing required argument: {}", key))
    }

    pub fn set(&mut self, key: &str, value: Value) {
        self.attributes.insert(key.to_string(), value);
    }

    /// Merge a flattened record into the attributes
    pub fn set_all(&mut self, record: Map<String, Value>) {
        self.attributes.extend(record);
    }

    pub fn attributes(&self) -> &Map<String, Value> {
        &self.attributes
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.attributes)
    }
}

/// Whether a value is the zero value of its type
pub fn is_zero(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// A non-fatal message returned by a lifecycle operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl Diagnostic {
    pub fn warning(summary: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            summary: summary.into(),
            detail: None,
        }
    }

    pub fn error(summary: impl Into<String>, detail: Option<String>) -> Self {
        Self {
            severity: Severity::Error,
            summary: summary.into(),
            detail,
        }
    }
}

pub type Diagnostics = Vec<Diagnostic>;
