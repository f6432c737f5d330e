//! Query and body builders
//!
//! Turns attribute data into URL query strings and JSON request bodies.
//! Unset optional values are always omitted.

use super::state::{is_zero, ResourceData};
use serde_json::{Map, Value};

/// Ordered list of query parameters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    pairs: Vec<(String, String)>,
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the plain parameters that are set in `data`
    pub fn from_data(data: &ResourceData, params: &[impl AsRef<str>]) -> Self {
        let mut query = Self::new();
        for param in params {
            let param = param.as_ref();
            if let Some(value) = data.get_ok(param) {
                query.push_value(param, value);
            }
        }
        query
    }

    pub fn push(&mut self, key: &str, value: impl Into<String>) -> &mut Self {
        self.pairs.push((key.to_string(), value.into()));
        self
    }

    /// Add a JSON value; arrays become repeated keys and nulls are skipped
    pub fn push_value(&mut self, key: &str, value: &Value) {
        match value {
            Value::String(s) => {
                self.push(key, s.as_str());
            },
            Value::Array(items) => {
                for item in items {
                    self.push_value(key, item);
                }
            },
            Value::Null => {},
            other => {
                self.push(key, other.to_string());
            },
        }
    }

    /// Add `key=true` when the boolean attribute is set
    pub fn flag(&mut self, data: &ResourceData, key: &str) -> &mut Self {
        if data.get_bool(key) {
            self.push(key, "true");
        }
        self
    }

    /// Split a comma-separated attribute into repeated keys
    pub fn multi(&mut self, data: &ResourceData, key: &str) -> &mut Self {
        if let Some(raw) = data.get_ok(key).and_then(|v| v.as_str()) {
            for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
                self.push(key, part);
            }
        }
        self
    }

    /// Add the offset unless it is the first page
    pub fn offset(&mut self, offset: usize) -> &mut Self {
        if offset != 0 {
            self.push("offset", offset.to_string());
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Render as `?k=v&...`, or an empty string when there are no parameters
    pub fn to_query_string(&self) -> String {
        if self.is_empty() {
            return String::new();
        }

        let parts: Vec<String> = self
            .pairs
            .iter()
            .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
            .collect();
        format!("?{}", parts.join("&"))
    }

    /// Append to a URL that may already carry a query string
    pub fn apply_to(&self, url: &str) -> String {
        let query = self.to_query_string();
        if query.is_empty() {
            url.to_string()
        } else if url.contains('?') {
            format!("{}&{}", url, &query[1..])
        } else {
            format!("{}{}", url, query)
        }
    }
}

/// Recursively drop nulls and empty containers from a request body
pub fn remove_nil(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let cleaned: Map<String, Value> = map
                .into_iter()
                .map(|(k, v)| (k, remove_nil(v)))
                .filter(|(_, v)| !is_empty_container(v))
                .collect();
            Value::Object(cleaned)
        },
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(remove_nil)
                .filter(|v| !is_empty_container(v))
                .collect(),
        ),
        other => other,
    }
}

fn is_empty_container(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(o) => o.is_empty(),
        Value::Array(a) => a.is_empty(),
        _ => false,
    }
}

/// Map zero values to null so `remove_nil` drops them
pub fn value_ignore_empty(value: Option<&Value>) -> Value {
    match value {
        Some(v) if !is_zero(v) => v.clone(),
        _ => Value::Null,
    }
}

/// `{"k": "v"}` to `[{"key": "k", "value": "v"}]`
pub fn expand_tags(tags: Option<&Value>) -> Value {
    let Some(map) = tags.and_then(|t| t.as_object()) else {
        return Value::Null;
    };

    Value::Array(
        map.iter()
            .map(|(k, v)| serde_json::json!({"key": k, "value": v}))
            .collect(),
    )
}

/// `[{"key": "k", "value": "v"}]` to `{"k": "v"}`
pub fn flatten_tags(tags: &Value) -> Value {
    let Some(items) = tags.as_array() else {
        return Value::Null;
    };

    let map: Map<String, Value> = items
        .iter()
        .filter_map(|item| {
            let key = item.get("key")?.as_str()?;
            let value = item.get("value").cloned().unwrap_or(Value::Null);
            Some((key.to_string(), value))
        })
        .collect();
    Value::Object(map)
}
