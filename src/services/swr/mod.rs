//! SWR Enterprise resources
//!
//! - [`instance`] - enterprise registry instances
//! - [`trigger`] - namespace webhook triggers
//! - [`policy`] - retention and image-signature policies and their executions
//!
//! Namespace-scoped objects use the ID format
//! `<instance_id>/<namespace_name>/<id>`.

mod instance;
mod policy;
mod trigger;

pub use instance::EnterpriseInstance;
pub use policy::{NamespacePolicy, PolicyExecute, PolicyKind};
pub use trigger::{parse_trigger_id, Trigger};

use crate::cloud::client::CloudClient;
use crate::resource::path::path_search;
use crate::resource::query::value_ignore_empty;
use anyhow::Result;
use serde_json::{json, Map, Value};

const SERVICE: &str = "swr";

/// Render an id the API may report as a number or a string
fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Split `<instance_id>/<namespace_name>/<id>`; `label` names the last part in errors
pub fn parse_namespace_scoped_id(id: &str, label: &str) -> Result<(String, String, String)> {
    let parts: Vec<&str> = id.split('/').collect();
    match parts.as_slice() {
        [instance_id, namespace_name, last]
            if !instance_id.is_empty() && !namespace_name.is_empty() && !last.is_empty() =>
        {
            Ok((instance_id.to_string(), namespace_name.to_string(), last.to_string()))
        },
        _ => Err(anyhow::anyhow!(
            "invalid ID format, want '<instance_id>/<namespace_name>/<{}>', but got '{}'",
            label,
            id
        )),
    }
}

/// URL below a namespace, e.g. `tail = ["webhook", "policies", "7"]`
fn namespace_url(
    client: &CloudClient,
    instance_id: &str,
    namespace_name: &str,
    tail: &[&str],
) -> String {
    let base = client.url(
        SERVICE,
        "v2/{project_id}/instances/{instance_id}/namespaces/{namespace_name}",
        &[("instance_id", instance_id), ("namespace_name", namespace_name)],
    );
    tail.iter()
        .fold(base, |url, part| format!("{}/{}", url, urlencoding::encode(part)))
}

// =============================================================================
// Scope rules
// =============================================================================
//
// Attributes hold scope selectors as a list of `{key, value: [selector]}`;
// the API takes and returns a map `{<key>: [selector]}`.

fn expand_selectors(selectors: Option<&Value>) -> Value {
    let Some(items) = selectors.and_then(|v| v.as_array()) else {
        return Value::Null;
    };
    Value::Array(
        items
            .iter()
            .filter(|s| s.is_object())
            .map(|s| {
                json!({
                    "kind": path_search("kind", s, Value::Null),
                    "decoration": path_search("decoration", s, Value::Null),
                    "pattern": path_search("pattern", s, Value::Null),
                    "extras": value_ignore_empty(s.get("extras")),
                })
            })
            .collect(),
    )
}

/// `[{key, value}]` to `{key: value}`
pub fn expand_scope_selectors(selectors: Option<&Value>) -> Value {
    let Some(items) = selectors.and_then(|v| v.as_array()) else {
        return Value::Null;
    };
    let map: Map<String, Value> = items
        .iter()
        .filter_map(|item| {
            let key = item.get("key")?.as_str()?;
            Some((key.to_string(), expand_selectors(item.get("value"))))
        })
        .collect();
    Value::Object(map)
}

/// Request form of a `scope_rules` attribute
pub fn expand_scope_rules(rules: Option<&Value>) -> Value {
    let Some(rules) = rules.and_then(|v| v.as_array()) else {
        return Value::Null;
    };
    Value::Array(
        rules
            .iter()
            .map(|rule| {
                json!({
                    "scope_selectors": expand_scope_selectors(rule.get("scope_selectors")),
                    "repo_scope_mode": path_search("repo_scope_mode", rule, Value::Null),
                    "tag_selectors": expand_selectors(rule.get("tag_selectors")),
                })
            })
            .collect(),
    )
}

fn flatten_selectors(selectors: &Value) -> Value {
    match selectors.as_array() {
        Some(items) if !items.is_empty() => Value::Array(
            items
                .iter()
                .map(|s| {
                    json!({
                        "kind": path_search("kind", s, Value::Null),
                        "decoration": path_search("decoration", s, Value::Null),
                        "pattern": path_search("pattern", s, Value::Null),
                        "extras": path_search("extras", s, Value::Null),
                    })
                })
                .collect(),
        ),
        _ => Value::Null,
    }
}

/// `{key: value}` to `[{key, value}]`, ordered by key
pub fn flatten_scope_selectors(selectors: &Value) -> Value {
    match selectors.as_object() {
        Some(map) if !map.is_empty() => Value::Array(
            map.iter()
                .map(|(key, value)| json!({"key": key, "value": flatten_selectors(value)}))
                .collect(),
        ),
        _ => Value::Null,
    }
}

/// Attribute form of the `scope_rules` the API returned
pub fn flatten_scope_rules(rules: &Value) -> Value {
    match rules.as_array() {
        Some(items) if !items.is_empty() => Value::Array(
            items
                .iter()
                .map(|rule| {
                    json!({
                        "scope_selectors": flatten_scope_selectors(
                            &path_search("scope_selectors", rule, Value::Null)
                        ),
                        "repo_scope_mode": path_search("repo_scope_mode", rule, Value::Null),
                        "tag_selectors": flatten_selectors(
                            &path_search("tag_selectors", rule, Value::Null)
                        ),
                    })
                })
                .collect(),
        ),
        _ => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::query::remove_nil;

    #[test]
    fn test_parse_namespace_scoped_id() {
        assert_eq!(
            parse_namespace_scoped_id("i-1/team/42", "policy_id").unwrap(),
            ("i-1".to_string(), "team".to_string(), "42".to_string())
        );

        for bad in ["i-1/team", "i-1/team/42/x", "i-1//42", ""] {
            assert_eq!(
                parse_namespace_scoped_id(bad, "policy_id").unwrap_err().to_string(),
                format!(
                    "invalid ID format, want '<instance_id>/<namespace_name>/<policy_id>', \
                     but got '{}'",
                    bad
                )
            );
        }
    }

    #[test]
    fn test_id_string() {
        assert_eq!(id_string(&json!(42)), Some("42".to_string()));
        assert_eq!(id_string(&json!("abc")), Some("abc".to_string()));
        assert_eq!(id_string(&json!("")), None);
        assert_eq!(id_string(&Value::Null), None);
    }

    #[test]
    fn test_scope_rules_expand_to_selector_map() {
        let rules = json!([{
            "repo_scope_mode": "regular",
            "scope_selectors": [{
                "key": "repository",
                "value": [{
                    "kind": "doublestar",
                    "decoration": "repoMatches",
                    "pattern": "app/**",
                    "extras": ""
                }]
            }],
            "tag_selectors": [{"kind": "doublestar", "decoration": "matches", "pattern": "v*"}]
        }]);

        assert_eq!(
            remove_nil(expand_scope_rules(Some(&rules))),
            json!([{
                "repo_scope_mode": "regular",
                "scope_selectors": {
                    "repository": [
                        {"kind": "doublestar", "decoration": "repoMatches", "pattern": "app/**"}
                    ]
                },
                "tag_selectors": [{"kind": "doublestar", "decoration": "matches", "pattern": "v*"}]
            }])
        );
        assert_eq!(expand_scope_rules(None), Value::Null);
    }

    #[test]
    fn test_scope_rules_flatten_from_selector_map() {
        let remote = json!([{
            "repo_scope_mode": "regular",
            "scope_selectors": {
                "repository": [
                    {"kind": "doublestar", "decoration": "repoMatches", "pattern": "app/**"}
                ],
                "label": [{"kind": "label", "decoration": "withLabels", "pattern": "prod"}]
            },
            "tag_selectors": []
        }]);

        assert_eq!(
            flatten_scope_rules(&remote),
            json!([{
                "repo_scope_mode": "regular",
                "scope_selectors": [
                    {"key": "label", "value": [{
                        "kind": "label",
                        "decoration": "withLabels",
                        "pattern": "prod",
                        "extras": null
                    }]},
                    {"key": "repository", "value": [{
                        "kind": "doublestar",
                        "decoration": "repoMatches",
                        "pattern": "app/**",
                        "extras": null
                    }]}
                ],
                "tag_selectors": null
            }])
        );
        assert_eq!(flatten_scope_rules(&json!([])), Value::Null);
    }

    #[test]
    fn test_namespace_url_encodes_tail() {
        use crate::cloud::auth::Credentials;
        use crate::cloud::http::HttpClient;

        let http = HttpClient::new().unwrap();
        let creds = Credentials::from_token("t", http.clone());
        let client = CloudClient::new("cn-north-4", "p1", "myhuaweicloud.com", creds, http);
        assert_eq!(
            namespace_url(&client, "i-1", "team", &["retention", "policies", "5"]),
            "https://swr.cn-north-4.myhuaweicloud.com/v2/p1/instances/i-1/namespaces/team/retention/policies/5"
        );
    }
}
