//! Namespace policies
//!
//! Retention and image-signature policies share their URL layout, ID format
//! and lifecycle; only the request body and the flattened fields differ.

use super::{
    expand_scope_rules, expand_scope_selectors, expand_selectors, flatten_scope_rules,
    flatten_scope_selectors, flatten_selectors, id_string, namespace_url,
    parse_namespace_scoped_id,
};
use crate::cloud::client::CloudClient;
use crate::cloud::error::convert_expected_into_404;
use crate::resource::path::{path_search, path_search_array};
use crate::resource::query::{remove_nil, value_ignore_empty};
use crate::resource::{check_deleted, Action, ManagedResource, OpFuture, ResourceData};
use anyhow::{Context, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::{json, Map, Value};

/// Which namespace policy a resource manages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyKind {
    Retention,
    ImageSignature,
}

impl PolicyKind {
    /// Path segment below the namespace
    fn segment(self) -> &'static str {
        match self {
            PolicyKind::Retention => "retention",
            PolicyKind::ImageSignature => "signature",
        }
    }

    fn resource_name(self) -> &'static str {
        match self {
            PolicyKind::Retention => "swr_enterprise_retention_policy",
            PolicyKind::ImageSignature => "swr_enterprise_image_signature_policy",
        }
    }

    fn execute_name(self) -> &'static str {
        match self {
            PolicyKind::Retention => "swr_enterprise_retention_policy_execute",
            PolicyKind::ImageSignature => "swr_enterprise_image_signature_policy_execute",
        }
    }

    /// Noun used in error messages
    fn label(self) -> &'static str {
        match self {
            PolicyKind::Retention => "SWR retention policy",
            PolicyKind::ImageSignature => "SWR policy",
        }
    }

    fn missing_id_message(self) -> &'static str {
        match self {
            PolicyKind::Retention => {
                "unable to find SWR instance retention policy ID from the API response"
            },
            PolicyKind::ImageSignature => {
                "unable to find SWR instance policy ID from the API response"
            },
        }
    }

    fn build_body(self, data: &ResourceData) -> Value {
        let body = match self {
            PolicyKind::Retention => json!({
                "name": data.get("name"),
                "algorithm": data.get("algorithm"),
                "enabled": data.get("enabled"),
                "rules": expand_retention_rules(data.get("rules")),
                "trigger": expand_trigger(data.get("trigger")),
            }),
            PolicyKind::ImageSignature => json!({
                "name": data.get("name"),
                "trigger": expand_trigger(data.get("trigger")),
                "scope_rules": expand_scope_rules(data.get("scope_rules")),
                "signature_method": data.get("signature_method"),
                "signature_algorithm": data.get("signature_algorithm"),
                "signature_key": data.get("signature_key"),
                "enabled": data.get("enabled"),
                "description": data.get("description"),
            }),
        };
        remove_nil(body)
    }

    fn flatten(self, policy: &Value, data: &mut ResourceData) {
        let fields: &[&str] = match self {
            PolicyKind::Retention => &["name", "enabled", "namespace_id", "algorithm"],
            PolicyKind::ImageSignature => &[
                "name",
                "enabled",
                "description",
                "signature_method",
                "signature_algorithm",
                "signature_key",
                "namespace_id",
                "creator",
                "created_at",
                "updated_at",
            ],
        };
        for field in fields {
            data.set(field, path_search(field, policy, Value::Null));
        }
        data.set("trigger", flatten_trigger(policy));

        match self {
            PolicyKind::Retention => data.set("rules", flatten_retention_rules(policy)),
            PolicyKind::ImageSignature => data.set(
                "scope_rules",
                flatten_scope_rules(&path_search("scope_rules", policy, Value::Null)),
            ),
        }
    }
}

/// Rule parameters are held as JSON text; `""` means unset and text that
/// does not parse is sent as a plain string
fn string_to_json(raw: &str) -> Value {
    if raw.is_empty() {
        return Value::Null;
    }
    serde_json::from_str(raw).unwrap_or_else(|err| {
        tracing::debug!("unable to parse rule parameter as JSON: {}", err);
        Value::String(raw.to_string())
    })
}

fn json_to_string(value: &Value) -> Value {
    match value {
        Value::Null => Value::String(String::new()),
        other => Value::String(other.to_string()),
    }
}

fn map_params(params: Option<&Value>, convert: impl Fn(&Value) -> Value) -> Value {
    let map: Map<String, Value> = params
        .and_then(|p| p.as_object())
        .map(|p| p.iter().map(|(k, v)| (k.clone(), convert(v))).collect())
        .unwrap_or_default();
    Value::Object(map)
}

/// `trigger` and `trigger_settings` are single-element lists in the attributes
fn expand_trigger(trigger: Option<&Value>) -> Value {
    let Some(trigger) = trigger.and_then(|t| t.get(0)) else {
        return Value::Null;
    };
    let settings = trigger
        .get("trigger_settings")
        .and_then(|s| s.get(0))
        .map(|s| json!({"cron": value_ignore_empty(s.get("cron"))}))
        .unwrap_or(Value::Null);
    json!({
        "type": path_search("type", trigger, Value::Null),
        "trigger_settings": settings,
    })
}

fn flatten_trigger(policy: &Value) -> Value {
    let trigger = path_search("trigger", policy, Value::Null);
    if !trigger.is_object() {
        return Value::Null;
    }
    let settings = match path_search("trigger_settings", &trigger, Value::Null) {
        settings @ Value::Object(_) => {
            json!([{"cron": path_search("cron", &settings, Value::Null)}])
        },
        _ => Value::Null,
    };
    json!([{
        "type": path_search("type", &trigger, Value::Null),
        "trigger_settings": settings,
    }])
}

fn expand_retention_rules(rules: Option<&Value>) -> Value {
    let Some(rules) = rules.and_then(|v| v.as_array()) else {
        return Value::Null;
    };
    Value::Array(
        rules
            .iter()
            .map(|rule| {
                json!({
                    "priority": path_search("priority", rule, Value::Null),
                    "action": path_search("action", rule, Value::Null),
                    "template": path_search("template", rule, Value::Null),
                    "params": map_params(rule.get("params"), |v| {
                        v.as_str().map(string_to_json).unwrap_or_else(|| v.clone())
                    }),
                    "repo_scope_mode": path_search("repo_scope_mode", rule, Value::Null),
                    "disabled": path_search("disabled", rule, Value::Null),
                    "scope_selectors": expand_scope_selectors(rule.get("scope_selectors")),
                    "tag_selectors": expand_selectors(rule.get("tag_selectors")),
                })
            })
            .collect(),
    )
}

fn flatten_retention_rules(policy: &Value) -> Value {
    let rules = path_search_array("rules", policy);
    if rules.is_empty() {
        return Value::Null;
    }
    Value::Array(
        rules
            .iter()
            .map(|rule| {
                json!({
                    "id": path_search("id", rule, Value::Null),
                    "priority": path_search("priority", rule, Value::Null),
                    "action": path_search("action", rule, Value::Null),
                    "template": path_search("template", rule, Value::Null),
                    "params": map_params(rule.get("params"), json_to_string),
                    "repo_scope_mode": path_search("repo_scope_mode", rule, Value::Null),
                    "disabled": path_search("disabled", rule, Value::Null),
                    "tag_selectors": flatten_selectors(
                        &path_search("tag_selectors", rule, Value::Null)
                    ),
                    "scope_selectors": flatten_scope_selectors(
                        &path_search("scope_selectors", rule, Value::Null)
                    ),
                })
            })
            .collect(),
    )
}

/// `swr_enterprise_retention_policy` or `swr_enterprise_image_signature_policy`.
/// ID format: `<instance_id>/<namespace_name>/<policy_id>`.
pub struct NamespacePolicy {
    kind: PolicyKind,
}

impl NamespacePolicy {
    pub fn new(kind: PolicyKind) -> Self {
        Self { kind }
    }

    fn policy_url(&self, client: &CloudClient, id: &str) -> Result<String> {
        let (instance_id, namespace_name, policy_id) =
            parse_namespace_scoped_id(id, "policy_id")?;
        Ok(namespace_url(
            client,
            &instance_id,
            &namespace_name,
            &[self.kind.segment(), "policies", &policy_id],
        ))
    }
}

impl ManagedResource for NamespacePolicy {
    fn name(&self) -> &'static str {
        self.kind.resource_name()
    }

    fn create<'a>(
        &'a self,
        client: &'a CloudClient,
        data: &'a mut ResourceData,
    ) -> OpFuture<'a> {
        async move {
            let instance_id = data.require_str("instance_id")?.to_string();
            let namespace_name = data.require_str("namespace_name")?.to_string();
            let body = self.kind.build_body(data);

            let url = namespace_url(
                client,
                &instance_id,
                &namespace_name,
                &[self.kind.segment(), "policies"],
            );
            let response = client
                .post(&url, Some(&body))
                .await
                .with_context(|| format!("error creating {}", self.kind.label()))?;
            let policy_id = id_string(&path_search("id", &response, Value::Null))
                .context(self.kind.missing_id_message())?;

            data.set_id(format!("{}/{}/{}", instance_id, namespace_name, policy_id));
            self.read(client, data).await
        }
        .boxed()
    }

    fn read<'a>(&'a self, client: &'a CloudClient, data: &'a mut ResourceData) -> OpFuture<'a> {
        async move {
            let id = data.id().context("policy has no ID")?.to_string();
            let (instance_id, namespace_name, policy_id) =
                parse_namespace_scoped_id(&id, "policy_id")?;

            let policy = match client.get(&self.policy_url(client, &id)?).await {
                Ok(policy) => policy,
                Err(err) => {
                    let context = format!("error retrieving {}", self.kind.label());
                    return check_deleted(data, err, &context);
                },
            };

            data.set("instance_id", Value::String(instance_id));
            data.set("namespace_name", Value::String(namespace_name));
            data.set("policy_id", Value::String(policy_id));
            self.kind.flatten(&policy, data);
            Ok(Vec::new())
        }
        .boxed()
    }

    fn update<'a>(
        &'a self,
        client: &'a CloudClient,
        data: &'a mut ResourceData,
    ) -> OpFuture<'a> {
        async move {
            let id = data.id().context("policy has no ID")?.to_string();
            let body = self.kind.build_body(data);

            client
                .put(&self.policy_url(client, &id)?, Some(&body))
                .await
                .with_context(|| format!("error updating {} ({})", self.kind.label(), id))?;
            self.read(client, data).await
        }
        .boxed()
    }

    fn delete<'a>(
        &'a self,
        client: &'a CloudClient,
        data: &'a mut ResourceData,
    ) -> OpFuture<'a> {
        async move {
            let id = data.id().context("policy has no ID")?.to_string();

            if let Err(err) = client.delete(&self.policy_url(client, &id)?, None).await {
                // A retention policy that is already gone answers 400 SWR.400003
                let err = convert_expected_into_404(err, 400, "error_code", &["SWR.400003"]);
                let context = format!("error deleting {}", self.kind.label());
                return check_deleted(data, err, &context);
            }
            data.clear_id();
            Ok(Vec::new())
        }
        .boxed()
    }
}

// =============================================================================
// Executions
// =============================================================================

/// `swr_enterprise_retention_policy_execute` and
/// `swr_enterprise_image_signature_policy_execute`: start one run of a policy
pub struct PolicyExecute {
    kind: PolicyKind,
}

impl PolicyExecute {
    pub fn new(kind: PolicyKind) -> Self {
        Self { kind }
    }
}

impl Action for PolicyExecute {
    fn name(&self) -> &'static str {
        self.kind.execute_name()
    }

    fn execute<'a>(
        &'a self,
        client: &'a CloudClient,
        data: &'a mut ResourceData,
    ) -> BoxFuture<'a, Result<Option<String>>> {
        async move {
            let instance_id = data.require_str("instance_id")?;
            let namespace_name = data.require_str("namespace_name")?;
            let policy_id = data.require_str("policy_id")?;
            let url = namespace_url(
                client,
                instance_id,
                namespace_name,
                &[self.kind.segment(), "policies", policy_id, "executions"],
            );

            let response = client.post(&url, None).await.with_context(|| {
                format!("error executing SWR {} policy ({})", self.kind.segment(), policy_id)
            })?;

            if let Some(execution_id) = id_string(&path_search("id", &response, Value::Null)) {
                data.set("execution_id", Value::String(execution_id));
            }
            Ok(None)
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retention_body() {
        let data = ResourceData::from_value(json!({
            "name": "keep-latest",
            "algorithm": "or",
            "enabled": true,
            "rules": [{
                "priority": 0,
                "action": "retain",
                "template": "latestPushedK",
                "params": {"latestPushedK": "5", "note": "not json", "unset": ""},
                "repo_scope_mode": "regular",
                "disabled": false,
                "scope_selectors": [{
                    "key": "repository",
                    "value": [{"kind": "doublestar", "decoration": "repoMatches", "pattern": "**"}]
                }],
                "tag_selectors": [{"kind": "doublestar", "decoration": "matches", "pattern": "**"}]
            }],
            "trigger": [{"type": "scheduled", "trigger_settings": [{"cron": "0 0 * * *"}]}]
        }));

        assert_eq!(
            PolicyKind::Retention.build_body(&data),
            json!({
                "name": "keep-latest",
                "algorithm": "or",
                "enabled": true,
                "rules": [{
                    "priority": 0,
                    "action": "retain",
                    "template": "latestPushedK",
                    "params": {"latestPushedK": 5, "note": "not json"},
                    "repo_scope_mode": "regular",
                    "disabled": false,
                    "scope_selectors": {
                        "repository": [
                            {"kind": "doublestar", "decoration": "repoMatches", "pattern": "**"}
                        ]
                    },
                    "tag_selectors": [
                        {"kind": "doublestar", "decoration": "matches", "pattern": "**"}
                    ]
                }],
                "trigger": {"type": "scheduled", "trigger_settings": {"cron": "0 0 * * *"}}
            })
        );
    }

    #[test]
    fn test_retention_flatten() {
        let remote = json!({
            "id": 5,
            "name": "keep-latest",
            "enabled": true,
            "algorithm": "or",
            "namespace_id": 3,
            "rules": [{
                "id": 9,
                "priority": 0,
                "action": "retain",
                "template": "latestPushedK",
                "params": {"latestPushedK": 5},
                "repo_scope_mode": "regular",
                "disabled": false,
                "scope_selectors": {"repository": [{"kind": "doublestar", "pattern": "**"}]},
                "tag_selectors": [{"kind": "doublestar", "pattern": "**"}]
            }],
            "trigger": {"type": "manual", "trigger_settings": {"cron": ""}}
        });

        let mut data = ResourceData::new();
        PolicyKind::Retention.flatten(&remote, &mut data);

        assert_eq!(data.get("namespace_id"), Some(&json!(3)));
        assert_eq!(
            data.get("trigger"),
            Some(&json!([{"type": "manual", "trigger_settings": [{"cron": ""}]}]))
        );
        let rule = &data.get("rules").unwrap()[0];
        assert_eq!(rule["id"], json!(9));
        assert_eq!(rule["params"], json!({"latestPushedK": "5"}));
        assert_eq!(rule["scope_selectors"][0]["key"], json!("repository"));
        assert_eq!(rule["tag_selectors"][0]["pattern"], json!("**"));
    }

    #[test]
    fn test_signature_body() {
        let data = ResourceData::from_value(json!({
            "name": "sign-all",
            "signature_method": "KMS",
            "signature_algorithm": "SM2DSA_SM3",
            "signature_key": "key-1",
            "enabled": false,
            "trigger": [{"type": "event_based"}],
            "scope_rules": [{
                "repo_scope_mode": "regular",
                "scope_selectors": [{
                    "key": "repository",
                    "value": [{"kind": "doublestar", "pattern": "**"}]
                }]
            }]
        }));

        assert_eq!(
            PolicyKind::ImageSignature.build_body(&data),
            json!({
                "name": "sign-all",
                "signature_method": "KMS",
                "signature_algorithm": "SM2DSA_SM3",
                "signature_key": "key-1",
                "enabled": false,
                "trigger": {"type": "event_based"},
                "scope_rules": [{
                    "repo_scope_mode": "regular",
                    "scope_selectors": {"repository": [{"kind": "doublestar", "pattern": "**"}]}
                }]
            })
        );
    }

    #[test]
    fn test_string_to_json() {
        assert_eq!(string_to_json(""), Value::Null);
        assert_eq!(string_to_json("[1,2]"), json!([1, 2]));
        assert_eq!(string_to_json("latest"), json!("latest"));
        assert_eq!(json_to_string(&json!({"a": 1})), json!(r#"{"a":1}"#));
        assert_eq!(json_to_string(&Value::Null), json!(""));
    }

    #[test]
    fn test_names() {
        assert_eq!(
            NamespacePolicy::new(PolicyKind::ImageSignature).name(),
            "swr_enterprise_image_signature_policy"
        );
        assert_eq!(
            PolicyExecute::new(PolicyKind::Retention).name(),
            "swr_enterprise_retention_policy_execute"
        );
    }
}
