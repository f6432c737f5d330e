use super::{
    expand_scope_rules, flatten_scope_rules, id_string, namespace_url, parse_namespace_scoped_id,
};
use crate::cloud::client::CloudClient;
use crate::resource::path::{path_search, path_search_array};
use crate::resource::query::{remove_nil, value_ignore_empty};
use crate::resource::{check_deleted, ManagedResource, OpFuture, ResourceData};
use anyhow::{Context, Result};
use futures::FutureExt;
use serde_json::{json, Value};

/// `swr_enterprise_trigger`: a webhook policy of a namespace.
/// ID format: `<instance_id>/<namespace_name>/<trigger_id>`.
pub struct Trigger;

/// Split a trigger ID into instance ID, namespace name and trigger ID
pub fn parse_trigger_id(id: &str) -> Result<(String, String, String)> {
    parse_namespace_scoped_id(id, "trigger_id")
}

fn policy_url(client: &CloudClient, instance_id: &str, namespace_name: &str, id: &str) -> String {
    namespace_url(client, instance_id, namespace_name, &["webhook", "policies", id])
}

fn build_trigger_body(data: &ResourceData) -> Result<Value> {
    let targets: Vec<Value> = data
        .get("targets")
        .and_then(|v| v.as_array())
        .map(|targets| {
            targets
                .iter()
                .map(|t| {
                    json!({
                        "type": path_search("type", t, Value::Null),
                        "address_type": path_search("address_type", t, Value::Null),
                        "address": path_search("address", t, Value::Null),
                        "auth_header": value_ignore_empty(t.get("auth_header")),
                        "skip_cert_verify": value_ignore_empty(t.get("skip_cert_verify")),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(remove_nil(json!({
        "name": data.require_str("name")?,
        "description": value_ignore_empty(data.get("description")),
        "enabled": data.get("enabled").cloned().unwrap_or(Value::Bool(true)),
        "event_types": data.get("event_types").cloned().unwrap_or(Value::Null),
        "targets": targets,
        "scope_rules": expand_scope_rules(data.get("scope_rules")),
    })))
}

impl ManagedResource for Trigger {
    fn name(&self) -> &'static str {
        "swr_enterprise_trigger"
    }

    fn create<'a>(
        &'a self,
        client: &'a CloudClient,
        data: &'a mut ResourceData,
    ) -> OpFuture<'a> {
        async move {
            let instance_id = data.require_str("instance_id")?.to_string();
            let namespace_name = data.require_str("namespace_name")?.to_string();
            let body = build_trigger_body(data)?;

            let url =
                namespace_url(client, &instance_id, &namespace_name, &["webhook", "policies"]);
            let response = client
                .post(&url, Some(&body))
                .await
                .context("error creating SWR trigger")?;
            let trigger_id = id_string(&path_search("id", &response, Value::Null))
                .context("unable to find the trigger ID from the API response")?;

            data.set_id(format!("{}/{}/{}", instance_id, namespace_name, trigger_id));
            self.read(client, data).await
        }
        .boxed()
    }

    fn read<'a>(&'a self, client: &'a CloudClient, data: &'a mut ResourceData) -> OpFuture<'a> {
        async move {
            let id = data.id().context("trigger has no ID")?.to_string();
            let (instance_id, namespace_name, trigger_id) = parse_trigger_id(&id)?;

            let url = policy_url(client, &instance_id, &namespace_name, &trigger_id);
            let policy = match client.get(&url).await {
                Ok(policy) => policy,
                Err(err) => return check_deleted(data, err, "error retrieving SWR trigger"),
            };

            data.set("instance_id", Value::String(instance_id));
            data.set("namespace_name", Value::String(namespace_name));
            data.set("trigger_id", Value::String(trigger_id));
            for field in [
                "name",
                "description",
                "enabled",
                "event_types",
                "namespace_id",
                "creator",
                "created_at",
                "updated_at",
            ] {
                data.set(field, path_search(field, &policy, Value::Null));
            }
            data.set(
                "scope_rules",
                flatten_scope_rules(&path_search("scope_rules", &policy, Value::Null)),
            );
            let targets: Vec<Value> = path_search_array("targets", &policy)
                .iter()
                .map(|t| {
                    json!({
                        "type": path_search("type", t, Value::Null),
                        "address_type": path_search("address_type", t, Value::Null),
                        "address": path_search("address", t, Value::Null),
                        "auth_header": path_search("auth_header", t, Value::Null),
                        "skip_cert_verify": path_search("skip_cert_verify", t, Value::Null),
                    })
                })
                .collect();
            data.set("targets", Value::Array(targets));
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
            let id = data.id().context("trigger has no ID")?.to_string();
            let (instance_id, namespace_name, trigger_id) = parse_trigger_id(&id)?;
            let body = build_trigger_body(data)?;

            client
                .put(&policy_url(client, &instance_id, &namespace_name, &trigger_id), Some(&body))
                .await
                .with_context(|| format!("error updating SWR trigger ({})", id))?;
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
            let id = data.id().context("trigger has no ID")?.to_string();
            let (instance_id, namespace_name, trigger_id) = parse_trigger_id(&id)?;

            let url = policy_url(client, &instance_id, &namespace_name, &trigger_id);
            if let Err(err) = client.delete(&url, None).await {
                return check_deleted(data, err, "error deleting SWR trigger");
            }
            data.clear_id();
            Ok(Vec::new())
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_trigger_id() {
        assert_eq!(
            parse_trigger_id("i-1/team/42").unwrap(),
            ("i-1".to_string(), "team".to_string(), "42".to_string())
        );
        assert_eq!(
            parse_trigger_id("i-1/team").unwrap_err().to_string(),
            "invalid ID format, want '<instance_id>/<namespace_name>/<trigger_id>', \
             but got 'i-1/team'"
        );
    }

    #[test]
    fn test_trigger_body_defaults() {
        let data = ResourceData::from_value(json!({
            "name": "notify",
            "event_types": ["PUSH_ARTIFACT"],
            "targets": [{
                "type": "http",
                "address": "https://hooks.example/swr",
                "auth_header": ""
            }],
        }));

        assert_eq!(
            build_trigger_body(&data).unwrap(),
            json!({
                "name": "notify",
                "enabled": true,
                "event_types": ["PUSH_ARTIFACT"],
                "targets": [{"type": "http", "address": "https://hooks.example/swr"}],
            })
        );
    }

    #[test]
    fn test_trigger_body_sends_selector_map() {
        let data = ResourceData::from_value(json!({
            "name": "notify",
            "scope_rules": [{
                "repo_scope_mode": "regular",
                "scope_selectors": [{
                    "key": "repository",
                    "value": [{"kind": "doublestar", "decoration": "repoMatches", "pattern": "**"}]
                }]
            }]
        }));

        let body = build_trigger_body(&data).unwrap();
        assert_eq!(
            body["scope_rules"],
            json!([{
                "repo_scope_mode": "regular",
                "scope_selectors": {
                    "repository": [
                        {"kind": "doublestar", "decoration": "repoMatches", "pattern": "**"}
                    ]
                }
            }])
        );
    }
}
