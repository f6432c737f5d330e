use super::SERVICE;
use crate::cloud::client::CloudClient;
use crate::resource::path::{path_search, path_search_array, path_search_str};
use crate::resource::query::{remove_nil, value_ignore_empty};
use crate::resource::{check_deleted, ManagedResource, OpFuture, ResourceData};
use anyhow::{Context, Result};
use futures::FutureExt;
use serde_json::{json, Map, Value};

/// Fields of `policy_operation_definition` passed through as they are
const OPERATION_FIELDS: [&str; 10] = [
    "day_backups",
    "destination_project_id",
    "destination_region",
    "max_backups",
    "month_backups",
    "retention_duration_days",
    "week_backups",
    "year_backups",
    "timezone",
    "full_backup_interval",
];

/// `cbr_organization_policy`: a backup or replication policy applied across
/// the accounts of an organization
pub struct OrganizationPolicy;

fn policies_url(client: &CloudClient) -> String {
    client.url(SERVICE, "v3/{project_id}/organization-policies", &[])
}

fn policy_url(client: &CloudClient, id: &str) -> String {
    client.url(
        SERVICE,
        "v3/{project_id}/organization-policies/{policy_id}",
        &[("policy_id", id)],
    )
}

/// `"true"` and `"false"` become booleans; anything else is left unset
fn parse_acceleration(raw: Option<&Value>) -> Value {
    match raw.and_then(|v| v.as_str()) {
        Some("true") => Value::Bool(true),
        Some("false") => Value::Bool(false),
        _ => Value::Null,
    }
}

fn build_operation_definition(definition: Option<&Value>) -> Value {
    let Some(definition) = definition.and_then(|d| d.get(0)) else {
        return Value::Null;
    };
    let mut body: Map<String, Value> = OPERATION_FIELDS
        .iter()
        .map(|field| (field.to_string(), value_ignore_empty(definition.get(*field))))
        .collect();
    body.insert(
        "enable_acceleration".to_string(),
        parse_acceleration(definition.get("enable_acceleration")),
    );
    Value::Object(body)
}

fn build_trigger(trigger: Option<&Value>) -> Value {
    let Some(trigger) = trigger.and_then(|t| t.get(0)) else {
        return Value::Null;
    };
    let pattern = trigger
        .get("properties")
        .and_then(|p| p.get(0))
        .map(|p| path_search_array("pattern", p))
        .unwrap_or_default();
    json!({"properties": {"pattern": pattern}})
}

/// Request body; `operation_type` can only be set at creation
fn build_policy_body(data: &ResourceData, creating: bool) -> Value {
    let operation_type = if creating {
        data.get("operation_type").cloned().unwrap_or(Value::Null)
    } else {
        Value::Null
    };
    remove_nil(json!({
        "name": data.get("name"),
        "operation_type": operation_type,
        "policy_name": data.get("policy_name"),
        "policy_enabled": data.get("policy_enabled"),
        "policy_operation_definition": build_operation_definition(
            data.get("policy_operation_definition")
        ),
        "policy_trigger": build_trigger(data.get("policy_trigger")),
        "description": value_ignore_empty(data.get("description")),
        "effective_scope": value_ignore_empty(data.get("effective_scope")),
    }))
}

fn flatten_operation_definition(definition: &Value) -> Value {
    if !definition.is_object() {
        return Value::Null;
    }
    let mut flattened: Map<String, Value> = OPERATION_FIELDS
        .iter()
        .map(|field| (field.to_string(), path_search(field, definition, Value::Null)))
        .collect();
    let acceleration = match definition.get("enable_acceleration") {
        Some(Value::Bool(b)) => Value::String(b.to_string()),
        other => other.cloned().unwrap_or(Value::Null),
    };
    flattened.insert("enable_acceleration".to_string(), acceleration);
    Value::Array(vec![Value::Object(flattened)])
}

fn flatten_trigger(trigger: &Value) -> Value {
    if !trigger.is_object() {
        return Value::Null;
    }
    let properties = path_search("properties", trigger, Value::Null);
    let properties = if properties.is_object() {
        json!([{"pattern": path_search_array("pattern", &properties)}])
    } else {
        Value::Null
    };
    json!([{"properties": properties}])
}

impl ManagedResource for OrganizationPolicy {
    fn name(&self) -> &'static str {
        "cbr_organization_policy"
    }

    fn create<'a>(
        &'a self,
        client: &'a CloudClient,
        data: &'a mut ResourceData,
    ) -> OpFuture<'a> {
        async move {
            let body = json!({"policy": build_policy_body(data, true)});
            let response = client
                .post(&policies_url(client), Some(&body))
                .await
                .context("error creating organization policy")?;

            let id = path_search_str("policy.id", &response, "");
            if id.is_empty() {
                anyhow::bail!("failed to find the organization policy ID from the API response");
            }
            data.set_id(id);
            self.read(client, data).await
        }
        .boxed()
    }

    fn read<'a>(&'a self, client: &'a CloudClient, data: &'a mut ResourceData) -> OpFuture<'a> {
        async move {
            let id = data.id().context("organization policy has no ID")?.to_string();
            let response = match client.get(&policy_url(client, &id)).await {
                Ok(response) => response,
                Err(err) => {
                    return check_deleted(data, err, "error retrieving organization policy")
                },
            };

            let policy = path_search("policy", &response, Value::Null);
            if policy.is_null() {
                tracing::warn!("organization policy ({}) is gone, removing from state", id);
                data.clear_id();
                return Ok(Vec::new());
            }

            for field in [
                "name",
                "description",
                "operation_type",
                "policy_name",
                "policy_enabled",
                "status",
                "domain_id",
                "domain_name",
                "effective_scope",
            ] {
                data.set(field, path_search(field, &policy, Value::Null));
            }
            data.set(
                "policy_operation_definition",
                flatten_operation_definition(&path_search(
                    "policy_operation_definition",
                    &policy,
                    Value::Null,
                )),
            );
            data.set(
                "policy_trigger",
                flatten_trigger(&path_search("policy_trigger", &policy, Value::Null)),
            );
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
            let id = data.id().context("organization policy has no ID")?.to_string();
            let body = json!({"policy": build_policy_body(data, false)});
            client
                .put(&policy_url(client, &id), Some(&body))
                .await
                .with_context(|| format!("error updating organization policy ({})", id))?;
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
            let id = data.id().context("organization policy has no ID")?.to_string();
            if let Err(err) = client.delete(&policy_url(client, &id), None).await {
                return check_deleted(data, err, "error deleting organization policy");
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

    fn policy_data() -> ResourceData {
        ResourceData::from_value(json!({
            "name": "org-backup",
            "operation_type": "backup",
            "policy_name": "daily",
            "policy_enabled": true,
            "policy_operation_definition": [{
                "max_backups": 10,
                "timezone": "UTC+08:00",
                "destination_region": "",
                "enable_acceleration": "false"
            }],
            "policy_trigger": [{"properties": [{"pattern": ["FREQ=DAILY;BYHOUR=2;BYMINUTE=0"]}]}],
            "description": ""
        }))
    }

    #[test]
    fn test_create_body() {
        assert_eq!(
            build_policy_body(&policy_data(), true),
            json!({
                "name": "org-backup",
                "operation_type": "backup",
                "policy_name": "daily",
                "policy_enabled": true,
                "policy_operation_definition": {
                    "max_backups": 10,
                    "timezone": "UTC+08:00",
                    "enable_acceleration": false
                },
                "policy_trigger": {
                    "properties": {"pattern": ["FREQ=DAILY;BYHOUR=2;BYMINUTE=0"]}
                }
            })
        );
    }

    #[test]
    fn test_update_body_omits_operation_type() {
        let body = build_policy_body(&policy_data(), false);
        assert!(body.get("operation_type").is_none());
        assert_eq!(body["policy_name"], json!("daily"));
    }

    #[test]
    fn test_flatten_operation_definition() {
        let flattened = flatten_operation_definition(&json!({
            "max_backups": 10,
            "enable_acceleration": true
        }));
        assert_eq!(flattened[0]["enable_acceleration"], json!("true"));
        assert_eq!(flattened[0]["max_backups"], json!(10));
        assert_eq!(flattened[0]["week_backups"], Value::Null);
        assert_eq!(flatten_operation_definition(&Value::Null), Value::Null);

        assert_eq!(
            flatten_trigger(&json!({"properties": {"pattern": ["FREQ=WEEKLY"]}})),
            json!([{"properties": [{"pattern": ["FREQ=WEEKLY"]}]}])
        );
    }
}
