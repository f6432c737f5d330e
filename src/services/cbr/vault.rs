use super::{args, SERVICE};
use crate::cloud::client::CloudClient;
use crate::cloud::error::is_not_found;
use crate::cloud::wait::StateChangeConf;
use crate::resource::path::{path_search, path_search_array, path_search_f64, path_search_str};
use crate::resource::query::{expand_tags, flatten_tags, remove_nil, value_ignore_empty};
use crate::resource::{check_deleted, Diagnostic, ManagedResource, OpFuture, ResourceData};
use anyhow::{Context, Result};
use futures::FutureExt;
use serde_json::{json, Map, Value};
use std::time::Duration;

const TYPE_SERVER: &str = "OS::Nova::Server";
const TYPE_DISK: &str = "OS::Cinder::Volume";
const TYPE_TURBO: &str = "OS::Sfs::Turbo";
const TYPE_WORKSPACE: &str = "OS::Workspace::DesktopV2";

/// `cbr_vault`: a backup vault (pay-per-use only).
///
/// Resources, policies and tags are managed through their own endpoints;
/// update compares each group with the remote vault and sends only changes.
pub struct Vault {
    pub delay: Duration,
    pub poll_interval: Duration,
    pub timeout: Duration,
}

impl Default for Vault {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(5),
            poll_interval: Duration::from_secs(10),
            timeout: Duration::from_secs(10 * 60),
        }
    }
}

fn vault_url(client: &CloudClient, id: &str, tail: &str) -> String {
    client.url(
        SERVICE,
        &format!("v3/{{project_id}}/vaults/{{vault_id}}{}", tail),
        &[("vault_id", id)],
    )
}

fn tags_url(client: &CloudClient, id: &str) -> String {
    client.url(SERVICE, "v3/{project_id}/vault/{vault_id}/tags/action", &[("vault_id", id)])
}

/// Resource type backed up by a vault type; `None` for vaults without resources
fn resource_type(vault_type: &str) -> Result<Option<&'static str>> {
    match vault_type {
        "server" => Ok(Some(TYPE_SERVER)),
        "disk" => Ok(Some(TYPE_DISK)),
        "turbo" => Ok(Some(TYPE_TURBO)),
        "workspace" => Ok(Some(TYPE_WORKSPACE)),
        "vmware" | "file" => Ok(None),
        other => Err(anyhow::anyhow!("invalid vault type: {}", other)),
    }
}

fn string_list(value: Option<&Value>) -> Vec<Value> {
    value
        .and_then(|v| v.as_array())
        .map(|items| items.iter().filter(|v| v.is_string()).cloned().collect())
        .unwrap_or_default()
}

/// Request form of the `resources` attribute. Server-like vaults take one
/// entry per server with optional excluded volumes; disk and turbo vaults take
/// a single entry listing the included resources.
fn build_associate_resources(vault_type: &str, resources: &[Value]) -> Result<Vec<Value>> {
    let Some(rtype) = resource_type(vault_type)? else {
        return Ok(Vec::new());
    };

    if rtype == TYPE_SERVER || rtype == TYPE_WORKSPACE {
        let mut results = Vec::with_capacity(resources.len());
        for res in resources {
            let server_id = path_search_str("server_id", res, "");
            if server_id.is_empty() {
                continue;
            }
            if !string_list(res.get("includes")).is_empty() {
                anyhow::bail!("server type vaults do not support 'includes'");
            }
            let mut result = json!({"id": server_id, "type": rtype});
            let excludes = string_list(res.get("excludes"));
            if !excludes.is_empty() {
                result["extra_info"] = json!({"exclude_volumes": excludes});
            }
            results.push(result);
        }
        return Ok(results);
    }

    match resources {
        [] => Ok(Vec::new()),
        [res] => {
            if !string_list(res.get("excludes")).is_empty() {
                anyhow::bail!("disk and turbo type vaults do not support 'excludes'");
            }
            Ok(string_list(res.get("includes"))
                .into_iter()
                .map(|id| json!({"id": id, "type": rtype}))
                .collect())
        },
        _ => anyhow::bail!("disk and turbo type vaults accept at most one resources entry"),
    }
}

fn flatten_vault_resources(vault_type: &str, resources: &[Value]) -> Value {
    match vault_type {
        "server" | "workspace" => Value::Array(
            resources
                .iter()
                .map(|res| {
                    json!({
                        "server_id": path_search("id", res, Value::Null),
                        "includes": path_search_array("extra_info.include_volumes[*].id", res),
                        "excludes": path_search_array("extra_info.exclude_volumes", res),
                    })
                })
                .collect(),
        ),
        "disk" | "turbo" => json!([{
            "includes": resources
                .iter()
                .map(|res| path_search("id", res, Value::Null))
                .collect::<Vec<_>>(),
        }]),
        _ => Value::Null,
    }
}

/// Tag map of an attribute as the `{key, value}` list bind rules use;
/// an empty list resets the rules
fn bind_rule_tags(rules: Option<&Value>) -> Value {
    match expand_tags(rules) {
        Value::Null => json!([]),
        tags => tags,
    }
}

fn build_vault_body(client: &CloudClient, data: &ResourceData) -> Result<Value> {
    if data.get_str("charging_mode") == "prePaid" {
        anyhow::bail!("prepaid vaults are not supported");
    }
    let vault_type = data.require_str("type")?;
    let resources = path_search_array("resources", &args(data));
    let resources = build_associate_resources(vault_type, &resources)
        .context("error building the structure of associated resources")?;

    let enterprise_project_id = match data.get_ok("enterprise_project_id") {
        Some(v) => v.clone(),
        None => client.enterprise_project_id.clone().map(Value::String).unwrap_or(Value::Null),
    };
    let bind_rules = match data.get_ok("bind_rules") {
        Some(rules) => json!({"tags": bind_rule_tags(Some(rules))}),
        None => Value::Null,
    };

    let mut body = remove_nil(json!({
        "name": data.require_str("name")?,
        "enterprise_project_id": enterprise_project_id,
        "backup_policy_id": value_ignore_empty(data.get("policy_id")),
        "billing": {
            "cloud_type": value_ignore_empty(data.get("cloud_type")),
            "object_type": vault_type,
            "consistent_level": consistent_level(data),
            "protect_type": data.require_str("protection_type")?,
            "size": data.get("size").cloned().unwrap_or(Value::Null),
            "is_multi_az": data.get_bool("is_multi_az"),
        },
        "auto_expand": data.get_bool("auto_expand"),
        "auto_bind": data.get_bool("auto_bind"),
        "backup_name_prefix": value_ignore_empty(data.get("backup_name_prefix")),
        "locked": data.get_bool("locked"),
        "bind_rules": bind_rules,
    }));
    // Sent even when empty: a vault created without resources needs `[]`
    body["resources"] = Value::Array(resources);
    Ok(body)
}

fn consistent_level(data: &ResourceData) -> &str {
    match data.get_str("consistent_level") {
        "" => "crash_consistent",
        level => level,
    }
}

/// Megabytes to gigabytes, rounded to two decimal places
fn megabytes_to_gigabytes(megabytes: f64) -> f64 {
    (megabytes / 1024.0 * 100.0).round() / 100.0
}

fn parse_charging_mode(mode: &str) -> &'static str {
    match mode {
        "pre_paid" => "prePaid",
        "post_paid" => "postPaid",
        _ => "",
    }
}

/// `{id, destination_vault_id}` for one policy, from the policy listing
fn flatten_policy(policy: &Value, vault_id: &str) -> Value {
    let destination = path_search_array("associated_vaults", policy)
        .into_iter()
        .find(|v| v.get("vault_id").and_then(|id| id.as_str()) == Some(vault_id))
        .map(|v| path_search("destination_vault_id", &v, Value::Null))
        .filter(|v| v.as_str().is_some_and(|s| !s.is_empty()));

    let mut flattened = json!({"id": path_search("id", policy, Value::Null)});
    if let Some(destination) = destination {
        flattened["destination_vault_id"] = destination;
    }
    flattened
}

async fn list_vault_policies(client: &CloudClient, vault_id: &str) -> Result<Vec<Value>> {
    let url = format!(
        "{}?vault_id={}",
        client.url(SERVICE, "v3/{project_id}/policies", &[]),
        urlencoding::encode(vault_id)
    );
    let response = client
        .get(&url)
        .await
        .with_context(|| format!("error querying policies of the vault ({})", vault_id))?;
    Ok(path_search_array("policies", &response)
        .iter()
        .map(|p| flatten_policy(p, vault_id))
        .collect())
}

/// Policy bindings from the attributes, with empty destinations dropped
fn desired_policies(data: &ResourceData) -> Vec<Value> {
    path_search_array("policy", &args(data))
        .iter()
        .filter(|p| p.get("id").and_then(|v| v.as_str()).is_some_and(|s| !s.is_empty()))
        .map(|p| {
            remove_nil(json!({
                "id": p.get("id"),
                "destination_vault_id": value_ignore_empty(p.get("destination_vault_id")),
            }))
        })
        .collect()
}

async fn bind_policy(client: &CloudClient, vault_id: &str, policy: &Value) -> Result<()> {
    let body = remove_nil(json!({
        "policy_id": policy.get("id"),
        "destination_vault_id": value_ignore_empty(policy.get("destination_vault_id")),
    }));
    client
        .post(&vault_url(client, vault_id, "/associatepolicy"), Some(&body))
        .await
        .with_context(|| format!("error binding policy to vault ({})", vault_id))?;
    Ok(())
}

async fn unbind_policy(client: &CloudClient, vault_id: &str, policy: &Value) -> Result<()> {
    let body = json!({"policy_id": policy.get("id")});
    client
        .post(&vault_url(client, vault_id, "/dissociatepolicy"), Some(&body))
        .await
        .with_context(|| format!("error unbinding policy from vault ({})", vault_id))?;
    Ok(())
}

/// Unbind `old` policies missing from `new`, then bind the new ones
async fn update_policies(
    client: &CloudClient,
    vault_id: &str,
    old: &[Value],
    new: &[Value],
) -> Result<()> {
    for policy in old.iter().filter(|p| !new.contains(p)) {
        unbind_policy(client, vault_id, policy).await?;
    }
    for policy in new.iter().filter(|p| !old.contains(p)) {
        bind_policy(client, vault_id, policy).await?;
    }
    Ok(())
}

async fn tag_action(
    client: &CloudClient,
    vault_id: &str,
    action: &str,
    tags: &Value,
) -> Result<()> {
    let body = json!({"action": action, "tags": expand_tags(Some(tags))});
    client.post(&tags_url(client, vault_id), Some(&body)).await?;
    Ok(())
}

async fn update_tags(client: &CloudClient, vault_id: &str, old: &Value, new: &Value) -> Result<()> {
    let has_tags = |tags: &Value| tags.as_object().is_some_and(|m| !m.is_empty());
    if has_tags(old) {
        tag_action(client, vault_id, "delete", old)
            .await
            .context("error deleting CBR vault tags")?;
    }
    if has_tags(new) {
        tag_action(client, vault_id, "create", new)
            .await
            .context("error setting CBR vault tags")?;
    }
    Ok(())
}

async fn get_vault(client: &CloudClient, vault_id: &str) -> Result<Value> {
    let response = client.get(&vault_url(client, vault_id, "")).await?;
    Ok(path_search("vault", &response, Value::Null))
}

fn vault_resource_ids(vault: &Value) -> Vec<Value> {
    path_search_array("resources[*].id", vault)
}

/// Changed basic parameters, as the `vault` object of an update request
fn basic_changes(data: &ResourceData, remote: &Value) -> Map<String, Value> {
    let mut body = Map::new();
    let mut billing = Map::new();
    let changed = |attr: &str, expr: &str| {
        data.get(attr)
            .is_some_and(|v| !v.is_null() && *v != path_search(expr, remote, Value::Null))
    };

    if changed("name", "name") {
        body.insert("name".to_string(), json!(data.get_str("name")));
    }
    if changed("consistent_level", "billing.consistent_level") {
        billing.insert("consistent_level".to_string(), json!(consistent_level(data)));
    }
    if changed("size", "billing.size")
        || changed("auto_expand", "auto_expand")
        || changed("auto_bind", "auto_bind")
    {
        body.insert("auto_expand".to_string(), json!(data.get_bool("auto_expand")));
        body.insert("auto_bind".to_string(), json!(data.get_bool("auto_bind")));
        billing.insert(
            "size".to_string(),
            data.get("size").cloned().unwrap_or(Value::Null),
        );
    }
    if changed("locked", "locked") {
        body.insert("locked".to_string(), json!(data.get_bool("locked")));
    }
    if let Some(rules) = data.get("bind_rules") {
        let remote_rules = flatten_tags(&path_search("bind_rules.tags", remote, json!([])));
        if *rules != remote_rules {
            body.insert("bind_rules".to_string(), json!({"tags": bind_rule_tags(Some(rules))}));
        }
    }
    if !billing.is_empty() {
        body.insert("billing".to_string(), Value::Object(billing));
    }
    body
}

impl Vault {
    /// Poll the vault until `done` holds for its resource ids
    async fn wait_for_resources(
        &self,
        client: &CloudClient,
        vault_id: &str,
        done: impl Fn(&[Value]) -> bool,
    ) -> Result<()> {
        let done = &done;
        StateChangeConf::new(&["PENDING"], &["COMPLETED"], move || async move {
            let vault = get_vault(client, vault_id)
                .await
                .with_context(|| format!("error getting vault by ID ({})", vault_id))?;
            let state = if done(&vault_resource_ids(&vault)) { "COMPLETED" } else { "PENDING" };
            Ok::<_, anyhow::Error>((vault, state.to_string()))
        })
        .delay(self.delay)
        .poll_interval(self.poll_interval)
        .timeout(self.timeout)
        .wait_for_state()
        .await?;
        Ok(())
    }

    async fn update_resources(
        &self,
        client: &CloudClient,
        vault_id: &str,
        vault_type: &str,
        remote: &Value,
        desired: &[Value],
    ) -> Result<()> {
        let desired = build_associate_resources(vault_type, desired)
            .context("error building associate list of vault resources")?;
        let desired_ids: Vec<Value> = desired.iter().map(|r| r["id"].clone()).collect();
        let remote_ids = vault_resource_ids(remote);

        let removed: Vec<Value> =
            remote_ids.iter().filter(|id| !desired_ids.contains(id)).cloned().collect();
        if !removed.is_empty() {
            let body = json!({"resource_ids": removed});
            client
                .post(&vault_url(client, vault_id, "/removeresources"), Some(&body))
                .await
                .with_context(|| format!("error updating CBR vault ({})", vault_id))?;
            self.wait_for_resources(client, vault_id, |ids| {
                !ids.iter().any(|id| removed.contains(id))
            })
            .await
            .context("timeout waiting for dissociate resources to complete")?;
        }

        let added: Vec<Value> =
            desired.into_iter().filter(|r| !remote_ids.contains(&r["id"])).collect();
        if !added.is_empty() {
            let added_ids: Vec<Value> = added.iter().map(|r| r["id"].clone()).collect();
            let body = json!({"resources": added});
            client
                .post(&vault_url(client, vault_id, "/addresources"), Some(&body))
                .await
                .with_context(|| format!("error updating CBR vault ({})", vault_id))?;
            self.wait_for_resources(client, vault_id, |ids| {
                added_ids.iter().all(|id| ids.contains(id))
            })
            .await
            .context("timeout waiting for associate resources to complete")?;
        }
        Ok(())
    }

    async fn wait_for_deleted(&self, client: &CloudClient, vault_id: &str) -> Result<()> {
        StateChangeConf::new(&["available", "deleting"], &["deleted"], move || async move {
            match get_vault(client, vault_id).await {
                Ok(vault) => {
                    let status = path_search_str("billing.status", &vault, "STATUS_NOT_FOUND");
                    Ok((vault, status))
                },
                Err(err) if is_not_found(&err) => Ok((Value::Null, "deleted".to_string())),
                Err(err) => Err(err),
            }
        })
        .delay(self.delay)
        .poll_interval(self.poll_interval)
        .timeout(self.timeout)
        .wait_for_state()
        .await
        .context("timeout waiting for vault deletion to complete")?;
        Ok(())
    }
}

impl ManagedResource for Vault {
    fn name(&self) -> &'static str {
        "cbr_vault"
    }

    fn create<'a>(
        &'a self,
        client: &'a CloudClient,
        data: &'a mut ResourceData,
    ) -> OpFuture<'a> {
        async move {
            let body = build_vault_body(client, data)?;
            let url = client.url(SERVICE, "v3/{project_id}/vaults", &[]);
            let response = client
                .post(&url, Some(&json!({"vault": body})))
                .await
                .context("error creating CBR vault")?;

            let id = path_search_str("vault.id", &response, "");
            if id.is_empty() {
                anyhow::bail!("unable to find the vault ID from the API response");
            }
            tracing::info!("created CBR vault {}", id);
            data.set_id(id.as_str());

            update_policies(client, &id, &[], &desired_policies(data)).await?;
            if let Some(tags) = data.get_ok("tags") {
                update_tags(client, &id, &Value::Null, tags)
                    .await
                    .context("error setting tags of CBR vault")?;
            }

            self.read(client, data).await
        }
        .boxed()
    }

    fn read<'a>(&'a self, client: &'a CloudClient, data: &'a mut ResourceData) -> OpFuture<'a> {
        async move {
            let id = data.id().context("vault has no ID")?.to_string();
            let vault = match get_vault(client, &id).await {
                Ok(vault) => vault,
                Err(err) => return check_deleted(data, err, "error retrieving CBR vault"),
            };
            if vault.is_null() {
                tracing::warn!("CBR vault ({}) is missing from the response, removing", id);
                data.clear_id();
                return Ok(Vec::new());
            }

            let vault_type = path_search_str("billing.object_type", &vault, "");
            let mut record = Map::new();
            for (attr, expr) in [
                ("cloud_type", "billing.cloud_type"),
                ("name", "name"),
                ("protection_type", "billing.protect_type"),
                ("size", "billing.size"),
                ("consistent_level", "billing.consistent_level"),
                ("auto_expand", "auto_expand"),
                ("auto_bind", "auto_bind"),
                ("enterprise_project_id", "enterprise_project_id"),
                ("backup_name_prefix", "backup_name_prefix"),
                ("locked", "locked"),
                ("is_multi_az", "billing.is_multi_az"),
                ("spec_code", "billing.spec_code"),
                ("status", "billing.status"),
                ("storage", "billing.storage_unit"),
            ] {
                record.insert(attr.to_string(), path_search(expr, &vault, Value::Null));
            }
            record.insert("type".to_string(), json!(vault_type.as_str()));
            record.insert(
                "tags".to_string(),
                flatten_tags(&path_search("tags", &vault, json!([]))),
            );
            record.insert(
                "bind_rules".to_string(),
                flatten_tags(&path_search("bind_rules.tags", &vault, json!([]))),
            );
            record.insert(
                "resources".to_string(),
                flatten_vault_resources(&vault_type, &path_search_array("resources", &vault)),
            );
            record.insert(
                "charging_mode".to_string(),
                json!(parse_charging_mode(&path_search_str("billing.charging_mode", &vault, ""))),
            );
            for (attr, expr) in [("allocated", "billing.allocated"), ("used", "billing.used")] {
                let megabytes = path_search_f64(expr, &vault, 0.0);
                record.insert(attr.to_string(), json!(megabytes_to_gigabytes(megabytes)));
            }
            data.set_all(record);

            let mut diagnostics = Vec::new();
            match list_vault_policies(client, &id).await {
                Ok(policies) => data.set("policy", Value::Array(policies)),
                Err(err) => {
                    tracing::warn!("{:#}", err);
                    diagnostics.push(Diagnostic::warning(format!("{:#}", err)));
                },
            }
            Ok(diagnostics)
        }
        .boxed()
    }

    fn update<'a>(
        &'a self,
        client: &'a CloudClient,
        data: &'a mut ResourceData,
    ) -> OpFuture<'a> {
        async move {
            let id = data.id().context("vault has no ID")?.to_string();
            let remote = get_vault(client, &id).await.context("error retrieving CBR vault")?;

            let changes = basic_changes(data, &remote);
            if !changes.is_empty() {
                client
                    .put(&vault_url(client, &id, ""), Some(&json!({"vault": changes})))
                    .await
                    .with_context(|| format!("error updating CBR vault ({})", id))?;
            }

            if data.get("resources").is_some() {
                let vault_type = path_search_str("billing.object_type", &remote, "");
                let desired = path_search_array("resources", &args(data));
                self.update_resources(client, &id, &vault_type, &remote, &desired)
                    .await?;
            }

            if data.get("policy").is_some() {
                let current = list_vault_policies(client, &id).await?;
                update_policies(client, &id, &current, &desired_policies(data)).await?;
            }

            if let Some(tags) = data.get("tags") {
                let current = flatten_tags(&path_search("tags", &remote, json!([])));
                if *tags != current {
                    update_tags(client, &id, &current, tags)
                        .await
                        .context("failed to update tags")?;
                }
            }

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
            let id = data.id().context("vault has no ID")?.to_string();
            if let Err(err) = client.delete(&vault_url(client, &id, ""), None).await {
                let context = format!("error deleting CBR vault ({})", id);
                return check_deleted(data, err, &context);
            }
            self.wait_for_deleted(client, &id).await?;
            data.clear_id();
            Ok(Vec::new())
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::auth::Credentials;
    use crate::cloud::http::HttpClient;

    fn client() -> CloudClient {
        let http = HttpClient::new().unwrap();
        let creds = Credentials::from_token("t", http.clone());
        CloudClient::new("cn-north-4", "p1", "myhuaweicloud.com", creds, http)
    }

    #[test]
    fn test_vault_body_always_sends_resources() {
        let data = ResourceData::from_value(json!({
            "name": "vault-a",
            "type": "disk",
            "protection_type": "backup",
            "size": 100,
        }));

        assert_eq!(
            build_vault_body(&client(), &data).unwrap(),
            json!({
                "name": "vault-a",
                "billing": {
                    "object_type": "disk",
                    "consistent_level": "crash_consistent",
                    "protect_type": "backup",
                    "size": 100,
                    "is_multi_az": false,
                },
                "auto_expand": false,
                "auto_bind": false,
                "locked": false,
                "resources": [],
            })
        );
    }

    #[test]
    fn test_vault_body_rejects_prepaid() {
        let data = ResourceData::from_value(json!({
            "name": "vault-a",
            "type": "server",
            "protection_type": "backup",
            "charging_mode": "prePaid",
        }));
        assert_eq!(
            build_vault_body(&client(), &data).unwrap_err().to_string(),
            "prepaid vaults are not supported"
        );
    }

    #[test]
    fn test_server_resources() {
        let resources = vec![
            json!({"server_id": "ecs-1", "excludes": ["vol-1"]}),
            json!({}),
            json!({"server_id": "ecs-2"}),
        ];
        assert_eq!(
            build_associate_resources("server", &resources).unwrap(),
            vec![
                json!({
                    "id": "ecs-1",
                    "type": TYPE_SERVER,
                    "extra_info": {"exclude_volumes": ["vol-1"]}
                }),
                json!({"id": "ecs-2", "type": TYPE_SERVER}),
            ]
        );

        let with_includes = vec![json!({"server_id": "ecs-1", "includes": ["vol-1"]})];
        assert!(build_associate_resources("server", &with_includes).is_err());
    }

    #[test]
    fn test_disk_resources() {
        let resources = vec![json!({"includes": ["evs-1", "evs-2"]})];
        assert_eq!(
            build_associate_resources("disk", &resources).unwrap(),
            vec![
                json!({"id": "evs-1", "type": TYPE_DISK}),
                json!({"id": "evs-2", "type": TYPE_DISK}),
            ]
        );
        assert!(build_associate_resources("turbo", &[json!({}), json!({})]).is_err());
        assert!(build_associate_resources("file", &resources).unwrap().is_empty());
        assert_eq!(
            build_associate_resources("tape", &resources).unwrap_err().to_string(),
            "invalid vault type: tape"
        );
    }

    #[test]
    fn test_flatten_resources_and_policies() {
        let remote = vec![json!({
            "id": "ecs-1",
            "extra_info": {"include_volumes": [{"id": "vol-1"}], "exclude_volumes": ["vol-2"]}
        })];
        assert_eq!(
            flatten_vault_resources("server", &remote),
            json!([{"server_id": "ecs-1", "includes": ["vol-1"], "excludes": ["vol-2"]}])
        );
        assert_eq!(
            flatten_vault_resources("disk", &[json!({"id": "evs-1"})]),
            json!([{"includes": ["evs-1"]}])
        );

        let policy = json!({
            "id": "pol-1",
            "associated_vaults": [
                {"vault_id": "other", "destination_vault_id": "x"},
                {"vault_id": "v-1", "destination_vault_id": "v-9"}
            ]
        });
        assert_eq!(
            flatten_policy(&policy, "v-1"),
            json!({"id": "pol-1", "destination_vault_id": "v-9"})
        );
        assert_eq!(flatten_policy(&policy, "v-2"), json!({"id": "pol-1"}));
    }

    #[test]
    fn test_basic_changes_only_lists_differences() {
        let remote = json!({
            "name": "vault-a",
            "auto_expand": false,
            "auto_bind": false,
            "locked": false,
            "billing": {"size": 100, "consistent_level": "crash_consistent"},
            "bind_rules": {"tags": []}
        });
        let data = ResourceData::from_value(json!({
            "name": "vault-a",
            "size": 200,
            "bind_rules": {"env": "prod"},
        }));

        assert_eq!(
            Value::Object(basic_changes(&data, &remote)),
            json!({
                "auto_expand": false,
                "auto_bind": false,
                "billing": {"size": 200},
                "bind_rules": {"tags": [{"key": "env", "value": "prod"}]},
            })
        );

        let unchanged = ResourceData::from_value(json!({"name": "vault-a", "size": 100}));
        assert!(basic_changes(&unchanged, &remote).is_empty());
    }

    #[test]
    fn test_megabytes_to_gigabytes() {
        assert_eq!(megabytes_to_gigabytes(1536.0), 1.5);
        assert_eq!(megabytes_to_gigabytes(100.0), 0.1);
        assert_eq!(megabytes_to_gigabytes(0.0), 0.0);
    }
}
