use super::{id_string, SERVICE};
use crate::cloud::client::CloudClient;
use crate::cloud::error::is_not_found;
use crate::cloud::wait::StateChangeConf;
use crate::resource::path::{path_search, path_search_array, path_search_str};
use crate::resource::query::{expand_tags, flatten_tags, remove_nil, value_ignore_empty};
use crate::resource::{check_deleted, ManagedResource, OpFuture, ResourceData};
use anyhow::{Context, Result};
use futures::FutureExt;
use serde_json::{json, Value};
use std::time::Duration;

const STATUS_ATTR: &str = "public_network_access_control_status";
const WHITE_LIST_ATTR: &str = "public_network_access_white_ip_list";

/// `swr_enterprise_instance`. Creation runs as an asynchronous job.
///
/// Tags, anonymous access and public network access are changed in place;
/// update compares them with the remote instance and only sends what differs.
pub struct EnterpriseInstance {
    pub create_delay: Duration,
    pub poll_interval: Duration,
    pub timeout: Duration,
    /// Delay and poll interval while public access is switched on or off
    pub access_poll_interval: Duration,
}

impl Default for EnterpriseInstance {
    fn default() -> Self {
        Self {
            create_delay: Duration::from_secs(120),
            poll_interval: Duration::from_secs(20),
            timeout: Duration::from_secs(40 * 60),
            access_poll_interval: Duration::from_secs(5),
        }
    }
}

fn instance_url(client: &CloudClient, id: &str) -> String {
    client.url(SERVICE, "v2/{project_id}/instances/{instance_id}", &[("instance_id", id)])
}

fn configurations_url(client: &CloudClient, id: &str) -> String {
    client.url(
        SERVICE,
        "v2/{project_id}/instances/{instance_id}/configurations",
        &[("instance_id", id)],
    )
}

fn endpoint_policy_url(client: &CloudClient, id: &str) -> String {
    client.url(
        SERVICE,
        "v2/{project_id}/instances/{instance_id}/endpoint-policy",
        &[("instance_id", id)],
    )
}

fn build_instance_body(client: &CloudClient, data: &ResourceData) -> Result<Value> {
    let enterprise_project_id = match data.get_ok("enterprise_project_id") {
        Some(v) => v.clone(),
        None => client
            .enterprise_project_id
            .clone()
            .map(Value::String)
            .unwrap_or(Value::Null),
    };

    Ok(remove_nil(json!({
        "charge_mode": "postPaid",
        "name": data.require_str("name")?,
        "spec": data.require_str("spec")?,
        "vpc_id": data.require_str("vpc_id")?,
        "subnet_id": data.require_str("subnet_id")?,
        "enterprise_project_id": enterprise_project_id,
        "project_id": client.project_id,
        "obs_encrypt": value_ignore_empty(data.get("obs_encrypt")),
        "encrypt_type": value_ignore_empty(data.get("encrypt_type")),
        "obs_bucket_name": value_ignore_empty(data.get("obs_bucket_name")),
        "description": value_ignore_empty(data.get("description")),
        "resource_tags": expand_tags(data.get("tags")),
    })))
}

/// White list entries in a comparable form: empty descriptions dropped, sorted by ip
fn normalize_ip_list(list: &Value) -> Vec<Value> {
    let mut entries: Vec<Value> = list
        .as_array()
        .map(|items| {
            items
                .iter()
                .map(|item| {
                    remove_nil(json!({
                        "ip": path_search("ip", item, Value::Null),
                        "description": value_ignore_empty(item.get("description")),
                    }))
                })
                .collect()
        })
        .unwrap_or_default();
    entries.sort_by_key(|e| path_search_str("ip", e, ""));
    entries
}

fn flatten_ip_list(policy: &Value) -> Value {
    Value::Array(
        path_search_array("ip_list", policy)
            .iter()
            .map(|item| {
                json!({
                    "description": path_search("description", item, Value::Null),
                    "ip": path_search("ip", item, Value::Null),
                })
            })
            .collect(),
    )
}

async fn update_anonymous_access(client: &CloudClient, id: &str, enabled: bool) -> Result<()> {
    let body = json!({ "anonymous_access": enabled });
    client
        .put(&configurations_url(client, id), Some(&body))
        .await
        .context("error updating SWR instance configuration anonymous access")?;
    Ok(())
}

async fn update_white_ip_list(client: &CloudClient, id: &str, list: &Value) -> Result<()> {
    // Sent even when empty: an empty list clears the remote one
    let body = json!({ "ip_list": normalize_ip_list(list) });
    client
        .put(&endpoint_policy_url(client, id), Some(&body))
        .await
        .context("error updating SWR instance public network access white IP list")?;
    Ok(())
}

async fn tag_request(client: &CloudClient, id: &str, action: &str, tags: &Value) -> Result<()> {
    let template = format!("v2/{{project_id}}/instances/{{instance_id}}/tags/{}", action);
    let url = client.url(SERVICE, &template, &[("instance_id", id)]);
    let body = json!({ "tags": expand_tags(Some(tags)) });
    client.post(&url, Some(&body)).await?;
    Ok(())
}

/// Replace the instance tags: remove every old tag, then add the new ones
async fn update_tags(client: &CloudClient, id: &str, old: &Value, new: &Value) -> Result<()> {
    let has_tags = |tags: &Value| tags.as_object().is_some_and(|m| !m.is_empty());
    if has_tags(old) {
        tag_request(client, id, "delete", old)
            .await
            .context("error deleting SWR enterprise instance tags")?;
    }
    if has_tags(new) {
        tag_request(client, id, "create", new)
            .await
            .context("error adding SWR enterprise instance tags")?;
    }
    Ok(())
}

impl EnterpriseInstance {
    async fn wait_for_job(&self, client: &CloudClient, job_id: &str) -> Result<Value> {
        let url = client.url(SERVICE, "v2/{project_id}/jobs/{job_id}", &[("job_id", job_id)]);
        let url = url.as_str();
        StateChangeConf::new(&["PENDING"], &["SUCCESS"], move || async move {
            let job = client.get(url).await?;
            let state = match path_search_str("status", &job, "").as_str() {
                "Success" => "SUCCESS",
                "Failed" => anyhow::bail!(
                    "job ({}) failed: {}",
                    job_id,
                    path_search_str("fail_reason", &job, "unknown reason")
                ),
                _ => "PENDING",
            };
            Ok::<_, anyhow::Error>((job, state.to_string()))
        })
        .delay(self.create_delay)
        .poll_interval(self.poll_interval)
        .timeout(self.timeout)
        .wait_for_state()
        .await
    }

    async fn wait_for_deleted(&self, client: &CloudClient, id: &str) -> Result<()> {
        let url = instance_url(client, id);
        let url = url.as_str();
        StateChangeConf::new(&["PENDING"], &["DELETED"], move || async move {
            match client.get(url).await {
                Ok(instance) => Ok((instance, "PENDING".to_string())),
                Err(err) if is_not_found(&err) => Ok((Value::Null, "DELETED".to_string())),
                Err(err) => Err(err),
            }
        })
        .poll_interval(self.poll_interval)
        .timeout(self.timeout)
        .wait_for_state()
        .await?;
        Ok(())
    }

    /// Switch public network access to `status` (`Enable` or `Disable`) and
    /// wait until the endpoint policy reports it
    async fn update_public_access(
        &self,
        client: &CloudClient,
        id: &str,
        status: &str,
    ) -> Result<()> {
        let url = endpoint_policy_url(client, id);
        let body = json!({ "enable": status == "Enable" });
        client
            .post(&url, Some(&body))
            .await
            .context("error updating SWR instance public network access control status")?;

        let url = url.as_str();
        StateChangeConf::new(&["PENDING"], &["SUCCESS"], move || async move {
            let policy = client.get(url).await?;
            let current = path_search_str("status", &policy, "");
            let state = if current == status {
                "SUCCESS"
            } else if current == "EnableFailed" || current == "DisableFailed" {
                "FAILED"
            } else {
                "PENDING"
            };
            Ok::<_, anyhow::Error>((policy, state.to_string()))
        })
        .delay(self.access_poll_interval)
        .poll_interval(self.access_poll_interval)
        .timeout(self.timeout)
        .wait_for_state()
        .await
        .context(
            "error waiting for updating SWR instance network access control status to be completed",
        )?;
        Ok(())
    }

    /// Bring public access and its white list to the desired values.
    /// A list is applied before disabling access and after enabling it.
    async fn apply_public_access(
        &self,
        client: &CloudClient,
        id: &str,
        status: Option<&str>,
        white_list: Option<&Value>,
    ) -> Result<()> {
        match status {
            Some("Disable") => {
                if let Some(list) = white_list {
                    update_white_ip_list(client, id, list).await?;
                }
                self.update_public_access(client, id, "Disable").await
            },
            Some(status) => {
                self.update_public_access(client, id, status).await?;
                match white_list {
                    Some(list) => update_white_ip_list(client, id, list).await,
                    None => Ok(()),
                }
            },
            None => match white_list {
                Some(list) => update_white_ip_list(client, id, list).await,
                None => Ok(()),
            },
        }
    }
}

impl ManagedResource for EnterpriseInstance {
    fn name(&self) -> &'static str {
        "swr_enterprise_instance"
    }

    fn create<'a>(
        &'a self,
        client: &'a CloudClient,
        data: &'a mut ResourceData,
    ) -> OpFuture<'a> {
        async move {
            let body = build_instance_body(client, data)?;
            let url = client.url(SERVICE, "v2/{project_id}/instances", &[]);
            let response = client
                .post(&url, Some(&body))
                .await
                .context("error creating SWR instance")?;

            let id = id_string(&path_search("instance_id", &response, Value::Null))
                .context("unable to find SWR instance ID from the API response")?;
            data.set_id(id.clone());

            let job_id = path_search_str("job_id", &response, "");
            if job_id.is_empty() {
                anyhow::bail!("unable to find the job ID from the API response");
            }
            self.wait_for_job(client, &job_id).await.with_context(|| {
                format!("error waiting for SWR enterprise instance ({}) to be created", id)
            })?;
            tracing::info!("created SWR enterprise instance {}", id);

            if data.get_bool("anonymous_access") {
                update_anonymous_access(client, &id, true).await?;
            }
            let status = (data.get_str(STATUS_ATTR) == "Enable").then_some("Enable");
            let white_list = data.get_ok(WHITE_LIST_ATTR).cloned();
            self.apply_public_access(client, &id, status, white_list.as_ref())
                .await?;

            self.read(client, data).await
        }
        .boxed()
    }

    fn read<'a>(&'a self, client: &'a CloudClient, data: &'a mut ResourceData) -> OpFuture<'a> {
        async move {
            let id = data.id().context("instance has no ID")?.to_string();
            let instance = match client.get(&instance_url(client, &id)).await {
                Ok(instance) => instance,
                Err(err) => return check_deleted(data, err, "error retrieving SWR instance"),
            };

            for field in [
                "name",
                "spec",
                "vpc_id",
                "subnet_id",
                "enterprise_project_id",
                "obs_encrypt",
                "encrypt_type",
                "obs_bucket_name",
                "description",
                "anonymous_access",
                "version",
                "charge_mode",
                "access_address",
                "created_at",
                "updated_at",
                "expires_at",
                "status",
                "user_def_obs",
                "vpc_name",
                "vpc_cidr",
                "subnet_name",
                "subnet_cidr",
            ] {
                data.set(field, path_search(field, &instance, Value::Null));
            }
            data.set(
                "tags",
                flatten_tags(&path_search("resource_tags", &instance, Value::Null)),
            );

            match client.get(&configurations_url(client, &id)).await {
                Ok(configuration) => data.set(
                    "anonymous_access",
                    path_search("anonymous_access", &configuration, Value::Null),
                ),
                Err(err) => {
                    tracing::warn!("error retrieving SWR instance configuration: {:#}", err)
                },
            }
            match client.get(&endpoint_policy_url(client, &id)).await {
                Ok(policy) => {
                    data.set(STATUS_ATTR, path_search("status", &policy, Value::Null));
                    data.set(WHITE_LIST_ATTR, flatten_ip_list(&policy));
                },
                Err(err) => tracing::warn!(
                    "error retrieving SWR instance public access control infos: {:#}",
                    err
                ),
            }
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
            let id = data.id().context("instance has no ID")?.to_string();

            if let Some(enabled) = data.get("anonymous_access").and_then(|v| v.as_bool()) {
                let configuration = client
                    .get(&configurations_url(client, &id))
                    .await
                    .context("error retrieving SWR instance configuration")?;
                if path_search("anonymous_access", &configuration, Value::Bool(false)) != enabled {
                    update_anonymous_access(client, &id, enabled).await?;
                }
            }

            if let Some(desired) = data.get("tags").filter(|t| t.is_object()) {
                let instance = client
                    .get(&instance_url(client, &id))
                    .await
                    .context("error retrieving SWR instance")?;
                let current = flatten_tags(&path_search("resource_tags", &instance, json!([])));
                if &current != desired {
                    update_tags(client, &id, &current, desired).await?;
                }
            }

            let desired_status = Some(data.get_str(STATUS_ATTR)).filter(|s| !s.is_empty());
            let desired_list = data.get(WHITE_LIST_ATTR).filter(|v| v.is_array());
            if desired_status.is_some() || desired_list.is_some() {
                let policy = client
                    .get(&endpoint_policy_url(client, &id))
                    .await
                    .context("error retrieving SWR instance public access control infos")?;
                let current_status = path_search_str("status", &policy, "");
                let status = desired_status.filter(|s| *s != current_status);
                let list = desired_list.filter(|list| {
                    normalize_ip_list(list) != normalize_ip_list(&flatten_ip_list(&policy))
                });
                self.apply_public_access(client, &id, status, list).await?;
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
            let id = data.id().context("instance has no ID")?.to_string();
            let body = json!({
                "delete_obs": data.get_bool("delete_obs"),
                "delete_dns": data.get_bool("delete_dns"),
            });

            if let Err(err) = client.delete(&instance_url(client, &id), Some(&body)).await {
                return check_deleted(data, err, "error deleting SWR instance");
            }
            self.wait_for_deleted(client, &id).await.with_context(|| {
                format!("error waiting for SWR enterprise instance ({}) to be deleted", id)
            })?;

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
    fn test_instance_body() {
        let data = ResourceData::from_value(json!({
            "name": "registry",
            "spec": "swr.ee.professional",
            "vpc_id": "vpc-1",
            "subnet_id": "subnet-1",
            "description": "",
            "tags": {"env": "prod"}
        }));

        assert_eq!(
            build_instance_body(&client(), &data).unwrap(),
            json!({
                "charge_mode": "postPaid",
                "name": "registry",
                "spec": "swr.ee.professional",
                "vpc_id": "vpc-1",
                "subnet_id": "subnet-1",
                "project_id": "p1",
                "resource_tags": [{"key": "env", "value": "prod"}]
            })
        );
    }

    #[test]
    fn test_ip_lists_compare_without_order_or_empty_descriptions() {
        let desired = json!([
            {"ip": "10.0.0.2", "description": ""},
            {"ip": "10.0.0.1", "description": "office"}
        ]);
        let remote = json!({"ip_list": [
            {"ip": "10.0.0.1", "description": "office"},
            {"ip": "10.0.0.2"}
        ]});

        assert_eq!(
            normalize_ip_list(&desired),
            normalize_ip_list(&flatten_ip_list(&remote))
        );
        assert_eq!(
            normalize_ip_list(&desired),
            vec![
                json!({"ip": "10.0.0.1", "description": "office"}),
                json!({"ip": "10.0.0.2"})
            ]
        );
    }
}
