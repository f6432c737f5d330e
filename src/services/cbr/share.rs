use super::{args, SERVICE};
use crate::cloud::client::CloudClient;
use crate::resource::path::{path_search, path_search_array};
use crate::resource::{check_deleted, ManagedResource, OpFuture, ResourceData};
use crate::services::delete_each;
use anyhow::{Context, Result};
use futures::FutureExt;
use serde_json::{json, Value};

/// `cbr_backup_share`: shares a backup with other projects. The ID is the backup ID.
pub struct BackupShare;

fn members_url(client: &CloudClient, backup_id: &str) -> String {
    client.url(
        SERVICE,
        "v3/{project_id}/backups/{backup_id}/members",
        &[("backup_id", backup_id)],
    )
}

fn member_url(client: &CloudClient, backup_id: &str, member_id: &str) -> String {
    client.url(
        SERVICE,
        "v3/{project_id}/backups/{backup_id}/members/{member_id}",
        &[("backup_id", backup_id), ("member_id", member_id)],
    )
}

/// Project IDs a backup is currently shared with
async fn list_share_members(client: &CloudClient, backup_id: &str) -> Result<Vec<Value>> {
    let response = client.get(&members_url(client, backup_id)).await?;
    Ok(path_search_array("members", &response))
}

fn member_project_ids(members: &[Value]) -> Vec<String> {
    members
        .iter()
        .filter_map(|m| m.get("dest_project_id").and_then(|v| v.as_str()).map(String::from))
        .collect()
}

fn desired_members(data: &ResourceData) -> Vec<String> {
    path_search_array("members[*].dest_project_id", &args(data))
        .into_iter()
        .filter_map(|v| v.as_str().map(String::from))
        .collect()
}

async fn add_members(client: &CloudClient, backup_id: &str, members: &[String]) -> Result<()> {
    if members.is_empty() {
        return Ok(());
    }
    let body = json!({ "members": members });
    client
        .post(&members_url(client, backup_id), Some(&body))
        .await
        .with_context(|| format!("error sharing the backup ({})", backup_id))?;
    Ok(())
}

async fn remove_members(client: &CloudClient, backup_id: &str, members: &[String]) -> Result<()> {
    let requests = members
        .iter()
        .map(|member| {
            (
                format!("share member ({})", member),
                member_url(client, backup_id, member),
            )
        })
        .collect();
    delete_each(client, requests).await
}

impl ManagedResource for BackupShare {
    fn name(&self) -> &'static str {
        "cbr_backup_share"
    }

    fn create<'a>(
        &'a self,
        client: &'a CloudClient,
        data: &'a mut ResourceData,
    ) -> OpFuture<'a> {
        async move {
            let backup_id = data.require_str("backup_id")?.to_string();
            let members = desired_members(data);
            if members.is_empty() {
                anyhow::bail!("at least one member must be specified");
            }
            add_members(client, &backup_id, &members).await?;
            data.set_id(backup_id);
            self.read(client, data).await
        }
        .boxed()
    }

    fn read<'a>(&'a self, client: &'a CloudClient, data: &'a mut ResourceData) -> OpFuture<'a> {
        async move {
            let backup_id = data.id().context("backup share has no ID")?.to_string();
            let members = match list_share_members(client, &backup_id).await {
                Ok(members) => members,
                Err(err) => {
                    return check_deleted(data, err, "error retrieving backup share members")
                },
            };
            if members.is_empty() {
                tracing::warn!("backup ({}) is no longer shared, removing from state", backup_id);
                data.clear_id();
                return Ok(Vec::new());
            }

            let flattened: Vec<Value> = members
                .iter()
                .map(|m| {
                    json!({
                        "dest_project_id": path_search("dest_project_id", m, Value::Null),
                        "id": path_search("id", m, Value::Null),
                        "status": path_search("status", m, Value::Null),
                        "created_at": path_search("created_at", m, Value::Null),
                        "updated_at": path_search("updated_at", m, Value::Null),
                        "image_id": path_search("image_id", m, Value::Null),
                        "vault_id": path_search("vault_id", m, Value::Null),
                    })
                })
                .collect();
            data.set("backup_id", Value::String(backup_id));
            data.set("members", Value::Array(flattened));
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
            let backup_id = data.id().context("backup share has no ID")?.to_string();
            let current = member_project_ids(
                &list_share_members(client, &backup_id)
                    .await
                    .context("error retrieving backup share members")?,
            );
            let desired = desired_members(data);

            let obsolete: Vec<String> =
                current.iter().filter(|m| !desired.contains(m)).cloned().collect();
            let new: Vec<String> =
                desired.iter().filter(|m| !current.contains(m)).cloned().collect();

            remove_members(client, &backup_id, &obsolete)
                .await
                .with_context(|| format!("error unsharing the backup ({})", backup_id))?;
            add_members(client, &backup_id, &new).await?;

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
            let backup_id = data.id().context("backup share has no ID")?.to_string();
            let members = match list_share_members(client, &backup_id).await {
                Ok(members) => members,
                Err(err) => {
                    return check_deleted(data, err, "error retrieving backup share members")
                },
            };

            remove_members(client, &backup_id, &member_project_ids(&members))
                .await
                .with_context(|| {
                    format!("error deleting share members of the backup ({})", backup_id)
                })?;

            data.clear_id();
            Ok(Vec::new())
        }
        .boxed()
    }
}
