use super::{args, SERVICE};
use crate::cloud::client::CloudClient;
use crate::cloud::error::convert_malformed_url_401_into_404;
use crate::resource::path::{path_search, path_search_array, path_search_str};
use crate::resource::query::{remove_nil, value_ignore_empty, QueryParams};
use crate::resource::{
    check_deleted, collect_offset_pages, ManagedResource, OpFuture, Page, ResourceData,
};
use crate::services::delete_each;
use anyhow::{Context, Result};
use futures::FutureExt;
use serde_json::{json, Value};

/// All backups belonging to a checkpoint
pub async fn list_checkpoint_backups(
    client: &CloudClient,
    checkpoint_id: &str,
) -> Result<Vec<Value>> {
    let base = client.url(SERVICE, "v3/{project_id}/backups", &[]);
    collect_offset_pages(|offset| {
        let mut query = QueryParams::new();
        query.push("checkpoint_id", checkpoint_id).offset(offset);
        let url = query.apply_to(&base);
        async move {
            let response = client.get(&url).await?;
            Ok(Page::new(path_search_array("backups", &response), None))
        }
    })
    .await
}

/// `cbr_checkpoint`: backs up the given resources of a vault in one go.
/// Deleting it deletes every backup it produced.
pub struct Checkpoint;

fn build_checkpoint_body(data: &ResourceData) -> Result<Value> {
    let args = args(data);
    let vault_id = data.require_str("vault_id")?;
    let resources = path_search_array("backups[*].resource_id", &args);
    if resources.is_empty() {
        anyhow::bail!("at least one backup resource must be specified");
    }
    let details: Vec<Value> = path_search_array("backups", &args)
        .iter()
        .map(|b| {
            json!({
                "id": path_search("resource_id", b, Value::Null),
                "type": path_search("type", b, Value::Null),
            })
        })
        .collect();

    Ok(remove_nil(json!({
        "checkpoint": {
            "vault_id": vault_id,
            "parameters": {
                "auto_trigger": false,
                "name": value_ignore_empty(data.get("name")),
                "description": value_ignore_empty(data.get("description")),
                "incremental": data.get_bool("incremental"),
                "resources": resources,
                "resource_details": details,
            }
        }
    })))
}

fn flatten_checkpoint_backups(backups: &[Value]) -> Value {
    Value::Array(
        backups
            .iter()
            .map(|b| {
                json!({
                    "id": path_search("id", b, Value::Null),
                    "resource_id": path_search("resource_id", b, Value::Null),
                    "type": path_search("resource_type", b, Value::Null),
                    "resource_size": path_search("resource_size", b, Value::Null),
                    "status": path_search("status", b, Value::Null),
                    "protected_at": path_search("protected_at", b, Value::Null),
                    "updated_at": path_search("updated_at", b, Value::Null),
                })
            })
            .collect(),
    )
}

impl ManagedResource for Checkpoint {
    fn name(&self) -> &'static str {
        "cbr_checkpoint"
    }

    fn create<'a>(
        &'a self,
        client: &'a CloudClient,
        data: &'a mut ResourceData,
    ) -> OpFuture<'a> {
        async move {
            let body = build_checkpoint_body(data)?;
            let url = client.url(SERVICE, "v3/{project_id}/checkpoints", &[]);
            let response = client
                .post(&url, Some(&body))
                .await
                .context("error creating CBR checkpoint")?;

            let id = path_search_str("checkpoint.id", &response, "");
            if id.is_empty() {
                anyhow::bail!("unable to find the checkpoint ID from the API response");
            }
            tracing::info!("created CBR checkpoint {}", id);
            data.set_id(id);

            self.read(client, data).await
        }
        .boxed()
    }

    fn read<'a>(&'a self, client: &'a CloudClient, data: &'a mut ResourceData) -> OpFuture<'a> {
        async move {
            let id = data.id().context("checkpoint has no ID")?.to_string();
            let url = client.url(
                SERVICE,
                "v3/{project_id}/checkpoints/{checkpoint_id}",
                &[("checkpoint_id", id.as_str())],
            );

            let response = match client.get(&url).await {
                Ok(response) => response,
                // Unknown checkpoints are reported as a 401 with a malformed url message
                Err(err) => {
                    return check_deleted(
                        data,
                        convert_malformed_url_401_into_404(err),
                        "error retrieving CBR checkpoint",
                    )
                },
            };

            let checkpoint = path_search("checkpoint", &response, Value::Null);
            for (attr, expr) in [
                ("vault_id", "vault.id"),
                ("status", "status"),
                ("created_at", "created_at"),
                ("name", "extra_info.name"),
                ("description", "extra_info.description"),
            ] {
                data.set(attr, path_search(expr, &checkpoint, Value::Null));
            }

            let backups = list_checkpoint_backups(client, &id)
                .await
                .context("error querying backups of the CBR checkpoint")?;
            data.set("backups", flatten_checkpoint_backups(&backups));

            Ok(Vec::new())
        }
        .boxed()
    }

    fn update<'a>(
        &'a self,
        client: &'a CloudClient,
        data: &'a mut ResourceData,
    ) -> OpFuture<'a> {
        // Nothing about a checkpoint can change in place
        self.read(client, data)
    }

    fn delete<'a>(
        &'a self,
        client: &'a CloudClient,
        data: &'a mut ResourceData,
    ) -> OpFuture<'a> {
        async move {
            let id = data.id().context("checkpoint has no ID")?.to_string();
            let backups = list_checkpoint_backups(client, &id)
                .await
                .context("error querying backups of the CBR checkpoint")?;

            let requests = backups
                .iter()
                .filter_map(|b| b.get("id").and_then(|v| v.as_str()))
                .map(|backup_id| {
                    let url = client.url(
                        SERVICE,
                        "v3/{project_id}/backups/{backup_id}",
                        &[("backup_id", backup_id)],
                    );
                    (format!("backup ({})", backup_id), url)
                })
                .collect();
            delete_each(client, requests)
                .await
                .with_context(|| format!("error deleting backups of the CBR checkpoint ({})", id))?;

            data.clear_id();
            Ok(Vec::new())
        }
        .boxed()
    }
}
