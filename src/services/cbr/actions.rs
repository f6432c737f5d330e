use super::SERVICE;
use crate::cloud::client::CloudClient;
use crate::resource::path::path_search;
use crate::resource::query::{remove_nil, value_ignore_empty};
use crate::resource::{Action, ResourceData};
use anyhow::{Context, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::{json, Value};

/// `cbr_backup_replicate`: copies a backup into a vault of another region
pub struct BackupReplicate;

impl Action for BackupReplicate {
    fn name(&self) -> &'static str {
        "cbr_backup_replicate"
    }

    fn execute<'a>(
        &'a self,
        client: &'a CloudClient,
        data: &'a mut ResourceData,
    ) -> BoxFuture<'a, Result<Option<String>>> {
        async move {
            let backup_id = data.require_str("backup_id")?;
            let body = remove_nil(json!({
                "replicate": {
                    "destination_project_id": data.require_str("destination_project_id")?,
                    "destination_region": data.require_str("destination_region")?,
                    "destination_vault_id": data.require_str("destination_vault_id")?,
                    "name": value_ignore_empty(data.get("name")),
                    "description": value_ignore_empty(data.get("description")),
                    "enable_acceleration": value_ignore_empty(data.get("enable_acceleration")),
                }
            }));
            let url = client.url(
                SERVICE,
                "v3/{project_id}/backups/{backup_id}/replicate",
                &[("backup_id", backup_id)],
            );

            let response = client
                .post(&url, Some(&body))
                .await
                .with_context(|| format!("error replicating the backup ({})", backup_id))?;

            data.set(
                "destination_backup_id",
                path_search("replication.backup_id", &response, Value::Null),
            );
            Ok(None)
        }
        .boxed()
    }
}

/// `cbr_migrate`: migrates resource data to the current CBR backend
pub struct Migrate;

impl Action for Migrate {
    fn name(&self) -> &'static str {
        "cbr_migrate"
    }

    fn execute<'a>(
        &'a self,
        client: &'a CloudClient,
        data: &'a mut ResourceData,
    ) -> BoxFuture<'a, Result<Option<String>>> {
        async move {
            let body = json!({
                "all_regions": data.get_bool("all_regions"),
                "reserve_motion": data.get_bool("reserve_motion"),
            });
            let url = client.url(SERVICE, "v3/{project_id}/migrates", &[]);
            client
                .post(&url, Some(&body))
                .await
                .context("error migrating CBR resources")?;
            Ok(None)
        }
        .boxed()
    }
}
