//! Managed resources and actions, one module per cloud service
//!
//! - [`cbr`] - Cloud Backup and Recovery: vaults, checkpoints, backup sharing,
//!   organization policies, replication
//! - [`swr`] - SWR Enterprise: instances, webhook triggers, namespace policies

pub mod cbr;
pub mod swr;

use crate::cloud::client::CloudClient;
use crate::cloud::error::MultiError;
use anyhow::{Context, Result};
use futures::future::join_all;

/// Send a DELETE to every url concurrently.
/// Every request is attempted; the failures are combined into one error.
pub(crate) async fn delete_each(
    client: &CloudClient,
    requests: Vec<(String, String)>,
) -> Result<()> {
    let results = join_all(requests.iter().map(|(label, url)| async move {
        client
            .delete(url, None)
            .await
            .with_context(|| format!("error deleting {}", label))
    }))
    .await;

    let mut errors = MultiError::new();
    for result in results {
        errors.append(result);
    }
    if !errors.is_empty() {
        tracing::warn!("{} of {} deletion(s) failed", errors.len(), requests.len());
    }
    errors.into_result()
}
