//! Cloud Backup and Recovery resources
//!
//! - [`vault`] - backup vaults with their resources, policies and tags
//! - [`checkpoint`] - a set of backups taken together
//! - [`share`] - backup sharing with other projects
//! - [`organization_policy`] - organization-wide backup policies
//! - [`actions`] - one-shot replicate and migrate

mod actions;
mod checkpoint;
mod organization_policy;
mod share;
mod vault;

pub use actions::{BackupReplicate, Migrate};
pub use checkpoint::{list_checkpoint_backups, Checkpoint};
pub use organization_policy::OrganizationPolicy;
pub use share::BackupShare;
pub use vault::Vault;

use crate::resource::ResourceData;
use serde_json::Value;

const SERVICE: &str = "cbr";

/// Attributes as one JSON object, for path lookups across nested lists
fn args(data: &ResourceData) -> Value {
    Value::Object(data.attributes().clone())
}
