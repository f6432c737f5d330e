//! Provider
//!
//! Looks up managed resources by name and dispatches lifecycle operations.
//! Data sources come from the JSON registry in [`crate::resource`].

use crate::cloud::client::CloudClient;
use crate::resource::{
    get_all_data_source_keys, ActionResource, Diagnostics, ManagedResource, ResourceData,
};
use crate::services::cbr;
use crate::services::swr::{self, PolicyKind};
use anyhow::Result;
use std::collections::BTreeMap;
use std::fmt;

/// Lifecycle operation requested by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create,
    Read,
    Update,
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Create => "create",
            Operation::Read => "read",
            Operation::Update => "update",
            Operation::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// All managed resources and actions, keyed by name
pub struct Provider {
    resources: BTreeMap<&'static str, Box<dyn ManagedResource>>,
}

impl Default for Provider {
    fn default() -> Self {
        Self::new()
    }
}

impl Provider {
    pub fn new() -> Self {
        let all: Vec<Box<dyn ManagedResource>> = vec![
            Box::new(cbr::Vault::default()),
            Box::new(cbr::Checkpoint),
            Box::new(cbr::BackupShare),
            Box::new(cbr::OrganizationPolicy),
            Box::new(ActionResource::new(cbr::BackupReplicate)),
            Box::new(ActionResource::new(cbr::Migrate)),
            Box::new(swr::EnterpriseInstance::default()),
            Box::new(swr::Trigger),
            Box::new(swr::NamespacePolicy::new(PolicyKind::Retention)),
            Box::new(swr::NamespacePolicy::new(PolicyKind::ImageSignature)),
            Box::new(ActionResource::new(swr::PolicyExecute::new(PolicyKind::Retention))),
            Box::new(ActionResource::new(swr::PolicyExecute::new(PolicyKind::ImageSignature))),
        ];
        Self::with_resources(all)
    }

    pub fn with_resources(resources: Vec<Box<dyn ManagedResource>>) -> Self {
        Self {
            resources: resources.into_iter().map(|r| (r.name(), r)).collect(),
        }
    }

    pub fn resource(&self, name: &str) -> Option<&dyn ManagedResource> {
        self.resources.get(name).map(|r| r.as_ref())
    }

    /// Resource names, sorted
    pub fn resource_names(&self) -> Vec<&'static str> {
        self.resources.keys().copied().collect()
    }

    /// Data source names, sorted
    pub fn data_source_names(&self) -> Vec<&'static str> {
        get_all_data_source_keys()
    }

    /// Run one lifecycle operation on the named resource
    pub async fn apply(
        &self,
        client: &CloudClient,
        name: &str,
        operation: Operation,
        data: &mut ResourceData,
    ) -> Result<Diagnostics> {
        let Some(resource) = self.resource(name) else {
            return Err(anyhow::anyhow!("Unknown resource: {}", name));
        };

        tracing::info!("{} {} (id: {})", operation, name, data.id().unwrap_or("-"));
        match operation {
            Operation::Create => resource.create(client, data).await,
            Operation::Read => resource.read(client, data).await,
            Operation::Update => resource.update(client, data).await,
            Operation::Delete => resource.delete(client, data).await,
        }
    }
}
