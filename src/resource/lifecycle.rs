//! Resource lifecycle
//!
//! The create/read/update/delete contract every managed resource implements,
//! and the generic one-shot action resource built on top of it.

use super::state::{Diagnostic, Diagnostics, ResourceData};
use crate::cloud::client::CloudClient;
use crate::cloud::error::is_not_found;
use anyhow::Result;
use futures::future::BoxFuture;
use futures::FutureExt;

/// Future returned by lifecycle operations
pub type OpFuture<'a> = BoxFuture<'a, Result<Diagnostics>>;

/// A resource with a managed lifecycle.
///
/// Operations mutate `data` in place. A read that finds the remote object gone
/// clears the id instead of failing.
pub trait ManagedResource: Send + Sync {
    fn name(&self) -> &'static str;

    fn create<'a>(&'a self, client: &'a CloudClient, data: &'a mut ResourceData) -> OpFuture<'a>;

    fn read<'a>(&'a self, client: &'a CloudClient, data: &'a mut ResourceData) -> OpFuture<'a>;

    fn update<'a>(&'a self, client: &'a CloudClient, data: &'a mut ResourceData) -> OpFuture<'a>;

    fn delete<'a>(&'a self, client: &'a CloudClient, data: &'a mut ResourceData) -> OpFuture<'a>;
}

/// Handle a failed read: a missing object is removed from the state,
/// anything else is returned with `context`.
pub fn check_deleted(
    data: &mut ResourceData,
    err: anyhow::Error,
    context: &str,
) -> Result<Diagnostics> {
    if is_not_found(&err) {
        tracing::warn!(
            "{}: resource not found, removing {} from state",
            context,
            data.id().unwrap_or("-")
        );
        data.clear_id();
        return Ok(Vec::new());
    }
    Err(err.context(context.to_string()))
}

/// A single imperative API call
pub trait Action: Send + Sync {
    fn name(&self) -> &'static str;

    /// Perform the call. May record computed attributes on `data` and may
    /// return the identifier the service assigned.
    fn execute<'a>(
        &'a self,
        client: &'a CloudClient,
        data: &'a mut ResourceData,
    ) -> BoxFuture<'a, Result<Option<String>>>;
}

/// Exposes an [`Action`] as a resource: create runs the action, read and
/// update do nothing, delete only forgets the state.
pub struct ActionResource<A> {
    action: A,
}

impl<A: Action> ActionResource<A> {
    pub fn new(action: A) -> Self {
        Self { action }
    }
}

impl<A: Action> ManagedResource for ActionResource<A> {
    fn name(&self) -> &'static str {
        self.action.name()
    }

    fn create<'a>(&'a self, client: &'a CloudClient, data: &'a mut ResourceData) -> OpFuture<'a> {
        async move {
            let id = self.action.execute(client, data).await?;
            let id = id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            tracing::info!("{} executed, id {}", self.name(), id);
            data.set_id(id);
            Ok(Vec::new())
        }
        .boxed()
    }

    fn read<'a>(&'a self, _client: &'a CloudClient, _data: &'a mut ResourceData) -> OpFuture<'a> {
        async { Ok(Vec::new()) }.boxed()
    }

    fn update<'a>(&'a self, _client: &'a CloudClient, _data: &'a mut ResourceData) -> OpFuture<'a> {
        async { Ok(Vec::new()) }.boxed()
    }

    fn delete<'a>(&'a self, _client: &'a CloudClient, data: &'a mut ResourceData) -> OpFuture<'a> {
        let name = self.name();
        data.clear_id();
        async move {
            Ok(vec![Diagnostic::warning(format!(
                "Deleting {name} resource is not supported. \
                 The {name} resource is only removed from the state."
            ))])
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::auth::Credentials;
    use crate::cloud::error::ApiError;
    use crate::cloud::http::HttpClient;
    use crate::resource::state::Severity;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Ping {
        calls: AtomicUsize,
        id: Option<&'static str>,
    }

    impl Action for Ping {
        fn name(&self) -> &'static str {
            "test_ping"
        }

        fn execute<'a>(
            &'a self,
            _client: &'a CloudClient,
            data: &'a mut ResourceData,
        ) -> BoxFuture<'a, Result<Option<String>>> {
            async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                data.set("pinged", Value::Bool(true));
                Ok(self.id.map(String::from))
            }
            .boxed()
        }
    }

    fn client() -> CloudClient {
        let http = HttpClient::new().unwrap();
        let creds = Credentials::from_token("t", http.clone());
        CloudClient::new("cn-north-4", "p1", "myhuaweicloud.com", creds, http)
    }

    #[tokio::test]
    async fn test_create_assigns_random_id() {
        let resource = ActionResource::new(Ping {
            calls: AtomicUsize::new(0),
            id: None,
        });
        let mut data = ResourceData::from_value(json!({"target": "x"}));

        let diags = resource.create(&client(), &mut data).await.unwrap();
        assert!(diags.is_empty());
        let id = data.id().unwrap().to_string();
        assert!(uuid::Uuid::parse_str(&id).is_ok());
        assert_eq!(data.get("pinged"), Some(&Value::Bool(true)));
        assert_eq!(resource.action.calls.load(Ordering::SeqCst), 1);

        // read and update leave the state untouched and never call out
        let before = data.clone();
        resource.read(&client(), &mut data).await.unwrap();
        resource.update(&client(), &mut data).await.unwrap();
        assert_eq!(data, before);
        assert_eq!(resource.action.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_create_keeps_returned_id() {
        let resource = ActionResource::new(Ping {
            calls: AtomicUsize::new(0),
            id: Some("exec-7"),
        });
        let mut data = ResourceData::new();
        resource.create(&client(), &mut data).await.unwrap();
        assert_eq!(data.id(), Some("exec-7"));
    }

    #[tokio::test]
    async fn test_delete_warns_and_forgets() {
        let resource = ActionResource::new(Ping {
            calls: AtomicUsize::new(0),
            id: Some("exec-1"),
        });
        let mut data = ResourceData::new();
        data.set_id("exec-1");

        let diags = resource.delete(&client(), &mut data).await.unwrap();
        assert_eq!(data.id(), None);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].severity, Severity::Warning);
        assert_eq!(
            diags[0].summary,
            concat!(
                "Deleting test_ping resource is not supported. ",
                "The test_ping resource is only removed from the state."
            )
        );
    }

    #[test]
    fn test_check_deleted_clears_id_on_404() {
        let mut data = ResourceData::new();
        data.set_id("cp-1");
        let err = anyhow::Error::new(ApiError::new(404, "{}"));

        let diags = check_deleted(&mut data, err, "error retrieving checkpoint").unwrap();
        assert!(diags.is_empty());
        assert_eq!(data.id(), None);
    }

    #[test]
    fn test_check_deleted_propagates_other_errors() {
        let mut data = ResourceData::new();
        data.set_id("cp-1");
        let err = anyhow::Error::new(ApiError::new(500, "{}"));

        let err = check_deleted(&mut data, err, "error retrieving checkpoint").unwrap_err();
        assert_eq!(err.to_string(), "error retrieving checkpoint");
        assert_eq!(data.id(), Some("cp-1"));
    }
}
