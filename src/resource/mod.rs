//! Resource abstraction layer
//!
//! Data sources are data-driven: their definitions are loaded from JSON files
//! at compile time, so a new list endpoint needs no code. Managed resources
//! implement [`lifecycle::ManagedResource`] in `crate::services`.
//!
//! # Architecture
//!
//! - [`registry`] - Loads and caches data source definitions from embedded JSON
//! - [`dispatch`] - Turns a definition plus attribute data into a REST call
//! - [`fetcher`] - Offset pagination and response flattening
//! - [`path`] - Path expressions over JSON responses
//! - [`query`] - Query string and request body builders
//! - [`state`] - Attribute data and diagnostics
//! - [`lifecycle`] - Resource CRUD contract and one-shot action resources
//!
//! # Data Source Definitions
//!
//! Data sources are defined in JSON files under `src/resources/`:
//! - `cbr.json` - Cloud Backup and Recovery (backups, vaults, operation logs)
//! - `swr.json` - SWR Enterprise (instances, namespaces)
//!
//! # Example
//!
//! ```ignore
//! use hwc_provider::resource::{fetch_data_source, ResourceData};
//!
//! async fn list_backups(client: &CloudClient) -> anyhow::Result<ResourceData> {
//!     let args = ResourceData::from_value(serde_json::json!({"vault_id": "..."}));
//!     fetch_data_source(client, "cbr_backups", &args).await
//! }
//! ```

pub mod dispatch;
mod fetcher;
pub mod lifecycle;
pub mod path;
pub mod query;
mod registry;
pub mod state;

pub use fetcher::{collect_offset_pages, fetch_data_source, flatten_record, Page};
pub use lifecycle::{check_deleted, Action, ActionResource, ManagedResource, OpFuture};
pub use path::path_search;
pub use registry::*;
pub use state::{Diagnostic, Diagnostics, ResourceData, Severity};
