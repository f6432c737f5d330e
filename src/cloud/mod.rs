//! Huawei Cloud API interaction module
//!
//! Core plumbing shared by every resource and data source: authentication,
//! the HTTP client, endpoint resolution, error classification and the
//! state-change waiter for long-running jobs.
//!
//! # Module Structure
//!
//! - [`auth`] - Static token or IAM password credentials with token caching
//! - [`client`] - Service client resolving endpoints and URL templates
//! - [`error`] - Typed API errors, 401/404 reinterpretation, multi-errors
//! - [`http`] - HTTP utilities for REST API calls
//! - [`wait`] - Polling until a job reaches a target state
//!
//! # Example
//!
//! ```ignore
//! use hwc_provider::cloud::client::CloudClient;
//! use hwc_provider::config::Config;
//!
//! async fn example() -> anyhow::Result<()> {
//!     let client = CloudClient::from_config(&Config::load(), None, None)?;
//!     let url = client.url("cbr", "v3/{project_id}/backups", &[]);
//!     let backups = client.get(&url).await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod client;
pub mod error;
pub mod http;
pub mod wait;
