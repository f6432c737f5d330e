//! Cloud Client
//!
//! Main client for interacting with the service APIs, combining
//! authentication, endpoint resolution and HTTP functionality.

use super::auth::Credentials;
use super::error::status_of;
use super::http::HttpClient;
use crate::config::{AuthConfig, Config};
use anyhow::{Context, Result};
use reqwest::Method;
use serde_json::Value;
use std::collections::HashMap;
use url::Url;

/// Main cloud client
#[derive(Clone)]
pub struct CloudClient {
    pub credentials: Credentials,
    pub http: HttpClient,
    pub region: String,
    pub project_id: String,
    pub cloud: String,
    pub enterprise_project_id: Option<String>,
    endpoints: HashMap<String, String>,
}

impl CloudClient {
    /// Create a client from explicit parts
    pub fn new(
        region: &str,
        project_id: &str,
        cloud: &str,
        credentials: Credentials,
        http: HttpClient,
    ) -> Self {
        Self {
            credentials,
            http,
            region: region.to_string(),
            project_id: project_id.to_string(),
            cloud: cloud.to_string(),
            enterprise_project_id: None,
            endpoints: HashMap::new(),
        }
    }

    /// Create a client from the effective configuration.
    /// `region` / `project_id` take precedence over the config when given.
    pub fn from_config(
        config: &Config,
        region: Option<&str>,
        project_id: Option<&str>,
    ) -> Result<Self> {
        let region = region
            .map(String::from)
            .unwrap_or_else(|| config.effective_region());
        let project_id = project_id
            .map(String::from)
            .or_else(|| config.effective_project_id())
            .context("No project configured. Set HW_PROJECT_ID or use --project-id")?;
        let cloud = config.effective_cloud();
        let http = HttpClient::new()?;

        let mut endpoints = HashMap::new();
        for (service, endpoint) in &config.endpoints {
            endpoints.insert(service.clone(), normalize_endpoint(endpoint)?);
        }

        let credentials = match config.effective_auth() {
            Some(AuthConfig::Token { token }) => Credentials::from_token(&token, http.clone()),
            Some(AuthConfig::Password {
                domain_name,
                user_name,
                password,
            }) => {
                let iam = endpoints
                    .get("iam")
                    .cloned()
                    .unwrap_or_else(|| default_endpoint("iam", &region, &cloud));
                Credentials::from_password(
                    &iam,
                    &domain_name,
                    &user_name,
                    &password,
                    &project_id,
                    http.clone(),
                )
            },
            None => anyhow::bail!(
                "No credentials configured. Set HW_AUTH_TOKEN or add `auth` to the config file"
            ),
        };

        Ok(Self {
            credentials,
            http,
            region,
            project_id,
            cloud,
            enterprise_project_id: config.effective_enterprise_project_id(),
            endpoints,
        })
    }

    /// Override the endpoint of one service
    pub fn with_endpoint(mut self, service: &str, endpoint: &str) -> Result<Self> {
        self.endpoints
            .insert(service.to_string(), normalize_endpoint(endpoint)?);
        Ok(self)
    }

    /// Base endpoint of a service, always ending in `/`
    pub fn endpoint(&self, service: &str) -> String {
        self.endpoints
            .get(service)
            .cloned()
            .unwrap_or_else(|| default_endpoint(service, &self.region, &self.cloud))
    }

    /// Build a request URL from a template such as `v3/{project_id}/backups/{backup_id}`.
    /// Path parameters are percent-encoded.
    pub fn url(&self, service: &str, template: &str, params: &[(&str, &str)]) -> String {
        let mut path = template.replace("{project_id}", &self.project_id);
        for (key, value) in params {
            path = path.replace(&format!("{{{}}}", key), &urlencoding::encode(value));
        }
        format!("{}{}", self.endpoint(service), path)
    }

    /// Get the current access token
    pub async fn get_token(&self) -> Result<String> {
        self.credentials.get_token().await
    }

    /// Send a request. A 401 with IAM-issued credentials drops the cached
    /// token and retries once with a new one.
    pub async fn request(&self, method: Method, url: &str, body: Option<&Value>) -> Result<Value> {
        let token = self.get_token().await?;
        match self.http.request(method.clone(), url, &token, body).await {
            Err(err) if status_of(&err) == Some(401) && self.credentials.is_refreshable() => {
                tracing::warn!("token rejected for {} {}, fetching a new one", method, url);
                self.credentials.refresh_token().await;
                let token = self.get_token().await?;
                self.http.request(method, url, &token, body).await
            },
            result => result,
        }
    }

    pub async fn get(&self, url: &str) -> Result<Value> {
        self.request(Method::GET, url, None).await
    }

    pub async fn post(&self, url: &str, body: Option<&Value>) -> Result<Value> {
        self.request(Method::POST, url, body).await
    }

    pub async fn put(&self, url: &str, body: Option<&Value>) -> Result<Value> {
        self.request(Method::PUT, url, body).await
    }

    pub async fn delete(&self, url: &str, body: Option<&Value>) -> Result<Value> {
        self.request(Method::DELETE, url, body).await
    }
}

fn default_endpoint(service: &str, region: &str, cloud: &str) -> String {
    format!("https://{}.{}.{}/", service, region, cloud)
}

/// Validate an endpoint and make sure it ends with `/`
fn normalize_endpoint(endpoint: &str) -> Result<String> {
    let parsed =
        Url::parse(endpoint).with_context(|| format!("Invalid endpoint: {}", endpoint))?;
    let mut normalized = parsed.to_string();
    if !normalized.ends_with('/') {
        normalized.push('/');
    }
    Ok(normalized)
}
