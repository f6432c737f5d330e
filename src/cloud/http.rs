//! HTTP utilities for Huawei Cloud REST API calls

use super::error::{status_of, ApiError};
use anyhow::{Context, Result};
use reqwest::{Client, Method};
use serde_json::Value;

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

/// Header carrying the IAM token
pub const AUTH_TOKEN_HEADER: &str = "X-Auth-Token";

/// Sanitize response body for logging
/// Truncates long responses and drops non-printable characters
fn sanitize_for_log(body: &str) -> String {
    let truncated = if body.len() > MAX_LOG_BODY_LENGTH {
        let mut end = MAX_LOG_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... [truncated, {} bytes total]", &body[..end], body.len())
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| !c.is_ascii_graphic() && c != ' ', "")
}

/// HTTP client wrapper for REST API calls
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Create a new HTTP client
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("hwc-provider/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client })
    }

    /// Access the underlying client (used for unauthenticated IAM calls)
    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Send a request and parse the JSON response.
    /// Non-success statuses become an [`ApiError`]; an empty body becomes `Value::Null`.
    pub async fn request(
        &self,
        method: Method,
        url: &str,
        token: &str,
        body: Option<&Value>,
    ) -> Result<Value> {
        tracing::debug!("{} {}", method, url);

        let mut request = self
            .client
            .request(method, url)
            .header(AUTH_TOKEN_HEADER, token)
            .header(reqwest::header::CONTENT_TYPE, "application/json");

        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.context("Failed to send request")?;

        let status = response.status();
        let response_body = response
            .text()
            .await
            .context("Failed to read response body")?;

        if !status.is_success() {
            // Only log the sanitized/truncated body
            tracing::error!("API error: {} - {}", status, sanitize_for_log(&response_body));
            return Err(ApiError::new(status.as_u16(), response_body).into());
        }

        if response_body.trim().is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(&response_body).context("Failed to parse response JSON")
    }

    pub async fn get(&self, url: &str, token: &str) -> Result<Value> {
        self.request(Method::GET, url, token, None).await
    }

    pub async fn post(&self, url: &str, token: &str, body: Option<&Value>) -> Result<Value> {
        self.request(Method::POST, url, token, body).await
    }

    pub async fn put(&self, url: &str, token: &str, body: Option<&Value>) -> Result<Value> {
        self.request(Method::PUT, url, token, body).await
    }

    pub async fn delete(&self, url: &str, token: &str, body: Option<&Value>) -> Result<Value> {
        self.request(Method::DELETE, url, token, body).await
    }
}

/// Format an API error for display
/// Avoids echoing raw API bodies back to the user
pub fn format_api_error(error: &anyhow::Error) -> String {
    if let Some(status) = status_of(error) {
        return match status {
            401 => "Authentication failed. Check HW_AUTH_TOKEN or the configured IAM credentials."
                .to_string(),
            403 => "Permission denied. Check the IAM policies of the account.".to_string(),
            404 => "Resource not found.".to_string(),
            409 => "Resource conflict. The resource may already exist or be in use.".to_string(),
            429 => "Rate limit exceeded. Please try again later.".to_string(),
            400..=499 => "Invalid request. Check your parameters.".to_string(),
            _ => "Service temporarily unavailable. Please try again.".to_string(),
        };
    }

    // Truncate long error messages and remove potential sensitive data
    let error_str = format!("{:#}", error);
    let sanitized = error_str
        .chars()
        .filter(|c| c.is_ascii_graphic() || *c == ' ')
        .take(120)
        .collect::<String>();

    if sanitized.len() < error_str.len() {
        format!("{}...", sanitized)
    } else {
        sanitized
    }
}
