//! Authentication
//!
//! Supplies the `X-Auth-Token` header, either from a static token or by
//! exchanging IAM password credentials for a project-scoped token.

use super::http::HttpClient;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Token expiry buffer - refresh tokens this much before they actually expire
const TOKEN_EXPIRY_BUFFER: Duration = Duration::from_secs(60);

/// Default token TTL if we can't determine expiry (conservative: 30 minutes)
const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(30 * 60);

/// Response header holding a freshly issued token
const SUBJECT_TOKEN_HEADER: &str = "X-Subject-Token";

#[derive(Clone)]
enum TokenSource {
    Static(String),
    Password {
        iam_endpoint: String,
        domain_name: String,
        user_name: String,
        password: String,
        project_id: String,
    },
}

/// Credentials holder with token caching
#[derive(Clone)]
pub struct Credentials {
    source: TokenSource,
    http: HttpClient,
    token_cache: Arc<RwLock<Option<CachedToken>>>,
}

#[derive(Clone)]
struct CachedToken {
    token: String,
    /// When this token expires (with buffer applied)
    expires_at: Instant,
}

impl CachedToken {
    fn is_valid(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

impl Credentials {
    /// Use a pre-issued token as-is
    pub fn from_token(token: &str, http: HttpClient) -> Self {
        Self {
            source: TokenSource::Static(token.to_string()),
            http,
            token_cache: Arc::new(RwLock::new(None)),
        }
    }

    /// Exchange user credentials at `iam_endpoint`,
    /// e.g. `https://iam.cn-north-4.myhuaweicloud.com/`
    pub fn from_password(
        iam_endpoint: &str,
        domain_name: &str,
        user_name: &str,
        password: &str,
        project_id: &str,
        http: HttpClient,
    ) -> Self {
        Self {
            source: TokenSource::Password {
                iam_endpoint: iam_endpoint.to_string(),
                domain_name: domain_name.to_string(),
                user_name: user_name.to_string(),
                password: password.to_string(),
                project_id: project_id.to_string(),
            },
            http,
            token_cache: Arc::new(RwLock::new(None)),
        }
    }

    /// Get a token for API calls, reusing the cached one while it is valid
    pub async fn get_token(&self) -> Result<String> {
        let (iam_endpoint, domain_name, user_name, password, project_id) = match &self.source {
            TokenSource::Static(token) => return Ok(token.clone()),
            TokenSource::Password {
                iam_endpoint,
                domain_name,
                user_name,
                password,
                project_id,
            } => (iam_endpoint, domain_name, user_name, password, project_id),
        };

        {
            let cache = self.token_cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.is_valid() {
                    return Ok(cached.token.clone());
                }
                tracing::debug!("Cached token expired, fetching new token");
            }
        }

        let url = format!("{}v3/auth/tokens", iam_endpoint);
        let body = json!({
            "auth": {
                "identity": {
                    "methods": ["password"],
                    "password": {
                        "user": {
                            "name": user_name,
                            "password": password,
                            "domain": {"name": domain_name}
                        }
                    }
                },
                "scope": {"project": {"id": project_id}}
            }
        });

        tracing::debug!("POST {}", url);
        let response = self
            .http
            .inner()
            .post(&url)
            .json(&body)
            .send()
            .await
            .context("Failed to request IAM token")?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow::anyhow!("IAM token request failed: {}", status));
        }

        let token = response
            .headers()
            .get(SUBJECT_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(String::from)
            .context("IAM response carries no X-Subject-Token header")?;

        let payload: Value = response.json().await.unwrap_or(Value::Null);
        let ttl = payload
            .pointer("/token/expires_at")
            .and_then(|v| v.as_str())
            .and_then(|s| token_ttl(s, Utc::now()))
            .unwrap_or(DEFAULT_TOKEN_TTL);

        let mut cache = self.token_cache.write().await;
        *cache = Some(CachedToken {
            token: token.clone(),
            expires_at: Instant::now() + ttl,
        });

        tracing::info!("Obtained IAM token valid for {}s", ttl.as_secs());
        Ok(token)
    }

    /// Whether a new token can be obtained after a rejection
    pub fn is_refreshable(&self) -> bool {
        matches!(self.source, TokenSource::Password { .. })
    }

    /// Drop the cached token so the next call fetches a new one
    pub async fn refresh_token(&self) {
        let mut cache = self.token_cache.write().await;
        *cache = None;
    }
}

/// Remaining lifetime of a token expiring at `expires_at`, minus the refresh buffer
fn token_ttl(expires_at: &str, now: DateTime<Utc>) -> Option<Duration> {
    let expires = DateTime::parse_from_rfc3339(expires_at).ok()?;
    let remaining = expires.with_timezone(&Utc) - now;
    let remaining = remaining.to_std().ok()?;
    Some(remaining.saturating_sub(TOKEN_EXPIRY_BUFFER))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_token_ttl_applies_buffer() {
        let now = Utc.with_ymd_and_hms(2026, 10, 17, 8, 0, 0).unwrap();
        let ttl = token_ttl("2026-10-17T09:00:00.000000Z", now).unwrap();
        assert_eq!(ttl, Duration::from_secs(3600 - 60));
    }

    #[test]
    fn test_token_ttl_expired_or_invalid() {
        let now = Utc.with_ymd_and_hms(2026, 10, 17, 8, 0, 0).unwrap();
        assert!(token_ttl("2026-10-17T07:00:00Z", now).is_none());
        assert!(token_ttl("yesterday", now).is_none());
        assert_eq!(
            token_ttl("2026-10-17T08:00:30Z", now),
            Some(Duration::ZERO)
        );
    }

    #[tokio::test]
    async fn test_static_token() {
        let creds = Credentials::from_token("abc", HttpClient::new().unwrap());
        assert_eq!(creds.get_token().await.unwrap(), "abc");
        assert!(!creds.is_refreshable());
    }
}
