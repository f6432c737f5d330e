//! Configuration Management
//!
//! Handles persistent configuration storage for hwc and the environment
//! overrides the provider has always honoured.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Region used when nothing else is configured
pub const DEFAULT_REGION: &str = "cn-north-4";

/// Domain suffix of the public cloud endpoints
pub const DEFAULT_CLOUD: &str = "myhuaweicloud.com";

/// How requests are authenticated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthConfig {
    /// A pre-issued IAM token
    Token { token: String },
    /// IAM user password, exchanged for a project-scoped token
    Password {
        domain_name: String,
        user_name: String,
        password: String,
    },
}

/// User configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
    /// Endpoint domain suffix, e.g. `myhuaweicloud.com`
    #[serde(default)]
    pub cloud: Option<String>,
    #[serde(default)]
    pub enterprise_project_id: Option<String>,
    /// Per-service endpoint overrides, e.g. `{"cbr": "https://cbr.internal/"}`
    #[serde(default)]
    pub endpoints: HashMap<String, String>,
    #[serde(default)]
    pub auth: Option<AuthConfig>,
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

impl Config {
    /// Get the config file path
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("hwc").join("config.json"))
    }

    /// Load configuration from disk
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };
        Self::load_from(&path)
    }

    /// Load from a specific file; missing or corrupt files give the defaults
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!("Ignoring unreadable config {:?}: {}", path, e);
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        let Some(path) = Self::config_path() else {
            return Ok(());
        };
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {:?}", parent))?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        Ok(())
    }

    /// Get effective region (env > config > default)
    pub fn effective_region(&self) -> String {
        env_var("HW_REGION_NAME")
            .or_else(|| self.region.clone())
            .unwrap_or_else(|| DEFAULT_REGION.to_string())
    }

    /// Get effective project (env > config)
    pub fn effective_project_id(&self) -> Option<String> {
        env_var("HW_PROJECT_ID").or_else(|| self.project_id.clone())
    }

    pub fn effective_cloud(&self) -> String {
        env_var("HW_CLOUD")
            .or_else(|| self.cloud.clone())
            .unwrap_or_else(|| DEFAULT_CLOUD.to_string())
    }

    pub fn effective_enterprise_project_id(&self) -> Option<String> {
        env_var("HW_ENTERPRISE_PROJECT_ID").or_else(|| self.enterprise_project_id.clone())
    }

    /// Get effective credentials (HW_AUTH_TOKEN > config)
    pub fn effective_auth(&self) -> Option<AuthConfig> {
        env_var("HW_AUTH_TOKEN")
            .map(|token| AuthConfig::Token { token })
            .or_else(|| self.auth.clone())
    }

    /// Set region and save
    pub fn set_region(&mut self, region: &str) -> Result<()> {
        self.region = Some(region.to_string());
        self.save()
    }

    /// Set project and save
    pub fn set_project(&mut self, project_id: &str) -> Result<()> {
        self.project_id = Some(project_id.to_string());
        self.save()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("hwc-config-test-{}", uuid::Uuid::new_v4()))
            .join(name)
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let config = Config::load_from(&scratch_path("absent.json"));
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_corrupt_file_gives_defaults() {
        let path = scratch_path("config.json");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{not json").unwrap();
        assert_eq!(Config::load_from(&path), Config::default());
    }

    #[test]
    fn test_save_and_reload() {
        let path = scratch_path("config.json");
        let mut config = Config {
            region: Some("ap-southeast-1".to_string()),
            project_id: Some("0123".to_string()),
            auth: Some(AuthConfig::Password {
                domain_name: "acme".to_string(),
                user_name: "ops".to_string(),
                password: "secret".to_string(),
            }),
            ..Default::default()
        };
        config
            .endpoints
            .insert("cbr".to_string(), "https://cbr.example/".to_string());

        config.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path), config);
    }

    #[test]
    fn test_auth_config_tagging() {
        let parsed: AuthConfig =
            serde_json::from_str(r#"{"type":"token","token":"abc"}"#).unwrap();
        assert_eq!(
            parsed,
            AuthConfig::Token {
                token: "abc".to_string()
            }
        );
    }
}
