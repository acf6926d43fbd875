//! Configuration management for Botdesk
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{BotdeskError, Result};
use crate::i18n::{MessageCatalog, MessageKey};

/// Main configuration structure for Botdesk
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Platform API settings
    #[serde(default)]
    pub api: ApiConfig,

    /// Fixed project context, overriding the persisted active project
    #[serde(default)]
    pub project: ProjectConfig,

    /// Default generation parameters for chat
    #[serde(default)]
    pub chat: ChatConfig,

    /// Credential storage settings
    #[serde(default)]
    pub storage: StorageConfig,

    /// Per-key overrides of user-facing messages
    #[serde(default)]
    pub messages: HashMap<MessageKey, String>,
}

/// Platform API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the REST API, including any version prefix
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Wall-clock budget for ordinary (non-streaming) requests, in seconds
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

fn default_base_url() -> String {
    "http://localhost:8000/api/v1".to_string()
}

fn default_timeout_seconds() -> u64 {
    30
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

impl ApiConfig {
    /// Per-request timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// Fixed project context
///
/// When `project_id` is set it takes precedence over the project stored by
/// `botdesk project use`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub project_id: Option<String>,

    #[serde(default)]
    pub api_key: Option<String>,
}

/// Chat generation defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_top_k")]
    pub top_k: u32,
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_top_k() -> u32 {
    5
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            top_k: default_top_k(),
        }
    }
}

/// Credential storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Storage backend: "keyring" or "memory"
    #[serde(default = "default_backend")]
    pub backend: String,

    /// Keyring service name
    #[serde(default = "default_service")]
    pub service: String,
}

fn default_backend() -> String {
    "keyring".to_string()
}

fn default_service() -> String {
    "botdesk".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            service: default_service(),
        }
    }
}

impl Config {
    /// Load configuration from file with environment and CLI overrides
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the YAML configuration file
    /// * `cli` - CLI arguments for overrides
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| BotdeskError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| BotdeskError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        if let Ok(base_url) = std::env::var("BOTDESK_API_BASE") {
            tracing::debug!(base_url = %base_url, "Env override: BOTDESK_API_BASE");
            self.api.base_url = base_url;
        }

        if let Ok(timeout) = std::env::var("BOTDESK_TIMEOUT_SECONDS") {
            if let Ok(value) = timeout.parse() {
                self.api.timeout_seconds = value;
            } else {
                tracing::warn!("Invalid BOTDESK_TIMEOUT_SECONDS: {}", timeout);
            }
        }

        if let Ok(project_id) = std::env::var("BOTDESK_PROJECT_ID") {
            self.project.project_id = Some(project_id);
        }

        if let Ok(api_key) = std::env::var("BOTDESK_API_KEY") {
            self.project.api_key = Some(api_key);
        }

        if let Ok(backend) = std::env::var("BOTDESK_STORE") {
            tracing::debug!(backend = %backend, "Env override: BOTDESK_STORE");
            self.storage.backend = backend;
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if let Some(base_url) = &cli.api_base {
            self.api.base_url = base_url.clone();
        }
        if cli.verbose {
            tracing::debug!("Verbose mode enabled");
        }
    }

    /// Message catalog with this configuration's overrides applied.
    pub fn message_catalog(&self) -> MessageCatalog {
        MessageCatalog::with_overrides(self.messages.clone())
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns error if any validation check fails
    pub fn validate(&self) -> Result<()> {
        let url = url::Url::parse(&self.api.base_url).map_err(|e| {
            BotdeskError::Config(format!("Invalid api.base_url '{}': {}", self.api.base_url, e))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(BotdeskError::Config(format!(
                "api.base_url must use http or https, got {}",
                url.scheme()
            ))
            .into());
        }

        if self.api.timeout_seconds == 0 {
            return Err(
                BotdeskError::Config("api.timeout_seconds must be greater than 0".to_string())
                    .into(),
            );
        }

        if !(0.0..=2.0).contains(&self.chat.temperature) {
            return Err(BotdeskError::Config(
                "chat.temperature must be between 0.0 and 2.0".to_string(),
            )
            .into());
        }

        if self.chat.max_tokens == 0 {
            return Err(
                BotdeskError::Config("chat.max_tokens must be greater than 0".to_string()).into(),
            );
        }

        let valid_backends = ["keyring", "memory"];
        if !valid_backends.contains(&self.storage.backend.as_str()) {
            return Err(BotdeskError::Config(format!(
                "Invalid storage backend: {}. Must be one of: {}",
                self.storage.backend,
                valid_backends.join(", ")
            ))
            .into());
        }

        if self.project.api_key.is_some() && self.project.project_id.is_none() {
            return Err(BotdeskError::Config(
                "project.api_key requires project.project_id".to_string(),
            )
            .into());
        }

        Ok(())
    }
}
