//! Configuration parsing and validation.
//!
//! ragchat is configured via a TOML file (default: `config/ragchat.toml`).
//! Every section is optional; a missing file falls back to
//! [`Config::minimal`].
//!
//! # Example Configuration
//!
//! ```toml
//! [backend]
//! base_url = "http://localhost:8000"
//! timeout_secs = 30
//!
//! [session]
//! default_namespace = "default"
//! reset_conversation_on_namespace_change = false
//!
//! [ingest]
//! status_display_secs = 3
//! default_source = "user-upload"
//! ```
//!
//! # Environment
//!
//! `RAGCHAT_BACKEND_URL`, when set and non-empty, replaces `backend.base_url`.
//!
//! # Validation
//!
//! [`load_config`] rejects:
//! - a `base_url` that is not `http://` or `https://`
//! - `timeout_secs = 0`
//! - a blank `default_namespace`

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use ragchat_core::ingest::DEFAULT_SOURCE;
use ragchat_core::namespace::DEFAULT_NAMESPACE;

/// Environment variable overriding `backend.base_url`.
pub const BACKEND_URL_ENV: &str = "RAGCHAT_BACKEND_URL";

/// Top-level configuration.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
}

/// Where the RAG service lives.
#[derive(Debug, Deserialize, Clone)]
pub struct BackendConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl BackendConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct SessionConfig {
    #[serde(default = "default_namespace")]
    pub default_namespace: String,
    /// Start a fresh conversation (new session token) when the namespace changes.
    #[serde(default)]
    pub reset_conversation_on_namespace_change: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_namespace: default_namespace(),
            reset_conversation_on_namespace_change: false,
        }
    }
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    /// How long a success or error status stays visible.
    #[serde(default = "default_status_display_secs")]
    pub status_display_secs: u64,
    /// Value of the `source` row in a fresh metadata list.
    #[serde(default = "default_source")]
    pub default_source: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            status_display_secs: default_status_display_secs(),
            default_source: default_source(),
        }
    }
}

impl IngestConfig {
    pub fn status_display(&self) -> Duration {
        Duration::from_secs(self.status_display_secs)
    }
}

fn default_status_display_secs() -> u64 {
    3
}
fn default_source() -> String {
    DEFAULT_SOURCE.to_string()
}

impl Config {
    /// Built-in defaults, used when no config file exists.
    pub fn minimal() -> Self {
        Self::default()
    }

    /// Apply environment overrides in place.
    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(BACKEND_URL_ENV) {
            if !url.trim().is_empty() {
                self.backend.base_url = url.trim().to_string();
            }
        }
    }

    /// Check invariants that serde defaults cannot express.
    pub fn validate(&self) -> Result<()> {
        let url = self.backend.base_url.as_str();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            anyhow::bail!(
                "backend.base_url must start with http:// or https:// (got '{}')",
                url
            );
        }
        if self.backend.timeout_secs == 0 {
            anyhow::bail!("backend.timeout_secs must be > 0");
        }
        if self.session.default_namespace.trim().is_empty() {
            anyhow::bail!("session.default_namespace must not be empty");
        }
        Ok(())
    }
}

/// Parse a config string, apply no overrides, and validate it.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    config.validate()?;
    Ok(config)
}

/// Load the config at `path`, falling back to defaults when the file does
/// not exist, then apply environment overrides and validate.
pub fn load_config(path: &Path) -> Result<Config> {
    let mut config = if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content).with_context(|| "Failed to parse config file")?
    } else {
        tracing::debug!(path = %path.display(), "config file not found, using defaults");
        Config::minimal()
    };

    config.apply_env();
    config.validate()?;
    Ok(config)
}
