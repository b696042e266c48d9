//! # Client Configuration
//!
//! Where the waterfall server lives and which provider to ask for.
//!
//! Resolution order: defaults → `<runtime dir>/config.json` → environment.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

use crate::models::LlmProvider;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8787";

/// Resolved client configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the waterfall server (without the `/waterfall` path)
    pub base_url: String,
    /// Provider named in every request
    #[serde(default)]
    pub provider: LlmProvider,
    /// Connection timeout for both endpoints
    pub connect_timeout_secs: u64,
    /// Whole-request timeout for the non-streaming step endpoint
    pub step_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            provider: LlmProvider::Anthropic,
            connect_timeout_secs: 10,
            step_timeout_secs: 120,
        }
    }
}

impl ClientConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn step_timeout(&self) -> Duration {
        Duration::from_secs(self.step_timeout_secs)
    }

    /// Load from the runtime directory, then apply environment overrides
    pub async fn load() -> Result<Self> {
        let path = get_runtime_path().join("config.json");
        let persisted = PersistedConfig::load_from(&path).await?;
        let mut config = Self::default();
        config.merge(persisted);
        config.apply_env()?;
        Ok(config)
    }

    /// Overlay the fields a persisted config sets
    pub fn merge(&mut self, other: PersistedConfig) {
        if let Some(base_url) = other.base_url {
            self.base_url = base_url;
        }
        if let Some(provider) = other.provider {
            self.provider = provider;
        }
        if let Some(secs) = other.connect_timeout_secs {
            self.connect_timeout_secs = secs;
        }
        if let Some(secs) = other.step_timeout_secs {
            self.step_timeout_secs = secs;
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("WATERFALL_BASE_URL") {
            self.base_url = url;
        }
        if let Ok(provider) = std::env::var("WATERFALL_PROVIDER") {
            self.provider = provider
                .parse()
                .context("WATERFALL_PROVIDER is not a known provider")?;
        }
        Ok(())
    }
}

/// On-disk config: every field optional
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersistedConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<LlmProvider>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connect_timeout_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_timeout_secs: Option<u64>,
}

impl PersistedConfig {
    /// Read a config file; a missing file yields the empty config
    pub async fn load_from(path: &Path) -> Result<Self> {
        if fs::metadata(path).await.is_err() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config: {:?}", path))?;
        serde_json::from_str(&content).with_context(|| format!("Invalid config: {:?}", path))
    }

    pub async fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)
            .await
            .with_context(|| format!("Failed to write config: {:?}", path))
    }
}

/// Get the runtime directory path (.waterfall)
pub fn get_runtime_path() -> PathBuf {
    if let Ok(path) = std::env::var("WATERFALL_RUNTIME_PATH") {
        return PathBuf::from(path);
    }

    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(".waterfall")
}
