//! Configuration loaded from `~/.shipnotes/config.json`.
//!
//! Every field has a serde default, so a partial (or missing) file is fine.
//! Credentials can also come from the environment; env values win.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::linear::client::LINEAR_API_URL;
use crate::prompts::{AiContext, Organization};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Could not find home directory")]
    HomeDirMissing,

    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Json(#[from] serde_json::Error),
}

fn default_linear_endpoint() -> String {
    LINEAR_API_URL.to_string()
}

fn default_page_size() -> u32 {
    100
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_gemini_model() -> String {
    "gemini-1.5-pro".to_string()
}

fn default_gemini_base_url() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

fn default_azure_api_version() -> String {
    "2024-06-01".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinearConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default = "default_linear_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

impl Default for LinearConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: default_linear_endpoint(),
            page_size: default_page_size(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AiProvider {
    /// Gemini if configured, else Azure OpenAI.
    #[default]
    Auto,
    Gemini,
    AzureOpenAi,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default = "default_gemini_model")]
    pub model: String,
    #[serde(default = "default_gemini_base_url")]
    pub base_url: String,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_gemini_model(),
            base_url: default_gemini_base_url(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AzureConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// e.g. `https://acme.openai.azure.com`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment: Option<String>,
    #[serde(default = "default_azure_api_version")]
    pub api_version: String,
}

impl Default for AzureConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: None,
            deployment: None,
            api_version: default_azure_api_version(),
        }
    }
}

impl AzureConfig {
    pub fn is_complete(&self) -> bool {
        [&self.api_key, &self.endpoint, &self.deployment]
            .iter()
            .all(|v| v.as_deref().is_some_and(|s| !s.trim().is_empty()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiConfig {
    #[serde(default)]
    pub provider: AiProvider,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub gemini: GeminiConfig,
    #[serde(default)]
    pub azure: AzureConfig,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            provider: AiProvider::Auto,
            timeout_secs: default_timeout_secs(),
            gemini: GeminiConfig::default(),
            azure: AzureConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub linear: LinearConfig,
    #[serde(default)]
    pub ai: AiConfig,
    /// Organization profile fed into prompt building.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<Organization>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_context: Option<AiContext>,
}

/// Get the canonical config file path (~/.shipnotes/config.json)
pub fn config_path() -> Result<PathBuf, ConfigError> {
    let home = dirs::home_dir().ok_or(ConfigError::HomeDirMissing)?;
    Ok(home.join(".shipnotes").join("config.json"))
}

/// Load config from `path`. A missing file yields defaults.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        log::debug!("No config at {}, using defaults", path.display());
        return Ok(Config::default());
    }

    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(serde_json::from_str(&content)?)
}

/// Load config from the default path and apply environment overrides.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_with(&config_path()?, |key| std::env::var(key).ok())
}

/// Load `path`, then overlay whatever `lookup` returns for the env keys.
pub fn load_config_with<F>(path: &Path, lookup: F) -> Result<Config, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = load_config_from(path)?;
    apply_env_overrides(&mut config, lookup);
    Ok(config)
}

/// Overlay credentials from the environment. `lookup` abstracts `env::var`.
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(v) = get("LINEAR_API_KEY") {
        config.linear.api_key = Some(v);
    }
    if let Some(v) = get("GEMINI_API_KEY") {
        config.ai.gemini.api_key = Some(v);
    }
    if let Some(v) = get("GEMINI_MODEL") {
        config.ai.gemini.model = v;
    }
    if let Some(v) = get("AZURE_OPENAI_API_KEY") {
        config.ai.azure.api_key = Some(v);
    }
    if let Some(v) = get("AZURE_OPENAI_ENDPOINT") {
        config.ai.azure.endpoint = Some(v);
    }
    if let Some(v) = get("AZURE_OPENAI_DEPLOYMENT") {
        config.ai.azure.deployment = Some(v);
    }
    if let Some(v) = get("AZURE_OPENAI_API_VERSION") {
        config.ai.azure.api_version = v;
    }
}
