//! Text generation providers for release-note drafts.

mod azure;
mod gemini;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::{AiConfig, AiProvider};

pub use azure::AzureOpenAiGenerator;
pub use gemini::GeminiGenerator;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Provider returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Generation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Provider returned no text")]
    EmptyResponse,

    #[error("Text generation not configured: {0}")]
    NotConfigured(String),
}

impl GenerationError {
    /// Classify a transport error, mapping reqwest timeouts to `Timeout`.
    pub(crate) fn from_send(err: reqwest::Error, timeout: Option<Duration>) -> Self {
        if err.is_timeout() {
            GenerationError::Timeout(timeout.unwrap_or_default())
        } else {
            GenerationError::Http(err)
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerateOptions {
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
    /// Per-request deadline. `None` waits indefinitely.
    pub timeout: Option<Duration>,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            temperature: Some(0.4),
            max_output_tokens: Some(4096),
            timeout: Some(Duration::from_secs(120)),
        }
    }
}

impl GenerateOptions {
    pub fn from_config(config: &AiConfig) -> Self {
        Self {
            timeout: Some(Duration::from_secs(config.timeout_secs)),
            ..Default::default()
        }
    }
}

/// A model that turns a system/user prompt pair into text.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    fn name(&self) -> &'static str;

    async fn generate(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        options: &GenerateOptions,
    ) -> Result<String, GenerationError>;
}

/// Reject blank output.
pub(crate) fn non_empty_output(text: String) -> Result<String, GenerationError> {
    if text.trim().is_empty() {
        Err(GenerationError::EmptyResponse)
    } else {
        Ok(text)
    }
}

/// Select the provider once from configuration.
pub fn create_generator(config: &AiConfig) -> Result<Box<dyn TextGenerator>, GenerationError> {
    match config.provider {
        AiProvider::Gemini => Ok(Box::new(GeminiGenerator::from_config(&config.gemini)?)),
        AiProvider::AzureOpenAi => Ok(Box::new(AzureOpenAiGenerator::from_config(&config.azure)?)),
        AiProvider::Auto => {
            let gemini_ready = config
                .gemini
                .api_key
                .as_deref()
                .is_some_and(|k| !k.trim().is_empty());
            if gemini_ready {
                return Ok(Box::new(GeminiGenerator::from_config(&config.gemini)?));
            }
            if config.azure.is_complete() {
                return Ok(Box::new(AzureOpenAiGenerator::from_config(&config.azure)?));
            }
            Err(GenerationError::NotConfigured(
                "set GEMINI_API_KEY, or AZURE_OPENAI_API_KEY with AZURE_OPENAI_ENDPOINT and AZURE_OPENAI_DEPLOYMENT"
                    .to_string(),
            ))
        }
    }
}
