//! Error types for release-notes generation
//!
//! Errors are classified by recoverability:
//! - Retryable: network issues, timeouts, rate limits, provider 5xx
//! - NonRetryable: invalid input, malformed config, GraphQL errors
//! - RequiresUserAction: missing credentials, rejected API keys

use thiserror::Error;

use crate::config::ConfigError;
use crate::generation::GenerationError;
use crate::linear::client::LinearError;
use crate::validation::ValidationResult;

/// Error types for a generation run
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid request: {}", .0.error_summary())]
    Validation(ValidationResult),

    #[error("Linear API key not configured")]
    MissingLinearToken,

    #[error("Linear request failed: {0}")]
    Linear(#[from] LinearError),

    #[error("Text generation failed: {0}")]
    Generation(#[from] GenerationError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl PipelineError {
    /// Returns true if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            PipelineError::Linear(LinearError::Http(_))
            | PipelineError::Linear(LinearError::RateLimited { .. })
            | PipelineError::Generation(GenerationError::Http(_))
            | PipelineError::Generation(GenerationError::Timeout(_))
            | PipelineError::Generation(GenerationError::EmptyResponse) => true,
            PipelineError::Linear(LinearError::Api { status, .. }) => *status >= 500,
            PipelineError::Generation(GenerationError::Api { status, .. }) => {
                *status == 429 || *status >= 500
            }
            _ => false,
        }
    }

    /// Returns true if this error requires user action to resolve
    pub fn requires_user_action(&self) -> bool {
        match self {
            PipelineError::MissingLinearToken
            | PipelineError::Generation(GenerationError::NotConfigured(_)) => true,
            PipelineError::Linear(LinearError::Api { status, .. }) => {
                *status == 401 || *status == 403
            }
            PipelineError::Generation(GenerationError::Api { status, .. }) => {
                *status == 401 || *status == 403
            }
            _ => false,
        }
    }

    /// Get a user-friendly recovery suggestion
    pub fn recovery_suggestion(&self) -> &'static str {
        if self.requires_user_action() {
            return match self {
                PipelineError::MissingLinearToken => {
                    "Set LINEAR_API_KEY or linear.apiKey in ~/.shipnotes/config.json"
                }
                PipelineError::Linear(_) => "Check that your Linear API key is valid.",
                _ => "Check your AI provider credentials in ~/.shipnotes/config.json",
            };
        }
        match self {
            PipelineError::Validation(_) => "Fix the listed fields and try again.",
            PipelineError::Linear(LinearError::RateLimited { .. }) => {
                "Linear is rate limiting requests. Wait a minute and try again."
            }
            PipelineError::Linear(LinearError::Http(_)) => {
                "Check your internet connection and try again."
            }
            PipelineError::Linear(_) => "Check the Linear request and try again.",
            PipelineError::Generation(GenerationError::Timeout(_)) => {
                "The AI provider took too long. Try again or raise ai.timeoutSecs."
            }
            PipelineError::Generation(_) => "The AI provider failed. Try again shortly.",
            PipelineError::Config(_) => "Check your configuration in ~/.shipnotes/config.json",
            PipelineError::MissingLinearToken => {
                "Set LINEAR_API_KEY or linear.apiKey in ~/.shipnotes/config.json"
            }
        }
    }
}

/// Serializable error representation for API boundaries
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineFailure {
    pub message: String,
    pub error_type: ErrorType,
    pub can_retry: bool,
    pub recovery_suggestion: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorType {
    Retryable,
    NonRetryable,
    RequiresUserAction,
}

impl From<&PipelineError> for PipelineFailure {
    fn from(err: &PipelineError) -> Self {
        let error_type = if err.requires_user_action() {
            ErrorType::RequiresUserAction
        } else if err.is_retryable() {
            ErrorType::Retryable
        } else {
            ErrorType::NonRetryable
        };

        PipelineFailure {
            message: err.to_string(),
            error_type,
            can_retry: err.is_retryable(),
            recovery_suggestion: err.recovery_suggestion().to_string(),
        }
    }
}
