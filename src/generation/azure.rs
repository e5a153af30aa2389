//! Azure OpenAI chat completions provider.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::{non_empty_output, GenerateOptions, GenerationError, TextGenerator};
use crate::config::AzureConfig;

pub struct AzureOpenAiGenerator {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
    deployment: String,
    api_version: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

fn required(value: &Option<String>, env: &str) -> Result<String, GenerationError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| GenerationError::NotConfigured(format!("{} is not set", env)))
}

impl AzureOpenAiGenerator {
    pub fn new(
        api_key: impl Into<String>,
        endpoint: impl Into<String>,
        deployment: impl Into<String>,
        api_version: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            endpoint: endpoint.into(),
            deployment: deployment.into(),
            api_version: api_version.into(),
        }
    }

    pub fn from_config(config: &AzureConfig) -> Result<Self, GenerationError> {
        let endpoint = required(&config.endpoint, "AZURE_OPENAI_ENDPOINT")?;
        let parsed = url::Url::parse(&endpoint).map_err(|e| {
            GenerationError::NotConfigured(format!("AZURE_OPENAI_ENDPOINT is not a URL: {}", e))
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(GenerationError::NotConfigured(format!(
                "AZURE_OPENAI_ENDPOINT must be http(s), got {}",
                parsed.scheme()
            )));
        }

        Ok(Self::new(
            required(&config.api_key, "AZURE_OPENAI_API_KEY")?,
            endpoint,
            required(&config.deployment, "AZURE_OPENAI_DEPLOYMENT")?,
            config.api_version.clone(),
        ))
    }

    fn url(&self) -> String {
        format!(
            "{}/openai/deployments/{}/chat/completions",
            self.endpoint.trim_end_matches('/'),
            self.deployment
        )
    }
}

#[async_trait]
impl TextGenerator for AzureOpenAiGenerator {
    fn name(&self) -> &'static str {
        "azure-openai"
    }

    async fn generate(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        options: &GenerateOptions,
    ) -> Result<String, GenerationError> {
        let mut body = json!({
            "messages": [
                { "role": "system", "content": system_prompt },
                { "role": "user", "content": user_prompt },
            ],
        });
        if let Some(t) = options.temperature {
            body["temperature"] = json!(t);
        }
        if let Some(max) = options.max_output_tokens {
            body["max_tokens"] = json!(max);
        }

        let mut request = self
            .client
            .post(self.url())
            .query(&[("api-version", self.api_version.as_str())])
            .header("api-key", &self.api_key)
            .json(&body);
        if let Some(timeout) = options.timeout {
            request = request.timeout(timeout);
        }

        let resp = request
            .send()
            .await
            .map_err(|e| GenerationError::from_send(e, options.timeout))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(GenerationError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let completion: ChatCompletion = resp
            .json()
            .await
            .map_err(|e| GenerationError::from_send(e, options.timeout))?;

        let text = completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .unwrap_or_default();

        non_empty_output(text)
    }
}
