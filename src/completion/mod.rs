// Completion client module
// One-shot requests against an OpenAI-compatible chat endpoint

#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::config::CompletionConfig;
use crate::{PortfolioError, Result};

const DEFAULT_TIMEOUT_SECONDS: u64 = 60;

/// Client for the remote text-generation endpoint.
///
/// Each call is a single attempt with no retry or backoff; failures
/// surface as `PortfolioError::Completion` and the caller decides how
/// to present them.
pub struct CompletionClient {
    base_url: Url,
    model: String,
    temperature: f32,
    max_tokens: u32,
    api_key: String,
    agent: ureq::Agent,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: String,
}

impl CompletionClient {
    /// Build a client, reading the API key from the environment
    /// variable named in the configuration. A missing key is a
    /// startup-time configuration error, not a runtime one.
    #[inline]
    pub fn from_env(config: &CompletionConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            PortfolioError::Config(format!(
                "Missing API key: set the {} environment variable",
                config.api_key_env
            ))
        })?;

        Self::new(config, api_key)
    }

    #[inline]
    pub fn new(config: &CompletionConfig, api_key: String) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(PortfolioError::Config("API key is empty".to_string()));
        }

        let base_url = Url::parse(&config.base_url).map_err(|e| {
            PortfolioError::Config(format!("Invalid completion base URL: {e}"))
        })?;

        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(DEFAULT_TIMEOUT_SECONDS)))
            .build()
            .into();

        Ok(Self {
            base_url,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            api_key,
            agent,
        })
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();
        self
    }

    /// Send one completion request and return the generated text,
    /// trimmed. Single attempt.
    #[inline]
    pub fn complete(&self, prompt: &str) -> Result<String> {
        debug!("Requesting completion (prompt length: {})", prompt.len());

        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user",
                content: prompt.to_string(),
            }],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let url = self.chat_url()?;
        let request_json = serde_json::to_string(&request)
            .map_err(|e| PortfolioError::Completion(format!("Failed to serialize request: {e}")))?;

        let response_text = self
            .agent
            .post(url.as_str())
            .header("Content-Type", "application/json")
            .header("Authorization", &format!("Bearer {}", self.api_key))
            .send(&request_json)
            .and_then(|mut resp| resp.body_mut().read_to_string())
            .map_err(|e| match e {
                ureq::Error::StatusCode(status) => {
                    PortfolioError::Completion(format!("Completion endpoint returned HTTP {status}"))
                }
                other => PortfolioError::Completion(format!("Completion request failed: {other}")),
            })?;

        let response: ChatResponse = serde_json::from_str(&response_text)
            .map_err(|e| PortfolioError::Completion(format!("Failed to parse response: {e}")))?;

        let content = response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| {
                PortfolioError::Completion("Response contained no choices".to_string())
            })?;

        debug!("Completion returned {} chars", content.len());
        Ok(content.trim().to_string())
    }

    fn chat_url(&self) -> Result<Url> {
        // base_url may carry a path prefix ("/openai/v1"); join relative
        // to it rather than the host root
        let base = if self.base_url.path().ends_with('/') {
            self.base_url.clone()
        } else {
            Url::parse(&format!("{}/", self.base_url)).map_err(|e| {
                PortfolioError::Completion(format!("Failed to normalize base URL: {e}"))
            })?
        };

        base.join("chat/completions")
            .map_err(|e| PortfolioError::Completion(format!("Failed to build URL: {e}")))
    }
}

#[cfg(test)]
impl CompletionClient {
    pub(crate) fn model(&self) -> &str {
        &self.model
    }

    pub(crate) fn chat_endpoint(&self) -> Result<Url> {
        self.chat_url()
    }
}
