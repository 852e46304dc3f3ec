/*!
 * OpenAI-compatible Chat Completions client.
 *
 * Moonshot (Kimi) exposes the same API under a different base URL, so one
 * client covers both.
 */

use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::errors::ProviderError;
use crate::providers::{error_from_response, Provider};

/// OpenAI-compatible client
#[derive(Debug, Clone)]
pub struct OpenAI {
    /// HTTP client for API requests
    client: Client,
    /// API key for authentication
    api_key: String,
    /// Base URL ending in `/v1`
    endpoint: String,
}

/// Chat completion request
#[derive(Debug, Clone, Serialize)]
pub struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

/// Chat message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIMessage {
    pub role: String,
    #[serde(default)]
    pub content: Option<String>,
}

/// `{"type": "json_object"}` switches on JSON mode
#[derive(Debug, Clone, Serialize)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub format_type: String,
}

/// Chat completion response
#[derive(Debug, Clone, Deserialize)]
pub struct OpenAIResponse {
    #[serde(default)]
    pub choices: Vec<OpenAIChoice>,
    #[serde(default)]
    pub usage: Option<OpenAIUsage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenAIChoice {
    pub message: OpenAIMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Token usage information
#[derive(Debug, Clone, Deserialize)]
pub struct OpenAIUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl OpenAIRequest {
    /// Create a new request for `model`
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            messages: Vec::new(),
            temperature: None,
            max_tokens: None,
            response_format: None,
        }
    }

    /// Add a message to the request
    pub fn add_message(mut self, role: impl Into<String>, content: impl Into<String>) -> Self {
        self.messages.push(OpenAIMessage {
            role: role.into(),
            content: Some(content.into()),
        });
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Ask for a JSON object answer
    pub fn json_mode(mut self) -> Self {
        self.response_format = Some(ResponseFormat {
            format_type: "json_object".to_string(),
        });
        self
    }
}

impl OpenAI {
    /// Create a new client
    pub fn new(api_key: impl Into<String>, endpoint: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(timeout_secs))
                .pool_idle_timeout(Duration::from_secs(90))
                .build()
                .unwrap_or_default(),
            api_key: api_key.into(),
            endpoint: endpoint.into(),
        }
    }

    fn completions_url(&self) -> String {
        let base = if self.endpoint.is_empty() {
            "https://api.openai.com/v1"
        } else {
            self.endpoint.trim_end_matches('/')
        };
        format!("{}/chat/completions", base)
    }

    /// The first choice must exist and have stopped on its own
    pub fn check_finished(response: &OpenAIResponse) -> Result<(), ProviderError> {
        let choice = response
            .choices
            .first()
            .ok_or_else(|| ProviderError::ParseError("chat completion returned no choices".to_string()))?;
        match choice.finish_reason.as_deref() {
            Some("stop") => {}
            other => return Err(ProviderError::Truncated(other.unwrap_or("none").to_string())),
        }
        match choice.message.content.as_deref() {
            Some(content) if !content.is_empty() => Ok(()),
            _ => Err(ProviderError::ParseError("chat completion returned empty content".to_string())),
        }
    }
}

#[async_trait]
impl Provider for OpenAI {
    type Request = OpenAIRequest;
    type Response = OpenAIResponse;

    async fn complete(&self, request: OpenAIRequest) -> Result<OpenAIResponse, ProviderError> {
        let response = self
            .client
            .post(self.completions_url())
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::from_transport(&e))?;

        if !response.status().is_success() {
            return Err(error_from_response("OpenAI", response).await);
        }

        let parsed = response
            .json::<OpenAIResponse>()
            .await
            .map_err(|e| ProviderError::ParseError(e.to_string()))?;

        if let Some(usage) = &parsed.usage {
            debug!(
                "OpenAI usage: {} prompt + {} completion tokens",
                usage.prompt_tokens, usage.completion_tokens
            );
        }

        Self::check_finished(&parsed)?;
        Ok(parsed)
    }

    async fn test_connection(&self, model: &str) -> Result<(), ProviderError> {
        let request = OpenAIRequest::new(model).add_message("user", "Hello").max_tokens(10);
        match self.complete(request).await {
            Ok(_) | Err(ProviderError::Truncated(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn extract_text(response: &OpenAIResponse) -> String {
        response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default()
    }
}
