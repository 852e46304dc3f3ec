use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::errors::ProviderError;
use crate::providers::{error_from_response, Provider};

/// Anthropic client for interacting with Anthropic API
#[derive(Debug, Clone)]
pub struct Anthropic {
    /// HTTP client for API requests
    client: Client,
    /// API key for authentication
    api_key: String,
    /// API endpoint URL (optional, defaults to public API)
    endpoint: String,
}

/// Anthropic message request
#[derive(Debug, Clone, Serialize)]
pub struct AnthropicRequest {
    /// The model to use
    model: String,

    /// The messages for the conversation
    messages: Vec<AnthropicMessage>,

    /// System prompt to guide the AI
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,

    /// Temperature for generation
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,

    /// Maximum number of tokens to generate
    max_tokens: u32,
}

/// Anthropic message format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicMessage {
    /// Role of the message sender (user, assistant)
    pub role: String,

    /// Content of the message
    pub content: String,
}

/// Token usage information
#[derive(Debug, Clone, Deserialize)]
pub struct TokenUsage {
    /// Number of input tokens
    pub input_tokens: u32,
    /// Number of output tokens
    pub output_tokens: u32,
}

/// Anthropic response
#[derive(Debug, Clone, Deserialize)]
pub struct AnthropicResponse {
    /// The content of the response
    pub content: Vec<AnthropicContent>,
    /// Why generation stopped
    #[serde(default)]
    pub stop_reason: Option<String>,
    /// Token usage information
    pub usage: TokenUsage,
}

/// Individual content block in an Anthropic response
#[derive(Debug, Clone, Deserialize)]
pub struct AnthropicContent {
    /// The type of content
    #[serde(rename = "type")]
    pub content_type: String,

    /// The actual text content
    #[serde(default)]
    pub text: String,
}

impl AnthropicRequest {
    /// Create a new Anthropic request
    pub fn new(model: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            model: model.into(),
            messages: Vec::new(),
            system: None,
            temperature: None,
            max_tokens,
        }
    }

    /// Add a message to the request
    pub fn add_message(mut self, role: impl Into<String>, content: impl Into<String>) -> Self {
        self.messages.push(AnthropicMessage {
            role: role.into(),
            content: content.into(),
        });
        self
    }

    /// Set the system prompt
    pub fn system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Set the temperature
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

impl Anthropic {
    /// Create a new Anthropic client
    pub fn new(api_key: impl Into<String>, endpoint: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(timeout_secs))
                .build()
                .unwrap_or_default(),
            api_key: api_key.into(),
            endpoint: endpoint.into(),
        }
    }

    fn messages_url(&self) -> String {
        if self.endpoint.is_empty() {
            "https://api.anthropic.com/v1/messages".to_string()
        } else {
            format!("{}/v1/messages", self.endpoint.trim_end_matches('/'))
        }
    }

    /// A reply cut off by the token limit is unusable
    pub fn check_finished(response: &AnthropicResponse) -> Result<(), ProviderError> {
        if response.stop_reason.as_deref() == Some("max_tokens") {
            return Err(ProviderError::Truncated("max_tokens".to_string()));
        }
        if Self::extract_text(response).is_empty() {
            return Err(ProviderError::ParseError("Anthropic returned no text content".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Provider for Anthropic {
    type Request = AnthropicRequest;
    type Response = AnthropicResponse;

    /// Complete a messages request
    async fn complete(&self, request: AnthropicRequest) -> Result<AnthropicResponse, ProviderError> {
        let response = self.client.post(self.messages_url())
            .header("Content-Type", "application/json")
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::from_transport(&e))?;

        if !response.status().is_success() {
            return Err(error_from_response("Anthropic", response).await);
        }

        let anthropic_response = response.json::<AnthropicResponse>().await
            .map_err(|e| ProviderError::ParseError(format!("Failed to parse Anthropic API response: {}", e)))?;

        debug!(
            "Anthropic usage: {} input + {} output tokens",
            anthropic_response.usage.input_tokens, anthropic_response.usage.output_tokens
        );

        Self::check_finished(&anthropic_response)?;
        Ok(anthropic_response)
    }

    /// Test the connection to the Anthropic API
    async fn test_connection(&self, model: &str) -> Result<(), ProviderError> {
        let request = AnthropicRequest::new(model, 10)
            .add_message("user", "Hello");

        match self.complete(request).await {
            Ok(_) | Err(ProviderError::Truncated(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Extract text from Anthropic response
    fn extract_text(response: &AnthropicResponse) -> String {
        response.content.iter()
            .filter(|c| c.content_type == "text")
            .map(|c| c.text.as_str())
            .collect()
    }
}
