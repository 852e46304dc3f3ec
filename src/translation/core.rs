/*!
 * Core translation service implementation.
 *
 * `DocumentTranslator` is the capability the pipeline needs from a language
 * model: one profiling call per document, one translate call per chunk, and
 * one conversion call per extracted diagram.
 * `TranslationService` implements it on top of the configured provider.
 */

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use log::debug;
use std::time::Instant;

use crate::app_config::{TranslationConfig, TranslationProvider as ConfigTranslationProvider};
use crate::errors::ProviderError;
use crate::providers::anthropic::{Anthropic, AnthropicRequest};
use crate::providers::openai::{OpenAI, OpenAIRequest};
use crate::providers::Provider;
use crate::translation::profile::{DocSource, GlossaryEntry, OutlineEntry};
use crate::translation::prompts::{render_diagram_prompt, ProfilePromptBuilder, PromptMessages, TranslationPromptBuilder};

/// Everything sent along with a chunk besides its text
#[derive(Debug, Clone, Default)]
pub struct ChunkContext {
    pub chunk_id: String,
    pub outline: Vec<OutlineEntry>,
    /// Glossary entries already filtered for this chunk
    pub glossary: Vec<GlossaryEntry>,
    pub style_rules: Vec<String>,
    /// Placeholder tokens the chunk contains, in order
    pub expected_tokens: Vec<String>,
}

impl ChunkContext {
    /// Render the prompt for this chunk
    pub fn prompt(&self, chunk_text: &str) -> PromptMessages {
        TranslationPromptBuilder::new()
            .with_outline(&self.outline)
            .with_glossary(&self.glossary)
            .with_style_rules(&self.style_rules)
            .with_placeholders(&self.expected_tokens)
            .build(chunk_text)
    }
}

/// Input of the profiling call
#[derive(Debug, Clone)]
pub struct ProfileRequest {
    pub content: String,
    pub source: DocSource,
    pub title_hint: Option<String>,
    pub source_language: String,
    pub target_language: String,
}

impl ProfileRequest {
    pub fn prompt(&self) -> PromptMessages {
        ProfilePromptBuilder::new(self.source.source_type.as_str(), &self.source.value)
            .with_languages(&self.source_language, &self.target_language)
            .with_title_hint(self.title_hint.as_deref())
            .build(&self.content)
    }
}

/// What the pipeline needs from a language model
#[async_trait]
pub trait DocumentTranslator: Send + Sync {
    /// Raw JSON text describing the document profile
    async fn profile(&self, request: &ProfileRequest) -> Result<String, ProviderError>;

    /// Translated Markdown for one protected chunk
    async fn translate(&self, chunk_text: &str, context: &ChunkContext) -> Result<String, ProviderError>;

    /// Raw JSON answer (`{"mermaid": "..."}`) for one Snapdown diagram
    async fn convert_diagram(&self, snapdown: &str) -> Result<String, ProviderError>;

    /// Model identifier written into the output meta section
    fn model_id(&self) -> String;
}

/// Translation provider implementation variants
#[derive(Debug, Clone)]
enum TranslationProviderImpl {
    /// OpenAI-compatible Chat Completions (Moonshot, OpenAI)
    OpenAI { client: OpenAI },

    /// Anthropic Messages API
    Anthropic { client: Anthropic },
}

/// Translation service backed by the configured provider
#[derive(Debug, Clone)]
pub struct TranslationService {
    provider: TranslationProviderImpl,

    /// Configuration for the translation service
    pub config: TranslationConfig,
}

impl TranslationService {
    /// Create a new translation service with the given configuration
    pub fn new(config: TranslationConfig) -> Result<Self> {
        let api_key = config.get_api_key();
        if api_key.trim().is_empty() {
            return Err(anyhow!(
                "No API key configured for {} (set {} or the config file)",
                config.provider.display_name(),
                config.provider.api_key_env()
            ));
        }
        let endpoint = config.get_endpoint();
        let timeout_secs = config.get_timeout_secs();

        let provider = match config.provider {
            ConfigTranslationProvider::Moonshot | ConfigTranslationProvider::OpenAI => {
                TranslationProviderImpl::OpenAI {
                    client: OpenAI::new(api_key, endpoint, timeout_secs),
                }
            }
            ConfigTranslationProvider::Anthropic => TranslationProviderImpl::Anthropic {
                client: Anthropic::new(api_key, endpoint, timeout_secs),
            },
        };

        Ok(Self { provider, config })
    }

    /// Send a tiny request to check credentials and model name
    pub async fn test_connection(&self) -> Result<(), ProviderError> {
        let model = self.config.get_model();
        match &self.provider {
            TranslationProviderImpl::OpenAI { client } => client.test_connection(&model).await,
            TranslationProviderImpl::Anthropic { client } => client.test_connection(&model).await,
        }
    }

    /// Send one system+user exchange and return the text of the answer
    async fn send(&self, messages: PromptMessages, json_mode: bool) -> Result<String, ProviderError> {
        let model = self.config.get_model();
        let common = &self.config.common;
        let start_time = Instant::now();

        let text = match &self.provider {
            TranslationProviderImpl::OpenAI { client } => {
                let mut request = OpenAIRequest::new(&model)
                    .add_message("system", messages.system)
                    .add_message("user", messages.user)
                    .temperature(common.temperature)
                    .max_tokens(common.max_tokens);
                if json_mode {
                    request = request.json_mode();
                }
                let response = client.complete(request).await?;
                OpenAI::extract_text(&response)
            }
            TranslationProviderImpl::Anthropic { client } => {
                let request = AnthropicRequest::new(&model, common.max_tokens)
                    .system(messages.system)
                    .add_message("user", messages.user)
                    .temperature(common.temperature);
                let response = client.complete(request).await?;
                Anthropic::extract_text(&response)
            }
        };

        debug!(
            "{} answered in {:?} ({} chars)",
            self.config.provider.display_name(),
            start_time.elapsed(),
            text.chars().count()
        );
        Ok(text)
    }
}

#[async_trait]
impl DocumentTranslator for TranslationService {
    async fn profile(&self, request: &ProfileRequest) -> Result<String, ProviderError> {
        self.send(request.prompt(), true).await
    }

    async fn translate(&self, chunk_text: &str, context: &ChunkContext) -> Result<String, ProviderError> {
        self.send(context.prompt(chunk_text), false).await
    }

    async fn convert_diagram(&self, snapdown: &str) -> Result<String, ProviderError> {
        self.send(render_diagram_prompt(snapdown), true).await
    }

    fn model_id(&self) -> String {
        format!("{}/{}", self.config.provider.to_lowercase_string(), self.config.get_model())
    }
}
