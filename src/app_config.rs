use anyhow::{anyhow, Context, Result};
use log::{warn, LevelFilter};
use serde::{Deserialize, Serialize};
use std::default::Default;
use std::path::Path;

/// Application configuration module
/// This module handles the application configuration including loading,
/// validating and saving configuration settings.
/// Represents the application configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// Source language code
    #[serde(default = "default_source_language")]
    pub source_language: String,

    /// Target language code
    #[serde(default = "default_target_language")]
    pub target_language: String,

    /// Translation config
    #[serde(default)]
    pub translation: TranslationConfig,

    /// Chunking and concurrency
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Per-chunk glossary limits
    #[serde(default)]
    pub glossary: GlossaryConfig,

    /// Reader service settings for URL sources
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,
}

/// Translation provider type
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TranslationProvider {
    // @provider: Moonshot (Kimi, OpenAI-compatible)
    #[default]
    Moonshot,
    // @provider: OpenAI
    OpenAI,
    // @provider: Anthropic
    Anthropic,
}

impl TranslationProvider {
    // @returns: Capitalized provider name
    pub fn display_name(&self) -> &str {
        match self {
            Self::Moonshot => "Moonshot",
            Self::OpenAI => "OpenAI",
            Self::Anthropic => "Anthropic",
        }
    }

    // @returns: Lowercase provider identifier
    pub fn to_lowercase_string(&self) -> String {
        match self {
            Self::Moonshot => "moonshot".to_string(),
            Self::OpenAI => "openai".to_string(),
            Self::Anthropic => "anthropic".to_string(),
        }
    }

    // @returns: Environment variable holding the API key
    pub fn api_key_env(&self) -> &'static str {
        match self {
            Self::Moonshot => "MOONSHOT_API_KEY",
            Self::OpenAI => "OPENAI_API_KEY",
            Self::Anthropic => "ANTHROPIC_API_KEY",
        }
    }
}

impl std::fmt::Display for TranslationProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_lowercase_string())
    }
}

impl std::str::FromStr for TranslationProvider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "moonshot" | "kimi" => Ok(Self::Moonshot),
            "openai" => Ok(Self::OpenAI),
            "anthropic" => Ok(Self::Anthropic),
            _ => Err(anyhow!("Invalid provider type: {}", s)),
        }
    }
}

/// Provider configuration wrapper
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ProviderConfig {
    // @field: Provider type identifier
    #[serde(rename = "type")]
    pub provider_type: String,

    // @field: Model name
    #[serde(default = "String::new")]
    pub model: String,

    // @field: API key
    #[serde(default = "String::new")]
    pub api_key: String,

    // @field: Service URL
    #[serde(default = "String::new")]
    pub endpoint: String,

    // @field: Timeout seconds
    #[serde(default = "default_provider_timeout_secs")]
    pub timeout_secs: u64,
}

impl ProviderConfig {
    // @param provider_type: Provider enum
    // @returns: Provider config with defaults
    pub fn new(provider_type: TranslationProvider) -> Self {
        Self {
            provider_type: provider_type.to_lowercase_string(),
            model: default_model(provider_type),
            api_key: String::new(),
            endpoint: default_endpoint(provider_type),
            timeout_secs: default_provider_timeout_secs(),
        }
    }
}

/// Translation service configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TranslationConfig {
    /// Translation provider to use
    #[serde(default)]
    pub provider: TranslationProvider,

    /// Available translation providers
    #[serde(default)]
    pub available_providers: Vec<ProviderConfig>,

    /// Common translation settings
    #[serde(default)]
    pub common: TranslationCommonConfig,
}

/// Common translation settings applicable to all providers
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TranslationCommonConfig {
    /// Retries after the first attempt for transient failures
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,

    /// Base backoff in milliseconds, doubled on each retry
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Upper bound for a single backoff delay
    #[serde(default = "default_retry_max_backoff_ms")]
    pub retry_max_backoff_ms: u64,

    /// Temperature parameter for text generation (0.0 to 1.0)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Completion token limit per request
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for TranslationCommonConfig {
    fn default() -> Self {
        Self {
            retry_count: default_retry_count(),
            retry_backoff_ms: default_retry_backoff_ms(),
            retry_max_backoff_ms: default_retry_max_backoff_ms(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

/// Chunking and worker pool settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PipelineConfig {
    /// Number of chunks translated in parallel
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Soft limit for chunk size, in characters
    #[serde(default = "default_max_chunk_chars")]
    pub max_chunk_chars: usize,

    /// Convert extracted Snapdown diagrams to Mermaid with the model
    #[serde(default = "default_true")]
    pub snapdown_mermaid: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            max_chunk_chars: default_max_chunk_chars(),
            snapdown_mermaid: true,
        }
    }
}

/// Limits for the glossary subset sent with each chunk
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GlossaryConfig {
    #[serde(default = "default_glossary_max_terms")]
    pub max_terms_per_chunk: usize,

    #[serde(default = "default_glossary_max_chars")]
    pub max_chars_per_chunk: usize,
}

impl Default for GlossaryConfig {
    fn default() -> Self {
        Self {
            max_terms_per_chunk: default_glossary_max_terms(),
            max_chars_per_chunk: default_glossary_max_chars(),
        }
    }
}

/// Reader service configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct FetchConfig {
    /// Reader endpoint, the page URL is appended to it
    #[serde(default = "default_reader_endpoint")]
    pub reader_endpoint: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Fetched documents shorter than this are rejected
    #[serde(default = "default_min_content_length")]
    pub min_content_length: usize,

    #[serde(default = "default_fetch_attempts")]
    pub max_attempts: u32,

    /// Optional reader API key
    #[serde(default = "String::new")]
    pub api_key: String,

    /// Also download the page HTML and pull out Snapdown diagram scripts
    #[serde(default = "default_true")]
    pub extract_snapdown: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            reader_endpoint: default_reader_endpoint(),
            timeout_secs: default_timeout_secs(),
            min_content_length: default_min_content_length(),
            max_attempts: default_fetch_attempts(),
            api_key: String::new(),
            extract_snapdown: true,
        }
    }
}

/// Log verbosity level
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn to_level_filter(self) -> LevelFilter {
        match self {
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

fn default_source_language() -> String {
    "en".to_string()
}

fn default_target_language() -> String {
    "zh-CN".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_provider_timeout_secs() -> u64 {
    180
}

fn default_retry_count() -> u32 {
    4 // 5 attempts in total
}

fn default_retry_backoff_ms() -> u64 {
    1000
}

fn default_retry_max_backoff_ms() -> u64 {
    20_000
}

fn default_temperature() -> f32 {
    0.3
}

fn default_max_tokens() -> u32 {
    8192
}

fn default_concurrency() -> usize {
    3
}

fn default_max_chunk_chars() -> usize {
    8000
}

fn default_glossary_max_terms() -> usize {
    30
}

fn default_glossary_max_chars() -> usize {
    2000
}

fn default_reader_endpoint() -> String {
    "https://r.jina.ai/".to_string()
}

fn default_min_content_length() -> usize {
    200
}

fn default_true() -> bool {
    true
}

fn default_fetch_attempts() -> u32 {
    3
}

fn default_endpoint(provider: TranslationProvider) -> String {
    match provider {
        TranslationProvider::Moonshot => "https://api.moonshot.cn/v1".to_string(),
        TranslationProvider::OpenAI => "https://api.openai.com/v1".to_string(),
        TranslationProvider::Anthropic => "https://api.anthropic.com".to_string(),
    }
}

fn default_model(provider: TranslationProvider) -> String {
    match provider {
        TranslationProvider::Moonshot => "kimi-k2-0905-preview".to_string(),
        TranslationProvider::OpenAI => "gpt-4o-mini".to_string(),
        TranslationProvider::Anthropic => "claude-3-5-sonnet-latest".to_string(),
    }
}

/// Parse a positive integer, ignoring blanks and garbage
fn parse_positive(raw: &str) -> Option<usize> {
    raw.trim().parse::<usize>().ok().filter(|v| *v > 0)
}

impl Config {
    /// Load `path`, or write a default config there when it does not exist
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to open config file: {}", path.display()))?;
            let config: Config = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
            return Ok(config);
        }

        warn!("Config file not found at '{}', creating default config.", path.display());
        let config = Config::default();
        let config_json =
            serde_json::to_string_pretty(&config).context("Failed to serialize default config to JSON")?;
        std::fs::write(path, config_json)
            .with_context(|| format!("Failed to write default config to file: {}", path.display()))?;
        Ok(config)
    }

    /// Apply environment overrides from the process environment
    pub fn apply_env_overrides(&mut self) {
        self.apply_env_with(|name| std::env::var(name).ok());
    }

    /// Apply environment overrides from an arbitrary lookup
    pub fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_blank = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        for provider in [
            TranslationProvider::Moonshot,
            TranslationProvider::OpenAI,
            TranslationProvider::Anthropic,
        ] {
            if let Some(key) = non_blank(provider.api_key_env()) {
                let entry = self.translation.provider_config_mut(provider);
                if entry.api_key.is_empty() {
                    entry.api_key = key;
                }
            }
        }

        if let Some(model) = non_blank("MOONSHOT_MODEL") {
            self.translation.provider_config_mut(TranslationProvider::Moonshot).model = model;
        }
        if let Some(endpoint) = non_blank("MOONSHOT_BASE_URL") {
            self.translation.provider_config_mut(TranslationProvider::Moonshot).endpoint = endpoint;
        }

        if self.fetch.api_key.is_empty() {
            if let Some(key) = non_blank("JINA_API_KEY") {
                self.fetch.api_key = key;
            }
        }

        if let Some(v) = lookup("NOTEZH_GLOSSARY_MAX_TERMS").as_deref().and_then(parse_positive) {
            self.glossary.max_terms_per_chunk = v;
        }
        if let Some(v) = lookup("NOTEZH_GLOSSARY_MAX_CHARS").as_deref().and_then(parse_positive) {
            self.glossary.max_chars_per_chunk = v;
        }
    }

    /// Validate the configuration for consistency and required values
    ///
    /// `needs_model` is false for debug commands that never call a provider.
    pub fn validate(&self, needs_model: bool) -> Result<()> {
        if self.pipeline.concurrency == 0 {
            return Err(anyhow!("pipeline.concurrency must be at least 1"));
        }
        if self.pipeline.max_chunk_chars == 0 {
            return Err(anyhow!("pipeline.max_chunk_chars must be at least 1"));
        }
        if self.target_language.trim().is_empty() {
            return Err(anyhow!("target_language must not be empty"));
        }

        if needs_model && self.translation.get_api_key().is_empty() {
            return Err(anyhow!(
                "Translation API key is required for {} provider (set it in the config or {})",
                self.translation.provider.display_name(),
                self.translation.provider.api_key_env()
            ));
        }

        Ok(())
    }
}

/// Default implementation for Config
impl Default for Config {
    fn default() -> Self {
        Config {
            source_language: default_source_language(),
            target_language: default_target_language(),
            translation: TranslationConfig::default(),
            pipeline: PipelineConfig::default(),
            glossary: GlossaryConfig::default(),
            fetch: FetchConfig::default(),
            log_level: LogLevel::default(),
        }
    }
}

impl TranslationConfig {
    /// Get the active provider configuration from the available_providers array
    pub fn get_active_provider_config(&self) -> Option<&ProviderConfig> {
        self.get_provider_config(&self.provider)
    }

    /// Get a specific provider configuration by type
    pub fn get_provider_config(&self, provider_type: &TranslationProvider) -> Option<&ProviderConfig> {
        let provider_str = provider_type.to_lowercase_string();
        self.available_providers.iter().find(|p| p.provider_type == provider_str)
    }

    /// Mutable access to a provider entry, added with defaults when missing
    pub fn provider_config_mut(&mut self, provider_type: TranslationProvider) -> &mut ProviderConfig {
        let provider_str = provider_type.to_lowercase_string();
        let position = match self.available_providers.iter().position(|p| p.provider_type == provider_str) {
            Some(position) => position,
            None => {
                self.available_providers.push(ProviderConfig::new(provider_type));
                self.available_providers.len() - 1
            }
        };
        &mut self.available_providers[position]
    }

    /// Get the model for the active provider
    pub fn get_model(&self) -> String {
        self.get_active_provider_config()
            .map(|p| p.model.clone())
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| default_model(self.provider))
    }

    /// Get the API key for the active provider
    pub fn get_api_key(&self) -> String {
        self.get_active_provider_config()
            .map(|p| p.api_key.clone())
            .unwrap_or_default()
    }

    /// Get the endpoint for the active provider
    pub fn get_endpoint(&self) -> String {
        self.get_active_provider_config()
            .map(|p| p.endpoint.clone())
            .filter(|e| !e.is_empty())
            .unwrap_or_else(|| default_endpoint(self.provider))
    }

    /// Get the request timeout for the active provider
    pub fn get_timeout_secs(&self) -> u64 {
        self.get_active_provider_config()
            .map(|p| p.timeout_secs)
            .filter(|t| *t > 0)
            .unwrap_or_else(default_provider_timeout_secs)
    }
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            provider: TranslationProvider::default(),
            available_providers: vec![
                ProviderConfig::new(TranslationProvider::Moonshot),
                ProviderConfig::new(TranslationProvider::OpenAI),
                ProviderConfig::new(TranslationProvider::Anthropic),
            ],
            common: TranslationCommonConfig::default(),
        }
    }
}
