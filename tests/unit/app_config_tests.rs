/*!
 * Tests for application configuration functionality
 */

use std::collections::HashMap;
use std::str::FromStr;

use notezh::app_config::{Config, LogLevel, TranslationProvider};
use notezh::translation::RetryPolicy;

use crate::common;

fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
    move |name| map.get(name).cloned()
}

/// Test default configuration values
#[test]
fn test_default_config_withNoParameters_shouldHaveCorrectDefaults() {
    let config = Config::default();

    assert_eq!(config.source_language, "en");
    assert_eq!(config.target_language, "zh-CN");
    assert_eq!(config.translation.provider, TranslationProvider::Moonshot);
    assert_eq!(config.translation.get_model(), "kimi-k2-0905-preview");
    assert_eq!(config.translation.get_endpoint(), "https://api.moonshot.cn/v1");
    assert_eq!(config.translation.get_timeout_secs(), 180);
    assert_eq!(config.pipeline.concurrency, 3);
    assert_eq!(config.pipeline.max_chunk_chars, 8000);
    assert_eq!(config.glossary.max_terms_per_chunk, 30);
    assert_eq!(config.glossary.max_chars_per_chunk, 2000);
    assert_eq!(config.fetch.reader_endpoint, "https://r.jina.ai/");
    assert_eq!(config.fetch.min_content_length, 200);
    assert!(config.fetch.extract_snapdown);
    assert!(config.pipeline.snapdown_mermaid);
    assert_eq!(config.log_level, LogLevel::Info);
}

#[test]
fn test_retry_policy_fromDefaults_shouldAllowFiveAttempts() {
    let policy = RetryPolicy::from(&Config::default().translation.common);
    assert_eq!(policy.max_attempts, 5);
    assert_eq!(policy.base_delay_ms, 1000);
    assert_eq!(policy.max_delay_ms, 20_000);
}

#[test]
fn test_config_validation_withVariousConfigs_shouldValidateCorrectly() {
    let mut config = Config::default();

    // No API key: fine for debug commands, rejected for translation
    assert!(config.validate(false).is_ok());
    assert!(config.validate(true).is_err());

    config.translation.provider_config_mut(TranslationProvider::Moonshot).api_key = "sk-test".to_string();
    assert!(config.validate(true).is_ok());

    config.pipeline.concurrency = 0;
    assert!(config.validate(false).is_err());
    config.pipeline.concurrency = 3;

    config.pipeline.max_chunk_chars = 0;
    assert!(config.validate(false).is_err());
    config.pipeline.max_chunk_chars = 8000;

    config.target_language = "  ".to_string();
    assert!(config.validate(false).is_err());
}

#[test]
fn test_env_overrides_withKeys_shouldOnlyFillEmptyValues() {
    let mut config = Config::default();
    config.translation.provider_config_mut(TranslationProvider::OpenAI).api_key = "from-config".to_string();

    config.apply_env_with(lookup(&[
        ("MOONSHOT_API_KEY", "moon-key"),
        ("OPENAI_API_KEY", "env-key"),
        ("JINA_API_KEY", "jina-key"),
    ]));

    assert_eq!(config.translation.get_api_key(), "moon-key");
    let openai = config
        .translation
        .get_provider_config(&TranslationProvider::OpenAI)
        .expect("openai entry exists");
    assert_eq!(openai.api_key, "from-config");
    assert_eq!(config.fetch.api_key, "jina-key");
}

#[test]
fn test_env_overrides_withModelAndGlossaryLimits_shouldReplaceValues() {
    let mut config = Config::default();
    config.apply_env_with(lookup(&[
        ("MOONSHOT_MODEL", "kimi-latest"),
        ("MOONSHOT_BASE_URL", "https://proxy.example.com/v1"),
        ("NOTEZH_GLOSSARY_MAX_TERMS", "12"),
        ("NOTEZH_GLOSSARY_MAX_CHARS", "not-a-number"),
    ]));

    assert_eq!(config.translation.get_model(), "kimi-latest");
    assert_eq!(config.translation.get_endpoint(), "https://proxy.example.com/v1");
    assert_eq!(config.glossary.max_terms_per_chunk, 12);
    assert_eq!(config.glossary.max_chars_per_chunk, 2000);
}

#[test]
fn test_env_overrides_withBlankValues_shouldBeIgnored() {
    let mut config = Config::default();
    config.apply_env_with(lookup(&[("MOONSHOT_MODEL", "   "), ("NOTEZH_GLOSSARY_MAX_TERMS", "0")]));
    assert_eq!(config.translation.get_model(), "kimi-k2-0905-preview");
    assert_eq!(config.glossary.max_terms_per_chunk, 30);
}

#[test]
fn test_load_or_create_withMissingFile_shouldWriteDefaults() -> anyhow::Result<()> {
    let dir = common::create_temp_dir()?;
    let path = dir.path().join("conf.json");

    let created = Config::load_or_create(&path)?;
    assert!(path.exists());
    assert_eq!(created.pipeline.concurrency, 3);

    let loaded = Config::load_or_create(&path)?;
    assert_eq!(loaded.target_language, created.target_language);
    Ok(())
}

#[test]
fn test_load_or_create_withPartialFile_shouldFillDefaults() -> anyhow::Result<()> {
    let dir = common::create_temp_dir()?;
    let path = common::create_test_file(
        dir.path(),
        "conf.json",
        r#"{"pipeline": {"concurrency": 5}, "translation": {"provider": "anthropic"}, "log_level": "debug"}"#,
    )?;

    let config = Config::load_or_create(&path)?;
    assert_eq!(config.pipeline.concurrency, 5);
    assert_eq!(config.pipeline.max_chunk_chars, 8000);
    assert!(config.pipeline.snapdown_mermaid);
    assert_eq!(config.translation.provider, TranslationProvider::Anthropic);
    assert_eq!(config.translation.get_model(), "claude-3-5-sonnet-latest");
    assert_eq!(config.log_level, LogLevel::Debug);
    Ok(())
}

#[test]
fn test_load_or_create_withBrokenJson_shouldFail() -> anyhow::Result<()> {
    let dir = common::create_temp_dir()?;
    let path = common::create_test_file(dir.path(), "conf.json", "{ not json")?;
    assert!(Config::load_or_create(&path).is_err());
    Ok(())
}

#[test]
fn test_provider_fromStr_shouldAcceptAliases() {
    assert_eq!(TranslationProvider::from_str("Kimi").unwrap(), TranslationProvider::Moonshot);
    assert_eq!(TranslationProvider::from_str("openai").unwrap(), TranslationProvider::OpenAI);
    assert!(TranslationProvider::from_str("ollama").is_err());
}
