/*!
 * Tests for translator implementations
 */

use std::sync::Arc;

use notezh::app_config::{TranslationConfig, TranslationProvider};
use notezh::errors::ProviderError;
use notezh::providers::mock::{MockBehavior, MockTranslator, DEFAULT_PROFILE_JSON};
use notezh::translation::profile::{DocSource, SourceType};
use notezh::translation::{ChunkContext, DocumentProfile, DocumentTranslator, ProfileRequest, TranslationService};

fn context(chunk_id: &str) -> ChunkContext {
    ChunkContext {
        chunk_id: chunk_id.to_string(),
        ..Default::default()
    }
}

fn profile_request() -> ProfileRequest {
    ProfileRequest {
        content: "# Notes\n\nA closure.".to_string(),
        source: DocSource {
            source_type: SourceType::File,
            value: "notes.md".to_string(),
        },
        title_hint: Some("notes.md".to_string()),
        source_language: "en".to_string(),
        target_language: "zh-CN".to_string(),
    }
}

#[test]
fn test_default_mock_profile_shouldParseAndValidate() {
    let profile = DocumentProfile::parse(DEFAULT_PROFILE_JSON).unwrap();
    assert_eq!(profile.doc.title, "Mock Notes");
    assert_eq!(profile.glossary[0].term_zh, "闭包");
}

#[tokio::test]
async fn test_mock_asTraitObject_shouldServeProfileAndChunks() {
    let mock = MockTranslator::uppercase();
    let translator: Arc<dyn DocumentTranslator> = Arc::new(mock.clone());

    let raw_profile = translator.profile(&profile_request()).await.unwrap();
    assert!(DocumentProfile::parse(&raw_profile).is_ok());

    let out = translator.translate("a __LINK_0001__ b", &context("chunk-0001")).await.unwrap();
    assert_eq!(out, "A __LINK_0001__ B");
    assert_eq!(translator.model_id(), "mock/mock-model");
    // Profile calls are not counted as translations
    assert_eq!(mock.calls(), 1);
}

#[tokio::test]
async fn test_mock_withCustomProfile_shouldReturnIt() {
    let mock = MockTranslator::passthrough().with_profile("not json at all");
    assert_eq!(mock.profile(&profile_request()).await.unwrap(), "not json at all");
}

#[tokio::test]
async fn test_mock_alwaysTransient_shouldKeepFailing() {
    let mock = MockTranslator::new(MockBehavior::AlwaysTransient);
    for _ in 0..3 {
        let err = mock.translate("x", &context("chunk-0001")).await.unwrap_err();
        assert!(matches!(err, ProviderError::RateLimitExceeded(_)));
    }
    assert_eq!(mock.calls(), 3);
}

#[test]
fn test_translation_service_withKey_shouldReportModelId() {
    let mut config = TranslationConfig::default();
    config.provider = TranslationProvider::Anthropic;
    config.provider_config_mut(TranslationProvider::Anthropic).api_key = "sk-ant".to_string();

    let service = TranslationService::new(config).unwrap();
    assert_eq!(service.model_id(), "anthropic/claude-3-5-sonnet-latest");
}

#[tokio::test]
async fn test_translation_service_withUnreachableEndpoint_shouldReturnTransientError() {
    let mut config = TranslationConfig::default();
    let entry = config.provider_config_mut(TranslationProvider::Moonshot);
    entry.api_key = "sk-test".to_string();
    entry.endpoint = "http://127.0.0.1:9/v1".to_string();
    entry.timeout_secs = 5;

    let service = TranslationService::new(config).unwrap();
    let err = service.translate("hello", &context("chunk-0001")).await.unwrap_err();
    assert!(err.is_transient(), "unexpected error: {}", err);
}
