/*!
 * Tests for error types and their stage tagging
 */

use std::path::PathBuf;

use notezh::errors::{
    AppError, ChunkError, FetchError, PipelineError, PreservationError, ProfileError, ProviderError, QaError,
    WriteError,
};
use notezh::validation::QaFailure;

#[test]
fn test_provider_error_isTransient_shouldClassifyByKind() {
    assert!(ProviderError::RateLimitExceeded("slow down".into()).is_transient());
    assert!(ProviderError::Timeout("30s".into()).is_transient());
    assert!(ProviderError::ConnectionError("reset".into()).is_transient());
    assert!(ProviderError::from_status(503, "unavailable").is_transient());
    assert!(ProviderError::from_status(429, "busy").is_transient());

    assert!(!ProviderError::from_status(401, "bad key").is_transient());
    assert!(!ProviderError::from_status(400, "bad request").is_transient());
    assert!(!ProviderError::ParseError("eof".into()).is_transient());
    assert!(!ProviderError::Truncated("length".into()).is_transient());
}

#[test]
fn test_provider_error_fromStatus_shouldMapAuthAndRateLimit() {
    assert!(matches!(ProviderError::from_status(403, "x"), ProviderError::AuthenticationError(_)));
    assert!(matches!(ProviderError::from_status(429, "x"), ProviderError::RateLimitExceeded(_)));
    assert!(matches!(
        ProviderError::from_status(500, "x"),
        ProviderError::ApiError { status_code: 500, .. }
    ));
}

#[test]
fn test_fetch_error_isTransient_shouldRetryServerErrorsOnly() {
    assert!(FetchError::Transport("dns".into()).is_transient());
    assert!(FetchError::Http { status: 502, message: String::new() }.is_transient());
    assert!(!FetchError::Http { status: 404, message: String::new() }.is_transient());
    assert!(!FetchError::TooShort { len: 10, min: 200 }.is_transient());
}

#[test]
fn test_pipeline_error_stage_shouldNameEachStage() {
    let cases: Vec<(PipelineError, &str)> = vec![
        (FetchError::InvalidSource("x".into()).into(), "fetch"),
        (ProfileError::InvalidJson("x".into()).into(), "profile"),
        (
            PreservationError::TokenCollision {
                token: "__LINK_0001__".into(),
                offset: 0,
            }
            .into(),
            "protect",
        ),
        (ChunkError::InvalidLimit(0).into(), "chunk"),
        (
            PipelineError::Translate {
                chunk_id: "chunk-0002".into(),
                attempts: 5,
                source: ProviderError::Timeout("t".into()),
            },
            "translate",
        ),
        (WriteError::MissingDirectory(PathBuf::from("/nope")).into(), "write"),
    ];
    for (error, stage) in cases {
        assert_eq!(error.stage(), stage);
    }
}

#[test]
fn test_qa_error_display_shouldNameChunkAndChecks() {
    let error = PipelineError::from(QaError {
        chunk_id: "chunk-0003".to_string(),
        failures: vec![
            QaFailure::PlaceholderCount {
                token: "__INLINE_CODE_0004__".to_string(),
                expected: 1,
                found: 0,
            },
            QaFailure::FenceCount { expected: 2, found: 1 },
        ],
    });

    assert_eq!(error.stage(), "qa");
    assert_eq!(error.chunk_id(), Some("chunk-0003"));
    let message = error.to_string();
    assert!(message.contains("chunk-0003"));
    assert!(message.contains("__INLINE_CODE_0004__"));
    assert!(message.contains("code fence lines"));
}

#[test]
fn test_translate_error_display_shouldIncludeAttempts() {
    let error = PipelineError::Translate {
        chunk_id: "chunk-0001".into(),
        attempts: 5,
        source: ProviderError::RateLimitExceeded("429".into()),
    };
    assert_eq!(error.chunk_id(), Some("chunk-0001"));
    assert!(error.to_string().contains("after 5 attempt(s)"));
}

#[test]
fn test_app_error_conversions_shouldWrapSources() {
    let from_anyhow: AppError = anyhow::anyhow!("boom").into();
    assert!(matches!(from_anyhow, AppError::Unknown(_)));

    let from_io: AppError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
    assert!(matches!(from_io, AppError::File(_)));

    let from_pipeline: AppError = PipelineError::from(ChunkError::InvalidLimit(0)).into();
    assert!(from_pipeline.to_string().contains("chunk stage failed"));
}
