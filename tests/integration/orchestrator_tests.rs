/*!
 * Chunk orchestration with the mock translator
 */

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use notezh::preservation::{split, Chunk, PlaceholderMap, PlaceholderVault};
use notezh::providers::mock::{MockBehavior, MockTranslator, DEFAULT_PROFILE_JSON};
use notezh::translation::context::GlossaryFilterConfig;
use notezh::translation::{
    no_progress, ChunkOrchestrator, ChunkOutcome, DocumentContext, DocumentProfile, OrchestratorConfig,
    ProgressCallback, RetryPolicy,
};

use crate::common::{self, SAMPLE_NOTES};

struct Prepared {
    protected: String,
    chunks: Vec<Chunk>,
    map: Arc<PlaceholderMap>,
}

fn prepare(max_chars: usize) -> Prepared {
    let (protected, map) = PlaceholderVault::new().protect(SAMPLE_NOTES).unwrap();
    let plan = split(&protected, max_chars).unwrap();
    Prepared {
        protected,
        chunks: plan.chunks,
        map: Arc::new(map),
    }
}

fn orchestrator(mock: &MockTranslator, concurrency: usize) -> ChunkOrchestrator {
    let retry = RetryPolicy {
        max_attempts: 3,
        base_delay_ms: 1,
        max_delay_ms: 2,
    };
    orchestrator_with_retry(mock, concurrency, retry)
}

fn orchestrator_with_retry(mock: &MockTranslator, concurrency: usize, retry: RetryPolicy) -> ChunkOrchestrator {
    common::init_logging();
    let config = OrchestratorConfig {
        concurrency,
        retry,
        glossary: GlossaryFilterConfig::default(),
    };
    ChunkOrchestrator::new(Arc::new(mock.clone()), config)
}

fn document_context() -> DocumentContext {
    DocumentContext::from(&DocumentProfile::parse(DEFAULT_PROFILE_JSON).unwrap())
}

fn body(outcomes: &[ChunkOutcome]) -> String {
    outcomes
        .iter()
        .map(|o| match o {
            ChunkOutcome::Translated(result) => result.text.clone(),
            other => panic!("{} was not translated", other.chunk_id()),
        })
        .collect()
}

#[tokio::test]
async fn test_translate_all_withUppercaseModel_shouldRestoreSpansVerbatim() {
    let prepared = prepare(160);
    assert!(prepared.chunks.len() > 2);
    let mock = MockTranslator::uppercase();

    let outcomes = orchestrator(&mock, 3)
        .translate_all(&prepared.chunks, Arc::clone(&prepared.map), &document_context(), no_progress())
        .await;

    let translated = body(&outcomes);
    let (expected, _) = prepared.map.restore_all(&prepared.protected.to_uppercase());
    assert_eq!(translated, expected);
    assert!(translated.contains("`check(x)`"));
    assert!(translated.contains("def square(x):"));
    assert!(translated.contains("A CLOSURE CAPTURES"));
}

#[tokio::test]
async fn test_translate_all_withUntranslatedTerm_shouldWarnWithoutFailing() {
    let prepared = prepare(10_000);
    let mock = MockTranslator::passthrough();

    let outcomes = orchestrator(&mock, 1)
        .translate_all(&prepared.chunks, Arc::clone(&prepared.map), &document_context(), no_progress())
        .await;

    match &outcomes[0] {
        ChunkOutcome::Translated(result) => {
            assert_eq!(result.glossary_warnings.len(), 1);
            assert!(result.glossary_warnings[0].contains("闭包"));
        }
        other => panic!("unexpected outcome for {}", other.chunk_id()),
    }
}

#[tokio::test]
async fn test_translate_all_withAlteredSpan_shouldReportQaFailure() {
    let prepared = prepare(10_000);
    let mock = MockTranslator::new(MockBehavior::AlterSpan { replacement: "`hacked`" });

    let outcomes = orchestrator(&mock, 2)
        .translate_all(&prepared.chunks, Arc::clone(&prepared.map), &document_context(), no_progress())
        .await;

    let failure = ChunkOutcome::first_failure(&outcomes).expect("altered span must fail");
    let qa = failure.qa_error().expect("failure is a QA failure");
    assert_eq!(qa.chunk_id, "chunk-0001");
    assert!(qa.failures.iter().any(|f| f.check() == "placeholder_count"));
}

#[tokio::test]
async fn test_translate_all_withDuplicatedTokenInLaterChunk_shouldNameThatChunk() {
    let prepared = prepare(120);
    let target = prepared
        .chunks
        .iter()
        .skip(1)
        .find(|c| !c.tokens.is_empty())
        .expect("a later chunk with placeholders")
        .id
        .clone();
    let mock = MockTranslator::new(MockBehavior::DuplicateFirstToken).only_for(target.clone());

    let outcomes = orchestrator(&mock, 1)
        .translate_all(&prepared.chunks, Arc::clone(&prepared.map), &document_context(), no_progress())
        .await;

    let failure = ChunkOutcome::first_failure(&outcomes).expect("duplicate must fail");
    assert_eq!(failure.chunk_id(), target);
    assert_eq!(outcomes.len(), prepared.chunks.len());
}

#[tokio::test]
async fn test_translate_all_withPersistentRateLimit_shouldExhaustRetries() {
    let prepared = prepare(10_000);
    let mock = MockTranslator::new(MockBehavior::AlwaysTransient);

    let outcomes = orchestrator(&mock, 1)
        .translate_all(&prepared.chunks, Arc::clone(&prepared.map), &document_context(), no_progress())
        .await;

    match &outcomes[0] {
        ChunkOutcome::TranslateFailed { attempts, error, .. } => {
            assert_eq!(*attempts, 3);
            assert!(error.is_transient());
        }
        other => panic!("unexpected outcome for {}", other.chunk_id()),
    }
    assert_eq!(mock.calls(), 3);
}

#[tokio::test]
async fn test_translate_all_withQaFailure_shouldStopChunksWaitingOnRetries() {
    let prepared = prepare(60);
    let target = prepared
        .chunks
        .iter()
        .find(|c| !c.tokens.is_empty())
        .map(|c| c.id.clone())
        .unwrap();
    let mock = MockTranslator::new(MockBehavior::DropFirstToken)
        .only_for(target.clone())
        .otherwise(MockBehavior::AlwaysTransient);
    let retry = RetryPolicy {
        max_attempts: 5,
        base_delay_ms: 30_000,
        max_delay_ms: 30_000,
    };

    let started = Instant::now();
    let outcomes = orchestrator_with_retry(&mock, prepared.chunks.len(), retry)
        .translate_all(&prepared.chunks, Arc::clone(&prepared.map), &document_context(), no_progress())
        .await;

    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(outcomes.len(), prepared.chunks.len());
    for outcome in &outcomes {
        if outcome.chunk_id() == target {
            assert!(matches!(outcome, ChunkOutcome::QaFailed(_)));
        } else {
            assert!(matches!(outcome, ChunkOutcome::Cancelled { .. }), "{} kept retrying", outcome.chunk_id());
        }
    }
    assert!(mock.calls() <= prepared.chunks.len());
}

#[tokio::test]
async fn test_translate_all_withSlowModel_shouldNeverExceedPoolWidth() {
    let prepared = prepare(60);
    assert!(prepared.chunks.len() >= 4);
    let mock = MockTranslator::new(MockBehavior::Slow { delay_ms: 20 });
    let seen = Arc::new(AtomicUsize::new(0));
    let seen_in_callback = Arc::clone(&seen);
    let progress: ProgressCallback = Arc::new(move |done, _total| {
        seen_in_callback.fetch_max(done, Ordering::SeqCst);
    });

    let outcomes = orchestrator(&mock, 2)
        .translate_all(&prepared.chunks, Arc::clone(&prepared.map), &document_context(), progress)
        .await;

    assert!(outcomes.iter().all(|o| matches!(o, ChunkOutcome::Translated(_))));
    assert!(mock.peak_concurrency() <= 2);
    assert_eq!(seen.load(Ordering::SeqCst), prepared.chunks.len());
    assert_eq!(body(&outcomes), SAMPLE_NOTES);
}

#[tokio::test]
async fn test_translate_all_withNoChunks_shouldReturnEmpty() {
    let mock = MockTranslator::passthrough();
    let outcomes = orchestrator(&mock, 2)
        .translate_all(&[], Arc::new(PlaceholderMap::default()), &DocumentContext::default(), no_progress())
        .await;
    assert!(outcomes.is_empty());
    assert_eq!(mock.calls(), 0);
}
