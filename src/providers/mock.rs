/*!
 * Mock translator for testing.
 *
 * `MockTranslator` implements `DocumentTranslator` without any network
 * access. Its behavior decides what it does to each chunk:
 * - `MockTranslator::passthrough()` returns the chunk unchanged
 * - `MockTranslator::uppercase()` "translates" prose by uppercasing it
 * - `MockTranslator::new(MockBehavior::DropFirstToken)` and friends corrupt
 *   placeholders so the QA gate has something to reject
 * - transient and permanent failure modes exercise the retry policy
 *
 * Diagram conversion answers with `DEFAULT_DIAGRAM_JSON` unless told otherwise.
 */

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::errors::ProviderError;
use crate::preservation::vault::find_tokens;
use crate::translation::core::{ChunkContext, DocumentTranslator, ProfileRequest};

/// Profile answer used unless another one is configured
pub const DEFAULT_PROFILE_JSON: &str = r#"{
  "doc": {"title": "Mock Notes", "source": {"type": "file", "value": "mock.md"}, "language": {"source": "en", "target": "zh-CN"}},
  "outline": [
    {"level": 1, "heading": "Introduction", "summary_bullets": ["What the notes cover"], "key_takeaways": ["Read carefully"]}
  ],
  "glossary": [
    {"term_en": "closure", "term_zh": "闭包", "note_zh": "捕获环境的函数", "keep_en_on_first_use": true}
  ],
  "style_guide": {"tone": "technical-but-friendly", "annotation_density": "medium", "rules": ["Keep sentences short"]}
}"#;

/// Diagram conversion answer used unless another one is configured
pub const DEFAULT_DIAGRAM_JSON: &str = r#"{"mermaid": "graph TD\n  A --> B"}"#;

/// Behavior mode for the mock translator
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MockBehavior {
    /// Return the chunk unchanged
    Passthrough,
    /// Uppercase everything; placeholder tokens are already uppercase
    Uppercase,
    /// Remove the first placeholder token of the chunk
    DropFirstToken,
    /// Repeat the first placeholder token of the chunk
    DuplicateFirstToken,
    /// Replace the first placeholder token with different content
    AlterSpan { replacement: &'static str },
    /// Fail the first `failures` calls with a rate limit error, then pass through
    TransientFailures { failures: usize },
    /// Every call fails with a rate limit error
    AlwaysTransient,
    /// Every call fails with an authentication error
    Permanent,
    /// Pass through after a delay
    Slow { delay_ms: u64 },
}

/// Mock translator for pipeline tests
#[derive(Debug, Clone)]
pub struct MockTranslator {
    behavior: MockBehavior,
    /// Apply `behavior` to this chunk only; others get `fallback`
    target_chunk: Option<String>,
    fallback: MockBehavior,
    profile_json: String,
    diagram_answer: Result<String, ProviderError>,
    diagram_count: Arc<AtomicUsize>,
    /// Translate calls made so far, shared between clones
    call_count: Arc<AtomicUsize>,
    in_flight: Arc<AtomicUsize>,
    peak_in_flight: Arc<AtomicUsize>,
}

impl MockTranslator {
    /// Create a new mock translator with the specified behavior
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            target_chunk: None,
            fallback: MockBehavior::Passthrough,
            profile_json: DEFAULT_PROFILE_JSON.to_string(),
            diagram_answer: Ok(DEFAULT_DIAGRAM_JSON.to_string()),
            diagram_count: Arc::new(AtomicUsize::new(0)),
            call_count: Arc::new(AtomicUsize::new(0)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn passthrough() -> Self {
        Self::new(MockBehavior::Passthrough)
    }

    pub fn uppercase() -> Self {
        Self::new(MockBehavior::Uppercase)
    }

    /// Restrict the behavior to one chunk id
    pub fn only_for(mut self, chunk_id: impl Into<String>) -> Self {
        self.target_chunk = Some(chunk_id.into());
        self
    }

    /// Behavior for the chunks `only_for` does not target
    pub fn otherwise(mut self, fallback: MockBehavior) -> Self {
        self.fallback = fallback;
        self
    }

    /// Use a custom profile answer
    pub fn with_profile(mut self, json: impl Into<String>) -> Self {
        self.profile_json = json.into();
        self
    }

    /// Answer every diagram conversion with `answer`
    pub fn with_diagram_answer(mut self, answer: Result<String, ProviderError>) -> Self {
        self.diagram_answer = answer;
        self
    }

    /// Number of diagram conversions received
    pub fn diagram_calls(&self) -> usize {
        self.diagram_count.load(Ordering::SeqCst)
    }

    /// Number of translate calls received
    pub fn calls(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Highest number of translate calls running at the same time
    pub fn peak_concurrency(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn behavior_for(&self, chunk_id: &str) -> MockBehavior {
        match &self.target_chunk {
            Some(target) if target != chunk_id => self.fallback,
            _ => self.behavior,
        }
    }

    fn first_token_range(text: &str) -> Option<(usize, usize)> {
        find_tokens(text).first().map(|m| (m.start, m.end))
    }

    /// Apply a behavior to a chunk; `call_index` is 0-based
    fn respond(behavior: MockBehavior, text: &str, call_index: usize) -> Result<String, ProviderError> {
        match behavior {
            MockBehavior::Passthrough | MockBehavior::Slow { .. } => Ok(text.to_string()),
            MockBehavior::Uppercase => Ok(text.to_uppercase()),
            MockBehavior::DropFirstToken => Ok(match Self::first_token_range(text) {
                Some((start, end)) => format!("{}{}", &text[..start], &text[end..]),
                None => text.to_string(),
            }),
            MockBehavior::DuplicateFirstToken => Ok(match Self::first_token_range(text) {
                Some((start, end)) => format!("{}{}", &text[..end], &text[start..]),
                None => text.to_string(),
            }),
            MockBehavior::AlterSpan { replacement } => Ok(match Self::first_token_range(text) {
                Some((start, end)) => format!("{}{}{}", &text[..start], replacement, &text[end..]),
                None => text.to_string(),
            }),
            MockBehavior::TransientFailures { failures } if call_index < failures => Err(
                ProviderError::RateLimitExceeded(format!("mock rate limit (call {})", call_index + 1)),
            ),
            MockBehavior::TransientFailures { .. } => Ok(text.to_string()),
            MockBehavior::AlwaysTransient => Err(ProviderError::RateLimitExceeded("mock rate limit".to_string())),
            MockBehavior::Permanent => Err(ProviderError::AuthenticationError("mock invalid api key".to_string())),
        }
    }
}

/// Counts a call as finished even when its future is dropped mid-flight
struct InFlightGuard<'a>(&'a AtomicUsize);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl DocumentTranslator for MockTranslator {
    async fn profile(&self, _request: &ProfileRequest) -> Result<String, ProviderError> {
        Ok(self.profile_json.clone())
    }

    async fn translate(&self, chunk_text: &str, context: &ChunkContext) -> Result<String, ProviderError> {
        let call_index = self.call_count.fetch_add(1, Ordering::SeqCst);
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(running, Ordering::SeqCst);
        let _in_flight = InFlightGuard(&self.in_flight);

        let behavior = self.behavior_for(&context.chunk_id);
        // Yield so concurrent calls overlap even without a delay
        match behavior {
            MockBehavior::Slow { delay_ms } => tokio::time::sleep(Duration::from_millis(delay_ms)).await,
            _ => tokio::task::yield_now().await,
        }
        Self::respond(behavior, chunk_text, call_index)
    }

    async fn convert_diagram(&self, _snapdown: &str) -> Result<String, ProviderError> {
        self.diagram_count.fetch_add(1, Ordering::SeqCst);
        self.diagram_answer.clone()
    }

    fn model_id(&self) -> String {
        "mock/mock-model".to_string()
    }
}
