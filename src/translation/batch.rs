/*!
 * Concurrent chunk translation.
 *
 * `ChunkOrchestrator` fans the chunks of one document out to a bounded pool
 * of tokio tasks. Each worker translates its chunk (with retries), cleans the
 * answer, restores the placeholders and runs the QA gate. The first failure
 * raises a shared cancel signal: workers that have not reached the model yet
 * skip it, and workers inside a model call or a retry backoff abandon it.
 * All tasks are awaited before the ordered outcomes are returned.
 */

use futures::FutureExt;
use log::{debug, error, info};
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Notify, Semaphore};
use tokio::task::JoinSet;

use crate::app_config::Config;
use crate::errors::{ProviderError, QaError};
use crate::preservation::{Chunk, PlaceholderMap};
use crate::translation::context::{glossary_warnings, GlossaryFilter, GlossaryFilterConfig};
use crate::translation::core::{ChunkContext, DocumentTranslator};
use crate::translation::formatting::OutputCleaner;
use crate::translation::profile::{DocumentProfile, GlossaryEntry, OutlineEntry};
use crate::translation::retry::RetryPolicy;
use crate::validation::{QaGate, QaInput, QaReport};

/// Progress callback: `(finished_chunks, total_chunks)`
pub type ProgressCallback = Arc<dyn Fn(usize, usize) + Send + Sync>;

/// A progress callback that ignores every update
pub fn no_progress() -> ProgressCallback {
    Arc::new(|_, _| {})
}

/// Document-wide context shared by every chunk
#[derive(Debug, Clone, Default)]
pub struct DocumentContext {
    pub outline: Vec<OutlineEntry>,
    /// Full glossary; each chunk receives a filtered subset
    pub glossary: Vec<GlossaryEntry>,
    pub style_rules: Vec<String>,
}

impl From<&DocumentProfile> for DocumentContext {
    fn from(profile: &DocumentProfile) -> Self {
        Self {
            outline: profile.outline.clone(),
            glossary: profile.glossary.clone(),
            style_rules: profile.style_rules(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultStatus {
    Ok,
    QaFailed,
}

/// A chunk that came back from the model
#[derive(Debug, Clone)]
pub struct TranslationResult {
    pub index: usize,
    pub chunk_id: String,
    /// Model answer exactly as received
    pub raw_output: String,
    /// Cleaned, restored and whitespace-aligned text
    pub text: String,
    pub status: ResultStatus,
    pub report: QaReport,
    pub glossary_warnings: Vec<String>,
    pub attempts: u32,
}

/// What happened to one chunk
#[derive(Debug)]
pub enum ChunkOutcome {
    Translated(TranslationResult),
    QaFailed(TranslationResult),
    TranslateFailed {
        index: usize,
        chunk_id: String,
        attempts: u32,
        error: ProviderError,
    },
    Cancelled {
        index: usize,
        chunk_id: String,
    },
}

impl ChunkOutcome {
    pub fn index(&self) -> usize {
        match self {
            Self::Translated(r) | Self::QaFailed(r) => r.index,
            Self::TranslateFailed { index, .. } | Self::Cancelled { index, .. } => *index,
        }
    }

    pub fn chunk_id(&self) -> &str {
        match self {
            Self::Translated(r) | Self::QaFailed(r) => &r.chunk_id,
            Self::TranslateFailed { chunk_id, .. } | Self::Cancelled { chunk_id, .. } => chunk_id,
        }
    }

    /// A QA or translate failure; cancellations are a consequence, not a cause
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::QaFailed(_) | Self::TranslateFailed { .. })
    }

    /// The failure with the lowest chunk index
    pub fn first_failure(outcomes: &[ChunkOutcome]) -> Option<&ChunkOutcome> {
        outcomes.iter().filter(|o| o.is_failure()).min_by_key(|o| o.index())
    }

    /// QA error for a rejected chunk
    pub fn qa_error(&self) -> Option<QaError> {
        match self {
            Self::QaFailed(result) => Some(QaError {
                chunk_id: result.chunk_id.clone(),
                failures: result.report.failures.clone(),
            }),
            _ => None,
        }
    }
}

/// Settings of the worker pool
#[derive(Debug, Clone, Copy)]
pub struct OrchestratorConfig {
    pub concurrency: usize,
    pub retry: RetryPolicy,
    pub glossary: GlossaryFilterConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            concurrency: 3,
            retry: RetryPolicy::default(),
            glossary: GlossaryFilterConfig::default(),
        }
    }
}

impl From<&Config> for OrchestratorConfig {
    fn from(config: &Config) -> Self {
        Self {
            concurrency: config.pipeline.concurrency,
            retry: RetryPolicy::from(&config.translation.common),
            glossary: GlossaryFilterConfig::from(&config.glossary),
        }
    }
}

/// Translates the chunks of one document with bounded concurrency
pub struct ChunkOrchestrator {
    translator: Arc<dyn DocumentTranslator>,
    config: OrchestratorConfig,
    gate: QaGate,
}

impl ChunkOrchestrator {
    pub fn new(translator: Arc<dyn DocumentTranslator>, config: OrchestratorConfig) -> Self {
        Self {
            translator,
            config,
            gate: QaGate::new(),
        }
    }

    /// Translate every chunk and return the outcomes ordered by index
    pub async fn translate_all(
        &self,
        chunks: &[Chunk],
        map: Arc<PlaceholderMap>,
        context: &DocumentContext,
        progress: ProgressCallback,
    ) -> Vec<ChunkOutcome> {
        let total = chunks.len();
        if total == 0 {
            return Vec::new();
        }

        let start_time = Instant::now();
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let cancelled = Arc::new(CancelSignal::default());
        let finished = Arc::new(AtomicUsize::new(0));
        let filter = GlossaryFilter::new(self.config.glossary);

        info!(
            "Translating {} chunk(s) with concurrency {}",
            total,
            self.config.concurrency.max(1)
        );

        let mut join_set = JoinSet::new();
        for chunk in chunks {
            let chunk_context = ChunkContext {
                chunk_id: chunk.id.clone(),
                outline: context.outline.clone(),
                glossary: filter.filter(&context.glossary, &chunk.text),
                style_rules: context.style_rules.clone(),
                expected_tokens: chunk.tokens.clone(),
            };
            let worker = ChunkWorker {
                translator: Arc::clone(&self.translator),
                map: Arc::clone(&map),
                retry: self.config.retry,
                gate: self.gate,
                cancelled: Arc::clone(&cancelled),
            };
            let chunk = chunk.clone();
            let semaphore = Arc::clone(&semaphore);
            let finished = Arc::clone(&finished);
            let progress = Arc::clone(&progress);

            join_set.spawn(async move {
                let index = chunk.index;
                let chunk_id = chunk.id.clone();

                let outcome = match semaphore.acquire_owned().await {
                    Ok(_permit) => AssertUnwindSafe(worker.run(chunk, chunk_context))
                        .catch_unwind()
                        .await
                        .unwrap_or_else(|panic| {
                            worker.cancelled.raise();
                            ChunkOutcome::TranslateFailed {
                                index,
                                chunk_id: chunk_id.clone(),
                                attempts: 0,
                                error: ProviderError::RequestFailed(format!(
                                    "worker panicked: {}",
                                    panic_message(panic.as_ref())
                                )),
                            }
                        }),
                    Err(_) => ChunkOutcome::Cancelled { index, chunk_id },
                };

                let done = finished.fetch_add(1, Ordering::SeqCst) + 1;
                progress(done, total);
                outcome
            });
        }

        // Barrier: every task is awaited, even after a failure
        let mut by_index: BTreeMap<usize, ChunkOutcome> = BTreeMap::new();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(outcome) => {
                    by_index.insert(outcome.index(), outcome);
                }
                Err(e) => error!("Chunk task ended abnormally: {}", e),
            }
        }

        // A task lost to the runtime still needs an outcome
        for chunk in chunks {
            by_index.entry(chunk.index).or_insert_with(|| ChunkOutcome::TranslateFailed {
                index: chunk.index,
                chunk_id: chunk.id.clone(),
                attempts: 0,
                error: ProviderError::RequestFailed("chunk task did not complete".to_string()),
            });
        }

        let outcomes: Vec<ChunkOutcome> = by_index.into_values().collect();
        let failed = outcomes.iter().filter(|o| o.is_failure()).count();
        info!(
            "Chunk translation finished in {:?}: {} ok, {} failed, {} cancelled",
            start_time.elapsed(),
            outcomes.iter().filter(|o| matches!(o, ChunkOutcome::Translated(_))).count(),
            failed,
            outcomes.iter().filter(|o| matches!(o, ChunkOutcome::Cancelled { .. })).count()
        );
        outcomes
    }
}

/// Raised by the first failing chunk; wakes workers that are mid-call or mid-backoff
#[derive(Debug, Default)]
struct CancelSignal {
    raised: AtomicBool,
    notify: Notify,
}

impl CancelSignal {
    fn raise(&self) {
        self.raised.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    fn is_raised(&self) -> bool {
        self.raised.load(Ordering::SeqCst)
    }

    async fn wait(&self) {
        loop {
            // Registered before the check so a raise in between is not missed
            let notified = self.notify.notified();
            if self.is_raised() {
                return;
            }
            notified.await;
        }
    }
}

/// Per-task state; everything is owned or shared read-only
struct ChunkWorker {
    translator: Arc<dyn DocumentTranslator>,
    map: Arc<PlaceholderMap>,
    retry: RetryPolicy,
    gate: QaGate,
    cancelled: Arc<CancelSignal>,
}

impl ChunkWorker {
    async fn run(&self, chunk: Chunk, context: ChunkContext) -> ChunkOutcome {
        if self.cancelled.is_raised() {
            debug!("{}: skipped after an earlier failure", chunk.id);
            return ChunkOutcome::Cancelled {
                index: chunk.index,
                chunk_id: chunk.id,
            };
        }

        debug!(
            "{}: translating {} chars, {} placeholder(s), {} glossary term(s)",
            chunk.id,
            chunk.char_count(),
            chunk.tokens.len(),
            context.glossary.len()
        );

        let translator = self.translator.as_ref();
        let text = chunk.text.as_str();
        let ctx = &context;
        let signal = self.cancelled.as_ref();
        let stop = async move {
            signal.wait().await;
            ProviderError::Cancelled
        };
        let outcome = self
            .retry
            .run_until(&chunk.id, move |_| translator.translate(text, ctx), ProviderError::is_transient, stop)
            .await;

        let raw_output = match outcome.result {
            Ok(raw) => raw,
            Err(ProviderError::Cancelled) => {
                debug!("{}: abandoned after {} attempt(s), another chunk failed", chunk.id, outcome.attempts);
                return ChunkOutcome::Cancelled {
                    index: chunk.index,
                    chunk_id: chunk.id,
                };
            }
            Err(error) => {
                self.cancelled.raise();
                error!("{}: translation failed after {} attempt(s): {}", chunk.id, outcome.attempts, error);
                return ChunkOutcome::TranslateFailed {
                    index: chunk.index,
                    chunk_id: chunk.id,
                    attempts: outcome.attempts,
                    error,
                };
            }
        };

        let result = self.finish(&chunk, &context, raw_output, outcome.attempts);
        if result.status == ResultStatus::Ok {
            debug!("{}: {}", chunk.id, result.report.summary());
            ChunkOutcome::Translated(result)
        } else {
            self.cancelled.raise();
            for failure in &result.report.failures {
                error!("{}: QA check '{}' failed: {}", chunk.id, failure.check(), failure);
            }
            ChunkOutcome::QaFailed(result)
        }
    }

    /// Cleanup, restoration and QA; pure apart from logging
    fn finish(&self, chunk: &Chunk, context: &ChunkContext, raw_output: String, attempts: u32) -> TranslationResult {
        let cleaned = OutputCleaner::clean(&raw_output);
        let aligned = OutputCleaner::align_trailing_whitespace(&chunk.text, &cleaned);
        let (restored, _) = self.map.restore(&aligned, &chunk.tokens);
        let (original, _) = self.map.restore_all(&chunk.text);

        let report = self.gate.check(&QaInput {
            chunk_id: &chunk.id,
            raw_output: &aligned,
            restored: &restored,
            original: &original,
            expected_tokens: &chunk.tokens,
            map: &self.map,
        });
        let warnings = glossary_warnings(&original, &restored, &context.glossary);
        for warning in &warnings {
            debug!("{}: {}", chunk.id, warning);
        }

        TranslationResult {
            index: chunk.index,
            chunk_id: chunk.id.clone(),
            raw_output,
            text: restored,
            status: if report.passed() {
                ResultStatus::Ok
            } else {
                ResultStatus::QaFailed
            },
            report,
            glossary_warnings: warnings,
            attempts,
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
