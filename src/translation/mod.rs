/*!
 * Translation of protected Markdown chunks using AI providers.
 *
 * This module is split into several submodules:
 *
 * - `core`: the `DocumentTranslator` capability and the provider-backed service
 * - `batch`: concurrent chunk orchestration with retries and QA
 * - `context`: per-chunk glossary filtering
 * - `formatting`: cleanup of raw model output
 * - `profile`: the document profile (outline, glossary, style guide)
 * - `prompts`: prompt templates and builders
 * - `retry`: exponential backoff for transient provider errors
 */

// Re-export main types for easier usage
pub use self::batch::{
    no_progress, ChunkOrchestrator, ChunkOutcome, DocumentContext, OrchestratorConfig, ProgressCallback,
    ResultStatus, TranslationResult,
};
pub use self::core::{ChunkContext, DocumentTranslator, ProfileRequest, TranslationService};
pub use self::profile::{DocumentProfile, GlossaryEntry, OutlineEntry};
pub use self::retry::RetryPolicy;

// Submodules
pub mod batch;
pub mod context;
pub mod core;
pub mod formatting;
pub mod profile;
pub mod prompts;
pub mod retry;
