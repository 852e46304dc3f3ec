/*!
 * # notezh - English technical notes to Chinese study guides
 *
 * A Rust library that translates English Markdown into a Chinese study
 * guide with a language model, while keeping code, math, links and other
 * fragile spans byte-for-byte intact.
 *
 * ## Pipeline
 *
 * 1. Read the source (local file, or a web page through a reader service)
 * 2. Profile the document: outline, glossary and style guide
 * 3. Protect fragile spans behind `__TAG_NNNN__` placeholder tokens
 * 4. Split the protected text into chunks that never cut a token
 * 5. Translate chunks concurrently, with retries for transient errors
 * 6. Restore placeholders and run the QA gate on every chunk
 * 7. Assemble meta, outline, glossary and body, then write atomically
 *
 * ## Architecture
 *
 * The library is organized in these main modules:
 * - `app_config`: Configuration management
 * - `app_controller`: The document pipeline and batch mode
 * - `assembly`: Final document composition
 * - `preservation`: Span scanning, placeholder vault and chunking
 * - `translation`: Profiling, prompts, retries and chunk orchestration
 * - `validation`: The per-chunk QA gate
 * - `sources`: Local files, the reader service and page diagrams
 * - `providers`: Clients for Moonshot/OpenAI-compatible and Anthropic APIs,
 *   plus a mock translator for tests
 * - `file_utils`: Atomic writes and batch output naming
 * - `errors`: Custom error types for the application
 *
 * ## License
 *
 * This project is licensed under the MIT License
 */

// Global lints configuration
// These lints will be allowed but not auto-fixed
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::redundant_closure_for_method_calls)]

// Public modules
pub mod app_config;
pub mod app_controller;
pub mod assembly;
pub mod errors;
pub mod file_utils;
pub mod preservation;
pub mod providers;
pub mod sources;
pub mod translation;
pub mod validation;

// Re-export main types for easier usage
pub use app_config::Config;
pub use app_controller::{BatchReport, Controller, DocumentReport};
pub use errors::{AppError, PipelineError, ProviderError};
pub use preservation::{split, Chunk, ChunkPlan, PlaceholderMap, PlaceholderVault};
pub use sources::SourceRef;
pub use translation::{DocumentProfile, DocumentTranslator, TranslationService};
