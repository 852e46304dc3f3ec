/*!
 * Structure preservation for Markdown translation.
 *
 * - `scanner`: finds protectable spans (code, math, links, HTML, tables, footnotes)
 * - `vault`: swaps spans for placeholder tokens and back
 * - `chunker`: splits protected text into model-sized chunks
 */

pub mod chunker;
pub mod scanner;
pub mod vault;

pub use chunker::{split, Chunk, ChunkPlan};
pub use scanner::{scan, MathDelimiter, Span, SpanKind};
pub use vault::{find_tokens, Placeholder, PlaceholderMap, PlaceholderVault, RestoreReport, TokenTally};
