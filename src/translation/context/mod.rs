/*!
 * Context sent along with each chunk.
 *
 * - `glossary`: per-chunk glossary filtering and soft terminology warnings
 */

pub mod glossary;

pub use glossary::{glossary_warnings, GlossaryFilter, GlossaryFilterConfig};
