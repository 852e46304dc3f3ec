/*!
 * Prompt construction for the translate and profile calls.
 *
 * This module provides:
 * - Fixed system prompts and the profile schema example
 * - A per-chunk translation prompt builder (placeholders, outline, glossary)
 * - The profiling prompt builder
 * - The Snapdown to Mermaid conversion prompt
 */

pub mod templates;

pub use templates::{
    render_condensed_outline, render_diagram_prompt, render_prompt_glossary, ProfilePromptBuilder, PromptMessages,
    PromptTemplate, TranslationPromptBuilder,
};
