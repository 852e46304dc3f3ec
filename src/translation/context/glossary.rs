/*!
 * Per-chunk glossary selection and soft terminology checks.
 *
 * Only the glossary entries that a chunk actually mentions are sent with it,
 * ranked by how confidently the English term was matched:
 * - multi-word exact phrase (priority 1)
 * - single word on a word boundary (priority 2)
 * - multi-word with at least half of its words present (priority 3)
 */

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

use crate::translation::profile::GlossaryEntry;

static WORD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[a-z0-9]+").expect("Invalid word regex"));
static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("Invalid whitespace regex"));
static SYMBOL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s]").expect("Invalid symbol regex"));

/// Limits for the glossary subset attached to one chunk
#[derive(Debug, Clone, Copy)]
pub struct GlossaryFilterConfig {
    pub max_terms: usize,
    pub max_chars: usize,
}

impl Default for GlossaryFilterConfig {
    fn default() -> Self {
        Self {
            max_terms: 30,
            max_chars: 2000,
        }
    }
}

impl From<&crate::app_config::GlossaryConfig> for GlossaryFilterConfig {
    fn from(config: &crate::app_config::GlossaryConfig) -> Self {
        Self {
            max_terms: config.max_terms_per_chunk,
            max_chars: config.max_chars_per_chunk,
        }
    }
}

/// Casefold, treat hyphens as spaces, collapse whitespace
pub fn normalize(text: &str) -> String {
    let lowered = text.to_lowercase().replace('-', " ");
    WHITESPACE_RE.replace_all(&lowered, " ").trim().to_string()
}

fn words(normalized: &str) -> HashSet<&str> {
    WORD_RE.find_iter(normalized).map(|m| m.as_str()).collect()
}

fn on_word_boundary(term: &str, haystack: &str) -> bool {
    if term.is_empty() {
        return false;
    }
    if SYMBOL_RE.is_match(term) {
        return haystack.contains(term);
    }
    Regex::new(&format!(r"\b{}\b", regex::escape(term)))
        .map(|re| re.is_match(haystack))
        .unwrap_or_else(|_| haystack.contains(term))
}

/// Selects the glossary entries relevant to a chunk
#[derive(Debug, Clone, Default)]
pub struct GlossaryFilter {
    config: GlossaryFilterConfig,
}

impl GlossaryFilter {
    pub fn new(config: GlossaryFilterConfig) -> Self {
        Self { config }
    }

    fn priority(term_en: &str, chunk: &str, chunk_words: &HashSet<&str>) -> Option<u8> {
        let term = normalize(term_en);
        let term_words = words(&term);
        if term_words.len() >= 2 {
            if chunk.contains(term.as_str()) {
                return Some(1);
            }
            let overlap = term_words.iter().filter(|w| chunk_words.contains(*w)).count();
            if overlap * 2 >= term_words.len() {
                return Some(3);
            }
            None
        } else if on_word_boundary(&term, chunk) {
            Some(2)
        } else {
            None
        }
    }

    /// Entries mentioned in `chunk_text`, best matches first, within budget
    pub fn filter(&self, glossary: &[GlossaryEntry], chunk_text: &str) -> Vec<GlossaryEntry> {
        if glossary.is_empty() || self.config.max_terms == 0 || self.config.max_chars == 0 {
            return Vec::new();
        }
        let chunk = normalize(chunk_text);
        if chunk.is_empty() {
            return Vec::new();
        }
        let chunk_words = words(&chunk);

        let mut candidates: Vec<(u8, usize, &GlossaryEntry)> = glossary
            .iter()
            .enumerate()
            .filter_map(|(index, entry)| {
                Self::priority(&entry.term_en, &chunk, &chunk_words).map(|p| (p, index, entry))
            })
            .collect();
        candidates.sort_by_key(|(priority, index, _)| (*priority, *index));

        let mut selected = Vec::new();
        let mut total_chars = 0;
        for (_, _, entry) in candidates {
            if selected.len() >= self.config.max_terms {
                break;
            }
            let size = entry.char_size();
            if total_chars + size > self.config.max_chars {
                continue;
            }
            total_chars += size;
            selected.push(entry.clone());
        }
        selected
    }
}

/// Soft check: glossary terms used in the source but whose Chinese form is absent
pub fn glossary_warnings(source_chunk: &str, restored: &str, glossary: &[GlossaryEntry]) -> Vec<String> {
    glossary
        .iter()
        .filter(|e| !e.term_zh.is_empty() && source_chunk.contains(&e.term_en) && !restored.contains(&e.term_zh))
        .map(|e| format!("glossary term '{}' missing Chinese form '{}'", e.term_en, e.term_zh))
        .collect()
}
