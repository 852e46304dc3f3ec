/*!
 * Placeholder vault.
 *
 * Swaps every scanned span for an opaque token before the text is sent to
 * the model, and swaps the tokens back afterwards. Tokens look like
 * `__MATH_INLINE_0007__`: a category tag plus a document-wide index. They
 * contain no whitespace, so line reflow in the model output cannot split
 * them.
 */

use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::errors::PreservationError;

use super::scanner::{scan, Span, SpanKind};

/// Anything shaped like a placeholder token, known or not. Tag words are
/// joined by single underscores, so a `__` left in the prose before a token
/// can never become part of its tag.
static TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"__([A-Z]+(?:_[A-Z]+)*)_([0-9]{4,})__").expect("valid token regex"));

/// A token-shaped substring found in some text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenMatch {
    pub token: String,
    pub start: usize,
    pub end: usize,
}

/// All token-shaped substrings of `text`, in order of appearance.
pub fn find_tokens(text: &str) -> Vec<TokenMatch> {
    TOKEN_RE
        .find_iter(text)
        .map(|m| TokenMatch {
            token: m.as_str().to_string(),
            start: m.start(),
            end: m.end(),
        })
        .collect()
}

fn make_token(kind: SpanKind, index: usize) -> String {
    format!("__{}_{:04}__", kind.tag(), index)
}

/// One token and the span it stands for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placeholder {
    pub token: String,
    pub span: Span,
}

/// Token → span mapping for one document. Read-only once built.
#[derive(Debug, Clone, Default)]
pub struct PlaceholderMap {
    entries: Vec<Placeholder>,
    by_token: HashMap<String, usize>,
}

/// Expected and found occurrences of one token
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenTally {
    pub token: String,
    pub expected: usize,
    pub found: usize,
}

impl TokenTally {
    pub fn matches(&self) -> bool {
        self.expected == self.found
    }
}

/// What restoration saw. Mismatches are reported here and never corrected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RestoreReport {
    /// Expected tokens first (in chunk order), then unexpected known tokens
    pub tallies: Vec<TokenTally>,
    /// Token-shaped strings that are not in the map, left in place
    pub unknown_tokens: Vec<String>,
}

impl RestoreReport {
    pub fn mismatches(&self) -> impl Iterator<Item = &TokenTally> {
        self.tallies.iter().filter(|t| !t.matches())
    }

    /// True when every token was found exactly as often as expected
    pub fn is_clean(&self) -> bool {
        self.unknown_tokens.is_empty() && self.tallies.iter().all(TokenTally::matches)
    }
}

impl PlaceholderMap {
    fn from_entries(entries: Vec<Placeholder>) -> Self {
        let by_token = entries
            .iter()
            .enumerate()
            .map(|(i, p)| (p.token.clone(), i))
            .collect();
        Self { entries, by_token }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, token: &str) -> Option<&Span> {
        self.by_token.get(token).map(|&i| &self.entries[i].span)
    }

    pub fn contains(&self, token: &str) -> bool {
        self.by_token.contains_key(token)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Placeholder> {
        self.entries.iter()
    }

    /// Replace every known token in `text` with its original span content.
    ///
    /// `expected` lists the tokens the text should contain exactly once. Any
    /// other known token is expected zero times.
    pub fn restore(&self, text: &str, expected: &[String]) -> (String, RestoreReport) {
        let mut restored = String::with_capacity(text.len());
        let mut found: HashMap<&str, usize> = HashMap::new();
        let mut seen_order: Vec<&str> = Vec::new();
        let mut unknown = Vec::new();
        let mut cursor = 0;

        for m in TOKEN_RE.find_iter(text) {
            restored.push_str(&text[cursor..m.start()]);
            match self.by_token.get(m.as_str()) {
                Some(&idx) => {
                    let entry = &self.entries[idx];
                    restored.push_str(&entry.span.raw);
                    let count = found.entry(entry.token.as_str()).or_insert(0);
                    if *count == 0 {
                        seen_order.push(entry.token.as_str());
                    }
                    *count += 1;
                }
                None => {
                    restored.push_str(m.as_str());
                    unknown.push(m.as_str().to_string());
                }
            }
            cursor = m.end();
        }
        restored.push_str(&text[cursor..]);

        let mut tallies: Vec<TokenTally> = expected
            .iter()
            .map(|token| TokenTally {
                token: token.clone(),
                expected: 1,
                found: found.get(token.as_str()).copied().unwrap_or(0),
            })
            .collect();
        for token in seen_order {
            if !expected.iter().any(|e| e == token) {
                tallies.push(TokenTally {
                    token: token.to_string(),
                    expected: 0,
                    found: found[token],
                });
            }
        }

        let report = RestoreReport {
            tallies,
            unknown_tokens: unknown,
        };
        if !report.is_clean() {
            debug!(
                "Restoration found {} token mismatch(es) and {} unknown token(s)",
                report.mismatches().count(),
                report.unknown_tokens.len()
            );
        }
        (restored, report)
    }

    /// Restore a whole protected document, expecting every token once.
    pub fn restore_all(&self, text: &str) -> (String, RestoreReport) {
        let expected: Vec<String> = self.entries.iter().map(|p| p.token.clone()).collect();
        self.restore(text, &expected)
    }

    pub fn to_json(&self) -> Result<String, PreservationError> {
        serde_json::to_string_pretty(&self.entries).map_err(|e| PreservationError::MapFormat(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self, PreservationError> {
        let entries: Vec<Placeholder> =
            serde_json::from_str(json).map_err(|e| PreservationError::MapFormat(e.to_string()))?;
        for entry in &entries {
            if entry.token != make_token(entry.span.kind, token_index(&entry.token).unwrap_or(0)) {
                return Err(PreservationError::MapFormat(format!(
                    "token '{}' does not match its span kind",
                    entry.token
                )));
            }
        }
        Ok(Self::from_entries(entries))
    }
}

fn token_index(token: &str) -> Option<usize> {
    TOKEN_RE
        .captures(token)
        .and_then(|caps| caps.get(2))
        .and_then(|m| m.as_str().parse().ok())
}

/// The first place where the tokens read back from `protected` differ from
/// the issued ones, as (token, byte offset in `protected`).
fn first_stray_token(protected: &str, entries: &[Placeholder]) -> Option<(String, usize)> {
    let seen = find_tokens(protected);
    if let Some(m) = seen.iter().zip(entries).find(|(m, p)| m.token != p.token).map(|(m, _)| m) {
        return Some((m.token.clone(), m.start));
    }
    if seen.len() > entries.len() {
        let m = &seen[entries.len()];
        return Some((m.token.clone(), m.start));
    }
    entries
        .get(seen.len())
        .map(|p| (p.token.clone(), protected.find(&p.token).unwrap_or(0)))
}

/// Issues tokens for one document. The counter lives here, not in a global.
#[derive(Debug)]
pub struct PlaceholderVault {
    next_index: usize,
}

impl Default for PlaceholderVault {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaceholderVault {
    pub fn new() -> Self {
        Self { next_index: 1 }
    }

    /// Replace every protectable span of `text` with a fresh token.
    pub fn protect(&mut self, text: &str) -> Result<(String, PlaceholderMap), PreservationError> {
        if let Some(existing) = TOKEN_RE.find(text) {
            return Err(PreservationError::TokenCollision {
                token: existing.as_str().to_string(),
                offset: existing.start(),
            });
        }

        let spans = scan(text);
        let mut protected = String::with_capacity(text.len());
        let mut entries = Vec::with_capacity(spans.len());
        let mut cursor = 0;

        for span in spans {
            let token = make_token(span.kind, self.next_index);
            self.next_index += 1;
            protected.push_str(&text[cursor..span.start]);
            protected.push_str(&token);
            cursor = span.end;
            entries.push(Placeholder { token, span });
        }
        protected.push_str(&text[cursor..]);

        // Prose glued to a token may still read as a different token
        if let Some((token, offset)) = first_stray_token(&protected, &entries) {
            return Err(PreservationError::TokenCollision { token, offset });
        }

        debug!("Protected {} span(s), {} -> {} bytes", entries.len(), text.len(), protected.len());
        Ok((protected, PlaceholderMap::from_entries(entries)))
    }
}
