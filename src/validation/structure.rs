/*!
 * Structural comparison between a source chunk and its translation.
 *
 * Counts the markers that must survive translation: fence lines, math
 * delimiters per syntax, and link URLs.
 */

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use crate::preservation::scan;

static FENCE_LINE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^[ \t]*(?:`{3,}|~{3,})").expect("Invalid fence line regex"));

/// Math delimiter markers counted one by one
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MathMarker {
    Dollar,
    DoubleDollar,
    ParenOpen,
    ParenClose,
    BracketOpen,
    BracketClose,
    Begin,
    End,
}

impl MathMarker {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dollar => "$",
            Self::DoubleDollar => "$$",
            Self::ParenOpen => "\\(",
            Self::ParenClose => "\\)",
            Self::BracketOpen => "\\[",
            Self::BracketClose => "\\]",
            Self::Begin => "\\begin{",
            Self::End => "\\end{",
        }
    }
}

impl fmt::Display for MathMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structural fingerprint of a piece of Markdown
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StructureCounts {
    /// Lines opening or closing a code fence
    pub fences: usize,
    /// Unescaped math delimiters per marker
    pub math: BTreeMap<MathMarker, usize>,
    /// Sorted link, definition and autolink URLs
    pub urls: Vec<String>,
}

impl StructureCounts {
    pub fn of(text: &str) -> Self {
        let mut urls: Vec<String> = scan(text).iter().filter_map(|s| s.url()).collect();
        urls.sort();
        Self {
            fences: count_fence_lines(text),
            math: count_math_markers(text),
            urls,
        }
    }

    pub fn math_count(&self, marker: MathMarker) -> usize {
        self.math.get(&marker).copied().unwrap_or(0)
    }
}

pub fn count_fence_lines(text: &str) -> usize {
    FENCE_LINE_RE.find_iter(text).count()
}

fn is_escaped(bytes: &[u8], pos: usize) -> bool {
    bytes[..pos].iter().rev().take_while(|&&b| b == b'\\').count() % 2 == 1
}

pub fn count_math_markers(text: &str) -> BTreeMap<MathMarker, usize> {
    let bytes = text.as_bytes();
    let mut counts = BTreeMap::new();
    let mut bump = |marker: MathMarker| *counts.entry(marker).or_insert(0) += 1;

    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'$' if !is_escaped(bytes, i) => {
                if bytes.get(i + 1) == Some(&b'$') {
                    bump(MathMarker::DoubleDollar);
                    i += 2;
                    continue;
                }
                bump(MathMarker::Dollar);
            }
            b'\\' if !is_escaped(bytes, i) => {
                let rest = &bytes[i + 1..];
                let marker = match rest.first() {
                    Some(b'(') => Some((MathMarker::ParenOpen, 2)),
                    Some(b')') => Some((MathMarker::ParenClose, 2)),
                    Some(b'[') => Some((MathMarker::BracketOpen, 2)),
                    Some(b']') => Some((MathMarker::BracketClose, 2)),
                    _ if rest.starts_with(b"begin{") => Some((MathMarker::Begin, 7)),
                    _ if rest.starts_with(b"end{") => Some((MathMarker::End, 5)),
                    _ => None,
                };
                if let Some((marker, width)) = marker {
                    bump(marker);
                    i += width;
                    continue;
                }
            }
            _ => {}
        }
        i += 1;
    }
    counts
}

/// Multiset difference of two sorted URL lists: (missing, unexpected)
pub fn url_difference(expected: &[String], found: &[String]) -> (Vec<String>, Vec<String>) {
    let mut missing = Vec::new();
    let mut unexpected = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < expected.len() || j < found.len() {
        match (expected.get(i), found.get(j)) {
            (Some(a), Some(b)) if a == b => {
                i += 1;
                j += 1;
            }
            (Some(a), Some(b)) if a < b => {
                missing.push(a.clone());
                i += 1;
            }
            (Some(_), Some(b)) => {
                unexpected.push(b.clone());
                j += 1;
            }
            (Some(a), None) => {
                missing.push(a.clone());
                i += 1;
            }
            (None, Some(b)) => {
                unexpected.push(b.clone());
                j += 1;
            }
            (None, None) => break,
        }
    }
    (missing, unexpected)
}
