/*!
 * Chunker.
 *
 * Splits a protected document into model-sized pieces. Boundaries are
 * tried in this order: ATX headings, blank-line paragraph breaks, then
 * sentence ends, newlines and spaces inside an oversized paragraph. A
 * placeholder token is never cut. Concatenating the chunks gives back the
 * protected document byte for byte.
 */

use log::warn;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::errors::ChunkError;

use super::vault::find_tokens;

static HEADING_LINE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^[ \t]{0,3}#{1,6}(?:[ \t]|$)").expect("valid heading regex"));

static PARAGRAPH_BREAK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\r?\n(?:[ \t]*\r?\n)+").expect("valid paragraph regex"));

static SENTENCE_END_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[.!?。！？]\s+").expect("valid sentence regex"));

/// One slice of the protected document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Zero-based position in the document
    pub index: usize,
    /// `chunk-0001` style identifier used in logs and errors
    pub id: String,
    /// Protected text of this slice
    pub text: String,
    /// Placeholder tokens inside `text`, in order
    pub tokens: Vec<String>,
}

impl Chunk {
    fn new(index: usize, text: String) -> Self {
        let tokens = find_tokens(&text).into_iter().map(|m| m.token).collect();
        Self {
            index,
            id: chunk_id(index),
            text,
            tokens,
        }
    }

    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }
}

pub fn chunk_id(index: usize) -> String {
    format!("chunk-{:04}", index + 1)
}

/// Result of splitting: ordered chunks plus non-fatal warnings
#[derive(Debug, Clone, Default, Serialize)]
pub struct ChunkPlan {
    pub chunks: Vec<Chunk>,
    #[serde(skip)]
    pub warnings: Vec<ChunkError>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PlanEntry {
    Text(String),
    Chunk { text: String },
}

impl ChunkPlan {
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Concatenate chunk text in index order
    pub fn reassemble(&self) -> String {
        let mut ordered: Vec<&Chunk> = self.chunks.iter().collect();
        ordered.sort_by_key(|c| c.index);
        ordered.iter().map(|c| c.text.as_str()).collect()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.chunks)
    }

    /// Read a plan written by `to_json`, or a plain JSON array of strings
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        let entries: Vec<PlanEntry> = serde_json::from_str(json)?;
        let chunks = entries
            .into_iter()
            .enumerate()
            .map(|(index, entry)| match entry {
                PlanEntry::Text(text) | PlanEntry::Chunk { text } => Chunk::new(index, text),
            })
            .collect();
        Ok(Self {
            chunks,
            warnings: Vec::new(),
        })
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Byte offset of the `n`th char of `text`, or `text.len()`
fn byte_offset(text: &str, n: usize) -> usize {
    text.char_indices().nth(n).map(|(i, _)| i).unwrap_or(text.len())
}

fn sections(text: &str) -> Vec<&str> {
    let mut bounds: Vec<usize> = HEADING_LINE_RE
        .find_iter(text)
        .map(|m| m.start())
        .filter(|&s| s > 0)
        .collect();
    bounds.push(text.len());

    let mut out = Vec::with_capacity(bounds.len());
    let mut start = 0;
    for end in bounds {
        if end > start {
            out.push(&text[start..end]);
        }
        start = end;
    }
    out
}

fn paragraphs(section: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    for m in PARAGRAPH_BREAK_RE.find_iter(section) {
        out.push(&section[start..m.end()]);
        start = m.end();
    }
    if start < section.len() {
        out.push(&section[start..]);
    }
    out
}

/// Where to cut `rest` so the head holds at most `max_chars` chars
fn cut_point(rest: &str, max_chars: usize) -> usize {
    let limit = byte_offset(rest, max_chars);
    let window = &rest[..limit];

    if let Some(m) = SENTENCE_END_RE.find_iter(window).last() {
        return m.end();
    }
    if let Some(pos) = window.rfind('\n') {
        return pos + 1;
    }
    if let Some(pos) = window.rfind(' ') {
        if pos > 0 {
            return pos + 1;
        }
    }

    // Hard cut, pulled back to the start of a token it would split
    match find_tokens(rest).into_iter().find(|t| t.start < limit && limit < t.end) {
        Some(token) if token.start > 0 => token.start,
        Some(token) => token.end,
        None => limit,
    }
}

fn force_split(paragraph: &str, max_chars: usize) -> Vec<&str> {
    let mut out = Vec::new();
    let mut rest = paragraph;
    while char_len(rest) > max_chars {
        let cut = cut_point(rest, max_chars);
        if cut == 0 || cut >= rest.len() {
            break;
        }
        out.push(&rest[..cut]);
        rest = &rest[cut..];
    }
    if !rest.is_empty() {
        out.push(rest);
    }
    out
}

/// Greedy packer that keeps every chunk within the limit where it can
struct Packer {
    max_chars: usize,
    chunks: Vec<Chunk>,
    warnings: Vec<ChunkError>,
    current: String,
    current_chars: usize,
}

impl Packer {
    fn new(max_chars: usize) -> Self {
        Self {
            max_chars,
            chunks: Vec::new(),
            warnings: Vec::new(),
            current: String::new(),
            current_chars: 0,
        }
    }

    fn fits(&self, chars: usize) -> bool {
        self.current_chars + chars <= self.max_chars
    }

    fn push(&mut self, unit: &str) {
        let chars = char_len(unit);
        if !self.fits(chars) {
            self.flush();
        }
        self.current.push_str(unit);
        self.current_chars += chars;
        if self.current_chars > self.max_chars {
            let index = self.chunks.len();
            let warning = ChunkError::OversizedUnit {
                chunk_id: chunk_id(index),
                chars: self.current_chars,
                max_chars: self.max_chars,
            };
            warn!("{}", warning);
            self.warnings.push(warning);
            self.flush();
        }
    }

    fn flush(&mut self) {
        if self.current.is_empty() {
            return;
        }
        let text = std::mem::take(&mut self.current);
        self.current_chars = 0;
        let index = self.chunks.len();
        self.chunks.push(Chunk::new(index, text));
    }

    fn finish(mut self) -> ChunkPlan {
        self.flush();
        ChunkPlan {
            chunks: self.chunks,
            warnings: self.warnings,
        }
    }
}

/// Split a protected document into chunks of at most `max_chars` chars.
pub fn split(protected: &str, max_chars: usize) -> Result<ChunkPlan, ChunkError> {
    if max_chars == 0 {
        return Err(ChunkError::InvalidLimit(max_chars));
    }

    let mut packer = Packer::new(max_chars);
    for section in sections(protected) {
        let chars = char_len(section);
        if chars <= max_chars {
            packer.push(section);
            continue;
        }

        // Oversized sections start on a fresh chunk so the heading leads it
        packer.flush();
        for paragraph in paragraphs(section) {
            if char_len(paragraph) <= max_chars {
                packer.push(paragraph);
            } else {
                for piece in force_split(paragraph, max_chars) {
                    packer.push(piece);
                }
            }
        }
    }
    Ok(packer.finish())
}
