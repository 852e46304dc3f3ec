/*!
 * Span scanner.
 *
 * Finds the structural parts of a Markdown document that must reach the
 * reader unchanged: code, math, link targets, HTML, tables and footnote
 * markers. Each category has its own small recognizer. Recognizers run in a
 * fixed precedence order and only look at text that no earlier recognizer
 * has claimed, so `$` inside inline code is never math and a link inside a
 * fenced block is never a link.
 *
 * Scanning never fails. An opener without a closer is protected up to the
 * end of the unclaimed region it starts in.
 */

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Math delimiter families tracked separately by QA
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MathDelimiter {
    /// `$...$`
    Dollar,
    /// `$$...$$`
    DoubleDollar,
    /// `\(...\)`
    Paren,
    /// `\[...\]`
    Bracket,
    /// `\begin{env}...\end{env}`
    Environment,
}

/// Category of a protected span
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanKind {
    FencedCode,
    InlineCode,
    Math(MathDelimiter),
    /// `(url "title")` part of an inline link or image
    LinkDestination,
    /// `[id]` part of a reference-style link or image
    LinkReference,
    /// `[id]: url "title"` definition line
    LinkDefinition,
    /// `<https://...>`
    Autolink,
    Html,
    Table,
    FootnoteReference,
    /// `[^id]:` label opening a footnote definition
    FootnoteDefinition,
}

impl SpanKind {
    /// Uppercase tag embedded in placeholder tokens
    pub fn tag(&self) -> &'static str {
        match self {
            Self::FencedCode => "CODE_BLOCK",
            Self::InlineCode => "INLINE_CODE",
            Self::Math(MathDelimiter::Dollar) => "MATH_INLINE",
            Self::Math(MathDelimiter::DoubleDollar) => "MATH_DISPLAY",
            Self::Math(MathDelimiter::Paren) => "MATH_PAREN",
            Self::Math(MathDelimiter::Bracket) => "MATH_BRACKET",
            Self::Math(MathDelimiter::Environment) => "MATH_ENV",
            Self::LinkDestination => "LINK",
            Self::LinkReference => "LINK_REF",
            Self::LinkDefinition => "LINK_DEF",
            Self::Autolink => "AUTOLINK",
            Self::Html => "HTML",
            Self::Table => "TABLE",
            Self::FootnoteReference => "FOOTNOTE_REF",
            Self::FootnoteDefinition => "FOOTNOTE_DEF",
        }
    }
}

/// A verbatim slice of the source that must survive translation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub kind: SpanKind,
    /// Byte offset of the first character
    pub start: usize,
    /// Byte offset one past the last character
    pub end: usize,
    /// `text[start..end]`
    pub raw: String,
}

impl Span {
    fn new(text: &str, kind: SpanKind, range: Range<usize>) -> Self {
        Self {
            kind,
            start: range.start,
            end: range.end,
            raw: text[range].to_string(),
        }
    }

    /// URL carried by link-like spans
    pub fn url(&self) -> Option<String> {
        match self.kind {
            SpanKind::LinkDestination => {
                let inner = self.raw.strip_prefix('(')?.strip_suffix(')')?;
                destination_url(inner)
            }
            SpanKind::LinkDefinition => {
                let colon = self.raw.find("]:")?;
                destination_url(&self.raw[colon + 2..])
            }
            SpanKind::Autolink => {
                let inner = self.raw.strip_prefix('<')?.strip_suffix('>')?;
                Some(inner.to_string())
            }
            _ => None,
        }
    }
}

fn destination_url(dest: &str) -> Option<String> {
    let dest = dest.trim_start();
    if let Some(rest) = dest.strip_prefix('<') {
        let close = rest.find('>')?;
        return Some(rest[..close].to_string());
    }
    let url = dest.split_whitespace().next()?;
    if url.is_empty() { None } else { Some(url.to_string()) }
}

/// Scan `text` and return its protected spans, ordered and non-overlapping.
pub fn scan(text: &str) -> Vec<Span> {
    let mut claims = Claims::default();

    scan_fenced_code(text, &mut claims);
    scan_gaps(text, &mut claims, scan_inline_code);

    scan_gaps(text, &mut claims, |t, r| scan_paired(t, r, "$$", "$$", MathDelimiter::DoubleDollar));
    scan_gaps(text, &mut claims, |t, r| scan_paired(t, r, "\\[", "\\]", MathDelimiter::Bracket));
    scan_gaps(text, &mut claims, scan_math_environment);
    scan_gaps(text, &mut claims, |t, r| scan_paired(t, r, "\\(", "\\)", MathDelimiter::Paren));
    scan_gaps(text, &mut claims, scan_inline_dollar);

    scan_link_definitions(text, &mut claims);
    scan_inline_links(text, &mut claims);
    scan_gaps(text, &mut claims, scan_autolinks);

    scan_gaps(text, &mut claims, scan_html);
    scan_tables(text, &mut claims);
    scan_gaps(text, &mut claims, scan_footnotes);

    claims.spans
}

/// Spans accepted so far, kept sorted by start offset
#[derive(Default)]
struct Claims {
    spans: Vec<Span>,
}

impl Claims {
    fn overlaps(&self, range: &Range<usize>) -> bool {
        self.spans.iter().any(|s| s.start < range.end && range.start < s.end)
    }

    fn containing(&self, pos: usize) -> Option<&Span> {
        self.spans.iter().find(|s| s.start <= pos && pos < s.end)
    }

    fn insert(&mut self, span: Span) {
        let idx = self.spans.partition_point(|s| s.start < span.start);
        self.spans.insert(idx, span);
    }

    /// Unclaimed byte ranges of a text of length `len`
    fn gaps(&self, len: usize) -> Vec<Range<usize>> {
        let mut gaps = Vec::new();
        let mut cursor = 0;
        for span in &self.spans {
            if span.start > cursor {
                gaps.push(cursor..span.start);
            }
            cursor = cursor.max(span.end);
        }
        if cursor < len {
            gaps.push(cursor..len);
        }
        gaps
    }
}

/// Run a region-local recognizer over every unclaimed region and claim its matches
fn scan_gaps<F>(text: &str, claims: &mut Claims, recognizer: F)
where
    F: Fn(&str, Range<usize>) -> Vec<(SpanKind, Range<usize>)>,
{
    let found: Vec<_> = claims
        .gaps(text.len())
        .into_iter()
        .flat_map(|gap| recognizer(text, gap))
        .collect();
    for (kind, range) in found {
        claims.insert(Span::new(text, kind, range));
    }
}

/// True when the byte at `pos` is preceded by an odd number of backslashes
fn is_escaped(bytes: &[u8], pos: usize) -> bool {
    let mut count = 0;
    let mut i = pos;
    while i > 0 && bytes[i - 1] == b'\\' {
        count += 1;
        i -= 1;
    }
    count % 2 == 1
}

/// `(start, end_without_terminator)` for every line
fn line_bounds(text: &str) -> Vec<(usize, usize)> {
    let mut lines = Vec::new();
    let mut start = 0;
    for (idx, _) in text.match_indices('\n') {
        let end = if idx > start && text.as_bytes()[idx - 1] == b'\r' { idx - 1 } else { idx };
        lines.push((start, end));
        start = idx + 1;
    }
    if start < text.len() {
        lines.push((start, text.len()));
    }
    lines
}

static FENCE_OPEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[ \t]*(`{3,}|~{3,})(.*)$").expect("valid fence regex"));

fn scan_fenced_code(text: &str, claims: &mut Claims) {
    let lines = line_bounds(text);
    let mut idx = 0;
    while idx < lines.len() {
        let (start, end) = lines[idx];
        let line = &text[start..end];
        let Some(caps) = FENCE_OPEN_RE.captures(line) else {
            idx += 1;
            continue;
        };
        let fence = &caps[1];
        let fence_char = fence.as_bytes()[0];
        // A backtick fence cannot carry backticks in its info string
        if fence_char == b'`' && caps[2].contains('`') {
            idx += 1;
            continue;
        }

        let mut close = None;
        for (offset, &(cs, ce)) in lines[idx + 1..].iter().enumerate() {
            if closes_fence(&text[cs..ce], fence_char, fence.len()) {
                close = Some((idx + 1 + offset, ce));
                break;
            }
        }
        match close {
            Some((close_idx, close_end)) => {
                claims.insert(Span::new(text, SpanKind::FencedCode, start..close_end));
                idx = close_idx + 1;
            }
            None => {
                claims.insert(Span::new(text, SpanKind::FencedCode, start..text.len()));
                return;
            }
        }
    }
}

fn closes_fence(line: &str, fence_char: u8, min_len: usize) -> bool {
    let trimmed = line.trim_start_matches([' ', '\t']);
    let run = trimmed.bytes().take_while(|&b| b == fence_char).count();
    run >= min_len && trimmed[run..].trim().is_empty()
}

fn backtick_run(bytes: &[u8], pos: usize, end: usize) -> usize {
    bytes[pos..end].iter().take_while(|&&b| b == b'`').count()
}

fn scan_inline_code(text: &str, region: Range<usize>) -> Vec<(SpanKind, Range<usize>)> {
    let bytes = text.as_bytes();
    let mut found = Vec::new();
    let mut i = region.start;
    while i < region.end {
        if bytes[i] != b'`' {
            i += 1;
            continue;
        }
        if is_escaped(bytes, i) {
            i += 1;
            continue;
        }
        let run = backtick_run(bytes, i, region.end);
        let mut j = i + run;
        let mut close = None;
        while j < region.end {
            if bytes[j] == b'`' {
                let candidate = backtick_run(bytes, j, region.end);
                if candidate == run {
                    close = Some(j + run);
                    break;
                }
                j += candidate;
            } else {
                j += 1;
            }
        }
        let end = close.unwrap_or(region.end);
        found.push((SpanKind::InlineCode, i..end));
        i = end;
    }
    found
}

/// Delimited math whose opener and closer are fixed strings
fn scan_paired(
    text: &str,
    region: Range<usize>,
    open: &str,
    close: &str,
    variant: MathDelimiter,
) -> Vec<(SpanKind, Range<usize>)> {
    let bytes = text.as_bytes();
    let mut found = Vec::new();
    let mut i = region.start;
    while i + open.len() <= region.end {
        if !bytes[i..].starts_with(open.as_bytes()) || is_escaped(bytes, i) {
            i += 1;
            continue;
        }
        let mut j = i + open.len();
        let mut end = region.end;
        while j + close.len() <= region.end {
            if bytes[j..].starts_with(close.as_bytes()) && !is_escaped(bytes, j) {
                end = j + close.len();
                break;
            }
            j += 1;
        }
        found.push((SpanKind::Math(variant), i..end));
        i = end;
    }
    found
}

static MATH_ENV_OPEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\\begin\{([A-Za-z]+\*?)\}").expect("valid environment regex"));

fn scan_math_environment(text: &str, region: Range<usize>) -> Vec<(SpanKind, Range<usize>)> {
    let bytes = text.as_bytes();
    let mut found = Vec::new();
    let mut cursor = region.start;
    while cursor < region.end {
        let Some(caps) = MATH_ENV_OPEN_RE.captures(&text[cursor..region.end]) else {
            break;
        };
        let Some(whole) = caps.get(0) else { break };
        let start = cursor + whole.start();
        if is_escaped(bytes, start) {
            cursor = start + 1;
            continue;
        }
        let closer = format!("\\end{{{}}}", &caps[1]);
        let body_start = cursor + whole.end();
        let end = text[body_start..region.end]
            .find(&closer)
            .map(|pos| body_start + pos + closer.len())
            .unwrap_or(region.end);
        found.push((SpanKind::Math(MathDelimiter::Environment), start..end));
        cursor = end;
    }
    found
}

fn scan_inline_dollar(text: &str, region: Range<usize>) -> Vec<(SpanKind, Range<usize>)> {
    let bytes = text.as_bytes();
    let mut found = Vec::new();
    let mut i = region.start;
    while i < region.end {
        if bytes[i] != b'$' || is_escaped(bytes, i) {
            i += 1;
            continue;
        }
        let opens = bytes
            .get(i + 1)
            .is_some_and(|&b| i + 1 < region.end && !b.is_ascii_whitespace() && b != b'$');
        if !opens {
            i += 1;
            continue;
        }
        let mut close = None;
        let mut j = i + 2;
        while j < region.end && bytes[j] != b'\n' {
            if bytes[j] == b'$'
                && !is_escaped(bytes, j)
                && !bytes[j - 1].is_ascii_whitespace()
                && !bytes.get(j + 1).is_some_and(|b| b.is_ascii_digit())
            {
                close = Some(j + 1);
                break;
            }
            j += 1;
        }
        match close {
            Some(end) => {
                found.push((SpanKind::Math(MathDelimiter::Dollar), i..end));
                i = end;
            }
            None => i += 1,
        }
    }
    found
}

static LINK_DEFINITION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^ {0,3}(\[[^\]\^\n][^\]\n]*\]:[ \t]*\S[^\r\n]*)").expect("valid definition regex")
});

fn scan_link_definitions(text: &str, claims: &mut Claims) {
    let found: Vec<Range<usize>> = LINK_DEFINITION_RE
        .captures_iter(text)
        .filter_map(|caps| caps.get(1).map(|m| m.range()))
        .collect();
    for range in found {
        if !claims.overlaps(&range) {
            claims.insert(Span::new(text, SpanKind::LinkDefinition, range));
        }
    }
}

/// Index of the `]` closing the label opened at `open`, stepping over claimed spans
fn label_end(text: &str, claims: &Claims, open: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut i = open;
    while i < bytes.len() {
        if let Some(span) = claims.containing(i) {
            i = span.end;
            continue;
        }
        match bytes[i] {
            b'[' if !is_escaped(bytes, i) => depth += 1,
            b']' if !is_escaped(bytes, i) => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            b'\n' if bytes.get(i + 1) == Some(&b'\n') => return None,
            _ => {}
        }
        i += 1;
    }
    None
}

/// Index one past the `)` matching the `(` at `open`; destinations stay on one line
fn destination_end(bytes: &[u8], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_title: Option<u8> = None;
    for (offset, &b) in bytes[open..].iter().enumerate() {
        let i = open + offset;
        if b == b'\n' {
            return None;
        }
        if let Some(quote) = in_title {
            if b == quote && !is_escaped(bytes, i) {
                in_title = None;
            }
            continue;
        }
        match b {
            b'"' | b'\'' if depth == 1 && i > open + 1 && bytes[i - 1].is_ascii_whitespace() => {
                in_title = Some(b)
            }
            b'(' if !is_escaped(bytes, i) => depth += 1,
            b')' if !is_escaped(bytes, i) => {
                depth -= 1;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

fn scan_inline_links(text: &str, claims: &mut Claims) {
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if let Some(span) = claims.containing(i) {
            i = span.end;
            continue;
        }
        if bytes[i] != b'[' || is_escaped(bytes, i) || bytes.get(i + 1) == Some(&b'^') {
            i += 1;
            continue;
        }
        let Some(close) = label_end(text, claims, i) else {
            i += 1;
            continue;
        };
        match bytes.get(close + 1) {
            Some(b'(') => {
                if let Some(end) = destination_end(bytes, close + 1) {
                    let range = close + 1..end;
                    if !claims.overlaps(&range) {
                        claims.insert(Span::new(text, SpanKind::LinkDestination, range));
                    }
                }
            }
            Some(b'[') => {
                let label_start = close + 1;
                let id_end = text[label_start..]
                    .find(|c: char| c == ']' || c == '\n')
                    .map(|p| label_start + p);
                if let Some(id_end) = id_end {
                    let id = &text[label_start + 1..id_end];
                    let range = label_start..id_end + 1;
                    if bytes[id_end] == b']'
                        && !id.trim().is_empty()
                        && !id.starts_with('^')
                        && !claims.overlaps(&range)
                    {
                        claims.insert(Span::new(text, SpanKind::LinkReference, range));
                    }
                }
            }
            _ => {}
        }
        // Nested labels (an image inside a link) are visited on their own
        i += 1;
    }
}

static AUTOLINK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<[A-Za-z][A-Za-z0-9+.\-]{1,31}:[^\s<>]*>").expect("valid autolink regex"));

fn scan_autolinks(text: &str, region: Range<usize>) -> Vec<(SpanKind, Range<usize>)> {
    AUTOLINK_RE
        .find_iter(&text[region.clone()])
        .map(|m| (SpanKind::Autolink, region.start + m.start()..region.start + m.end()))
        .collect()
}

static HTML_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)<!--|<!DOCTYPE[^>]*>|</?[A-Za-z][A-Za-z0-9\-]*(?:\s[^<>]*)?/?>").expect("valid html regex")
});

fn scan_html(text: &str, region: Range<usize>) -> Vec<(SpanKind, Range<usize>)> {
    let slice = &text[region.clone()];
    let mut found = Vec::new();
    let mut cursor = 0;
    while let Some(m) = HTML_RE.find_at(slice, cursor) {
        let start = m.start();
        let end = if m.as_str() == "<!--" {
            slice[m.end()..]
                .find("-->")
                .map(|p| m.end() + p + 3)
                .unwrap_or(slice.len())
        } else {
            m.end()
        };
        found.push((SpanKind::Html, region.start + start..region.start + end));
        cursor = end;
    }
    found
}

static TABLE_SEPARATOR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[ \t]*\|?[ \t]*:?-+:?[ \t]*(\|[ \t]*:?-+:?[ \t]*)*\|?[ \t]*$").expect("valid separator regex")
});

fn scan_tables(text: &str, claims: &mut Claims) {
    let lines = line_bounds(text);
    let is_row = |&(start, end): &(usize, usize)| {
        let line = &text[start..end];
        line.contains('|') && !line.trim().is_empty() && claims.containing(start).is_none()
    };

    let mut tables = Vec::new();
    let mut idx = 0;
    while idx < lines.len() {
        if !is_row(&lines[idx]) {
            idx += 1;
            continue;
        }
        let first = idx;
        while idx < lines.len() && is_row(&lines[idx]) {
            idx += 1;
        }
        let run = &lines[first..idx];
        let has_separator = run
            .iter()
            .skip(1)
            .any(|&(s, e)| TABLE_SEPARATOR_RE.is_match(&text[s..e]) && text[s..e].contains('|'));
        if has_separator {
            tables.push(run[0].0..run[run.len() - 1].1);
        }
    }

    for range in tables {
        let partial = claims
            .spans
            .iter()
            .any(|s| s.start < range.end && range.start < s.end && (s.start < range.start || s.end > range.end));
        if partial {
            continue;
        }
        claims.spans.retain(|s| !(s.start >= range.start && s.end <= range.end));
        claims.insert(Span::new(text, SpanKind::Table, range));
    }
}

static FOOTNOTE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[\^[^\]\s]+\](:)?").expect("valid footnote regex"));

fn scan_footnotes(text: &str, region: Range<usize>) -> Vec<(SpanKind, Range<usize>)> {
    let bytes = text.as_bytes();
    FOOTNOTE_RE
        .captures_iter(&text[region.clone()])
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let start = region.start + whole.start();
            if is_escaped(bytes, start) {
                return None;
            }
            let line_start = text[..start].rfind('\n').map(|p| p + 1).unwrap_or(0);
            let at_line_start = text[line_start..start].len() <= 3
                && text[line_start..start].bytes().all(|b| b == b' ');
            if caps.get(1).is_some() && at_line_start {
                Some((SpanKind::FootnoteDefinition, start..region.start + whole.end()))
            } else {
                let end = region.start + caps.get(1).map(|c| c.start()).unwrap_or(whole.end());
                Some((SpanKind::FootnoteReference, start..end))
            }
        })
        .collect()
}
