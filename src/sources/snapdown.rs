/*!
 * Snapdown diagrams embedded in course pages.
 *
 * The reader service drops `<script type="application/snapdown">` blocks, so
 * they are pulled out of the raw page HTML, optionally converted to Mermaid
 * by the model, and put back as fenced code under the heading they followed.
 */

use log::{debug, warn};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::Value;
use std::collections::HashMap;

use crate::errors::ProviderError;
use crate::translation::core::DocumentTranslator;
use crate::translation::retry::RetryPolicy;

/// `<script type="application/snapdown">` (group 1 marks the `+json` variant)
static SNAPDOWN_SCRIPT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<script\b[^>]*\btype\s*=\s*['"]application/snapdown(\+json)?['"][^>]*>(.*?)</script\s*>"#)
        .expect("Invalid snapdown script regex")
});

/// `<hN ...>text</hN>`; the closing level is checked by the caller
static HEADING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<h([1-6])\b[^>]*>(.*?)</h([1-6])\s*>").expect("Invalid heading regex"));

static HTML_TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").expect("Invalid tag regex"));

/// The entities course pages actually use; anything else passes through
static ENTITY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"&(#[xX][0-9a-fA-F]{1,6}|#[0-9]{1,7}|amp|lt|gt|quot|apos|nbsp);").expect("Invalid entity regex")
});

const SECTION_HEADING: &str = "## Snapdown Diagrams (extracted)";

/// Fence language of a diagram block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagramLanguage {
    Snapdown,
    Mermaid,
}

impl DiagramLanguage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Snapdown => "snapdown",
            Self::Mermaid => "mermaid",
        }
    }
}

/// One diagram and the page heading it appeared under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapdownBlock {
    pub language: DiagramLanguage,
    pub content: String,
    pub heading: Option<String>,
}

impl SnapdownBlock {
    /// The block as a fenced code block, with a fence longer than any backtick run inside
    pub fn fenced(&self) -> String {
        let fence = build_fence(&self.content);
        format!("{}{}\n{}\n{}", fence, self.language.as_str(), self.content, fence)
    }
}

fn build_fence(content: &str) -> String {
    let longest_run = content.split(|c| c != '`').map(str::len).max().unwrap_or(0);
    "`".repeat((longest_run + 1).max(3))
}

/// Decode numeric entities and the common named ones
pub fn decode_entities(text: &str) -> String {
    ENTITY_RE
        .replace_all(text, |caps: &Captures| {
            let entity = &caps[1];
            let decoded = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "nbsp" => Some('\u{a0}'),
                _ => {
                    let code = match entity.strip_prefix("#x").or_else(|| entity.strip_prefix("#X")) {
                        Some(hex) => u32::from_str_radix(hex, 16).ok(),
                        None => entity[1..].parse::<u32>().ok(),
                    };
                    code.and_then(char::from_u32)
                }
            };
            decoded.map(String::from).unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

fn normalize_heading(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Snapdown scripts of a page, each tagged with the closest heading before it.
///
/// `application/snapdown+json` scripts hold layout data, not diagrams, and are skipped.
pub fn extract_snapdown_blocks(html: &str) -> Vec<SnapdownBlock> {
    let headings: Vec<(usize, String)> = HEADING_RE
        .captures_iter(html)
        .filter(|caps| caps[1] == caps[3])
        .filter_map(|caps| {
            let start = caps.get(0)?.start();
            let text = normalize_heading(&decode_entities(&HTML_TAG_RE.replace_all(&caps[2], "")));
            (!text.is_empty()).then_some((start, text))
        })
        .collect();

    SNAPDOWN_SCRIPT_RE
        .captures_iter(html)
        .filter(|caps| caps.get(1).is_none())
        .filter_map(|caps| {
            let start = caps.get(0)?.start();
            let content = decode_entities(&caps[2]).trim().to_string();
            if content.is_empty() {
                return None;
            }
            let heading = headings
                .iter()
                .rev()
                .find(|(position, _)| *position < start)
                .map(|(_, text)| text.clone());
            Some(SnapdownBlock {
                language: DiagramLanguage::Snapdown,
                content,
                heading,
            })
        })
        .collect()
}

/// Append blocks at the end of the document under their own section
pub fn append_snapdown_blocks(markdown: &str, blocks: &[SnapdownBlock]) -> String {
    if blocks.is_empty() {
        return markdown.to_string();
    }
    let section: Vec<String> = blocks.iter().map(SnapdownBlock::fenced).collect();
    format!(
        "{}\n\n{}\n\n{}\n",
        markdown.trim_end_matches('\n'),
        SECTION_HEADING,
        section.join("\n\n")
    )
}

/// Insert each block after the first matching Markdown heading, in page order.
///
/// Blocks whose heading is missing or not found go to a trailing section.
pub fn insert_snapdown_blocks(markdown: &str, blocks: &[SnapdownBlock]) -> String {
    if blocks.is_empty() {
        return markdown.to_string();
    }

    let mut lines: Vec<String> = markdown.lines().map(str::to_string).collect();
    let mut leftovers = Vec::new();
    let mut cursor = 0;

    for block in blocks {
        let Some(heading) = block.heading.as_deref().map(normalize_heading) else {
            leftovers.push(block.clone());
            continue;
        };
        let found = (cursor..lines.len()).find(|&index| {
            let line = lines[index].trim_start();
            line.starts_with('#') && normalize_heading(line.trim_start_matches(['#', ' '])) == heading
        });
        let Some(index) = found else {
            debug!("No heading '{}' for a Snapdown block, appending it", heading);
            leftovers.push(block.clone());
            continue;
        };

        let mut insert_at = index + 1;
        while insert_at < lines.len() && lines[insert_at].trim().is_empty() {
            insert_at += 1;
        }
        lines.insert(insert_at, String::new());
        lines.insert(insert_at, block.fenced());
        cursor = insert_at + 2;
    }

    let mut merged = lines.join("\n");
    if markdown.ends_with('\n') {
        merged.push('\n');
    }
    append_snapdown_blocks(&merged, &leftovers)
}

/// Mermaid code from a conversion answer: a `{"mermaid": ...}` object, or bare text
pub fn extract_mermaid(answer: &str) -> Option<String> {
    let text = answer.trim();
    if text.is_empty() {
        return None;
    }
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => map.get("mermaid").and_then(Value::as_str).map(str::to_string),
        Ok(_) => None,
        Err(_) => Some(text.to_string()),
    }
}

/// Drop code fences and stray backticks around model-written Mermaid
pub fn sanitize_mermaid(content: &str) -> String {
    let mut lines: Vec<&str> = content.trim().lines().collect();
    if lines.first().is_some_and(|line| line.trim_start().starts_with("```")) {
        lines.remove(0);
        if lines.last().is_some_and(|line| line.trim_start().starts_with("```")) {
            lines.pop();
        }
    }
    lines.join("\n").replace('`', "").trim().to_string()
}

/// Convert Snapdown blocks to Mermaid.
///
/// A block whose conversion fails keeps its Snapdown source. Identical
/// diagrams are converted once.
pub async fn convert_to_mermaid(
    blocks: Vec<SnapdownBlock>,
    translator: &dyn DocumentTranslator,
    retry: &RetryPolicy,
) -> Vec<SnapdownBlock> {
    let mut by_source: HashMap<String, Option<String>> = HashMap::new();
    let mut converted = Vec::with_capacity(blocks.len());

    for block in blocks {
        if block.language != DiagramLanguage::Snapdown {
            converted.push(block);
            continue;
        }
        if !by_source.contains_key(&block.content) {
            let mermaid = convert_one(&block.content, translator, retry).await;
            by_source.insert(block.content.clone(), mermaid);
        }
        match by_source.get(&block.content).cloned().flatten() {
            Some(mermaid) => converted.push(SnapdownBlock {
                language: DiagramLanguage::Mermaid,
                content: mermaid,
                heading: block.heading,
            }),
            None => converted.push(block),
        }
    }
    converted
}

async fn convert_one(source: &str, translator: &dyn DocumentTranslator, retry: &RetryPolicy) -> Option<String> {
    let outcome = retry
        .run("diagram", move |_| translator.convert_diagram(source), ProviderError::is_transient)
        .await;
    match outcome.result {
        Ok(answer) => extract_mermaid(&answer)
            .map(|mermaid| sanitize_mermaid(&mermaid))
            .filter(|mermaid| !mermaid.is_empty()),
        Err(e) => {
            warn!("Snapdown conversion failed, keeping the original diagram: {}", e);
            None
        }
    }
}
