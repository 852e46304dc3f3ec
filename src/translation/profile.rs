/*!
 * Document profile: outline, glossary and style guide produced by the
 * profiling call before any chunk is translated.
 *
 * The model answer is parsed leniently where models are sloppy (string lists
 * may come back as a bare string or null) and strictly everywhere else.
 */

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};

use crate::errors::ProfileError;

static JSON_FENCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^\s*```(?:json)?\s*\n(.*?)\n\s*```\s*$").expect("Invalid JSON fence regex"));

pub const REQUIRED_TONE: &str = "technical-but-friendly";
pub const REQUIRED_DENSITY: &str = "medium";

/// Where a document came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Url,
    File,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Url => "url",
            SourceType::File => "file",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocSource {
    #[serde(rename = "type")]
    pub source_type: SourceType,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocLanguage {
    pub source: String,
    pub target: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocInfo {
    pub title: String,
    pub source: DocSource,
    pub language: DocLanguage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutlineEntry {
    pub level: u32,
    pub heading: String,
    #[serde(default, deserialize_with = "lenient_string_list")]
    pub summary_bullets: Vec<String>,
    #[serde(default, deserialize_with = "lenient_string_list")]
    pub key_takeaways: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlossaryEntry {
    pub term_en: String,
    pub term_zh: String,
    pub note_zh: String,
    pub keep_en_on_first_use: bool,
}

impl GlossaryEntry {
    /// Budget size used when filtering per chunk
    pub fn char_size(&self) -> usize {
        self.term_en.chars().count() + self.term_zh.chars().count() + self.note_zh.chars().count()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleGuide {
    pub tone: String,
    pub annotation_density: String,
    #[serde(default, deserialize_with = "lenient_string_list")]
    pub rules: Vec<String>,
}

/// Global profile of a document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentProfile {
    pub doc: DocInfo,
    pub outline: Vec<OutlineEntry>,
    pub glossary: Vec<GlossaryEntry>,
    pub style_guide: StyleGuide,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrList {
    One(String),
    Many(Vec<String>),
}

/// Accept null, a single string, or a list of strings
fn lenient_string_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<StringOrList>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(StringOrList::One(s)) if s.trim().is_empty() => Vec::new(),
        Some(StringOrList::One(s)) => vec![s],
        Some(StringOrList::Many(list)) => list,
    })
}

/// Remove a Markdown code fence wrapped around a JSON answer
pub fn strip_json_fences(text: &str) -> &str {
    match JSON_FENCE_RE.captures(text).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str().trim(),
        None => text.trim(),
    }
}

fn schema(field: impl Into<String>, message: impl Into<String>) -> ProfileError {
    ProfileError::Schema {
        field: field.into(),
        message: message.into(),
    }
}

impl DocumentProfile {
    /// Parse and validate a raw model answer
    pub fn parse(response_text: &str) -> Result<Self, ProfileError> {
        let body = strip_json_fences(response_text);
        let value: serde_json::Value =
            serde_json::from_str(body).map_err(|e| ProfileError::InvalidJson(e.to_string()))?;
        if !value.is_object() {
            return Err(schema("profile", "must be a JSON object"));
        }
        let profile: DocumentProfile = serde_json::from_value(value).map_err(|e| schema("profile", e.to_string()))?;
        profile.validate()?;
        Ok(profile)
    }

    pub fn validate(&self) -> Result<(), ProfileError> {
        for (index, entry) in self.outline.iter().enumerate() {
            if entry.level == 0 {
                return Err(schema(format!("outline[{}].level", index), "must be positive"));
            }
        }
        if self.style_guide.tone != REQUIRED_TONE {
            return Err(schema("style_guide.tone", format!("must be '{}'", REQUIRED_TONE)));
        }
        if self.style_guide.annotation_density != REQUIRED_DENSITY {
            return Err(schema(
                "style_guide.annotation_density",
                format!("must be '{}'", REQUIRED_DENSITY),
            ));
        }
        Ok(())
    }

    /// Overwrite the metadata the model cannot know and fill gaps
    pub fn apply_defaults(
        &mut self,
        source: DocSource,
        source_language: &str,
        target_language: &str,
        title_hint: Option<&str>,
    ) {
        self.doc.source = source;
        self.doc.language = DocLanguage {
            source: source_language.to_string(),
            target: target_language.to_string(),
        };
        if self.doc.title.trim().is_empty() {
            if let Some(hint) = title_hint.filter(|h| !h.trim().is_empty()) {
                self.doc.title = hint.to_string();
            }
        }
        for entry in &mut self.glossary {
            entry.keep_en_on_first_use = true;
        }
    }

    pub fn style_rules(&self) -> Vec<String> {
        self.style_guide
            .rules
            .iter()
            .filter(|r| !r.trim().is_empty())
            .cloned()
            .collect()
    }
}

pub fn escape_table_cell(value: &str) -> String {
    value.replace('|', "\\|").replace('\n', "<br>")
}

/// `## Outline` section
pub fn render_outline(outline: &[OutlineEntry]) -> String {
    let mut lines = vec!["## Outline".to_string()];
    if outline.is_empty() {
        lines.push("_No outline entries._".to_string());
        return lines.join("\n");
    }
    for entry in outline {
        let heading_level = (entry.level as usize + 2).clamp(3, 6);
        lines.push(format!("{} {}", "#".repeat(heading_level), entry.heading));
        if !entry.summary_bullets.is_empty() {
            lines.push("- Summary".to_string());
            lines.extend(entry.summary_bullets.iter().map(|b| format!("  - {}", b)));
        }
        if !entry.key_takeaways.is_empty() {
            lines.push("- Key takeaways".to_string());
            lines.extend(entry.key_takeaways.iter().map(|b| format!("  - {}", b)));
        }
        lines.push(String::new());
    }
    lines.join("\n").trim_end().to_string()
}

/// `## Glossary` section
pub fn render_glossary(glossary: &[GlossaryEntry]) -> String {
    let mut lines = vec!["## Glossary".to_string()];
    if glossary.is_empty() {
        lines.push("_No glossary entries._".to_string());
        return lines.join("\n");
    }
    lines.push("| Term (EN) | Term (ZH) | Note (ZH) | Keep EN First Use |".to_string());
    lines.push("| --- | --- | --- | --- |".to_string());
    for entry in glossary {
        lines.push(format!(
            "| {} | {} | {} | {} |",
            escape_table_cell(&entry.term_en),
            escape_table_cell(&entry.term_zh),
            escape_table_cell(&entry.note_zh),
            entry.keep_en_on_first_use
        ));
    }
    lines.join("\n")
}

/// Standalone Markdown view of a profile, used by `debug-profile`
pub fn render_profile_markdown(profile: &DocumentProfile) -> String {
    let title = match profile.doc.title.trim() {
        "" => "Profile",
        title => title,
    };
    format!(
        "# {}\n\n{}\n\n{}\n",
        title,
        render_outline(&profile.outline),
        render_glossary(&profile.glossary)
    )
}
