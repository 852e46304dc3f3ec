/*!
 * Prompt templates for chunk translation and document profiling.
 *
 * Both prompts wrap the document text in `<<<` / `>>>` so the model can tell
 * instructions from content. The output cleaner strips the markers if the
 * model echoes them back.
 */

use crate::translation::profile::{escape_table_cell, GlossaryEntry, OutlineEntry};

/// A system prompt and a user prompt, ready to send
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptMessages {
    pub system: String,
    pub user: String,
}

/// Fixed prompt texts.
pub struct PromptTemplate;

impl PromptTemplate {
    /// System prompt for chunk translation.
    pub const TRANSLATOR_SYSTEM: &'static str = "You are a technical translation assistant for study notes. \
Output ONLY Markdown. Do not wrap output in JSON or code fences. \
Preserve all placeholders and Markdown structure exactly.";

    /// System prompt for the profiling call.
    pub const PROFILER_SYSTEM: &'static str = "You are a translation profiling assistant. Output ONLY valid JSON. \
Do not include markdown, code fences, or extra text.";

    /// System prompt for Snapdown to Mermaid conversion.
    pub const DIAGRAM_SYSTEM: &'static str = "You convert Snapdown DSL diagrams into Mermaid graph syntax. \
Return a JSON object with a single key 'mermaid' and a string value. \
The Mermaid value must be raw Mermaid code only with no backticks, \
no code fences, and no surrounding commentary.";

    /// Shape of the profile the model must return.
    pub const PROFILE_SCHEMA_EXAMPLE: &'static str = r#"{
  "doc": {
    "title": "...",
    "source": {"type": "url|file", "value": "..."},
    "language": {"source": "en", "target": "zh-CN"}
  },
  "outline": [
    {
      "level": 1,
      "heading": "...",
      "summary_bullets": ["..."],
      "key_takeaways": ["..."]
    }
  ],
  "glossary": [
    {
      "term_en": "...",
      "term_zh": "...",
      "note_zh": "...",
      "keep_en_on_first_use": true
    }
  ],
  "style_guide": {
    "tone": "technical-but-friendly",
    "annotation_density": "medium",
    "rules": ["..."]
  }
}"#;

    const TRANSLATION_REQUIREMENTS: [&'static str; 8] = [
        "- Output Markdown only; no JSON wrapper, no extra commentary.",
        "- Preserve Markdown structure, links, math, code fences, and inline code.",
        "- Do not translate or modify placeholder tokens like __CODE_BLOCK_0001__.",
        "- Term style: 首次出现使用 `中文（English）`，后续只用中文。",
        "- Annotation density: medium (key explanation + 1 example/analogy).",
        "- Annotation format: `> **学习批注：** ...` or `> **背景扩展：** ...`.",
        "- Glossary enforcement is soft: prefer glossary terms when relevant.",
        "- Keep headings at the same level and in the same position.",
    ];
}

/// Headings-only outline, one `- L<level> <heading>` line per entry
pub fn render_condensed_outline(outline: &[OutlineEntry]) -> String {
    if outline.is_empty() {
        return "_No outline provided._".to_string();
    }
    outline
        .iter()
        .map(|entry| format!("- L{} {}", entry.level, entry.heading))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Glossary as a raw-field table for the model
pub fn render_prompt_glossary(glossary: &[GlossaryEntry]) -> String {
    if glossary.is_empty() {
        return "_No glossary entries._".to_string();
    }
    let mut lines = vec![
        "| term_en | term_zh | note_zh | keep_en_on_first_use |".to_string(),
        "| --- | --- | --- | --- |".to_string(),
    ];
    lines.extend(glossary.iter().map(|entry| {
        format!(
            "| {} | {} | {} | {} |",
            escape_table_cell(&entry.term_en),
            escape_table_cell(&entry.term_zh),
            escape_table_cell(&entry.note_zh),
            entry.keep_en_on_first_use
        )
    }));
    lines.join("\n")
}

/// Builder for the translation prompt of one chunk.
#[derive(Debug, Clone, Default)]
pub struct TranslationPromptBuilder<'a> {
    outline: &'a [OutlineEntry],
    glossary: &'a [GlossaryEntry],
    style_rules: &'a [String],
    tokens: &'a [String],
}

impl<'a> TranslationPromptBuilder<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_outline(mut self, outline: &'a [OutlineEntry]) -> Self {
        self.outline = outline;
        self
    }

    pub fn with_glossary(mut self, glossary: &'a [GlossaryEntry]) -> Self {
        self.glossary = glossary;
        self
    }

    pub fn with_style_rules(mut self, rules: &'a [String]) -> Self {
        self.style_rules = rules;
        self
    }

    /// Placeholders the chunk contains; each must come back exactly once
    pub fn with_placeholders(mut self, tokens: &'a [String]) -> Self {
        self.tokens = tokens;
        self
    }

    pub fn build_user_prompt(&self, chunk_text: &str) -> String {
        let mut lines: Vec<String> = vec![
            "Translate the chunk from English to Chinese.".to_string(),
            "Requirements:".to_string(),
        ];
        lines.extend(PromptTemplate::TRANSLATION_REQUIREMENTS.iter().map(|r| r.to_string()));

        let rules: Vec<&String> = self.style_rules.iter().filter(|r| !r.trim().is_empty()).collect();
        if !rules.is_empty() {
            lines.push(String::new());
            lines.push("Style rules:".to_string());
            lines.extend(rules.iter().map(|r| format!("- {}", r)));
        }

        if !self.tokens.is_empty() {
            lines.push(String::new());
            lines.push("Placeholders (must appear exactly once, unchanged):".to_string());
            lines.extend(self.tokens.iter().map(|t| format!("- {}", t)));
        }

        lines.push(String::new());
        lines.push("Condensed outline:".to_string());
        lines.push(render_condensed_outline(self.outline));
        lines.push(String::new());
        lines.push("Glossary:".to_string());
        lines.push(render_prompt_glossary(self.glossary));
        lines.push(String::new());
        lines.push("Chunk (protected text, keep placeholders unchanged):".to_string());
        lines.push("<<<".to_string());
        lines.push(chunk_text.to_string());
        lines.push(">>>".to_string());
        lines.join("\n")
    }

    pub fn build(&self, chunk_text: &str) -> PromptMessages {
        PromptMessages {
            system: PromptTemplate::TRANSLATOR_SYSTEM.to_string(),
            user: self.build_user_prompt(chunk_text),
        }
    }
}

/// Prompt asking for the Mermaid version of one Snapdown diagram
pub fn render_diagram_prompt(snapdown: &str) -> PromptMessages {
    PromptMessages {
        system: PromptTemplate::DIAGRAM_SYSTEM.to_string(),
        user: format!("Snapdown DSL:\n{}", snapdown),
    }
}

/// Builder for the profiling prompt.
#[derive(Debug, Clone)]
pub struct ProfilePromptBuilder<'a> {
    source_type: &'a str,
    source_value: &'a str,
    source_language: &'a str,
    target_language: &'a str,
    title_hint: Option<&'a str>,
}

impl<'a> ProfilePromptBuilder<'a> {
    pub fn new(source_type: &'a str, source_value: &'a str) -> Self {
        Self {
            source_type,
            source_value,
            source_language: "en",
            target_language: "zh-CN",
            title_hint: None,
        }
    }

    pub fn with_languages(mut self, source_language: &'a str, target_language: &'a str) -> Self {
        self.source_language = source_language;
        self.target_language = target_language;
        self
    }

    pub fn with_title_hint(mut self, title_hint: Option<&'a str>) -> Self {
        self.title_hint = title_hint.filter(|t| !t.trim().is_empty());
        self
    }

    pub fn build(&self, content: &str) -> PromptMessages {
        let mut user = format!(
            "Create a global profile for the document.\n\
Return a JSON object that matches the schema exactly.\n\
Schema example:\n{schema}\n\
Rules:\n\
- Output ONLY valid JSON.\n\
- Use double quotes for all keys and strings.\n\
- keep_en_on_first_use must be true for every glossary entry.\n\
- tone must be \"technical-but-friendly\".\n\
- annotation_density must be \"medium\".\n\
- style_guide.rules should be a list of short, actionable rules.\n\
- Term style: first occurrence uses \"Chinese (English)\".\n\
- Glossary enforcement is soft: prefer glossary terms when relevant.\n\
- If a list has no items, return an empty list.\n\
\n\
Source metadata:\n\
- source_type: {source_type}\n\
- source_value: {source_value}\n\
- source_language: {source_language}\n\
- target_language: {target_language}",
            schema = PromptTemplate::PROFILE_SCHEMA_EXAMPLE,
            source_type = self.source_type,
            source_value = self.source_value,
            source_language = self.source_language,
            target_language = self.target_language,
        );
        if let Some(hint) = self.title_hint {
            user.push_str(&format!("\n- title_hint: {}", hint));
        }
        user.push_str("\n\nDocument content:\n<<<\n");
        user.push_str(content);
        user.push_str("\n>>>");

        PromptMessages {
            system: PromptTemplate::PROFILER_SYSTEM.to_string(),
            user,
        }
    }
}
