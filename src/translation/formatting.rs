/*!
 * Cleanup of raw model output before placeholders are restored.
 *
 * Models sometimes echo the `<<<` / `>>>` chunk delimiters from the prompt,
 * or glue a heading onto the end of the previous line. Both are repaired
 * here. Running before restoration means protected content is never touched.
 */

use once_cell::sync::Lazy;
use regex::Regex;

/// A delimiter alone on its line
static MARKER_LINE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^[ \t]*(?:<<<|>>>)[ \t]*(?:\r?\n|$)").expect("Invalid marker line regex")
});

/// A delimiter glued to the start of a heading
static MARKER_HEADING_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^[ \t]*(?:<<<|>>>)[ \t]*(#+[ \t]*)").expect("Invalid marker heading regex")
});

/// Heading collisions: thematic break, blockquote, bullet and ordered list
/// lines with a heading glued on. The character before the `#` run must be
/// punctuation or non-ASCII so `C# code` stays intact.
static HEADING_COLLISION_REGEXES: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?m)^((?:={3,}|-{3,}))[ \t]*(#{1,6}[ \t]+)",
        r"(?m)^(>[^\n]*?[^A-Za-z0-9#\s])(#{1,6}[ \t]+)",
        r"(?m)^([ \t]*[-*+][ \t]+[^\n]*?[^A-Za-z0-9#\s])(#{1,6}[ \t]+)",
        r"(?m)^([ \t]*\d+[.)][ \t]+[^\n]*?[^A-Za-z0-9#\s])(#{1,6}[ \t]+)",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("Invalid heading collision regex"))
    .collect()
});

/// Output cleanup helpers
pub struct OutputCleaner;

impl OutputCleaner {
    /// Full cleanup pass applied to every raw model answer
    pub fn clean(raw: &str) -> String {
        let stripped = Self::strip_prompt_markers(raw);
        Self::fix_heading_collisions(&stripped)
    }

    /// Drop echoed chunk delimiters
    pub fn strip_prompt_markers(text: &str) -> String {
        let cleaned = MARKER_LINE_REGEX.replace_all(text, "");
        MARKER_HEADING_REGEX.replace_all(&cleaned, "$1").into_owned()
    }

    /// Move headings glued onto a previous line back to their own line
    pub fn fix_heading_collisions(text: &str) -> String {
        HEADING_COLLISION_REGEXES
            .iter()
            .fold(text.to_string(), |acc, re| re.replace_all(&acc, "$1\n$2").into_owned())
    }

    /// Give `translated` the same trailing whitespace as `source`
    pub fn align_trailing_whitespace(source: &str, translated: &str) -> String {
        let source_tail = &source[source.trim_end().len()..];
        let mut aligned = translated.trim_end().to_string();
        aligned.push_str(source_tail);
        aligned
    }
}
