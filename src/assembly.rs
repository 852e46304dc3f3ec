/*!
 * Final document composition: meta, outline, glossary and translated body.
 */

use chrono::{DateTime, Utc};

use crate::errors::AssemblyError;
use crate::translation::profile::{render_glossary, render_outline, DocSource, DocumentProfile};

/// `## Meta` section
pub fn render_meta(source: &DocSource, model_id: &str, timestamp: DateTime<Utc>) -> String {
    [
        "## Meta".to_string(),
        format!("- Source: {} {}", source.source_type.as_str(), source.value),
        format!("- Timestamp: {}", timestamp.format("%Y-%m-%dT%H:%M:%SZ")),
        format!("- Model: {}", model_id),
    ]
    .join("\n")
}

/// Join the sections with one blank line; the result ends with a single newline
pub fn compose(sections: &[&str]) -> String {
    let joined = sections
        .iter()
        .map(|section| section.trim_matches('\n'))
        .collect::<Vec<_>>()
        .join("\n\n");
    format!("{}\n", joined.trim_end())
}

/// Build the output document for a translated body
pub fn assemble_document(
    profile: &DocumentProfile,
    model_id: &str,
    body: &str,
    timestamp: DateTime<Utc>,
) -> Result<String, AssemblyError> {
    if profile.doc.source.value.trim().is_empty() {
        return Err(AssemblyError::MissingSection("meta"));
    }
    if model_id.trim().is_empty() {
        return Err(AssemblyError::MissingSection("meta"));
    }
    if body.trim().is_empty() {
        return Err(AssemblyError::MissingSection("body"));
    }

    let meta = render_meta(&profile.doc.source, model_id, timestamp);
    let outline = render_outline(&profile.outline);
    let glossary = render_glossary(&profile.glossary);
    Ok(compose(&[&meta, &outline, &glossary, body]))
}
