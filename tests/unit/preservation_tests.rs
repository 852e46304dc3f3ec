/*!
 * Property-style tests for protect, split and restore
 */

use notezh::preservation::{find_tokens, scan, split, ChunkPlan, PlaceholderVault, SpanKind};

use crate::common::SAMPLE_NOTES;

fn documents() -> Vec<String> {
    vec![
        SAMPLE_NOTES.to_string(),
        "Use `x` and $y$ in prose.\n".to_string(),
        "Intro\n\n```python\nprint('hi')\n\nMore [text](http://x.y)\n".to_string(),
        "Plain prose without anything to protect.".to_string(),
        "\\(a+b\\) and \\[c\\] and \\begin{align}x\\end{align}\n".to_string(),
        "<!-- note --> <div>html</div> [ref][r]\n\n[r]: https://r.example.com\n".to_string(),
        "Prices are $5 and $10, not math.\n".to_string(),
        "__A`x` end and __init__ `y`__B\n".to_string(),
        "# Title\r\n\r\nUse `x` and $y$.\r\n\r\n```rust\r\nfn main() {}\r\n```\r\n\r\n| a | b |\r\n|---|---|\r\n| 1 | 2 |\r\n"
            .to_string(),
        String::new(),
    ]
}

#[test]
fn test_protect_thenRestoreAll_withVariedDocuments_shouldBeIdentity() {
    for doc in documents() {
        let (protected, map) = PlaceholderVault::new().protect(&doc).unwrap();
        let (restored, report) = map.restore_all(&protected);
        assert_eq!(restored, doc, "round trip changed {:?}", doc);
        assert!(report.is_clean());
    }
}

#[test]
fn test_protect_withUnderscorePrefixedSpan_shouldIssueOneTokenPerSpan() {
    let source = "__A`x` end";
    let (protected, map) = PlaceholderVault::new().protect(source).unwrap();
    let tokens: Vec<String> = find_tokens(&protected).into_iter().map(|m| m.token).collect();
    let issued: Vec<String> = map.iter().map(|p| p.token.clone()).collect();
    assert_eq!(tokens, issued);

    let (restored, report) = map.restore_all(&protected);
    assert_eq!(restored, source);
    assert!(report.is_clean());
}

#[test]
fn test_protect_withSampleNotes_shouldHideEveryFragileSpan() {
    let (protected, map) = PlaceholderVault::new().protect(SAMPLE_NOTES).unwrap();

    for fragile in ["`check(x)`", "$x^2 + 1$", "def square", "https://example.com/reading", "| int  |", "\\sum"] {
        assert!(!protected.contains(fragile), "{} was left in the protected text", fragile);
    }
    // Link labels and prose stay translatable
    assert!(protected.contains("[the reading]"));
    assert!(protected.contains("A closure captures its environment."));
    assert_eq!(find_tokens(&protected).len(), map.len());
}

#[test]
fn test_split_withAnyLimit_shouldKeepTokensWholeAndReassemble() {
    for doc in documents() {
        let (protected, _) = PlaceholderVault::new().protect(&doc).unwrap();
        for max_chars in [1, 7, 20, 64, 500, 10_000] {
            let plan = split(&protected, max_chars).unwrap();
            assert_eq!(plan.reassemble(), protected);

            let whole: Vec<String> = find_tokens(&protected).into_iter().map(|m| m.token).collect();
            let per_chunk: Vec<String> = plan.chunks.iter().flat_map(|c| c.tokens.clone()).collect();
            assert_eq!(per_chunk, whole, "a token was split at limit {}", max_chars);
        }
    }
}

#[test]
fn test_split_withForcedLineSplits_shouldRespectLimitOutsideOversizedUnits() {
    let mut doc = String::new();
    for i in 0..40 {
        doc.push_str(&format!("line {} has `code{}` and some words\n", i, i));
    }
    let (protected, _) = PlaceholderVault::new().protect(&doc).unwrap();
    let plan = split(&protected, 120).unwrap();

    assert!(plan.len() > 5);
    assert!(plan.warnings.is_empty());
    assert!(plan.chunks.iter().all(|c| c.char_count() <= 120));
    assert_eq!(plan.reassemble(), protected);
}

#[test]
fn test_chunk_ids_shouldFollowIndex() {
    let plan = split("# A\n\naaa\n\n# B\n\nbbb\n\n# C\n\nccc\n", 8).unwrap();
    for (position, chunk) in plan.chunks.iter().enumerate() {
        assert_eq!(chunk.index, position);
        assert_eq!(chunk.id, format!("chunk-{:04}", position + 1));
    }
}

#[test]
fn test_chunk_plan_fromJson_withObjects_shouldReassemble() {
    let json = r#"[{"chunk_id": "chunk-0001", "text": "A "}, {"chunk_id": "chunk-0002", "text": "B"}]"#;
    assert_eq!(ChunkPlan::from_json(json).unwrap().reassemble(), "A B");
}

#[test]
fn test_scan_withUnterminatedFence_shouldSwallowRestOfDocument() {
    let doc = "Intro\n\n```python\nprint('hi')\n\nMore [text](http://x.y)\n";
    let spans = scan(doc);
    assert_eq!(spans.len(), 1);
    assert_eq!(spans[0].kind, SpanKind::FencedCode);
    assert_eq!(&doc[spans[0].start..], "```python\nprint('hi')\n\nMore [text](http://x.y)\n");
}
