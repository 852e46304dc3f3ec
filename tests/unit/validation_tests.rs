/*!
 * QA gate soundness over a realistic document
 */

use notezh::preservation::{split, PlaceholderMap, PlaceholderVault};
use notezh::validation::{QaGate, QaInput, QaReport};

use crate::common::SAMPLE_NOTES;

fn check(map: &PlaceholderMap, original_protected: &str, tokens: &[String], raw: &str) -> QaReport {
    let (restored, _) = map.restore(raw, tokens);
    let (original, _) = map.restore(original_protected, tokens);
    QaGate::new().check(&QaInput {
        chunk_id: "chunk-0001",
        raw_output: raw,
        restored: &restored,
        original: &original,
        expected_tokens: tokens,
        map,
    })
}

#[test]
fn test_gate_withUntouchedChunks_shouldPassEveryChunk() {
    let (protected, map) = PlaceholderVault::new().protect(SAMPLE_NOTES).unwrap();
    let plan = split(&protected, 150).unwrap();
    for chunk in &plan.chunks {
        let report = check(&map, &chunk.text, &chunk.tokens, &chunk.text);
        assert!(report.passed(), "{}: {:?}", chunk.id, report.failures);
    }
}

#[test]
fn test_gate_withAnyCorruptedToken_shouldReject() {
    let (protected, map) = PlaceholderVault::new().protect(SAMPLE_NOTES).unwrap();
    let tokens: Vec<String> = map.iter().map(|p| p.token.clone()).collect();
    assert!(!tokens.is_empty());

    for token in &tokens {
        let dropped = protected.replacen(token.as_str(), "", 1);
        let duplicated = protected.replacen(token.as_str(), &format!("{t}{t}", t = token), 1);
        let altered = protected.replacen(token.as_str(), "`altered`", 1);

        for (label, raw) in [("dropped", dropped), ("duplicated", duplicated), ("altered", altered)] {
            let report = check(&map, &protected, &tokens, &raw);
            assert!(!report.passed(), "{} {} was accepted", label, token);
            assert!(report.failures.iter().any(|f| f.check() == "placeholder_count"));
        }
    }
}

#[test]
fn test_gate_withTranslatedProse_shouldPass() {
    let (protected, map) = PlaceholderVault::new().protect(SAMPLE_NOTES).unwrap();
    let tokens: Vec<String> = map.iter().map(|p| p.token.clone()).collect();
    let raw = protected
        .replace("A closure captures its environment.", "闭包（closure）会捕获其环境。")
        .replace("Footnote here", "这里有脚注");

    let report = check(&map, &protected, &tokens, &raw);
    assert!(report.passed(), "{:?}", report.failures);
    assert_eq!(report.summary(), "chunk-0001: QA passed");
}

#[test]
fn test_gate_withSpanPastedInsteadOfToken_shouldReject() {
    let (protected, map) = PlaceholderVault::new().protect("Run `cargo test` now.").unwrap();
    let tokens: Vec<String> = map.iter().map(|p| p.token.clone()).collect();
    let report = check(&map, &protected, &tokens, "现在运行 `cargo test`。");
    assert!(!report.passed());
}
