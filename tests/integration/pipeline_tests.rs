/*!
 * End-to-end document pipeline through the controller
 */

use anyhow::Result;
use std::fs;

use notezh::errors::{FetchError, PipelineError, PreservationError, ProfileError, WriteError};
use notezh::providers::mock::{MockBehavior, MockTranslator};
use notezh::sources::snapdown::{DiagramLanguage, SnapdownBlock};
use notezh::sources::SourceRef;

use crate::common::{self, SAMPLE_NOTES};

#[tokio::test]
async fn test_translate_document_withPassthrough_shouldWriteFullGuide() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let input = common::create_test_file(dir.path(), "notes.md", SAMPLE_NOTES)?;
    let output = dir.path().join("notes.zh.md");
    let mock = MockTranslator::passthrough();
    let controller = common::mock_controller(common::test_config(), &mock);

    let report = controller.translate_document(&SourceRef::File(input.clone()), &output).await?;

    let written = fs::read_to_string(&output)?;
    assert!(written.starts_with(&format!("## Meta\n- Source: file {}\n- Timestamp: ", input.display())));
    assert!(written.contains("- Model: mock/mock-model\n\n## Outline\n### Introduction\n"));
    assert!(written.contains("## Glossary\n| Term (EN) | Term (ZH) | Note (ZH) | Keep EN First Use |\n"));
    assert!(written.contains("| closure | 闭包 | 捕获环境的函数 | true |"));
    assert!(written.ends_with(&format!("\n\n{}", SAMPLE_NOTES)));
    assert!(!written.ends_with("\n\n"));

    assert_eq!(report.output, output);
    assert_eq!(report.model_id, "mock/mock-model");
    assert!(report.placeholders > 0);
    assert_eq!(report.chunks, 1);
    assert_eq!(report.glossary_warnings, 1);
    assert_eq!(mock.calls(), 1);
    Ok(())
}

#[tokio::test]
async fn test_translate_document_withInlineCodeAndMath_shouldPassThroughUnchanged() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let doc = "Use `x` and $y$ in prose.\n";
    let input = common::create_test_file(dir.path(), "inline.md", doc)?;
    let output = dir.path().join("inline.zh.md");
    let controller = common::mock_controller(common::test_config(), &MockTranslator::passthrough());

    controller.translate_document(&SourceRef::File(input), &output).await?;

    assert!(fs::read_to_string(&output)?.ends_with("\n\nUse `x` and $y$ in prose.\n"));
    Ok(())
}

#[tokio::test]
async fn test_translate_document_withUnderscoresBeforeInlineCode_shouldPassQa() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let doc = "Call __A`x` here.\n";
    let input = common::create_test_file(dir.path(), "glued.md", doc)?;
    let output = dir.path().join("glued.zh.md");
    let controller = common::mock_controller(common::test_config(), &MockTranslator::passthrough());

    controller.translate_document(&SourceRef::File(input), &output).await?;

    assert!(fs::read_to_string(&output)?.ends_with("\n\nCall __A`x` here.\n"));
    Ok(())
}

#[tokio::test]
async fn test_translate_document_withUnterminatedFence_shouldKeepTailVerbatim() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let doc = "Intro paragraph.\n\n```python\nprint('hi')\n\nMore [text](http://x.y)\n";
    let input = common::create_test_file(dir.path(), "fence.md", doc)?;
    let output = dir.path().join("fence.zh.md");
    let controller = common::mock_controller(common::test_config(), &MockTranslator::uppercase());

    controller.translate_document(&SourceRef::File(input), &output).await?;

    let written = fs::read_to_string(&output)?;
    assert!(written.ends_with("\n\nINTRO PARAGRAPH.\n\n```python\nprint('hi')\n\nMore [text](http://x.y)\n"));
    Ok(())
}

#[tokio::test]
async fn test_translate_document_withSmallChunks_shouldReassembleInOrder() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let mut doc = String::from("# Long Lecture\n\n");
    for i in 0..30 {
        doc.push_str(&format!("Sentence {} mentions `item{}` and plain prose. ", i, i));
        if i % 5 == 4 {
            doc.push_str("\n\n");
        }
    }
    doc.push('\n');
    let input = common::create_test_file(dir.path(), "long.md", &doc)?;
    let output = dir.path().join("long.zh.md");

    let mut config = common::test_config();
    config.pipeline.max_chunk_chars = 90;
    config.pipeline.concurrency = 4;
    let mock = MockTranslator::new(MockBehavior::Slow { delay_ms: 5 });
    let controller = common::mock_controller(config, &mock);

    let report = controller.translate_document(&SourceRef::File(input), &output).await?;

    assert!(report.chunks > 5);
    assert_eq!(mock.calls(), report.chunks);
    assert!(mock.peak_concurrency() <= 4);
    let written = fs::read_to_string(&output)?;
    assert!(written.ends_with(&format!("\n\n{}\n", doc.trim_end())));
    Ok(())
}

#[tokio::test]
async fn test_translate_document_withDroppedToken_shouldAbortWithoutOutput() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let input = common::create_test_file(dir.path(), "notes.md", SAMPLE_NOTES)?;
    let output = dir.path().join("notes.zh.md");
    let controller = common::mock_controller(common::test_config(), &MockTranslator::new(MockBehavior::DropFirstToken));

    let err = controller
        .translate_document(&SourceRef::File(input), &output)
        .await
        .unwrap_err();

    assert_eq!(err.stage(), "qa");
    assert_eq!(err.chunk_id(), Some("chunk-0001"));
    match &err {
        PipelineError::Qa(qa) => assert!(qa.failures.iter().any(|f| f.check() == "placeholder_count")),
        other => panic!("expected a QA error, got {}", other),
    }
    assert!(!output.exists());
    // Only the input remains, no temp file either
    assert_eq!(fs::read_dir(dir.path())?.count(), 1);
    Ok(())
}

#[tokio::test]
async fn test_translate_document_withFailure_shouldKeepExistingOutput() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let input = common::create_test_file(dir.path(), "notes.md", SAMPLE_NOTES)?;
    let output = common::create_test_file(dir.path(), "notes.zh.md", "previous translation\n")?;
    let controller = common::mock_controller(common::test_config(), &MockTranslator::new(MockBehavior::Permanent));

    let err = controller
        .translate_document(&SourceRef::File(input), &output)
        .await
        .unwrap_err();

    match err {
        PipelineError::Translate { chunk_id, attempts, .. } => {
            assert_eq!(chunk_id, "chunk-0001");
            assert_eq!(attempts, 1);
        }
        other => panic!("expected a translate error, got {}", other),
    }
    assert_eq!(fs::read_to_string(&output)?, "previous translation\n");
    Ok(())
}

#[tokio::test]
async fn test_translate_document_withTransientErrors_shouldRecover() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let input = common::create_test_file(dir.path(), "notes.md", "# Title\n\nShort note.\n")?;
    let output = dir.path().join("out.md");
    let mock = MockTranslator::new(MockBehavior::TransientFailures { failures: 2 });
    let controller = common::mock_controller(common::test_config(), &mock);

    controller.translate_document(&SourceRef::File(input), &output).await?;

    assert_eq!(mock.calls(), 3);
    assert!(output.exists());
    Ok(())
}

#[tokio::test]
async fn test_translate_document_withInvalidProfile_shouldFailAtProfileStage() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let input = common::create_test_file(dir.path(), "notes.md", "# Title\n\nBody.\n")?;
    let output = dir.path().join("out.md");
    let mock = MockTranslator::passthrough().with_profile("Sure! Here is the profile you asked for.");
    let controller = common::mock_controller(common::test_config(), &mock);

    let err = controller
        .translate_document(&SourceRef::File(input), &output)
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::Profile(ProfileError::InvalidJson(_))));
    assert_eq!(mock.calls(), 0);
    assert!(!output.exists());
    Ok(())
}

#[tokio::test]
async fn test_translate_document_withTokenShapedInput_shouldFailAtProtectStage() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let input = common::create_test_file(dir.path(), "notes.md", "Literal __CODE_BLOCK_0001__ text.\n")?;
    let output = dir.path().join("out.md");
    let controller = common::mock_controller(common::test_config(), &MockTranslator::passthrough());

    let err = controller
        .translate_document(&SourceRef::File(input), &output)
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::Preserve(PreservationError::TokenCollision { .. })));
    assert_eq!(err.stage(), "protect");
    Ok(())
}

#[tokio::test]
async fn test_translate_document_withMissingOutputDir_shouldFailBeforeModelCalls() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let input = common::create_test_file(dir.path(), "notes.md", SAMPLE_NOTES)?;
    let output = dir.path().join("missing").join("out.md");
    let mock = MockTranslator::passthrough();
    let controller = common::mock_controller(common::test_config(), &mock);

    let err = controller
        .translate_document(&SourceRef::File(input), &output)
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::Write(WriteError::MissingDirectory(_))));
    assert_eq!(mock.calls(), 0);
    Ok(())
}

#[tokio::test]
async fn test_translate_document_withMissingInput_shouldFailAtFetchStage() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let controller = common::mock_controller(common::test_config(), &MockTranslator::passthrough());

    let err = controller
        .translate_document(&SourceRef::File(dir.path().join("nope.md")), &dir.path().join("out.md"))
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::Fetch(FetchError::Io { .. })));
    Ok(())
}

fn snapdown_block(content: &str, heading: &str) -> SnapdownBlock {
    SnapdownBlock {
        language: DiagramLanguage::Snapdown,
        content: content.to_string(),
        heading: Some(heading.to_string()),
    }
}

#[tokio::test]
async fn test_attach_diagrams_withMermaidEnabled_shouldConvertAndInsert() -> Result<()> {
    let mock = MockTranslator::passthrough();
    let controller = common::mock_controller(common::test_config(), &mock);
    let markdown = "# Intro\n\n## Aliasing\n\nBody.\n";

    let merged = controller
        .attach_diagrams(markdown, vec![snapdown_block("x -> 1", "Aliasing")])
        .await;

    assert_eq!(
        merged,
        "# Intro\n\n## Aliasing\n\n```mermaid\ngraph TD\n  A --> B\n```\n\nBody.\n"
    );
    assert_eq!(mock.diagram_calls(), 1);
    assert_eq!(mock.calls(), 0);
    Ok(())
}

#[tokio::test]
async fn test_attach_diagrams_withMermaidDisabled_shouldKeepSnapdown() -> Result<()> {
    let mock = MockTranslator::passthrough();
    let mut config = common::test_config();
    config.pipeline.snapdown_mermaid = false;
    let controller = common::mock_controller(config, &mock);

    let merged = controller
        .attach_diagrams("# Intro\n\nBody.\n", vec![snapdown_block("x -> 1", "Elsewhere")])
        .await;

    assert_eq!(
        merged,
        "# Intro\n\nBody.\n\n## Snapdown Diagrams (extracted)\n\n```snapdown\nx -> 1\n```\n"
    );
    assert_eq!(mock.diagram_calls(), 0);
    Ok(())
}

#[tokio::test]
async fn test_translate_document_withFileSource_shouldNotLookForDiagrams() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let input = common::create_test_file(dir.path(), "notes.md", "# Title\n\nBody.\n")?;
    let output = dir.path().join("out.md");
    let mock = MockTranslator::passthrough();
    let controller = common::mock_controller(common::test_config(), &mock);

    controller.translate_document(&SourceRef::File(input), &output).await?;

    assert_eq!(mock.diagram_calls(), 0);
    assert!(!fs::read_to_string(&output)?.contains("Snapdown"));
    Ok(())
}

#[tokio::test]
async fn test_translate_batch_withInvalidUrls_shouldCountFailuresAndContinue() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let mock = MockTranslator::passthrough();
    let controller = common::mock_controller(common::test_config(), &mock);
    let urls = vec!["ftp://example.com/a".to_string(), "not a url".to_string()];

    let report = controller.translate_batch(&urls, dir.path()).await?;

    assert_eq!(report.total(), 2);
    assert_eq!(report.failed.len(), 2);
    assert!(!report.is_success());
    assert!(report.failed.iter().all(|(_, e)| e.stage() == "fetch"));
    assert_eq!(fs::read_dir(dir.path())?.count(), 0);
    assert_eq!(mock.calls(), 0);
    Ok(())
}

#[test]
fn test_translate_batch_withMissingOutDir_shouldFail() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let controller = common::mock_controller(common::test_config(), &MockTranslator::passthrough());
    let missing = dir.path().join("missing");

    let result = tokio_test::block_on(controller.translate_batch(&["https://example.com".to_string()], &missing));

    assert!(result.is_err());
    Ok(())
}
