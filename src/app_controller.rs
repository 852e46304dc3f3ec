use anyhow::{anyhow, Result};
use chrono::Utc;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use log::{debug, error, info, warn};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::app_config::Config;
use crate::assembly::assemble_document;
use crate::errors::{PipelineError, ProfileError, ProviderError, WriteError};
use crate::file_utils::FileManager;
use crate::preservation::{split, PlaceholderVault};
use crate::sources::snapdown::{convert_to_mermaid, insert_snapdown_blocks, SnapdownBlock};
use crate::sources::{read_source, ReaderClient, SourceRef};
use crate::translation::{
    no_progress, ChunkOrchestrator, ChunkOutcome, DocumentContext, DocumentProfile, DocumentTranslator,
    OrchestratorConfig, ProfileRequest, ProgressCallback, RetryPolicy, TranslationService,
};

// @module: Application controller for document translation

/// Summary of one translated document
#[derive(Debug, Clone)]
pub struct DocumentReport {
    pub source: String,
    pub output: PathBuf,
    pub chunks: usize,
    pub placeholders: usize,
    pub chunk_warnings: usize,
    pub glossary_warnings: usize,
    pub model_id: String,
    pub duration: Duration,
}

/// Summary of a URL batch
#[derive(Debug, Default)]
pub struct BatchReport {
    pub succeeded: Vec<DocumentReport>,
    /// URL and the error that stopped it
    pub failed: Vec<(String, PipelineError)>,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Main application controller: runs documents through the pipeline
pub struct Controller {
    // @field: App configuration
    config: Config,
    // @field: Model used for profiling and chunk translation
    translator: Arc<dyn DocumentTranslator>,
    // @field: Reader service client for URL sources
    reader: ReaderClient,
    // @field: Draw progress bars on stderr
    show_progress: bool,
}

impl Controller {
    // @method: Create a controller backed by the configured provider
    pub fn with_config(config: Config) -> Result<Self> {
        let service = TranslationService::new(config.translation.clone())?;
        Ok(Self::with_translator(config, Arc::new(service)))
    }

    // @method: Create a controller around any translator
    pub fn with_translator(config: Config, translator: Arc<dyn DocumentTranslator>) -> Self {
        let reader = ReaderClient::new(&config.fetch);
        Self {
            config,
            translator,
            reader,
            show_progress: true,
        }
    }

    /// Disable progress bars, for tests and non-interactive runs
    pub fn without_progress(mut self) -> Self {
        self.show_progress = false;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Translate one document and write it to `output_path`.
    ///
    /// The destination is only touched after every chunk passed QA, and the
    /// write is atomic: a failed run leaves an existing file as it was.
    pub async fn translate_document(
        &self,
        source: &SourceRef,
        output_path: &Path,
    ) -> Result<DocumentReport, PipelineError> {
        let result = self.run_pipeline(source, output_path, None).await;
        if let Err(e) = &result {
            Self::log_failure(source, e);
        }
        result
    }

    /// Translate every URL of a batch into `out_dir`, one after another.
    ///
    /// A failed URL is logged and counted; the batch moves on to the next one.
    pub async fn translate_batch(&self, urls: &[String], out_dir: &Path) -> Result<BatchReport> {
        if !FileManager::dir_exists(out_dir) {
            return Err(anyhow!("Output directory does not exist: {}", out_dir.display()));
        }
        let start_time = Instant::now();
        let multi_progress = MultiProgress::new();
        let batch_bar = self.show_progress.then(|| {
            let bar = multi_progress.add(ProgressBar::new(urls.len() as u64));
            bar.set_style(Self::progress_style("documents"));
            bar
        });

        let mut used_names = HashSet::new();
        let mut report = BatchReport::default();

        for (position, url) in urls.iter().enumerate() {
            let output_path = FileManager::batch_output_path(out_dir, url, position + 1, &mut used_names);
            let source = SourceRef::Url(url.clone());
            info!("[{}/{}] {}", position + 1, urls.len(), url);

            match self.run_pipeline(&source, &output_path, Some(&multi_progress)).await {
                Ok(document) => report.succeeded.push(document),
                Err(e) => {
                    Self::log_failure(&source, &e);
                    report.failed.push((url.clone(), e));
                }
            }
            if let Some(bar) = &batch_bar {
                bar.inc(1);
            }
        }

        if let Some(bar) = batch_bar {
            bar.finish_and_clear();
        }
        info!(
            "Batch finished in {}: {} succeeded, {} failed",
            Self::format_duration(start_time.elapsed()),
            report.succeeded.len(),
            report.failed.len()
        );
        Ok(report)
    }

    /// Ask the model for the document profile and complete it locally
    pub async fn profile_document(&self, source: &SourceRef, content: &str) -> Result<DocumentProfile, ProfileError> {
        let request = ProfileRequest {
            content: content.to_string(),
            source: source.doc_source(),
            title_hint: Some(source.title_hint()),
            source_language: self.config.source_language.clone(),
            target_language: self.config.target_language.clone(),
        };

        let retry = RetryPolicy::from(&self.config.translation.common);
        let translator = &self.translator;
        let request_ref = &request;
        let outcome = retry
            .run(
                "profile",
                move |_| translator.profile(request_ref),
                ProviderError::is_transient,
            )
            .await;
        let raw = outcome.result?;
        debug!("Profile answer received after {} attempt(s)", outcome.attempts);

        let mut profile = DocumentProfile::parse(&raw)?;
        profile.apply_defaults(
            source.doc_source(),
            &self.config.source_language,
            &self.config.target_language,
            Some(&source.title_hint()),
        );
        Ok(profile)
    }

    /// Put page diagrams back into the Markdown, as Mermaid when enabled
    pub async fn attach_diagrams(&self, markdown: &str, blocks: Vec<SnapdownBlock>) -> String {
        if blocks.is_empty() {
            return markdown.to_string();
        }
        info!("Attaching {} Snapdown diagram(s)", blocks.len());
        let blocks = if self.config.pipeline.snapdown_mermaid {
            let retry = RetryPolicy::from(&self.config.translation.common);
            convert_to_mermaid(blocks, self.translator.as_ref(), &retry).await
        } else {
            blocks
        };
        insert_snapdown_blocks(markdown, &blocks)
    }

    async fn run_pipeline(
        &self,
        source: &SourceRef,
        output_path: &Path,
        multi_progress: Option<&MultiProgress>,
    ) -> Result<DocumentReport, PipelineError> {
        let start_time = Instant::now();

        // The output directory must exist before any model call
        if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if !FileManager::dir_exists(parent) {
                return Err(WriteError::MissingDirectory(parent.to_path_buf()).into());
            }
        }

        info!("Reading {}", source);
        let mut content = read_source(source, &self.reader).await?;
        if let SourceRef::Url(url) = source {
            if self.config.fetch.extract_snapdown {
                let blocks = self.reader.fetch_snapdown_blocks(url).await;
                content = self.attach_diagrams(&content, blocks).await;
            }
        }
        debug!("Source has {} chars", content.chars().count());

        info!("Profiling document with {}", self.translator.model_id());
        let profile = self.profile_document(source, &content).await?;
        info!(
            "Profile: '{}', {} outline entries, {} glossary terms",
            profile.doc.title,
            profile.outline.len(),
            profile.glossary.len()
        );

        let (protected, map) = PlaceholderVault::new().protect(&content)?;
        let map = Arc::new(map);
        info!("Protected {} span(s)", map.len());

        let plan = split(&protected, self.config.pipeline.max_chunk_chars)?;
        for warning in &plan.warnings {
            warn!("{}", warning);
        }
        info!(
            "Split into {} chunk(s) of at most {} chars",
            plan.len(),
            self.config.pipeline.max_chunk_chars
        );

        let (progress_bar, progress) = self.chunk_progress(plan.len(), multi_progress);
        let orchestrator = ChunkOrchestrator::new(Arc::clone(&self.translator), OrchestratorConfig::from(&self.config));
        let outcomes = orchestrator
            .translate_all(&plan.chunks, Arc::clone(&map), &DocumentContext::from(&profile), progress)
            .await;
        if let Some(bar) = progress_bar {
            bar.finish_and_clear();
        }

        if let Some(failure) = ChunkOutcome::first_failure(&outcomes) {
            return Err(Self::failure_error(failure));
        }

        let mut body = String::with_capacity(protected.len());
        let mut glossary_warnings = 0;
        for outcome in &outcomes {
            match outcome {
                ChunkOutcome::Translated(result) => {
                    for warning in &result.glossary_warnings {
                        warn!("{}: {}", result.chunk_id, warning);
                    }
                    glossary_warnings += result.glossary_warnings.len();
                    body.push_str(&result.text);
                }
                other => {
                    // Cancellations only happen after a failure, handled above
                    return Err(PipelineError::Translate {
                        chunk_id: other.chunk_id().to_string(),
                        attempts: 0,
                        source: ProviderError::RequestFailed("chunk was not translated".to_string()),
                    });
                }
            }
        }

        let model_id = self.translator.model_id();
        let document = assemble_document(&profile, &model_id, &body, Utc::now())?;
        FileManager::atomic_write(output_path, &document)?;

        let duration = start_time.elapsed();
        info!("Success: {} ({})", output_path.display(), Self::format_duration(duration));

        Ok(DocumentReport {
            source: source.to_string(),
            output: output_path.to_path_buf(),
            chunks: plan.len(),
            placeholders: map.len(),
            chunk_warnings: plan.warnings.len(),
            glossary_warnings,
            model_id,
            duration,
        })
    }

    fn failure_error(failure: &ChunkOutcome) -> PipelineError {
        if let Some(qa) = failure.qa_error() {
            return PipelineError::Qa(qa);
        }
        match failure {
            ChunkOutcome::TranslateFailed {
                chunk_id,
                attempts,
                error,
                ..
            } => PipelineError::Translate {
                chunk_id: chunk_id.clone(),
                attempts: *attempts,
                source: error.clone(),
            },
            other => PipelineError::Translate {
                chunk_id: other.chunk_id().to_string(),
                attempts: 0,
                source: ProviderError::RequestFailed("chunk failed".to_string()),
            },
        }
    }

    // @logs: stage, chunk and failed checks of a document failure
    fn log_failure(source: &SourceRef, error: &PipelineError) {
        match error.chunk_id() {
            Some(chunk_id) => error!("{} failed at {} stage ({}): {}", source, error.stage(), chunk_id, error),
            None => error!("{} failed at {} stage: {}", source, error.stage(), error),
        }
    }

    fn progress_style(unit: &str) -> ProgressStyle {
        ProgressStyle::default_bar()
            .template(&format!(
                "{{spinner:.green}} [{{elapsed_precise}}] [{{bar:40.cyan/blue}}] {{pos}}/{{len}} {} ({{percent}}%) {{msg}}",
                unit
            ))
            .or_else(|_| ProgressStyle::default_bar().template("{spinner} [{elapsed_precise}] [{bar:40}] {pos}/{len}"))
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ")
    }

    fn chunk_progress(
        &self,
        total: usize,
        multi_progress: Option<&MultiProgress>,
    ) -> (Option<ProgressBar>, ProgressCallback) {
        if !self.show_progress {
            return (None, no_progress());
        }
        let bar = ProgressBar::new(total as u64);
        let bar = match multi_progress {
            Some(multi) => multi.add(bar),
            None => bar,
        };
        bar.set_style(Self::progress_style("chunks"));
        bar.set_message("Translating");

        let pb = bar.clone();
        let callback: ProgressCallback = Arc::new(move |done, _total| pb.set_position(done as u64));
        (Some(bar), callback)
    }

    // Format duration in a human-readable format
    pub fn format_duration(duration: Duration) -> String {
        let total_seconds = duration.as_secs();
        let hours = total_seconds / 3600;
        let minutes = (total_seconds % 3600) / 60;
        let seconds = total_seconds % 60;

        if hours > 0 {
            format!("{}h {}m {}s", hours, minutes, seconds)
        } else if minutes > 0 {
            format!("{}m {}s", minutes, seconds)
        } else {
            format!("{}.{:03}s", seconds, duration.subsec_millis())
        }
    }
}
