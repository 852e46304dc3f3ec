// Module-specific lints configuration
#![allow(clippy::uninlined_format_args)]

use anyhow::{anyhow, Context, Result};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{generate, Shell};
use log::{info, warn, Level, LevelFilter, Log, Metadata, Record, SetLoggerError};
use std::io::Write;
use std::path::{Path, PathBuf};

use notezh::app_config::{Config, LogLevel, TranslationProvider};
use notezh::app_controller::Controller;
use notezh::file_utils::FileManager;
use notezh::preservation::{split, ChunkPlan, PlaceholderMap, PlaceholderVault};
use notezh::sources::{read_file, ReaderClient, SourceRef};
use notezh::translation::profile::render_profile_markdown;

/// CLI Wrapper for TranslationProvider to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliTranslationProvider {
    Moonshot,
    #[value(name = "openai")]
    OpenAI,
    Anthropic,
}

impl From<CliTranslationProvider> for TranslationProvider {
    fn from(cli_provider: CliTranslationProvider) -> Self {
        match cli_provider {
            CliTranslationProvider::Moonshot => TranslationProvider::Moonshot,
            CliTranslationProvider::OpenAI => TranslationProvider::OpenAI,
            CliTranslationProvider::Anthropic => TranslationProvider::Anthropic,
        }
    }
}

/// CLI Wrapper for LogLevel to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<CliLogLevel> for LogLevel {
    fn from(cli_level: CliLogLevel) -> Self {
        match cli_level {
            CliLogLevel::Error => LogLevel::Error,
            CliLogLevel::Warn => LogLevel::Warn,
            CliLogLevel::Info => LogLevel::Info,
            CliLogLevel::Debug => LogLevel::Debug,
            CliLogLevel::Trace => LogLevel::Trace,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fetch a web page through the reader service and translate it
    TranslateUrl {
        #[arg(long)]
        url: String,
        #[arg(long)]
        out: PathBuf,
        /// Keep page diagrams as Snapdown instead of converting them to Mermaid
        #[arg(long)]
        no_snapdown_mermaid: bool,
    },

    /// Translate every URL listed in one or more URL files
    TranslateUrlBatch {
        /// Files with one URL per line; blank lines and `#` comments are skipped
        #[arg(long, num_args = 1.., required = true)]
        urls: Vec<PathBuf>,
        #[arg(long)]
        out_dir: PathBuf,
        /// Keep page diagrams as Snapdown instead of converting them to Mermaid
        #[arg(long)]
        no_snapdown_mermaid: bool,
    },

    /// Translate a local Markdown file
    TranslateMd {
        #[arg(long = "in")]
        input: PathBuf,
        #[arg(long)]
        out: PathBuf,
    },

    /// Fetch a page as Markdown without translating it
    DebugFetch {
        #[arg(long)]
        url: String,
        #[arg(long)]
        out: PathBuf,
    },

    /// Protect and split a Markdown file, then print the chunks
    DebugChunk {
        #[arg(long = "in")]
        input: PathBuf,
        #[arg(long)]
        max_chunk_chars: Option<usize>,
        /// Print the chunk plan as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the concatenation of a JSON chunk plan
    DebugReconstruct {
        #[arg(long)]
        chunks: PathBuf,
    },

    /// Replace protected spans with placeholders and save the map
    DebugProtect {
        #[arg(long = "in")]
        input: PathBuf,
        #[arg(long)]
        out: PathBuf,
        #[arg(long)]
        map: PathBuf,
    },

    /// Put protected spans back from a saved map
    DebugRestore {
        #[arg(long = "in")]
        input: PathBuf,
        #[arg(long)]
        map: PathBuf,
        #[arg(long)]
        out: PathBuf,
    },

    /// Ask the model for a document profile and write it as Markdown
    DebugProfile {
        #[arg(long = "in")]
        input: PathBuf,
        #[arg(long)]
        out: PathBuf,
    },

    /// Generate shell completions for notezh
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

impl Commands {
    // @returns: Whether the command calls the model
    fn needs_model(&self) -> bool {
        matches!(
            self,
            Commands::TranslateUrl { .. }
                | Commands::TranslateUrlBatch { .. }
                | Commands::TranslateMd { .. }
                | Commands::DebugProfile { .. }
        )
    }
}

/// notezh - English technical notes to Chinese study guides
///
/// Translates Markdown while keeping code, math, links and other fragile
/// spans byte-for-byte intact.
#[derive(Parser, Debug)]
#[command(name = "notezh")]
#[command(version)]
#[command(about = "Translate English Markdown notes into Chinese study guides")]
#[command(long_about = "notezh translates English technical Markdown into a Chinese study guide.

Code blocks, inline code, math, URLs, HTML, tables and footnote labels are swapped for
placeholders before translation and restored afterwards. Every chunk is checked before
anything is written; a failed document leaves no output file behind.

EXAMPLES:
    notezh translate-md --in notes.md --out notes.zh.md
    notezh translate-url --url https://example.com/lecture --out lecture.zh.md
    notezh translate-url-batch --urls urls.txt --out-dir out/
    notezh debug-chunk --in notes.md --max-chunk-chars 2000
    notezh completions bash > notezh.bash

CONFIGURATION:
    Configuration is stored in conf.json by default. You can specify a different
    config file with --config. If the config file doesn't exist, a default one
    will be created automatically. API keys may come from MOONSHOT_API_KEY,
    OPENAI_API_KEY, ANTHROPIC_API_KEY and JINA_API_KEY.")]
struct CommandLineOptions {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true, default_value = "conf.json")]
    config: PathBuf,

    /// Translation provider to use
    #[arg(short, long, global = true, value_enum)]
    provider: Option<CliTranslationProvider>,

    /// Model name to use for translation
    #[arg(short, long, global = true)]
    model: Option<String>,

    /// Number of chunks translated in parallel
    #[arg(long, global = true)]
    concurrency: Option<usize>,

    /// Soft limit for chunk size, in characters
    #[arg(long, global = true)]
    max_chunk_chars: Option<usize>,

    /// Provider request timeout in seconds
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Set logging level
    #[arg(short, long, global = true, value_enum)]
    log_level: Option<CliLogLevel>,
}

// @struct: Custom logger implementation
struct CustomLogger {
    level: LevelFilter,
}

impl CustomLogger {
    // @creates: New logger with specified level
    fn new(level: LevelFilter) -> Self {
        CustomLogger { level }
    }

    // @initializes: Global logger
    fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
        let logger = Box::new(CustomLogger::new(level));
        log::set_boxed_logger(logger)?;
        log::set_max_level(level);
        Ok(())
    }

    // @returns: ANSI color and tag for a level
    fn style_for_level(level: Level) -> (&'static str, &'static str) {
        match level {
            Level::Error => ("\x1B[1;31m", "ERROR"),
            Level::Warn => ("\x1B[1;33m", "WARN "),
            Level::Info => ("\x1B[1;32m", "INFO "),
            Level::Debug => ("\x1B[1;36m", "DEBUG"),
            Level::Trace => ("\x1B[1;35m", "TRACE"),
        }
    }
}

impl Log for CustomLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level.max(log::max_level())
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let now = chrono::Local::now().format("%H:%M:%S.%3f");
            let (color, tag) = Self::style_for_level(record.level());
            let mut stderr = std::io::stderr();
            let _ = writeln!(stderr, "{}{} {} {}\x1B[0m", color, now, tag, record.args());
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Start at info; the configured level is applied once the config is loaded
    CustomLogger::init(LevelFilter::Info)?;

    let cli = CommandLineOptions::parse();

    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = CommandLineOptions::command();
        generate(*shell, &mut cmd, "notezh", &mut std::io::stdout());
        return Ok(());
    }

    if let Some(level) = &cli.log_level {
        log::set_max_level(LogLevel::from(level.clone()).to_level_filter());
    }

    let config = load_config(&cli)?;
    log::set_max_level(config.log_level.to_level_filter());

    run_command(cli.command, config).await
}

// @loads: Config file, then environment, then CLI flags
fn load_config(cli: &CommandLineOptions) -> Result<Config> {
    let mut config = Config::load_or_create(&cli.config)?;
    config.apply_env_overrides();

    if let Some(provider) = &cli.provider {
        config.translation.provider = provider.clone().into();
    }
    let active = config.translation.provider;
    if let Some(model) = &cli.model {
        config.translation.provider_config_mut(active).model = model.clone();
    }
    if let Some(timeout) = cli.timeout {
        config.translation.provider_config_mut(active).timeout_secs = timeout;
        config.fetch.timeout_secs = timeout;
    }
    if let Some(concurrency) = cli.concurrency {
        config.pipeline.concurrency = concurrency;
    }
    if let Some(max_chars) = cli.max_chunk_chars {
        config.pipeline.max_chunk_chars = max_chars;
    }
    if let Some(level) = &cli.log_level {
        config.log_level = level.clone().into();
    }

    config
        .validate(cli.command.needs_model())
        .context("Configuration validation failed")?;
    Ok(config)
}

async fn run_command(command: Commands, mut config: Config) -> Result<()> {
    match command {
        Commands::TranslateUrl {
            url,
            out,
            no_snapdown_mermaid,
        } => {
            if no_snapdown_mermaid {
                config.pipeline.snapdown_mermaid = false;
            }
            let controller = Controller::with_config(config)?;
            controller.translate_document(&SourceRef::Url(url), &out).await?;
            Ok(())
        }
        Commands::TranslateMd { input, out } => {
            let controller = Controller::with_config(config)?;
            controller.translate_document(&SourceRef::File(input), &out).await?;
            Ok(())
        }
        Commands::TranslateUrlBatch {
            urls,
            out_dir,
            no_snapdown_mermaid,
        } => {
            if no_snapdown_mermaid {
                config.pipeline.snapdown_mermaid = false;
            }
            let mut all_urls = Vec::new();
            for list in &urls {
                all_urls.extend(FileManager::read_url_list(list)?);
            }
            info!("Loaded {} URL(s) from {} file(s)", all_urls.len(), urls.len());

            let controller = Controller::with_config(config)?;
            let report = controller.translate_batch(&all_urls, &out_dir).await?;
            if report.is_success() {
                Ok(())
            } else {
                for (url, error) in &report.failed {
                    warn!("Failed: {} ({} stage)", url, error.stage());
                }
                Err(anyhow!("{} of {} document(s) failed", report.failed.len(), report.total()))
            }
        }
        Commands::DebugFetch { url, out } => {
            let reader = ReaderClient::new(&config.fetch);
            let content = reader.fetch_markdown(&url).await?;
            FileManager::atomic_write(&out, &content)?;
            info!("Success: {}", out.display());
            Ok(())
        }
        Commands::DebugChunk {
            input,
            max_chunk_chars,
            json,
        } => debug_chunk(&input, max_chunk_chars.unwrap_or(config.pipeline.max_chunk_chars), json),
        Commands::DebugReconstruct { chunks } => {
            let json = FileManager::read_to_string(&chunks)?;
            let plan = ChunkPlan::from_json(&json).with_context(|| format!("Invalid chunk plan: {:?}", chunks))?;
            print!("{}", plan.reassemble());
            Ok(())
        }
        Commands::DebugProtect { input, out, map } => {
            let content = read_file(&input)?;
            let (protected, placeholders) = PlaceholderVault::new().protect(&content)?;
            FileManager::atomic_write(&out, &protected)?;
            FileManager::atomic_write(&map, &placeholders.to_json()?)?;
            info!("Protected {} span(s): {}", placeholders.len(), out.display());
            Ok(())
        }
        Commands::DebugRestore { input, map, out } => {
            let protected = read_file(&input)?;
            let placeholders = PlaceholderMap::from_json(&FileManager::read_to_string(&map)?)?;
            let (restored, report) = placeholders.restore_all(&protected);
            if !report.is_clean() {
                for tally in report.mismatches() {
                    warn!("{}: expected {}, found {}", tally.token, tally.expected, tally.found);
                }
                for token in &report.unknown_tokens {
                    warn!("{}: not in the map", token);
                }
                return Err(anyhow!("Restore found placeholder mismatches; nothing written"));
            }
            FileManager::atomic_write(&out, &restored)?;
            info!("Success: {}", out.display());
            Ok(())
        }
        Commands::DebugProfile { input, out } => {
            let content = read_file(&input)?;
            let controller = Controller::with_config(config)?;
            let profile = controller.profile_document(&SourceRef::File(input), &content).await?;
            FileManager::atomic_write(&out, &render_profile_markdown(&profile))?;
            info!("Success: {}", out.display());
            Ok(())
        }
        Commands::Completions { .. } => Ok(()),
    }
}

// @prints: Chunks with their restored text, or the JSON plan
fn debug_chunk(input: &Path, max_chunk_chars: usize, json: bool) -> Result<()> {
    let content = read_file(input)?;
    let (protected, map) = PlaceholderVault::new().protect(&content)?;
    let plan = split(&protected, max_chunk_chars)?;
    for warning in &plan.warnings {
        warn!("{}", warning);
    }

    if json {
        println!("{}", plan.to_json()?);
        return Ok(());
    }

    for chunk in &plan.chunks {
        println!(
            "===== {} ({} chars, {} placeholders) =====",
            chunk.id,
            chunk.char_count(),
            chunk.tokens.len()
        );
        let (restored, _) = map.restore_all(&chunk.text);
        println!("{}", restored);
    }
    info!("{} chunk(s), {} placeholder(s)", plan.len(), map.len());
    Ok(())
}
