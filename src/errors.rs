/*!
 * Error types for the notezh application.
 *
 * Each pipeline stage has its own error enum, built with thiserror. The
 * `PipelineError` wrapper names the stage that failed (and the chunk, when
 * there is one) so the binary can report exactly where a document stopped.
 */

use std::path::PathBuf;

use thiserror::Error;

use crate::validation::QaFailure;

/// Errors that can occur when working with provider APIs
#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    /// Error when making an API request fails
    #[error("API request failed: {0}")]
    RequestFailed(String),

    /// Error when parsing an API response fails
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// Error returned by the API itself
    #[error("API responded with error: {status_code} - {message}")]
    ApiError {
        /// HTTP status code
        status_code: u16,
        /// Error message from the API
        message: String,
    },

    /// Error establishing or maintaining a connection
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// The request did not complete in time
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// Error related to rate limiting
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// Error with authentication
    #[error("Authentication error: {0}")]
    AuthenticationError(String),

    /// The model stopped before finishing its answer
    #[error("Response truncated (finish reason: {0})")]
    Truncated(String),

    /// The request was abandoned because the run is stopping
    #[error("Request cancelled")]
    Cancelled,
}

impl ProviderError {
    /// Whether a retry of the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::ConnectionError(_) | Self::Timeout(_) | Self::RateLimitExceeded(_) => true,
            Self::ApiError { status_code, .. } => *status_code == 429 || *status_code >= 500,
            Self::RequestFailed(_)
            | Self::ParseError(_)
            | Self::AuthenticationError(_)
            | Self::Truncated(_)
            | Self::Cancelled => false,
        }
    }

    /// Map an HTTP status and body onto the provider error taxonomy
    pub fn from_status(status_code: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status_code {
            401 | 403 => Self::AuthenticationError(message),
            429 => Self::RateLimitExceeded(message),
            _ => Self::ApiError { status_code, message },
        }
    }

    /// Map a reqwest transport error
    pub fn from_transport(error: &reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout(error.to_string())
        } else if error.is_connect() || error.is_request() {
            Self::ConnectionError(error.to_string())
        } else if error.is_decode() {
            Self::ParseError(error.to_string())
        } else {
            Self::RequestFailed(error.to_string())
        }
    }
}

/// Errors raised while protecting or restoring a document
#[derive(Error, Debug)]
pub enum PreservationError {
    /// The input contains, or its protected form reads as, an unissued placeholder token
    #[error("input contains placeholder-like text '{token}' at byte {offset}")]
    TokenCollision { token: String, offset: usize },

    /// A serialized placeholder map could not be read back
    #[error("invalid placeholder map: {0}")]
    MapFormat(String),
}

/// Chunking problems. `OversizedUnit` is a warning and never aborts a run.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChunkError {
    /// The configured chunk size cannot hold anything
    #[error("max chunk size must be positive (got {0})")]
    InvalidLimit(usize),

    /// An indivisible unit is larger than the configured limit
    #[error("{chunk_id} holds an indivisible unit of {chars} chars (limit {max_chars})")]
    OversizedUnit {
        chunk_id: String,
        chars: usize,
        max_chars: usize,
    },
}

/// Errors reading the source document
#[derive(Error, Debug)]
pub enum FetchError {
    /// The source reference is not usable
    #[error("invalid source: {0}")]
    InvalidSource(String),

    /// The reader service answered with a non-success status
    #[error("reader service returned HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// Network failure talking to the reader service
    #[error("transport error: {0}")]
    Transport(String),

    /// The reader service answered but without usable content
    #[error("unexpected reader response: {0}")]
    Reader(String),

    /// The fetched document is suspiciously small
    #[error("content too short ({len} < {min} chars)")]
    TooShort { len: usize, min: usize },

    /// Local file could not be read
    #[error("failed to read {}: {message}", .path.display())]
    Io { path: PathBuf, message: String },
}

impl FetchError {
    /// Whether the fetch may succeed when retried
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Http { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// Errors producing the document profile
#[derive(Error, Debug)]
pub enum ProfileError {
    /// The model did not return JSON
    #[error("profile response is not valid JSON: {0}")]
    InvalidJson(String),

    /// The JSON does not follow the profile schema
    #[error("profile field '{field}' is invalid: {message}")]
    Schema { field: String, message: String },

    /// The profile call itself failed
    #[error("profile request failed: {0}")]
    Provider(#[from] ProviderError),
}

/// A chunk was rejected by the QA gate
#[derive(Error, Debug)]
#[error("{chunk_id} failed QA: {}", describe_failures(.failures))]
pub struct QaError {
    pub chunk_id: String,
    pub failures: Vec<QaFailure>,
}

fn describe_failures(failures: &[QaFailure]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors composing the final document
#[derive(Error, Debug)]
pub enum AssemblyError {
    #[error("required section '{0}' is missing or empty")]
    MissingSection(&'static str),
}

/// Errors writing the output file
#[derive(Error, Debug)]
pub enum WriteError {
    /// The destination directory does not exist
    #[error("output directory does not exist: {}", .0.display())]
    MissingDirectory(PathBuf),

    /// Creating or filling the temporary file failed
    #[error("failed to write temporary file in {}: {message}", .dir.display())]
    TempFile { dir: PathBuf, message: String },

    /// Renaming the temporary file over the destination failed
    #[error("failed to replace {}: {message}", .path.display())]
    Persist { path: PathBuf, message: String },
}

/// Document-level failure, tagged with the stage it happened in
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("fetch stage failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("profile stage failed: {0}")]
    Profile(#[from] ProfileError),

    #[error("protect stage failed: {0}")]
    Preserve(#[from] PreservationError),

    #[error("chunk stage failed: {0}")]
    Chunk(#[from] ChunkError),

    #[error("translate stage failed on {chunk_id} after {attempts} attempt(s): {source}")]
    Translate {
        chunk_id: String,
        attempts: u32,
        #[source]
        source: ProviderError,
    },

    #[error("QA stage failed: {0}")]
    Qa(#[from] QaError),

    #[error("assembly stage failed: {0}")]
    Assembly(#[from] AssemblyError),

    #[error("write stage failed: {0}")]
    Write(#[from] WriteError),
}

impl PipelineError {
    /// Short stage name used in logs and summaries
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Fetch(_) => "fetch",
            Self::Profile(_) => "profile",
            Self::Preserve(_) => "protect",
            Self::Chunk(_) => "chunk",
            Self::Translate { .. } => "translate",
            Self::Qa(_) => "qa",
            Self::Assembly(_) => "assembly",
            Self::Write(_) => "write",
        }
    }

    /// The chunk the failure belongs to, if any
    pub fn chunk_id(&self) -> Option<&str> {
        match self {
            Self::Translate { chunk_id, .. } => Some(chunk_id.as_str()),
            Self::Qa(e) => Some(e.chunk_id.as_str()),
            Self::Chunk(ChunkError::OversizedUnit { chunk_id, .. }) => Some(chunk_id.as_str()),
            _ => None,
        }
    }
}

/// Main application error type that wraps all other errors
#[derive(Error, Debug)]
pub enum AppError {
    /// Error from a file operation
    #[error("File error: {0}")]
    File(String),

    /// Error from a provider
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// A document failed somewhere in the pipeline
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Any other error
    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        Self::Unknown(error.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        Self::File(error.to_string())
    }
}
