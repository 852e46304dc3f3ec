/*!
 * Source documents: local Markdown files and web pages read through a
 * reader service that converts HTML to Markdown.
 *
 * - `snapdown`: diagrams the reader drops, recovered from the raw page
 */

pub mod snapdown;

use log::{debug, info};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde_json::Value;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::app_config::FetchConfig;
use crate::errors::FetchError;
use crate::translation::profile::{DocSource, SourceType};
use crate::translation::retry::RetryPolicy;

use self::snapdown::{extract_snapdown_blocks, SnapdownBlock};

/// `[](https://...)` anchors left behind by the reader
static EMPTY_ANCHOR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[\]\(https?://[^)]+\)[ \t]*").expect("Invalid empty anchor regex"));

/// A closing and an opening fence glued onto one line
static DOUBLE_FENCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^(`{6,}|~{6,})[ \t]*$").expect("Invalid double fence regex"));

/// Where a document is read from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceRef {
    Url(String),
    File(PathBuf),
}

impl SourceRef {
    pub fn source_type(&self) -> SourceType {
        match self {
            SourceRef::Url(_) => SourceType::Url,
            SourceRef::File(_) => SourceType::File,
        }
    }

    pub fn value(&self) -> String {
        match self {
            SourceRef::Url(url) => url.clone(),
            SourceRef::File(path) => path.display().to_string(),
        }
    }

    pub fn doc_source(&self) -> DocSource {
        DocSource {
            source_type: self.source_type(),
            value: self.value(),
        }
    }

    /// Fallback title when the profile has none: the file name or the URL
    pub fn title_hint(&self) -> String {
        match self {
            SourceRef::Url(url) => url.clone(),
            SourceRef::File(path) => path
                .file_name()
                .map(|name| name.to_string_lossy().to_string())
                .unwrap_or_else(|| path.display().to_string()),
        }
    }
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.source_type().as_str(), self.value())
    }
}

/// Only absolute http(s) URLs are accepted
pub fn validate_url(url: &str) -> Result<Url, FetchError> {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return Err(FetchError::InvalidSource("URL must be a non-empty string".to_string()));
    }
    let parsed = Url::parse(trimmed).map_err(|e| FetchError::InvalidSource(format!("{}: {}", trimmed, e)))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        scheme => Err(FetchError::InvalidSource(format!(
            "URL must start with http:// or https:// (got {}://)",
            scheme
        ))),
    }
}

/// Remove reader artifacts that would confuse the scanner
pub fn clean_reader_artifacts(content: &str) -> String {
    let without_anchors = EMPTY_ANCHOR_RE.replace_all(content, "");
    DOUBLE_FENCE_RE
        .replace_all(&without_anchors, |caps: &regex::Captures| {
            let run = &caps[1];
            let half = &run[..run.len() / 2];
            format!("{}\n{}", half, half)
        })
        .into_owned()
}

/// Read a local UTF-8 file
pub fn read_file(path: &Path) -> Result<String, FetchError> {
    let io_error = |message: String| FetchError::Io {
        path: path.to_path_buf(),
        message,
    };
    if !path.exists() {
        return Err(io_error("file not found".to_string()));
    }
    if !path.is_file() {
        return Err(io_error("not a file".to_string()));
    }
    std::fs::read_to_string(path).map_err(|e| io_error(e.to_string()))
}

/// Client for the reader service
#[derive(Debug, Clone)]
pub struct ReaderClient {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    min_content_length: usize,
    retry: RetryPolicy,
}

impl ReaderClient {
    pub fn new(config: &FetchConfig) -> Self {
        let api_key = Some(config.api_key.trim().to_string()).filter(|k| !k.is_empty());
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs.max(1)))
                .build()
                .unwrap_or_default(),
            endpoint: config.reader_endpoint.clone(),
            api_key,
            min_content_length: config.min_content_length,
            retry: RetryPolicy {
                max_attempts: config.max_attempts.max(1),
                base_delay_ms: 1000,
                max_delay_ms: 20_000,
            },
        }
    }

    /// Fetch a page as Markdown, retrying transient failures
    pub async fn fetch_markdown(&self, url: &str) -> Result<String, FetchError> {
        let parsed = validate_url(url)?;
        let clean_url = parsed.as_str().to_string();
        info!("Fetching {} through reader service", clean_url);

        let this = self;
        let target = clean_url.as_str();
        let outcome = self
            .retry
            .run("reader", move |_| this.fetch_once(target), FetchError::is_transient)
            .await;
        let content = outcome.result?;
        debug!("Fetched {} chars in {} attempt(s)", content.chars().count(), outcome.attempts);

        let length = content.chars().count();
        if length < self.min_content_length {
            return Err(FetchError::TooShort {
                len: length,
                min: self.min_content_length,
            });
        }
        Ok(content)
    }

    async fn fetch_once(&self, url: &str) -> Result<String, FetchError> {
        let request = if url.contains('#') {
            self.client.post(&self.endpoint).form(&[("url", url)])
        } else {
            self.client.get(format!("{}{}", self.endpoint, url))
        };
        let mut request = request
            .header("Accept", "application/json")
            .header("X-Return-Format", "markdown");
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| FetchError::Transport(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| FetchError::Transport(e.to_string()))?;
        if !(200..300).contains(&status) {
            return Err(FetchError::Http {
                status,
                message: body.chars().take(200).collect(),
            });
        }
        Self::parse_reader_body(&body)
    }

    /// Fetch the raw HTML of a page, without the reader service
    pub async fn fetch_html(&self, url: &str) -> Result<String, FetchError> {
        let parsed = validate_url(url)?;
        let response = self
            .client
            .get(parsed.as_str())
            .header("User-Agent", concat!("notezh/", env!("CARGO_PKG_VERSION")))
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| FetchError::Transport(e.to_string()))?;
        if !(200..300).contains(&status) {
            return Err(FetchError::Http {
                status,
                message: body.chars().take(200).collect(),
            });
        }
        Ok(body)
    }

    /// Snapdown diagrams of a page; an unreachable page has none
    pub async fn fetch_snapdown_blocks(&self, url: &str) -> Vec<SnapdownBlock> {
        match self.fetch_html(url).await {
            Ok(html) => {
                let blocks = extract_snapdown_blocks(&html);
                debug!("Found {} Snapdown block(s) in {}", blocks.len(), url);
                blocks
            }
            Err(e) => {
                debug!("Skipping Snapdown extraction for {}: {}", url, e);
                Vec::new()
            }
        }
    }

    /// Extract Markdown from a reader answer: JSON envelope or plain text
    pub fn parse_reader_body(body: &str) -> Result<String, FetchError> {
        let payload = match serde_json::from_str::<Value>(body) {
            Ok(Value::Object(map)) => map,
            _ => {
                return match body.trim() {
                    "" => Err(FetchError::Reader("empty response body".to_string())),
                    _ => Ok(body.to_string()),
                };
            }
        };

        if let Some(code) = payload.get("code") {
            if code.as_i64() != Some(200) {
                return Err(FetchError::Reader(format!(
                    "code={} status={} message={}",
                    code,
                    payload.get("status").unwrap_or(&Value::Null),
                    payload.get("message").unwrap_or(&Value::Null)
                )));
            }
        }

        payload
            .get("content")
            .and_then(Value::as_str)
            .or_else(|| payload.get("data").and_then(|d| d.get("content")).and_then(Value::as_str))
            .filter(|content| !content.is_empty())
            .map(str::to_string)
            .ok_or_else(|| FetchError::Reader("missing content in reader response".to_string()))
    }
}

/// Read a source document and clean reader artifacts from it
pub async fn read_source(source: &SourceRef, reader: &ReaderClient) -> Result<String, FetchError> {
    let content = match source {
        SourceRef::Url(url) => reader.fetch_markdown(url).await?,
        SourceRef::File(path) => read_file(path)?,
    };
    Ok(clean_reader_artifacts(&content))
}
