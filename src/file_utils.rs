use anyhow::{anyhow, Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use url::Url;

use crate::errors::WriteError;

// @module: File and directory utilities

static NON_ALNUM_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^A-Za-z0-9]+").expect("Invalid slug regex"));

const MAX_SLUG_LEN: usize = 120;

// @struct: File operations utility
pub struct FileManager;

impl FileManager {
    // @checks: Directory existence
    pub fn dir_exists<P: AsRef<Path>>(path: P) -> bool {
        path.as_ref().is_dir()
    }

    /// Read a UTF-8 file to a string
    pub fn read_to_string<P: AsRef<Path>>(path: P) -> Result<String> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(anyhow!("Input file not found: {:?}", path));
        }
        if !path.is_file() {
            return Err(anyhow!("Input path is not a file: {:?}", path));
        }
        fs::read_to_string(path).with_context(|| format!("Failed to read file: {:?}", path))
    }

    // @writes: content to a temp file next to `path`, then renames it over `path`
    // @invariant: on error the destination is untouched and no temp file remains
    pub fn atomic_write<P: AsRef<Path>>(path: P, content: &str) -> Result<(), WriteError> {
        let path = path.as_ref();
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        if !dir.is_dir() {
            return Err(WriteError::MissingDirectory(dir));
        }

        let temp_error = |e: std::io::Error| WriteError::TempFile {
            dir: dir.clone(),
            message: e.to_string(),
        };
        let mut temp = tempfile::Builder::new()
            .prefix(".tmp-")
            .tempfile_in(&dir)
            .map_err(temp_error)?;
        temp.write_all(content.as_bytes()).map_err(temp_error)?;
        temp.flush().map_err(temp_error)?;
        temp.as_file().sync_all().map_err(temp_error)?;

        Self::persist(temp, path)
    }

    fn persist(temp: NamedTempFile, path: &Path) -> Result<(), WriteError> {
        temp.persist(path).map(|_| ()).map_err(|e| WriteError::Persist {
            path: path.to_path_buf(),
            message: e.error.to_string(),
        })
    }

    // @returns: Non-empty URLs from a list file; blank lines and `#` comments skipped
    pub fn read_url_list<P: AsRef<Path>>(path: P) -> Result<Vec<String>> {
        let path = path.as_ref();
        let content = Self::read_to_string(path)?;
        let urls: Vec<String> = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::to_string)
            .collect();
        if urls.is_empty() {
            return Err(anyhow!("No URLs found in: {:?}", path));
        }
        Ok(urls)
    }

    // @returns: Filesystem-safe slug built from host, path and query
    pub fn slugify_url(url: &str) -> String {
        let raw = match Url::parse(url) {
            Ok(parsed) => {
                let mut raw = format!("{}{}", parsed.host_str().unwrap_or_default(), parsed.path());
                if let Some(query) = parsed.query() {
                    raw.push('?');
                    raw.push_str(query);
                }
                raw
            }
            Err(_) => url.to_string(),
        };
        let slug = NON_ALNUM_RE.replace_all(raw.trim(), "-").trim_matches('-').to_lowercase();
        let truncated: String = slug.chars().take(MAX_SLUG_LEN).collect();
        match truncated.trim_matches('-') {
            "" => "url".to_string(),
            slug => slug.to_string(),
        }
    }

    // @generates: `NNN-<slug>.md` inside out_dir, suffixed `-2`, `-3`... when taken
    pub fn batch_output_path(out_dir: &Path, url: &str, position: usize, used: &mut HashSet<String>) -> PathBuf {
        let slug = Self::slugify_url(url);
        let mut name = format!("{:03}-{}.md", position, slug);
        let mut counter = 2;
        while used.contains(&name) {
            name = format!("{:03}-{}-{}.md", position, slug, counter);
            counter += 1;
        }
        used.insert(name.clone());
        out_dir.join(name)
    }
}
