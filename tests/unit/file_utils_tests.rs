/*!
 * Tests for file utilities
 */

use anyhow::Result;
use std::collections::HashSet;
use std::fs;

use notezh::errors::WriteError;
use notezh::file_utils::FileManager;

use crate::common;

#[test]
fn test_atomic_write_withNewFile_shouldCreateIt() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let path = dir.path().join("guide.md");

    FileManager::atomic_write(&path, "# 指南\n")?;

    assert_eq!(fs::read_to_string(&path)?, "# 指南\n");
    // Only the destination remains, no temp file
    assert_eq!(fs::read_dir(dir.path())?.count(), 1);
    Ok(())
}

#[test]
fn test_atomic_write_withMissingDirectory_shouldLeaveNothingBehind() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let path = dir.path().join("missing").join("guide.md");

    let err = FileManager::atomic_write(&path, "content").unwrap_err();

    assert!(matches!(err, WriteError::MissingDirectory(_)));
    assert_eq!(fs::read_dir(dir.path())?.count(), 0);
    Ok(())
}

#[test]
fn test_read_url_list_shouldSkipBlanksAndComments() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let path = common::create_test_file(
        dir.path(),
        "urls.txt",
        "# lecture notes\nhttps://a.example.com/1\n\n   https://a.example.com/2  \n#https://skipped\n",
    )?;

    let urls = FileManager::read_url_list(&path)?;
    assert_eq!(urls, vec!["https://a.example.com/1", "https://a.example.com/2"]);
    Ok(())
}

#[test]
fn test_read_url_list_withOnlyComments_shouldFail() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let path = common::create_test_file(dir.path(), "urls.txt", "# nothing\n\n")?;
    assert!(FileManager::read_url_list(&path).is_err());
    Ok(())
}

#[test]
fn test_batch_output_path_shouldNumberAndDeduplicate() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let mut used = HashSet::new();

    let first = FileManager::batch_output_path(dir.path(), "https://example.com/notes/", 1, &mut used);
    let second = FileManager::batch_output_path(dir.path(), "https://example.com/other", 2, &mut used);
    let third = FileManager::batch_output_path(dir.path(), "https://example.com/notes/", 1, &mut used);
    let fourth = FileManager::batch_output_path(dir.path(), "https://example.com/notes/", 1, &mut used);

    assert_eq!(first, dir.path().join("001-example-com-notes.md"));
    assert_eq!(second, dir.path().join("002-example-com-other.md"));
    assert_eq!(third, dir.path().join("001-example-com-notes-2.md"));
    assert_eq!(fourth, dir.path().join("001-example-com-notes-3.md"));
    Ok(())
}

#[test]
fn test_slugify_url_withLongPath_shouldTruncate() {
    let url = format!("https://example.com/{}", "segment/".repeat(40));
    let slug = FileManager::slugify_url(&url);
    assert!(slug.chars().count() <= 120);
    assert!(!slug.ends_with('-'));
}

#[test]
fn test_read_to_string_withDirectory_shouldFail() -> Result<()> {
    let dir = common::create_temp_dir()?;
    assert!(FileManager::read_to_string(dir.path()).is_err());
    assert!(FileManager::dir_exists(dir.path()));
    Ok(())
}
