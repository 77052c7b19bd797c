//! Content files: naming, front matter and atomic writes.
//!
//! Each fetched record owns exactly one Markdown file directly under the
//! content directory. The store keeps the bare file name; the directory
//! comes from configuration so the archive can be moved as a whole.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tempfile::NamedTempFile;
use thiserror::Error;

use crate::error::ArchiveError;
use crate::models::{ArticleContent, HeadlineRecord};

const MAX_SLUG_CHARS: usize = 80;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("content directory missing or not writable: {0}")]
    ContentDir(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl From<PersistError> for ArchiveError {
    fn from(err: PersistError) -> Self {
        ArchiveError::Storage(err.to_string())
    }
}

/// `{source}--{title}--{hash prefix}.md`, stable for a given record.
pub fn deterministic_filename(source_label: &str, title: &str, hash: &str) -> String {
    let short: String = hash.chars().take(8).collect();
    format!(
        "{}--{}--{}.md",
        slugify(source_label, "unknown"),
        slugify(title, "untitled"),
        short
    )
}

/// Lowercase ASCII-safe slug: alphanumerics kept, every other run becomes `-`.
fn slugify(input: &str, fallback: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut pending_dash = false;
    for c in input.chars() {
        if c.is_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.extend(c.to_lowercase());
        } else {
            pending_dash = true;
        }
    }
    let mut slug: String = slug.chars().take(MAX_SLUG_CHARS).collect();
    while slug.ends_with('-') {
        slug.pop();
    }
    if slug.is_empty() {
        fallback.to_string()
    } else {
        slug
    }
}

fn yaml_quote(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Markdown document with a front-matter header describing the record.
pub fn build_markdown_document(
    record: &HeadlineRecord,
    content: &ArticleContent,
    fetched_at: DateTime<Utc>,
) -> String {
    let mut doc = String::with_capacity(content.markdown.len() + 512);
    doc.push_str("---\n");
    doc.push_str(&format!("title: {}\n", yaml_quote(&record.title)));
    doc.push_str(&format!("url: {}\n", yaml_quote(&record.url)));
    doc.push_str(&format!("domain: {}\n", record.domain));
    if let Some(source) = record.source.as_deref() {
        doc.push_str(&format!("source: {}\n", yaml_quote(source)));
    }
    doc.push_str(&format!("published: {}\n", record.publish_at.to_rfc3339()));
    doc.push_str(&format!("fetched: {}\n", fetched_at.to_rfc3339()));
    doc.push_str(&format!("strategy: {}\n", content.strategy));
    doc.push_str(&format!("hash: {}\n", record.hash));
    doc.push_str("---\n\n");
    doc.push_str(content.markdown.trim());
    doc.push('\n');
    doc
}

/// Prefix of in-progress writes in the content directory. A crash between
/// create and rename leaves one behind; the retention sweep removes them.
pub const TEMP_FILE_PREFIX: &str = ".harc-tmp";

fn temp_file_in(dir: &Path) -> io::Result<NamedTempFile> {
    tempfile::Builder::new().prefix(TEMP_FILE_PREFIX).tempfile_in(dir)
}

/// Create the content directory if missing and check it is writable.
pub fn ensure_content_dir(dir: &Path) -> Result<(), PersistError> {
    if dir.exists() {
        let meta = fs::metadata(dir).map_err(|e| PersistError::ContentDir(e.to_string()))?;
        if !meta.is_dir() {
            return Err(PersistError::ContentDir(format!(
                "{} is not a directory",
                dir.display()
            )));
        }
    } else {
        fs::create_dir_all(dir).map_err(|e| PersistError::ContentDir(e.to_string()))?;
    }
    // Writability probe; the temp file is removed on drop.
    temp_file_in(dir).map_err(|e| PersistError::ContentDir(e.to_string()))?;
    Ok(())
}

/// Writes and removes content files under one directory.
#[derive(Debug, Clone)]
pub struct ContentWriter {
    dir: PathBuf,
}

impl ContentWriter {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `content` to `{dir}/{filename}` via a temp file and rename, so a
    /// reader never observes a partial file.
    pub fn write(&self, filename: &str, content: &str) -> Result<PathBuf, PersistError> {
        let target = self.dir.join(filename);
        let mut tmp = temp_file_in(&self.dir)?;
        tmp.write_all(content.as_bytes())?;
        tmp.flush()?;
        tmp.as_file_mut().sync_all()?;
        tmp.persist(&target).map_err(|e| PersistError::Io(e.error))?;
        Ok(target)
    }

    /// Remove a content file; a file that is already gone is not an error.
    /// Returns whether a file was deleted.
    pub fn remove(&self, filename: &str) -> Result<bool, PersistError> {
        match fs::remove_file(self.dir.join(filename)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FetchStatus, Strategy};
    use tempfile::TempDir;

    fn record() -> HeadlineRecord {
        HeadlineRecord {
            hash: "0123456789abcdef".to_string(),
            title: "Nvidia \"beats\" Q3: what's next?".to_string(),
            url: "https://www.reuters.com/a".to_string(),
            domain: "reuters.com".to_string(),
            source: Some("Reuters".to_string()),
            publish_at: Utc::now(),
            status: FetchStatus::Pending,
            content_path: None,
            strategy: None,
            crawled_at: Utc::now(),
            fetched_at: None,
            retry_count: 0,
            last_error: None,
        }
    }

    #[test]
    fn test_filename_is_deterministic_and_safe() {
        let name = deterministic_filename("Reuters", "Nvidia beats: Q3/Q4 <update>", "0123456789abcdef");
        assert_eq!(name, "reuters--nvidia-beats-q3-q4-update--01234567.md");
        assert_eq!(
            name,
            deterministic_filename("Reuters", "Nvidia beats: Q3/Q4 <update>", "0123456789abcdef")
        );
        assert_eq!(deterministic_filename("", "???", "ab"), "unknown--untitled--ab.md");
    }

    #[test]
    fn test_long_titles_are_truncated() {
        let name = deterministic_filename("x", &"word ".repeat(100), "deadbeef");
        assert!(name.len() < 120);
        assert!(name.ends_with("--deadbeef.md"));
    }

    #[test]
    fn test_front_matter_escapes_quotes() {
        let content = ArticleContent {
            title: None,
            markdown: "Body text.\n".to_string(),
            strategy: Strategy::Feed,
        };
        let doc = build_markdown_document(&record(), &content, Utc::now());
        assert!(doc.starts_with("---\ntitle: \"Nvidia \\\"beats\\\" Q3: what's next?\"\n"));
        assert!(doc.contains("strategy: feed\n"));
        assert!(doc.ends_with("---\n\nBody text.\n"));
    }

    #[test]
    fn test_write_then_remove() {
        let tmp = TempDir::new().unwrap();
        ensure_content_dir(tmp.path()).unwrap();
        let writer = ContentWriter::new(tmp.path().to_path_buf());
        let path = writer.write("a.md", "hello").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "hello");
        assert!(writer.remove("a.md").unwrap());
        assert!(!writer.remove("a.md").unwrap());

        let leftovers: Vec<_> = fs::read_dir(tmp.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(TEMP_FILE_PREFIX))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_content_dir_that_is_a_file_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("not-a-dir");
        fs::write(&file, "x").unwrap();
        assert!(matches!(
            ensure_content_dir(&file),
            Err(PersistError::ContentDir(_))
        ));
    }
}
