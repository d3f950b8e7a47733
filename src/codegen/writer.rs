//! Hash-gated file writer: a generated file is rewritten only when its content hash changes.

use crate::error::CodegenError;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;

/// Comment syntax of the first-line hash marker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommentMarker {
    Rust,
    Sql,
}

impl CommentMarker {
    pub fn prefix(self) -> &'static str {
        match self {
            CommentMarker::Rust => "//",
            CommentMarker::Sql => "--",
        }
    }

    /// Marker for a path by extension (`.sql` → `--`, anything else → `//`).
    pub fn for_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("sql") => CommentMarker::Sql,
            _ => CommentMarker::Rust,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    Unchanged,
}

pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn hash_line(marker: CommentMarker, hash: &str) -> String {
    format!("{} content_hash: {}", marker.prefix(), hash)
}

#[derive(Clone, Debug, Default)]
pub struct CodeWriter;

impl CodeWriter {
    pub fn new() -> Self {
        CodeWriter
    }

    /// Writes `content` behind a hash line and a generated-at banner unless the existing
    /// file already starts with the same hash line.
    pub fn write_if_changed(&self, path: &Path, content: &str, marker: CommentMarker) -> Result<WriteOutcome, CodegenError> {
        let first = hash_line(marker, &content_hash(content));
        if let Ok(existing) = fs::read_to_string(path) {
            if existing.lines().next() == Some(first.as_str()) {
                tracing::debug!(path = %path.display(), "unchanged, skipped");
                return Ok(WriteOutcome::Unchanged);
            }
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let banner = format!(
            "{} generated by {} at {}; edits are overwritten",
            marker.prefix(),
            env!("CARGO_PKG_NAME"),
            chrono::Utc::now().to_rfc3339()
        );
        fs::write(path, format!("{}\n{}\n{}", first, banner, content))?;
        tracing::info!(path = %path.display(), "written");
        Ok(WriteOutcome::Written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_write_of_same_content_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/out.rs");
        let w = CodeWriter::new();
        assert_eq!(w.write_if_changed(&path, "pub struct A;\n", CommentMarker::Rust).unwrap(), WriteOutcome::Written);
        let before = fs::read_to_string(&path).unwrap();
        assert!(before.starts_with("// content_hash: "));
        assert!(before.ends_with("pub struct A;\n"));
        assert_eq!(w.write_if_changed(&path, "pub struct A;\n", CommentMarker::Rust).unwrap(), WriteOutcome::Unchanged);
        assert_eq!(fs::read_to_string(&path).unwrap(), before);
        assert_eq!(w.write_if_changed(&path, "pub struct B;\n", CommentMarker::Rust).unwrap(), WriteOutcome::Written);
        assert!(fs::read_to_string(&path).unwrap().ends_with("pub struct B;\n"));
    }

    #[test]
    fn hand_edited_file_is_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tables.sql");
        fs::write(&path, "-- hand written\n").unwrap();
        let w = CodeWriter::new();
        let marker = CommentMarker::for_path(&path);
        assert_eq!(marker, CommentMarker::Sql);
        assert_eq!(w.write_if_changed(&path, "SELECT 1;\n", marker).unwrap(), WriteOutcome::Written);
        assert!(fs::read_to_string(&path).unwrap().starts_with("-- content_hash: "));
    }

    #[test]
    fn hash_is_hex_sha256() {
        assert_eq!(
            content_hash(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
