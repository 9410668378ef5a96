//! Durable per-document file storage.
//!
//! Uploads are moved (not copied) into `<root>/<document_id>/<name>` before
//! any processing, so a failed ingestion never leaves a temp file behind:
//! the engine removes the document directory instead.

use anyhow::{Context, Result};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn document_dir(&self, document_id: &str) -> PathBuf {
        self.root.join(document_id)
    }

    /// Move `source` into permanent storage for `document_id`.
    ///
    /// Falls back to copy + remove when a rename is not possible (for
    /// example across filesystems).
    pub async fn store(&self, source: &Path, document_id: &str, original_name: &str) -> Result<PathBuf> {
        let dir = self.document_dir(document_id);
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create storage directory: {}", dir.display()))?;
        let dest = dir.join(sanitize_file_name(original_name));

        if tokio::fs::rename(source, &dest).await.is_err() {
            tokio::fs::copy(source, &dest).await.with_context(|| {
                format!("Failed to move {} into {}", source.display(), dest.display())
            })?;
            if let Err(e) = tokio::fs::remove_file(source).await {
                tracing::warn!(path = %source.display(), error = %e, "could not remove upload after copy");
            }
        }
        Ok(dest)
    }

    /// Remove the document's directory. Missing directories are fine.
    pub async fn delete(&self, document_id: &str) -> Result<()> {
        let dir = self.document_dir(document_id);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to delete {}", dir.display())),
        }
    }

    /// Remove every stored document.
    pub async fn clear(&self) -> Result<()> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to list {}", self.root.display()))
            }
        };
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if entry.file_type().await?.is_dir() {
                tokio::fs::remove_dir_all(&path).await
            } else {
                tokio::fs::remove_file(&path).await
            }
            .with_context(|| format!("Failed to delete {}", path.display()))?;
        }
        Ok(())
    }
}

/// Base name of `name` with anything outside `[A-Za-z0-9._-]` replaced.
pub fn sanitize_file_name(name: &str) -> String {
    let base = Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload");
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.trim_matches('.').is_empty() {
        "upload".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("my report (v2).pdf"), "my_report__v2_.pdf");
        assert_eq!(sanitize_file_name(".."), "upload");
    }

    #[tokio::test]
    async fn test_store_moves_and_delete_removes() {
        let tmp = TempDir::new().unwrap();
        let upload = tmp.path().join("incoming.txt");
        tokio::fs::write(&upload, b"hello").await.unwrap();

        let storage = FileStorage::new(tmp.path().join("store"));
        let dest = storage.store(&upload, "doc1", "notes.txt").await.unwrap();
        assert!(!upload.exists());
        assert_eq!(tokio::fs::read(&dest).await.unwrap(), b"hello");

        storage.delete("doc1").await.unwrap();
        assert!(!dest.exists());
        storage.delete("doc1").await.unwrap();
    }

    #[tokio::test]
    async fn test_clear_on_missing_root() {
        let tmp = TempDir::new().unwrap();
        let storage = FileStorage::new(tmp.path().join("never-created"));
        storage.clear().await.unwrap();
    }
}
