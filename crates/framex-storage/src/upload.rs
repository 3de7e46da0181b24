//! Upload store: resolves a file id to the uploaded input artifact.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::error::{validate_name, StorageError, StorageResult};

/// Source of uploaded input artifacts.
#[async_trait]
pub trait UploadStore: Send + Sync {
    /// Path of the artifact uploaded under `file_id`.
    ///
    /// Fails with `StorageError::NotFound` when nothing matches.
    async fn locate(&self, file_id: &str) -> StorageResult<PathBuf>;
}

/// Uploads kept in a local directory.
///
/// The upload service stores each file as `<file_id>_<original name>`; a
/// file named exactly `<file_id>` is accepted too. When several files match,
/// the lexicographically first wins.
#[derive(Debug, Clone)]
pub struct LocalUploadStore {
    root: PathBuf,
}

impl LocalUploadStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn matches(file_id: &str, name: &str) -> bool {
        name == file_id
            || name
                .strip_prefix(file_id)
                .is_some_and(|rest| rest.starts_with('_'))
    }
}

#[async_trait]
impl UploadStore for LocalUploadStore {
    async fn locate(&self, file_id: &str) -> StorageResult<PathBuf> {
        validate_name(file_id).map_err(|_| StorageError::not_found(file_id))?;

        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::not_found(file_id));
            }
            Err(e) => return Err(e.into()),
        };

        let mut candidates = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            if Self::matches(file_id, &name) && entry.file_type().await?.is_file() {
                candidates.push(entry.path());
            }
        }

        candidates.sort();
        let path = candidates
            .into_iter()
            .next()
            .ok_or_else(|| StorageError::not_found(file_id))?;

        debug!(file_id, path = %path.display(), "Located upload");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_locate_prefixed_upload() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("abc123_clip.mp4"), b"video").unwrap();
        std::fs::write(dir.path().join("abc1234_other.mp4"), b"video").unwrap();

        let store = LocalUploadStore::new(dir.path());
        let path = store.locate("abc123").await.unwrap();
        assert_eq!(path, dir.path().join("abc123_clip.mp4"));
    }

    #[tokio::test]
    async fn test_locate_exact_name() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("abc123"), b"video").unwrap();

        let store = LocalUploadStore::new(dir.path());
        assert_eq!(
            store.locate("abc123").await.unwrap(),
            dir.path().join("abc123")
        );
    }

    #[tokio::test]
    async fn test_locate_missing() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalUploadStore::new(dir.path());

        let err = store.locate("missing").await.unwrap_err();
        assert!(err.is_not_found());

        let err = store.locate("../secret").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_locate_missing_root() {
        let store = LocalUploadStore::new("/definitely/not/here");
        assert!(store.locate("abc123").await.unwrap_err().is_not_found());
    }
}
