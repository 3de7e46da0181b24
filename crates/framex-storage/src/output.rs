//! Output store: persists produced archives.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::info;

use crate::error::{validate_name, StorageError, StorageResult};

/// Destination for produced archives.
#[async_trait]
pub trait OutputStore: Send + Sync {
    /// Persist `bytes` under `name`, replacing any previous object.
    async fn store(&self, name: &str, bytes: Vec<u8>) -> StorageResult<()>;
}

/// Archives written to a local directory.
///
/// Each write goes to a temp file in the same directory and is renamed into
/// place, so readers never observe a partial archive.
#[derive(Debug, Clone)]
pub struct LocalOutputStore {
    root: PathBuf,
}

impl LocalOutputStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Final path of an object.
    pub fn path_of(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

#[async_trait]
impl OutputStore for LocalOutputStore {
    async fn store(&self, name: &str, bytes: Vec<u8>) -> StorageResult<()> {
        validate_name(name)?;
        tokio::fs::create_dir_all(&self.root).await?;

        let tmp = self.root.join(format!(".{}.tmp", name));
        let target = self.path_of(name);
        let size = bytes.len();

        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|e| StorageError::upload_failed(format!("{}: {}", tmp.display(), e)))?;
        if let Err(e) = tokio::fs::rename(&tmp, &target).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(StorageError::upload_failed(format!(
                "{}: {}",
                target.display(),
                e
            )));
        }

        info!(name, size, path = %target.display(), "Stored output");
        Ok(())
    }
}

/// Archives kept in memory.
#[derive(Debug, Default)]
pub struct MemoryOutputStore {
    objects: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryOutputStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, name: &str) -> Option<Vec<u8>> {
        self.objects.read().await.get(name).cloned()
    }

    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.objects.read().await.keys().cloned().collect();
        names.sort();
        names
    }
}

#[async_trait]
impl OutputStore for MemoryOutputStore {
    async fn store(&self, name: &str, bytes: Vec<u8>) -> StorageResult<()> {
        validate_name(name)?;
        self.objects.write().await.insert(name.to_string(), bytes);
        Ok(())
    }
}
