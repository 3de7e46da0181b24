//! Storage configuration.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::{StorageError, StorageResult};
use crate::output::{LocalOutputStore, OutputStore};
use crate::r2::{R2Config, R2OutputStore};
use crate::upload::LocalUploadStore;

/// Where produced archives go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputBackend {
    #[default]
    Local,
    R2,
}

impl FromStr for OutputBackend {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(OutputBackend::Local),
            "r2" => Ok(OutputBackend::R2),
            other => Err(StorageError::config_error(format!(
                "unknown OUTPUT_BACKEND: {}",
                other
            ))),
        }
    }
}

/// Storage configuration.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Directory holding uploaded inputs
    pub uploads_dir: PathBuf,
    /// Output backend
    pub output_backend: OutputBackend,
    /// Directory for archives (local backend)
    pub outputs_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            uploads_dir: PathBuf::from("../uploads"),
            output_backend: OutputBackend::Local,
            outputs_dir: PathBuf::from("outputs"),
        }
    }
}

impl StorageConfig {
    /// Create config from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        let output_backend = match std::env::var("OUTPUT_BACKEND") {
            Ok(value) => value.parse()?,
            Err(_) => OutputBackend::Local,
        };

        Ok(Self {
            uploads_dir: std::env::var("UPLOADS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("../uploads")),
            output_backend,
            outputs_dir: std::env::var("OUTPUTS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("outputs")),
        })
    }

    pub fn upload_store(&self) -> LocalUploadStore {
        LocalUploadStore::new(&self.uploads_dir)
    }

    /// Build the configured output store.
    pub fn output_store(&self) -> StorageResult<Arc<dyn OutputStore>> {
        match self.output_backend {
            OutputBackend::Local => Ok(Arc::new(LocalOutputStore::new(&self.outputs_dir))),
            OutputBackend::R2 => Ok(Arc::new(R2OutputStore::new(R2Config::from_env()?))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_backend() {
        assert_eq!("local".parse::<OutputBackend>().unwrap(), OutputBackend::Local);
        assert_eq!(" R2 ".parse::<OutputBackend>().unwrap(), OutputBackend::R2);
        assert!("gcs".parse::<OutputBackend>().is_err());
    }

    #[test]
    fn test_defaults() {
        let config = StorageConfig::default();
        assert_eq!(config.uploads_dir, PathBuf::from("../uploads"));
        assert_eq!(config.output_backend, OutputBackend::Local);
        assert!(config.output_store().is_ok());
    }
}
