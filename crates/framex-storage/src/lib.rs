//! Upload and output store collaborators.
//!
//! - `UploadStore`: resolves a file id to the uploaded input artifact
//! - `OutputStore`: persists produced archives (local directory or R2)

pub mod config;
pub mod error;
pub mod output;
pub mod r2;
pub mod upload;

pub use config::{OutputBackend, StorageConfig};
pub use error::{StorageError, StorageResult};
pub use output::{LocalOutputStore, MemoryOutputStore, OutputStore};
pub use r2::{R2Config, R2OutputStore};
pub use upload::{LocalUploadStore, UploadStore};
