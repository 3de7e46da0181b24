//! Application state.

use std::sync::Arc;

use framex_queue::{RedisWorkQueue, WorkQueue};
use framex_store::{JobRepository, JobStore, RedisJobStore};

use crate::config::ApiConfig;
use crate::services::JobService;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub jobs: JobService,
}

impl AppState {
    /// Build state from explicit collaborators.
    pub fn new(config: ApiConfig, store: Arc<dyn JobStore>, queue: Arc<dyn WorkQueue>) -> Self {
        Self {
            config,
            jobs: JobService::new(JobRepository::new(store), queue),
        }
    }

    /// Redis-backed store and queue configured from the environment.
    pub fn from_env(config: ApiConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let store = RedisJobStore::from_env()?;
        let queue = RedisWorkQueue::from_env()?;
        Ok(Self::new(config, Arc::new(store), Arc::new(queue)))
    }
}
