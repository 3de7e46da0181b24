//! Job record store.
//!
//! - `JobStore`: keyed record storage with a retention TTL
//! - `RedisJobStore` / `MemoryJobStore`: the two backends
//! - `JobRepository`: per-job serialized, version-checked updates

pub mod error;
pub mod locks;
pub mod memory;
pub mod redis_store;
pub mod repository;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use locks::KeyedLocks;
pub use memory::MemoryJobStore;
pub use redis_store::RedisJobStore;
pub use repository::JobRepository;
pub use store::{JobStore, StoreConfig, DEFAULT_RETENTION_SECS};
