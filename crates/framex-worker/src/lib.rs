//! Frame extraction worker.
//!
//! This crate provides:
//! - Dispatcher over a bounded worker pool
//! - Per-job pipeline (extract, enumerate, package, store)
//! - Heartbeat and cancellation watcher
//! - Stale job reconciliation
//! - Completion notifications

pub mod config;
pub mod context;
pub mod error;
pub mod executor;
pub mod logging;
pub mod notifier;
pub mod processor;
pub mod reconciler;
pub mod retry;
pub mod watcher;

pub use config::WorkerConfig;
pub use context::ProcessingContext;
pub use error::{WorkerError, WorkerResult};
pub use executor::Dispatcher;
pub use logging::JobLogger;
pub use notifier::{HttpNotifier, LogNotifier, NotificationSink, NotifierConfig};
pub use processor::{process_job, JobOutcome};
pub use reconciler::{StaleJobReconciler, STALE_JOB_ERROR};
pub use retry::{retry_async, FailureTracker, RetryConfig};
