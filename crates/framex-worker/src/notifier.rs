//! Best-effort completion/failure notifications.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};

use framex_models::{JobEvent, JobStatus};

use crate::error::{WorkerError, WorkerResult};

/// How long the notification service keeps a job notification.
const NOTIFICATION_TTL_SECS: u64 = 24 * 60 * 60;

/// Receiver of job events.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, event: &JobEvent) -> WorkerResult<()>;
}

/// Notifier configuration.
#[derive(Debug, Clone)]
pub struct NotifierConfig {
    /// Base URL of the notification service
    pub service_url: Option<String>,
    /// Request timeout
    pub timeout: Duration,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            service_url: None,
            timeout: Duration::from_secs(5),
        }
    }
}

impl NotifierConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            service_url: std::env::var("NOTIFICATION_SERVICE_URL")
                .ok()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            timeout: Duration::from_secs(
                std::env::var("NOTIFICATION_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(5),
            ),
        }
    }

    /// HTTP sink when a service URL is configured, otherwise a log-only sink.
    pub fn build(&self) -> WorkerResult<Arc<dyn NotificationSink>> {
        match &self.service_url {
            Some(url) => Ok(Arc::new(HttpNotifier::new(url, self.timeout)?)),
            None => Ok(Arc::new(LogNotifier)),
        }
    }
}

/// Request body accepted by the notification service.
#[derive(Debug, Serialize)]
struct NotificationRequest<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    title: String,
    message: String,
    data: &'a JobEvent,
    ttl: u64,
}

impl<'a> NotificationRequest<'a> {
    fn from_event(event: &'a JobEvent) -> Self {
        let kind = match event.status {
            JobStatus::Completed => "success",
            JobStatus::Failed => "error",
            _ => "info",
        };
        Self {
            kind,
            title: event.title(),
            message: event.message(),
            data: event,
            ttl: NOTIFICATION_TTL_SECS,
        }
    }
}

/// Posts events to `{service_url}/notifications`.
pub struct HttpNotifier {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpNotifier {
    pub fn new(service_url: &str, timeout: Duration) -> WorkerResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| WorkerError::config_error(format!("notification client: {}", e)))?;
        Ok(Self {
            client,
            endpoint: format!("{}/notifications", service_url.trim_end_matches('/')),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl NotificationSink for HttpNotifier {
    async fn notify(&self, event: &JobEvent) -> WorkerResult<()> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&NotificationRequest::from_event(event))
            .send()
            .await
            .map_err(|e| WorkerError::notification_failed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(WorkerError::notification_failed(format!(
                "notification service returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

/// Logs events instead of delivering them.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl NotificationSink for LogNotifier {
    async fn notify(&self, event: &JobEvent) -> WorkerResult<()> {
        info!(
            job_id = %event.job_id,
            file_id = %event.file_id,
            status = %event.status,
            "{}", event.message()
        );
        Ok(())
    }
}

/// Deliver `event` in the background. Failures are logged and dropped.
pub fn dispatch(sink: Arc<dyn NotificationSink>, event: JobEvent) {
    tokio::spawn(async move {
        if let Err(e) = sink.notify(&event).await {
            warn!(job_id = %event.job_id, "Failed to deliver notification: {}", e);
        }
    });
}
