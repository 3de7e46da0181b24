//! Worker settings.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Size of the worker pool
    pub max_concurrent_jobs: usize,
    /// Parent directory of per-job scratch directories
    pub work_dir: PathBuf,
    /// Frame sampling rate handed to ffmpeg's `fps` filter
    pub frame_rate: String,
    /// Wall-clock limit of one ffmpeg invocation
    pub job_timeout: Duration,
    /// Extra attempts after a tool failure (0 disables retries)
    pub tool_retries: u32,
    /// Base delay of the tool retry backoff
    pub tool_retry_delay: Duration,
    /// How often a running job refreshes its lease
    pub heartbeat_interval: Duration,
    /// How often a running job re-reads its record to observe cancellation
    pub cancel_poll_interval: Duration,
    /// How often the reconciler sweeps for stale jobs
    pub reconcile_interval: Duration,
    /// Lease age after which a processing job counts as orphaned
    pub stale_threshold: Duration,
    /// How long shutdown waits for in-flight jobs
    pub shutdown_timeout: Duration,
    /// Longest single blocking dequeue; shutdown is observed between waits
    pub dequeue_timeout: Duration,
    /// Backoff after a failed dequeue
    pub dequeue_backoff: Duration,
    /// Prometheus exporter listen address
    pub metrics_addr: Option<SocketAddr>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 4,
            work_dir: PathBuf::from("processing"),
            frame_rate: "1".to_string(),
            job_timeout: Duration::from_secs(60 * 60),
            tool_retries: 0,
            tool_retry_delay: Duration::from_secs(1),
            heartbeat_interval: Duration::from_secs(15),
            cancel_poll_interval: Duration::from_millis(1000),
            reconcile_interval: Duration::from_secs(30),
            stale_threshold: Duration::from_secs(120),
            shutdown_timeout: Duration::from_secs(60),
            dequeue_timeout: Duration::from_secs(5),
            dequeue_backoff: Duration::from_secs(5),
            metrics_addr: None,
        }
    }
}

fn env_value<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok()?.trim().parse().ok()
}

fn env_secs(key: &str, default: Duration) -> Duration {
    env_value(key).map(Duration::from_secs).unwrap_or(default)
}

impl WorkerConfig {
    /// Overlay the `WORKER_*` variables (and `QUEUE_BLOCK_SECS`) on the
    /// defaults. Unparsable values fall back to the default.
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            max_concurrent_jobs: env_value("WORKER_MAX_JOBS")
                .filter(|&n: &usize| n > 0)
                .unwrap_or(d.max_concurrent_jobs),
            work_dir: std::env::var_os("WORKER_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(d.work_dir),
            frame_rate: std::env::var("WORKER_FRAME_RATE").unwrap_or(d.frame_rate),
            job_timeout: env_secs("WORKER_JOB_TIMEOUT", d.job_timeout),
            tool_retries: env_value("WORKER_TOOL_RETRIES").unwrap_or(d.tool_retries),
            tool_retry_delay: d.tool_retry_delay,
            heartbeat_interval: env_secs("WORKER_HEARTBEAT_SECS", d.heartbeat_interval),
            cancel_poll_interval: env_value("WORKER_CANCEL_POLL_MS")
                .map(Duration::from_millis)
                .unwrap_or(d.cancel_poll_interval),
            reconcile_interval: env_secs("WORKER_RECONCILE_SECS", d.reconcile_interval),
            stale_threshold: env_secs("WORKER_STALE_SECS", d.stale_threshold),
            shutdown_timeout: env_secs("WORKER_SHUTDOWN_TIMEOUT", d.shutdown_timeout),
            dequeue_timeout: env_secs("QUEUE_BLOCK_SECS", d.dequeue_timeout),
            dequeue_backoff: d.dequeue_backoff,
            metrics_addr: env_value("WORKER_METRICS_ADDR"),
        }
    }
}
