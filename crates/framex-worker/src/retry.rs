//! Backoff retries for the extraction stage and log throttling for the
//! background loops.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

const DEFAULT_CEILING: Duration = Duration::from_secs(30);

/// Bounded exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    label: String,
    /// Extra attempts after the first one.
    retries: u32,
    first_delay: Duration,
    ceiling: Duration,
}

impl RetryConfig {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            retries: 3,
            first_delay: Duration::from_millis(100),
            ceiling: DEFAULT_CEILING,
        }
    }

    pub fn with_max_retries(self, retries: u32) -> Self {
        Self { retries, ..self }
    }

    pub fn with_base_delay(self, first_delay: Duration) -> Self {
        Self { first_delay, ..self }
    }

    /// Pause before retry `n`, counting from 1: `first_delay * 2^(n-1)`,
    /// capped at the ceiling.
    fn backoff(&self, n: u32) -> Duration {
        let shift = n.saturating_sub(1).min(31);
        self.first_delay
            .saturating_mul(1u32 << shift)
            .min(self.ceiling)
    }
}

/// Call `operation` with the attempt index (0 for the first call) until it
/// succeeds, returns an error `should_retry` rejects, or runs out of retries.
pub async fn retry_async<F, Fut, T, E, P>(
    config: &RetryConfig,
    mut operation: F,
    should_retry: P,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
    P: Fn(&E) -> bool,
{
    let mut attempt = 0u32;
    loop {
        let err = match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        if attempt >= config.retries || !should_retry(&err) {
            return Err(err);
        }

        attempt += 1;
        let pause = config.backoff(attempt);
        warn!(
            operation = %config.label,
            attempt,
            retries = config.retries,
            "Retrying in {:?} after error: {}",
            pause,
            err
        );
        tokio::time::sleep(pause).await;
    }
}

/// Counts consecutive failures of a periodic task and says whether each one
/// is still worth logging.
#[derive(Debug)]
pub struct FailureTracker {
    streak: u32,
    log_limit: u32,
}

impl FailureTracker {
    pub fn new(log_limit: u32) -> Self {
        Self { streak: 0, log_limit }
    }

    pub fn record_success(&mut self) {
        if self.streak > self.log_limit {
            debug!(failures = self.streak, "Recovered after suppressed failures");
        }
        self.streak = 0;
    }

    /// Returns `true` while the streak is within the log limit.
    pub fn record_failure(&mut self) -> bool {
        self.streak = self.streak.saturating_add(1);
        if self.streak == self.log_limit + 1 {
            warn!(
                "{} failures in a row, further errors are muted until recovery",
                self.log_limit
            );
        }
        self.streak <= self.log_limit
    }

    pub fn failure_count(&self) -> u32 {
        self.streak
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_backoff_doubles_then_caps() {
        let config = RetryConfig::new("extract").with_base_delay(Duration::from_millis(250));

        assert_eq!(config.backoff(1), Duration::from_millis(250));
        assert_eq!(config.backoff(3), Duration::from_secs(1));
        assert_eq!(config.backoff(40), DEFAULT_CEILING);
    }

    #[test]
    fn test_tracker_mutes_after_limit() {
        let mut tracker = FailureTracker::new(2);

        assert!(tracker.record_failure());
        assert!(tracker.record_failure());
        assert!(!tracker.record_failure());
        assert_eq!(tracker.failure_count(), 3);

        tracker.record_success();
        assert_eq!(tracker.failure_count(), 0);
        assert!(tracker.record_failure());
    }

    #[tokio::test]
    async fn test_retries_until_success_with_attempt_index() {
        let config = RetryConfig::new("extract").with_base_delay(Duration::from_millis(1));
        let seen = std::sync::Mutex::new(Vec::new());

        let result = retry_async(
            &config,
            |attempt| {
                seen.lock().unwrap().push(attempt);
                async move {
                    if attempt < 2 {
                        Err("ffmpeg exited with status 1")
                    } else {
                        Ok(attempt)
                    }
                }
            },
            |_| true,
        )
        .await;

        assert_eq!(result, Ok(2));
        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_rejected_error_is_returned_at_once() {
        let config = RetryConfig::new("extract").with_base_delay(Duration::from_millis(1));
        let calls = AtomicU32::new(0);

        let result: Result<(), &str> = retry_async(
            &config,
            |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("input missing") }
            },
            |e| *e != "input missing",
        )
        .await;

        assert_eq!(result, Err("input missing"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_zero_retries_runs_once() {
        let config = RetryConfig::new("extract").with_max_retries(0);
        let calls = AtomicU32::new(0);

        let result: Result<(), &str> = retry_async(
            &config,
            |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("boom") }
            },
            |_| true,
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
