//! Invoking the ffmpeg CLI.

use std::collections::VecDeque;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::{MediaError, MediaResult};
use crate::progress::{is_progress_line, parse_progress_line, FfmpegProgress};

/// Diagnostic lines kept from ffmpeg's stderr.
const STDERR_TAIL_LINES: usize = 20;

/// One ffmpeg invocation: a single input, a single output (file or
/// `%04d` pattern) and a video filter chain.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    input: PathBuf,
    output: PathBuf,
    filters: Vec<String>,
    verbosity: &'static str,
}

impl FfmpegCommand {
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            input: input.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
            filters: Vec::new(),
            verbosity: "error",
        }
    }

    /// Append a filter to the `-vf` chain.
    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filters.push(filter.into());
        self
    }

    /// Sample the input at a fixed rate, e.g. `"1"` or `"1/5"`.
    pub fn frame_rate(self, fps: impl AsRef<str>) -> Self {
        self.filter(format!("fps={}", fps.as_ref()))
    }

    /// Argument vector, without the program name.
    ///
    /// Progress key/value pairs are written to stderr next to diagnostics
    /// and split apart by the runner.
    pub fn build_args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = ["-y", "-nostdin", "-v", self.verbosity]
            .into_iter()
            .chain(["-progress", "pipe:2", "-nostats", "-i"])
            .map(OsString::from)
            .collect();
        args.push(self.input.clone().into_os_string());
        if !self.filters.is_empty() {
            args.push("-vf".into());
            args.push(self.filters.join(",").into());
        }
        args.push(self.output.clone().into_os_string());
        args
    }
}

/// Runs an [`FfmpegCommand`], killing the child on cancellation or when the
/// wall-clock limit passes.
#[derive(Debug, Default)]
pub struct FfmpegRunner {
    cancel: Option<watch::Receiver<bool>>,
    limit: Option<Duration>,
}

impl FfmpegRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancel(self, cancel: watch::Receiver<bool>) -> Self {
        Self {
            cancel: Some(cancel),
            ..self
        }
    }

    pub fn with_timeout(self, secs: u64) -> Self {
        Self {
            limit: Some(Duration::from_secs(secs)),
            ..self
        }
    }

    pub async fn run(&self, cmd: &FfmpegCommand) -> MediaResult<()> {
        self.run_with_progress(cmd, |_| {}).await
    }

    /// Run to completion, reporting parsed progress to `on_progress`.
    ///
    /// A non-zero exit becomes `FfmpegFailed` carrying the last diagnostic
    /// lines ffmpeg printed.
    pub async fn run_with_progress<F>(&self, cmd: &FfmpegCommand, on_progress: F) -> MediaResult<()>
    where
        F: Fn(FfmpegProgress) + Send + 'static,
    {
        if self.cancel.as_ref().is_some_and(|rx| *rx.borrow()) {
            return Err(MediaError::Cancelled);
        }

        let program = check_ffmpeg()?;
        let args = cmd.build_args();
        debug!(?args, "Spawning ffmpeg");

        let mut child = Command::new(program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| MediaError::internal("ffmpeg stderr not captured"))?;
        let reader = tokio::spawn(drain_stderr(stderr, on_progress));

        let waited = self.wait(&mut child).await;
        let diagnostic = reader.await.unwrap_or_default();
        let status = waited?;

        if status.success() {
            Ok(())
        } else if diagnostic.is_empty() {
            Err(MediaError::ffmpeg_failed(
                format!("ffmpeg exited with {}", status),
                status.code(),
            ))
        } else {
            Err(MediaError::ffmpeg_failed(diagnostic, status.code()))
        }
    }

    async fn wait(&self, child: &mut Child) -> MediaResult<ExitStatus> {
        let cancelled = cancel_requested(self.cancel.clone());
        let expired = async {
            match self.limit {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            status = child.wait() => Ok(status?),
            _ = cancelled => {
                info!("Killing ffmpeg after cancellation");
                let _ = child.kill().await;
                Err(MediaError::Cancelled)
            }
            _ = expired => {
                let secs = self.limit.map(|d| d.as_secs()).unwrap_or_default();
                warn!(timeout_secs = secs, "Killing ffmpeg after timeout");
                let _ = child.kill().await;
                Err(MediaError::Timeout(secs))
            }
        }
    }
}

/// Resolves once `cancel` reads `true`. Never resolves without a receiver
/// or after the sender is gone.
async fn cancel_requested(cancel: Option<watch::Receiver<bool>>) {
    let fired = match cancel {
        Some(mut rx) => rx.wait_for(|flag| *flag).await.is_ok(),
        None => false,
    };
    if !fired {
        std::future::pending::<()>().await;
    }
}

/// Read stderr to EOF, forwarding progress blocks and returning the last
/// diagnostic lines joined by newlines.
async fn drain_stderr<R, F>(stderr: R, on_progress: F) -> String
where
    R: AsyncRead + Unpin,
    F: Fn(FfmpegProgress),
{
    let mut lines = BufReader::new(stderr).lines();
    let mut current = FfmpegProgress::default();
    let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);

    while let Ok(Some(line)) = lines.next_line().await {
        if is_progress_line(&line) {
            if let Some(progress) = parse_progress_line(&line, &mut current) {
                on_progress(progress);
            }
            continue;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if tail.len() == STDERR_TAIL_LINES {
            tail.pop_front();
        }
        tail.push_back(line.to_owned());
    }

    Vec::from(tail).join("\n")
}

/// Path of the ffmpeg binary.
pub fn check_ffmpeg() -> MediaResult<PathBuf> {
    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_place_filter_after_input() {
        let args = FfmpegCommand::new("in/abc123_clip.mp4", "scratch/frame_%04d.png")
            .frame_rate("1")
            .build_args();

        assert_eq!(args.first().map(|a| a.as_os_str()), Some("-y".as_ref()));
        let input = args.iter().position(|a| a == "-i").unwrap();
        assert_eq!(args[input + 1], "in/abc123_clip.mp4");

        let vf = args.iter().position(|a| a == "-vf").unwrap();
        assert!(vf > input);
        assert_eq!(args[vf + 1], "fps=1");
        assert_eq!(args.last().unwrap(), "scratch/frame_%04d.png");
    }

    #[tokio::test]
    async fn test_stderr_tail_skips_progress_lines() {
        let stderr: &[u8] = b"frame=1\nprogress=continue\n[png] broken frame\n\nmoov atom not found\n";
        let tail = drain_stderr(stderr, |_| {}).await;
        assert_eq!(tail, "[png] broken frame\nmoov atom not found");
    }

    #[tokio::test]
    async fn test_cancel_requested_fires_on_flag() {
        let (tx, rx) = watch::channel(false);
        let waiter = tokio::spawn(cancel_requested(Some(rx)));
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("cancel observed")
            .unwrap();
    }

    #[tokio::test]
    async fn test_cancel_requested_pends_without_sender() {
        let (tx, rx) = watch::channel(false);
        drop(tx);
        let waited = tokio::time::timeout(Duration::from_millis(50), cancel_requested(Some(rx))).await;
        assert!(waited.is_err());

        let waited = tokio::time::timeout(Duration::from_millis(50), cancel_requested(None)).await;
        assert!(waited.is_err());
    }

    #[tokio::test]
    async fn test_runner_short_circuits_when_cancelled() {
        let (_tx, rx) = watch::channel(true);
        let runner = FfmpegRunner::new().with_cancel(rx);
        let cmd = FfmpegCommand::new("in.mp4", "out_%04d.png");

        let err = runner.run(&cmd).await.unwrap_err();
        assert!(matches!(err, MediaError::Cancelled));
    }
}
