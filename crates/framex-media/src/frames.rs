//! Frame extraction and enumeration.

use std::path::{Path, PathBuf};
use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::debug;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};

/// File name pattern of extracted frames.
pub const FRAME_PATTERN: &str = "frame_%04d.png";

/// Extension of extracted frames.
pub const FRAME_EXTENSION: &str = "png";

/// Turns an input artifact into a directory of frame images.
#[async_trait]
pub trait FrameExtractor: Send + Sync {
    /// Write frames for `input` into `output_dir`.
    ///
    /// Must stop promptly with `MediaError::Cancelled` once `cancel` reads
    /// `true`.
    async fn extract(
        &self,
        input: &Path,
        output_dir: &Path,
        cancel: watch::Receiver<bool>,
    ) -> MediaResult<()>;
}

/// Frame extraction with the ffmpeg CLI.
#[derive(Debug, Clone)]
pub struct FfmpegFrameExtractor {
    /// Sampling rate passed to the `fps` filter
    frame_rate: String,
    /// Wall-clock limit per invocation
    timeout_secs: u64,
}

impl FfmpegFrameExtractor {
    pub fn new(frame_rate: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            frame_rate: frame_rate.into(),
            timeout_secs,
        }
    }

    /// Command used for one extraction.
    pub fn command(&self, input: &Path, output_dir: &Path) -> FfmpegCommand {
        FfmpegCommand::new(input, output_dir.join(FRAME_PATTERN)).frame_rate(self.frame_rate.clone())
    }
}

#[async_trait]
impl FrameExtractor for FfmpegFrameExtractor {
    async fn extract(
        &self,
        input: &Path,
        output_dir: &Path,
        cancel: watch::Receiver<bool>,
    ) -> MediaResult<()> {
        let cmd = self.command(input, output_dir);
        let runner = FfmpegRunner::new()
            .with_cancel(cancel)
            .with_timeout(self.timeout_secs);

        let started = Instant::now();
        let result = runner
            .run_with_progress(&cmd, |progress| {
                debug!(frame = progress.frame, speed = progress.speed, "ffmpeg progress");
            })
            .await;

        let outcome = match &result {
            Ok(()) => "success",
            Err(MediaError::Cancelled) => "cancelled",
            Err(_) => "failure",
        };
        metrics::histogram!("framex_ffmpeg_duration_seconds", "outcome" => outcome)
            .record(started.elapsed().as_secs_f64());

        result
    }
}

/// Frame images in `dir`, sorted by file name.
pub async fn list_frames(dir: &Path) -> MediaResult<Vec<PathBuf>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(MediaError::FileNotFound(dir.to_path_buf()));
        }
        Err(e) => return Err(e.into()),
    };

    let mut frames = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_frame = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(FRAME_EXTENSION));
        if is_frame && entry.file_type().await?.is_file() {
            frames.push(path);
        }
    }

    frames.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(frames)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_list_frames_sorted_png_only() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["frame_0003.png", "frame_0001.png", "notes.txt", "frame_0002.png"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        std::fs::create_dir(dir.path().join("nested.png")).unwrap();

        let frames = list_frames(dir.path()).await.unwrap();
        let names: Vec<_> = frames
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["frame_0001.png", "frame_0002.png", "frame_0003.png"]);
    }

    #[tokio::test]
    async fn test_list_frames_empty_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert!(list_frames(dir.path()).await.unwrap().is_empty());
    }

    #[test]
    fn test_extractor_command() {
        let extractor = FfmpegFrameExtractor::new("2", 60);
        let args = extractor
            .command(Path::new("/uploads/abc123_clip.mp4"), Path::new("/scratch"))
            .build_args();

        assert!(args.iter().any(|a| a == "fps=2"));
        assert_eq!(args.last().and_then(|a| a.to_str()), Some("/scratch/frame_%04d.png"));
    }
}
