//! Frame extraction with the FFmpeg CLI and frame archive packaging.
//!
//! - `FfmpegCommand` / `FfmpegRunner`: command builder and a runner with
//!   cancellation, timeout and diagnostic capture
//! - `FrameExtractor`: extraction seam, implemented by `FfmpegFrameExtractor`
//! - `list_frames` / `package_frames`: enumeration and deterministic ZIP output

pub mod archive;
pub mod command;
pub mod error;
pub mod frames;
pub mod progress;

pub use archive::package_frames;
pub use command::{check_ffmpeg, FfmpegCommand, FfmpegRunner};
pub use error::{MediaError, MediaResult};
pub use frames::{list_frames, FfmpegFrameExtractor, FrameExtractor, FRAME_PATTERN};
pub use progress::FfmpegProgress;
