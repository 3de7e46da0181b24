//! FFmpeg `-progress` output parsing.

/// Progress information from FFmpeg.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FfmpegProgress {
    /// Current frame number
    pub frame: u64,
    /// Current FPS
    pub fps: f64,
    /// Output time in milliseconds
    pub out_time_ms: i64,
    /// Encoding speed (e.g., 1.5 = 1.5x realtime)
    pub speed: f64,
    /// Whether encoding is complete
    pub is_complete: bool,
}

/// Whether a stderr line belongs to the `-progress` key/value stream
/// rather than a diagnostic message.
pub(crate) fn is_progress_line(line: &str) -> bool {
    let line = line.trim();
    match line.split_once('=') {
        Some((key, _)) => !key.is_empty() && !key.contains(char::is_whitespace),
        None => false,
    }
}

/// Fold a progress line into `current`. Returns a snapshot at the end of
/// each progress block.
pub(crate) fn parse_progress_line(line: &str, current: &mut FfmpegProgress) -> Option<FfmpegProgress> {
    let (key, value) = line.trim().split_once('=')?;
    match key {
        "out_time_ms" | "out_time_us" => {
            // Both keys carry microseconds.
            if let Ok(us) = value.parse::<i64>() {
                current.out_time_ms = us / 1000;
            }
        }
        "frame" => {
            if let Ok(frame) = value.parse() {
                current.frame = frame;
            }
        }
        "fps" => {
            if let Ok(fps) = value.parse() {
                current.fps = fps;
            }
        }
        "speed" => {
            if let Some(speed) = value.strip_suffix('x').and_then(|s| s.trim().parse().ok()) {
                current.speed = speed;
            }
        }
        "progress" => {
            current.is_complete = value == "end";
            return Some(current.clone());
        }
        _ => {}
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_parsing() {
        let mut progress = FfmpegProgress::default();

        assert!(parse_progress_line("frame=3", &mut progress).is_none());
        parse_progress_line("out_time_us=3000000", &mut progress);
        parse_progress_line("speed=N/A", &mut progress);
        parse_progress_line("speed= 2.5x", &mut progress);

        let snapshot = parse_progress_line("progress=end", &mut progress).unwrap();
        assert_eq!(snapshot.frame, 3);
        assert_eq!(snapshot.out_time_ms, 3000);
        assert!((snapshot.speed - 2.5).abs() < 0.01);
        assert!(snapshot.is_complete);
    }

    #[test]
    fn test_is_progress_line() {
        assert!(is_progress_line("frame=12"));
        assert!(is_progress_line("stream_0_0_q=-0.0"));
        assert!(!is_progress_line("missing.mp4: No such file or directory"));
        assert!(!is_progress_line("Error opening input file x=y.mp4."));
    }
}
