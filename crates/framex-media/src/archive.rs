//! ZIP packaging of extracted frames.
//!
//! Entries are named by file name, written in name order with a fixed
//! timestamp and fixed permissions, so the same frame set always yields
//! the same bytes.

use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

use crate::error::{MediaError, MediaResult};

const ENTRY_PERMISSIONS: u32 = 0o644;

/// Package `frames` into an in-memory ZIP archive.
///
/// Blocking; run it on the blocking pool from async code.
pub fn package_frames(frames: &[PathBuf]) -> MediaResult<Vec<u8>> {
    let mut entries: Vec<(&str, &Path)> = Vec::with_capacity(frames.len());
    for path in frames {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| MediaError::internal(format!("invalid frame name: {}", path.display())))?;
        entries.push((name, path.as_path()));
    }
    entries.sort_by(|a, b| a.0.cmp(b.0));

    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default())
        .unix_permissions(ENTRY_PERMISSIONS);

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, path) in entries {
        let data = std::fs::read(path)?;
        zip.start_file(name, options)?;
        zip.write_all(&data)?;
    }

    Ok(zip.finish()?.into_inner())
}
