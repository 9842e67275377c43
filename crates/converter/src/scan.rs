//! Scanner module for discovering video files in the input directory.
//!
//! Only the top level of the directory is listed; subdirectories are ignored.

use std::io;
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

/// Video file extensions supported by the scanner (case-insensitive matching).
pub const VIDEO_EXTENSIONS: &[&str] = &[".mp4", ".m4v", ".mov", ".mkv", ".avi", ".ts", ".m2ts"];

/// A video file discovered in the input directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanCandidate {
    /// Full path to the video file.
    pub path: PathBuf,
    /// File size in bytes at discovery time.
    pub size_bytes: u64,
}

/// Checks if a file has a video extension (case-insensitive).
pub fn is_video_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext_lower = format!(".{}", ext.to_lowercase());
            VIDEO_EXTENSIONS.contains(&ext_lower.as_str())
        })
        .unwrap_or(false)
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.starts_with('.'))
        .unwrap_or(false)
}

/// Lists the video files directly inside `dir`, sorted by path.
///
/// Hidden files (names starting with `.`, e.g. macOS `._clip.mp4` resource forks)
/// and non-video files are ignored. Failing to read `dir` itself is an error;
/// unreadable entries are logged and skipped.
pub fn scan_input_dir(dir: &Path) -> io::Result<Vec<ScanCandidate>> {
    let mut candidates = Vec::new();

    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() == 0 => return Err(e.into()),
            Err(e) => {
                warn!("Skipping unreadable entry in {}: {}", dir.display(), e);
                continue;
            }
        };

        let path = entry.path();

        // Only regular files, symlinks to files included
        let is_file = entry.file_type().is_file()
            || (entry.path_is_symlink() && path.is_file());
        if !is_file || is_hidden(path) || !is_video_file(path) {
            continue;
        }

        match entry.metadata() {
            Ok(metadata) => {
                // Metadata of the link itself for symlinks; follow it for the real size
                let size_bytes = if entry.path_is_symlink() {
                    std::fs::metadata(path).map(|m| m.len()).unwrap_or(metadata.len())
                } else {
                    metadata.len()
                };
                candidates.push(ScanCandidate {
                    path: path.to_path_buf(),
                    size_bytes,
                });
            }
            Err(e) => warn!("Skipping {}: {}", path.display(), e),
        }
    }

    candidates.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(candidates)
}
