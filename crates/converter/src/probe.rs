//! Source probe using ffprobe.
//!
//! Reads container metadata of a source before it is encoded. The result is
//! informational (it sizes the progress bar and gives the encode speed relative
//! to real time); a failing probe never fails a job.

use std::path::Path;
use thiserror::Error;
use tokio::process::Command;

/// Error type for probe operations.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// ffprobe exited with non-zero status.
    #[error("ffprobe failed: {0}")]
    FfprobeFailed(String),

    /// Failed to parse ffprobe JSON output.
    #[error("Failed to parse ffprobe output: {0}")]
    ParseError(String),

    /// IO error during probe.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Format information from ffprobe.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceInfo {
    /// Duration in seconds, if the container reports one.
    pub duration_secs: Option<f64>,
    /// Container format name (e.g. "mov,mp4,m4a,3gp,3g2,mj2").
    pub format_name: Option<String>,
}

/// Raw ffprobe JSON structures for parsing.
mod ffprobe_json {
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    pub struct FfprobeOutput {
        pub format: Option<Format>,
    }

    #[derive(Debug, Deserialize)]
    pub struct Format {
        pub duration: Option<String>,
        pub format_name: Option<String>,
    }
}

/// Probes a source file using ffprobe.
///
/// Runs `<ffprobe> -v quiet -print_format json -show_format <path>` and parses
/// the JSON output.
pub async fn probe_source(ffprobe: &Path, path: &Path) -> Result<SourceInfo, ProbeError> {
    let output = Command::new(ffprobe)
        .args(["-v", "quiet", "-print_format", "json", "-show_format"])
        .arg(path)
        .stdin(std::process::Stdio::null())
        .kill_on_drop(true)
        .output()
        .await?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ProbeError::FfprobeFailed(format!(
            "ffprobe exited with status {}: {}",
            output.status,
            stderr.trim()
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    parse_ffprobe_output(&stdout)
}

/// Parses ffprobe JSON output into a SourceInfo.
pub fn parse_ffprobe_output(json_str: &str) -> Result<SourceInfo, ProbeError> {
    let ffprobe: ffprobe_json::FfprobeOutput =
        serde_json::from_str(json_str).map_err(|e| ProbeError::ParseError(e.to_string()))?;

    let format = ffprobe.format.ok_or_else(|| {
        ProbeError::ParseError("Missing format information in ffprobe output".to_string())
    })?;

    let duration_secs = format
        .duration
        .as_ref()
        .and_then(|d| d.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d > 0.0);

    Ok(SourceInfo {
        duration_secs,
        format_name: format.format_name,
    })
}
