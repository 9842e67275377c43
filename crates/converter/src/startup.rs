//! Startup checks for the converter
//!
//! Provides preflight checks run once before any file is processed:
//! - ffmpeg and ffprobe availability
//! - Hardware AV1 encoder (NVENC) detection and encoder selection
//! - Input and output directory validation

use crate::job::EncoderMode;
use std::fs;
use std::path::Path;
use std::process::Command;
use thiserror::Error;
use tracing::{debug, info};

/// Encoder name ffmpeg lists when NVENC AV1 support is compiled in
pub const NVENC_AV1_ENCODER: &str = "av1_nvenc";

/// Error types for startup checks
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("{tool} not available: {reason}")]
    ToolUnavailable { tool: String, reason: String },

    #[error("Encoder query failed: {0}")]
    EncoderQuery(String),

    #[error("Hardware AV1 encoder (av1_nvenc) is not available and software fallback is not allowed (pass --allow-software)")]
    HardwareEncoderUnavailable,

    #[error("Invalid input directory: {0}")]
    InvalidInputDir(String),

    #[error("Invalid output directory: {0}")]
    InvalidOutputDir(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Check that a tool runs by executing `<binary> -version`
///
/// Returns the first line of the version output.
pub fn check_tool_available(binary: &Path) -> Result<String, StartupError> {
    let tool = binary.display().to_string();
    let output = Command::new(binary)
        .arg("-version")
        .output()
        .map_err(|e| StartupError::ToolUnavailable {
            tool: tool.clone(),
            reason: format!("{} -version failed; is it installed and in PATH? Error: {}", tool, e),
        })?;

    if !output.status.success() {
        return Err(StartupError::ToolUnavailable {
            tool: tool.clone(),
            reason: format!("{} -version exited with {}", tool, output.status),
        });
    }

    let version_output = String::from_utf8_lossy(&output.stdout);
    Ok(version_output.lines().next().unwrap_or("").trim().to_string())
}

/// Parse FFmpeg version string and extract major version number
///
/// Handles various FFmpeg version formats:
/// - Standard: "ffmpeg version 7.1 ..."
/// - N-prefixed: "ffmpeg version n7.1-... ..."
pub fn parse_ffmpeg_version(version_output: &str) -> Option<u32> {
    let version_line = version_output
        .lines()
        .find(|line| line.to_lowercase().contains("ffmpeg version"))?;

    let version_part = version_line
        .to_lowercase()
        .split("ffmpeg version")
        .nth(1)?
        .trim()
        .split_whitespace()
        .next()?
        .to_string();

    let version_str = version_part.trim_start_matches('n');

    // Major version is everything before the first '.' or '-'
    let major_str = version_str.split(['.', '-']).next()?;

    major_str.parse().ok()
}

/// Check whether `ffmpeg -encoders` output lists the named encoder
///
/// Encoder rows look like ` V....D av1_nvenc   NVIDIA NVENC av1 encoder (codec av1)`:
/// a six-character capability column followed by the encoder name.
pub fn encoders_list_contains(encoders_output: &str, encoder: &str) -> bool {
    encoders_output.lines().any(|line| {
        let mut parts = line.split_whitespace();
        match (parts.next(), parts.next()) {
            (Some(flags), Some(name)) => flags.len() == 6 && name == encoder,
            _ => false,
        }
    })
}

/// Ask ffmpeg once whether the NVENC AV1 encoder is available
pub fn probe_hardware_av1(ffmpeg: &Path) -> Result<bool, StartupError> {
    let output = Command::new(ffmpeg)
        .args(["-hide_banner", "-encoders"])
        .output()
        .map_err(|e| StartupError::EncoderQuery(format!("failed to run ffmpeg -encoders: {}", e)))?;

    if !output.status.success() {
        return Err(StartupError::EncoderQuery(format!(
            "ffmpeg -encoders exited with {}",
            output.status
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(encoders_list_contains(&stdout, NVENC_AV1_ENCODER))
}

/// Pick the encoder from the probe result
///
/// A failed probe counts as "no hardware encoder": it is fatal unless software
/// encoding is allowed.
pub fn select_encoder(
    probe: Result<bool, StartupError>,
    allow_software: bool,
) -> Result<EncoderMode, StartupError> {
    match probe {
        Ok(true) => Ok(EncoderMode::Hardware),
        Ok(false) if allow_software => {
            info!("{} not available, using libaom-av1", NVENC_AV1_ENCODER);
            Ok(EncoderMode::Software)
        }
        Ok(false) => Err(StartupError::HardwareEncoderUnavailable),
        Err(e) if allow_software => {
            debug!("Encoder probe failed ({}), using libaom-av1", e);
            Ok(EncoderMode::Software)
        }
        Err(e) => Err(e),
    }
}

/// Validate the input directory and create the output directory if needed
pub fn prepare_directories(input_dir: &Path, output_dir: &Path) -> Result<(), StartupError> {
    if !input_dir.exists() {
        return Err(StartupError::InvalidInputDir(format!(
            "{} does not exist",
            input_dir.display()
        )));
    }
    if !input_dir.is_dir() {
        return Err(StartupError::InvalidInputDir(format!(
            "{} is not a directory",
            input_dir.display()
        )));
    }

    if output_dir.exists() && !output_dir.is_dir() {
        return Err(StartupError::InvalidOutputDir(format!(
            "{} is not a directory",
            output_dir.display()
        )));
    }

    fs::create_dir_all(output_dir).map_err(|e| {
        StartupError::InvalidOutputDir(format!("cannot create {}: {}", output_dir.display(), e))
    })?;

    Ok(())
}

/// Run all tool checks in order and choose the encoder
///
/// Checks are run in the following order:
/// 1. ffmpeg availability
/// 2. ffprobe availability
/// 3. Hardware encoder probe and selection
pub fn run_startup_checks(
    ffmpeg: &Path,
    ffprobe: &Path,
    allow_software: bool,
) -> Result<EncoderMode, StartupError> {
    let ffmpeg_version = check_tool_available(ffmpeg)?;
    match parse_ffmpeg_version(&ffmpeg_version) {
        Some(major) => info!("Found ffmpeg {} ({})", major, ffmpeg_version),
        None => info!("Found ffmpeg ({})", ffmpeg_version),
    }

    let ffprobe_version = check_tool_available(ffprobe)?;
    debug!("Found ffprobe ({})", ffprobe_version);

    select_encoder(probe_hardware_av1(ffmpeg), allow_software)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tempfile::TempDir;

    const ENCODERS_WITH_NVENC: &str = r#"Encoders:
 V..... = Video
 A..... = Audio
 S..... = Subtitle
 ------
 V....D libx264              libx264 H.264 / AVC / MPEG-4 AVC / MPEG-4 part 10 (codec h264)
 V....D libaom-av1           libaom AV1 (codec av1)
 V....D av1_nvenc            NVIDIA NVENC av1 encoder (codec av1)
 A....D aac                  AAC (Advanced Audio Coding)
"#;

    const ENCODERS_WITHOUT_NVENC: &str = r#"Encoders:
 V..... = Video
 ------
 V....D libaom-av1           libaom AV1 (codec av1)
 V....D libsvtav1            SVT-AV1(Scalable Video Technology for AV1) encoder (codec av1)
 V....D h264_nvenc           NVIDIA NVENC H.264 encoder (codec h264)
"#;

    #[test]
    fn test_encoders_list_detects_nvenc() {
        assert!(encoders_list_contains(ENCODERS_WITH_NVENC, NVENC_AV1_ENCODER));
        assert!(encoders_list_contains(ENCODERS_WITH_NVENC, "libaom-av1"));
    }

    #[test]
    fn test_encoders_list_without_nvenc() {
        // h264_nvenc must not count as AV1 hardware support
        assert!(!encoders_list_contains(ENCODERS_WITHOUT_NVENC, NVENC_AV1_ENCODER));
        assert!(!encoders_list_contains("", NVENC_AV1_ENCODER));
    }

    #[test]
    fn test_encoders_list_ignores_description_mentions() {
        let output = " V....D hevc_nvenc           wraps av1_nvenc for testing (codec hevc)\n";
        assert!(!encoders_list_contains(output, NVENC_AV1_ENCODER));
    }

    #[test]
    fn test_select_encoder_prefers_hardware() {
        assert_eq!(select_encoder(Ok(true), false).unwrap(), EncoderMode::Hardware);
        assert_eq!(select_encoder(Ok(true), true).unwrap(), EncoderMode::Hardware);
    }

    #[test]
    fn test_select_encoder_software_fallback() {
        assert_eq!(select_encoder(Ok(false), true).unwrap(), EncoderMode::Software);
        let failed = Err(StartupError::EncoderQuery("boom".to_string()));
        assert_eq!(select_encoder(failed, true).unwrap(), EncoderMode::Software);
    }

    #[test]
    fn test_select_encoder_fatal_without_fallback() {
        assert!(matches!(
            select_encoder(Ok(false), false),
            Err(StartupError::HardwareEncoderUnavailable)
        ));
        let failed = Err(StartupError::EncoderQuery("boom".to_string()));
        assert!(matches!(
            select_encoder(failed, false),
            Err(StartupError::EncoderQuery(_))
        ));
    }

    #[test]
    fn test_missing_tool_is_unavailable() {
        let result = check_tool_available(Path::new("/nonexistent/bin/ffmpeg-av1-convert-test"));
        assert!(matches!(result, Err(StartupError::ToolUnavailable { .. })));
    }

    #[test]
    fn test_probe_with_missing_ffmpeg_fails() {
        let result = probe_hardware_av1(Path::new("/nonexistent/bin/ffmpeg-av1-convert-test"));
        assert!(matches!(result, Err(StartupError::EncoderQuery(_))));
    }

    #[test]
    fn test_prepare_directories_creates_output() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("in");
        let output = temp_dir.path().join("out").join("nested");
        fs::create_dir(&input).unwrap();

        prepare_directories(&input, &output).unwrap();
        assert!(output.is_dir());
    }

    #[test]
    fn test_prepare_directories_rejects_bad_input() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("missing");
        let output = temp_dir.path().join("out");
        assert!(matches!(
            prepare_directories(&missing, &output),
            Err(StartupError::InvalidInputDir(_))
        ));

        let file = temp_dir.path().join("file.mp4");
        fs::write(&file, b"x").unwrap();
        assert!(matches!(
            prepare_directories(&file, &output),
            Err(StartupError::InvalidInputDir(_))
        ));
    }

    #[test]
    fn test_prepare_directories_rejects_file_as_output() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("in");
        fs::create_dir(&input).unwrap();
        let output = temp_dir.path().join("out.txt");
        fs::write(&output, b"x").unwrap();

        assert!(matches!(
            prepare_directories(&input, &output),
            Err(StartupError::InvalidOutputDir(_))
        ));
    }

    #[test]
    fn test_parse_ffmpeg_version_standard() {
        assert_eq!(parse_ffmpeg_version("ffmpeg version 7.1 Copyright (c) 2000-2024"), Some(7));
    }

    #[test]
    fn test_parse_ffmpeg_version_n_prefixed() {
        let output = "ffmpeg version n8.0-123-gabcdef Copyright (c) 2000-2025";
        assert_eq!(parse_ffmpeg_version(output), Some(8));
    }

    #[test]
    fn test_parse_ffmpeg_version_invalid() {
        assert_eq!(parse_ffmpeg_version("not ffmpeg output"), None);
        assert_eq!(parse_ffmpeg_version(""), None);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_ffmpeg_version_parsing(
            major in 1u32..20,
            minor in 0u32..10,
            prefixed in proptest::bool::ANY,
        ) {
            let version_output = format!(
                "ffmpeg version {}{}.{} Copyright (c) 2000-2025 the FFmpeg developers\nbuilt with gcc 13",
                if prefixed { "n" } else { "" },
                major,
                minor
            );
            prop_assert_eq!(parse_ffmpeg_version(&version_output), Some(major));
        }

        #[test]
        fn prop_encoder_detection_exact_name(
            name in "[a-z0-9_-]{3,16}",
        ) {
            let output = format!(" V....D {:<20} some encoder\n", name);
            prop_assert_eq!(
                encoders_list_contains(&output, NVENC_AV1_ENCODER),
                name == NVENC_AV1_ENCODER
            );
            prop_assert!(encoders_list_contains(&output, &name));
        }
    }
}
