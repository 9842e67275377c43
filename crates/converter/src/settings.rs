//! Run settings
//!
//! The explicit, validated-once configuration of a single conversion run.

use av1_convert_config::MAX_QUALITY;
use std::path::PathBuf;
use thiserror::Error;

/// Error type for invalid run settings
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("quality must be 0-{max}, got {value}")]
    QualityOutOfRange { value: u8, max: u8 },

    #[error("input directory path is empty")]
    EmptyInputDir,

    #[error("output directory path is empty")]
    EmptyOutputDir,
}

/// Settings for one run of the converter
#[derive(Debug, Clone, PartialEq)]
pub struct ConverterSettings {
    /// Directory scanned (non-recursively) for source videos
    pub input_dir: PathBuf,
    /// Directory receiving the `.mkv` outputs and the CSV log
    pub output_dir: PathBuf,
    /// Quality value 0-51, lower is better
    pub quality: u8,
    /// Skip sources whose output already exists; rename when false
    pub skip_existing: bool,
    /// Remove each source after it converted successfully
    pub delete_original: bool,
    /// Permit libaom-av1 when NVENC is unavailable
    pub allow_software: bool,
}

impl ConverterSettings {
    /// Settings with the default flags: skip existing outputs, keep originals,
    /// hardware encoder only.
    pub fn new(input_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>, quality: u8) -> Self {
        Self {
            input_dir: input_dir.into(),
            output_dir: output_dir.into(),
            quality,
            skip_existing: true,
            delete_original: false,
            allow_software: false,
        }
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.quality > MAX_QUALITY {
            return Err(SettingsError::QualityOutOfRange {
                value: self.quality,
                max: MAX_QUALITY,
            });
        }
        if self.input_dir.as_os_str().is_empty() {
            return Err(SettingsError::EmptyInputDir);
        }
        if self.output_dir.as_os_str().is_empty() {
            return Err(SettingsError::EmptyOutputDir);
        }
        Ok(())
    }
}
