//! Core configuration structures and loading logic

use serde::{Deserialize, Serialize};
use std::env;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

/// Highest accepted quality value (shared scale of `-cq` and `-crf`)
pub const MAX_QUALITY: u8 = 51;

/// Quality used when neither the CLI nor the config file sets one
pub const DEFAULT_QUALITY: u8 = 28;

/// Error type for configuration operations
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file
    Io(std::io::Error),
    /// TOML parsing error
    Parse(toml::de::Error),
    /// A value parsed but is outside its accepted range
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "Failed to read config file: {}", e),
            ConfigError::Parse(e) => write!(f, "Failed to parse config: {}", e),
            ConfigError::Invalid(msg) => write!(f, "Invalid config value: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

/// Locations of the external binaries
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolsConfig {
    /// ffmpeg executable (looked up in PATH when not absolute)
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: PathBuf,
    /// ffprobe executable (looked up in PATH when not absolute)
    #[serde(default = "default_ffprobe")]
    pub ffprobe: PathBuf,
}

fn default_ffmpeg() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_ffprobe() -> PathBuf {
    PathBuf::from("ffprobe")
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ffmpeg: default_ffmpeg(),
            ffprobe: default_ffprobe(),
        }
    }
}

/// Encoder tuning
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EncodeConfig {
    /// Quality value 0-51, lower is better (default 28)
    #[serde(default = "default_quality")]
    pub quality: u8,
    /// NVENC preset, p1 (fastest) to p7 (slowest)
    #[serde(default = "default_nvenc_preset")]
    pub nvenc_preset: String,
    /// libaom `-cpu-used` speed level, 0 (slowest) to 8
    #[serde(default = "default_aom_cpu_used")]
    pub aom_cpu_used: u8,
}

fn default_quality() -> u8 {
    DEFAULT_QUALITY
}

fn default_nvenc_preset() -> String {
    "p5".to_string()
}

fn default_aom_cpu_used() -> u8 {
    4
}

impl Default for EncodeConfig {
    fn default() -> Self {
        Self {
            quality: default_quality(),
            nvenc_preset: default_nvenc_preset(),
            aom_cpu_used: default_aom_cpu_used(),
        }
    }
}

/// Disk-space safety settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SafetyConfig {
    /// Free space required at the destination, as a multiple of the source size
    #[serde(default = "default_disk_space_multiplier")]
    pub disk_space_multiplier: f64,
}

fn default_disk_space_multiplier() -> f64 {
    1.5
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            disk_space_multiplier: default_disk_space_multiplier(),
        }
    }
}

/// Conversion log settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogConfig {
    /// File name of the CSV log, created inside the output directory
    #[serde(default = "default_log_file_name")]
    pub file_name: String,
}

fn default_log_file_name() -> String {
    "convert_log.csv".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            file_name: default_log_file_name(),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub encode: EncodeConfig,
    #[serde(default)]
    pub safety: SafetyConfig,
    #[serde(default)]
    pub log: LogConfig,
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Parses the file and handles missing optional fields with defaults.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::parse_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration
    ///
    /// Overrides the following values if environment variables are set:
    /// - AV1_CONVERT_FFMPEG -> tools.ffmpeg
    /// - AV1_CONVERT_FFPROBE -> tools.ffprobe
    /// - AV1_CONVERT_QUALITY -> encode.quality
    /// - AV1_CONVERT_DISK_SPACE_MULTIPLIER -> safety.disk_space_multiplier
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("AV1_CONVERT_FFMPEG") {
            if !val.is_empty() {
                self.tools.ffmpeg = PathBuf::from(val);
            }
        }

        if let Ok(val) = env::var("AV1_CONVERT_FFPROBE") {
            if !val.is_empty() {
                self.tools.ffprobe = PathBuf::from(val);
            }
        }

        if let Ok(val) = env::var("AV1_CONVERT_QUALITY") {
            if let Ok(quality) = val.parse::<u8>() {
                self.encode.quality = quality;
            }
        }

        if let Ok(val) = env::var("AV1_CONVERT_DISK_SPACE_MULTIPLIER") {
            if let Ok(multiplier) = val.parse::<f64>() {
                self.safety.disk_space_multiplier = multiplier;
            }
        }
    }

    /// Load configuration from file and apply environment overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Built-in defaults with environment overrides, for runs without a config file
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Check every value against its accepted range
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.encode.quality > MAX_QUALITY {
            return Err(ConfigError::Invalid(format!(
                "encode.quality must be 0-{}, got {}",
                MAX_QUALITY, self.encode.quality
            )));
        }

        if !is_valid_nvenc_preset(&self.encode.nvenc_preset) {
            return Err(ConfigError::Invalid(format!(
                "encode.nvenc_preset must be p1-p7, got '{}'",
                self.encode.nvenc_preset
            )));
        }

        if self.encode.aom_cpu_used > 8 {
            return Err(ConfigError::Invalid(format!(
                "encode.aom_cpu_used must be 0-8, got {}",
                self.encode.aom_cpu_used
            )));
        }

        let multiplier = self.safety.disk_space_multiplier;
        if !multiplier.is_finite() || multiplier < 1.0 {
            return Err(ConfigError::Invalid(format!(
                "safety.disk_space_multiplier must be a finite number >= 1.0, got {}",
                multiplier
            )));
        }

        let name = &self.log.file_name;
        let plain = Path::new(name).file_name() == Some(OsStr::new(name.as_str()));
        if !plain || name.contains('\\') {
            return Err(ConfigError::Invalid(format!(
                "log.file_name must be a plain file name, got '{}'",
                name
            )));
        }

        Ok(())
    }
}

fn is_valid_nvenc_preset(preset: &str) -> bool {
    matches!(preset, "p1" | "p2" | "p3" | "p4" | "p5" | "p6" | "p7")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Mutex;

    // Mutex to ensure env var tests don't interfere with each other
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// Helper to clear all config-related env vars
    fn clear_env_vars() {
        env::remove_var("AV1_CONVERT_FFMPEG");
        env::remove_var("AV1_CONVERT_FFPROBE");
        env::remove_var("AV1_CONVERT_QUALITY");
        env::remove_var("AV1_CONVERT_DISK_SPACE_MULTIPLIER");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_config_parses_all_sections(
            quality in 0u8..=51,
            preset in 1u8..=7,
            cpu_used in 0u8..=8,
            multiplier in 1.0f64..10.0,
            log_name in "[a-z_]{1,12}\\.csv",
        ) {
            let toml_str = format!(
                r#"
[tools]
ffmpeg = "/opt/ffmpeg/bin/ffmpeg"
ffprobe = "/opt/ffmpeg/bin/ffprobe"

[encode]
quality = {}
nvenc_preset = "p{}"
aom_cpu_used = {}

[safety]
disk_space_multiplier = {:?}

[log]
file_name = "{}"
"#,
                quality, preset, cpu_used, multiplier, log_name
            );

            let config = Config::parse_toml(&toml_str).expect("Valid TOML should parse");

            prop_assert_eq!(&config.tools.ffmpeg, &PathBuf::from("/opt/ffmpeg/bin/ffmpeg"));
            prop_assert_eq!(&config.tools.ffprobe, &PathBuf::from("/opt/ffmpeg/bin/ffprobe"));
            prop_assert_eq!(config.encode.quality, quality);
            prop_assert_eq!(&config.encode.nvenc_preset, &format!("p{}", preset));
            prop_assert_eq!(config.encode.aom_cpu_used, cpu_used);
            prop_assert!((config.safety.disk_space_multiplier - multiplier).abs() < 1e-9);
            prop_assert_eq!(&config.log.file_name, &log_name);
            prop_assert!(config.validate().is_ok());
        }

        #[test]
        fn prop_quality_above_range_rejected(quality in 52u8..=255) {
            let toml_str = format!("[encode]\nquality = {}\n", quality);
            let config = Config::parse_toml(&toml_str).expect("Valid TOML");
            prop_assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
        }

        #[test]
        fn prop_env_overrides_quality(
            initial in 0u8..=51,
            override_quality in 0u8..=51,
        ) {
            let _guard = ENV_MUTEX.lock().unwrap();
            clear_env_vars();

            let toml_str = format!("[encode]\nquality = {}\n", initial);
            let mut config = Config::parse_toml(&toml_str).expect("Valid TOML");

            env::set_var("AV1_CONVERT_QUALITY", override_quality.to_string());
            config.apply_env_overrides();
            clear_env_vars();

            prop_assert_eq!(config.encode.quality, override_quality);
        }

        #[test]
        fn prop_env_overrides_disk_space_multiplier(
            initial in 1.0f64..4.0,
            override_multiplier in 1.0f64..8.0,
        ) {
            let _guard = ENV_MUTEX.lock().unwrap();
            clear_env_vars();

            let toml_str = format!("[safety]\ndisk_space_multiplier = {:?}\n", initial);
            let mut config = Config::parse_toml(&toml_str).expect("Valid TOML");

            env::set_var("AV1_CONVERT_DISK_SPACE_MULTIPLIER", override_multiplier.to_string());
            config.apply_env_overrides();
            clear_env_vars();

            prop_assert!((config.safety.disk_space_multiplier - override_multiplier).abs() < 1e-9);
        }
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::parse_toml("").expect("Empty TOML should parse");

        assert_eq!(config.tools.ffmpeg, PathBuf::from("ffmpeg"));
        assert_eq!(config.tools.ffprobe, PathBuf::from("ffprobe"));
        assert_eq!(config.encode.quality, 28);
        assert_eq!(config.encode.nvenc_preset, "p5");
        assert_eq!(config.encode.aom_cpu_used, 4);
        assert!((config.safety.disk_space_multiplier - 1.5).abs() < 1e-9);
        assert_eq!(config.log.file_name, "convert_log.csv");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_config_uses_defaults_for_missing() {
        let toml_str = r#"
[encode]
quality = 35
"#;
        let config = Config::parse_toml(toml_str).expect("Partial TOML should parse");

        assert_eq!(config.encode.quality, 35);
        assert_eq!(config.encode.nvenc_preset, "p5"); // default
        assert_eq!(config.tools, ToolsConfig::default());
        assert_eq!(config.safety, SafetyConfig::default());
    }

    #[test]
    fn test_env_overrides_tool_paths() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env_vars();

        let mut config = Config::default();
        env::set_var("AV1_CONVERT_FFMPEG", "/usr/local/bin/ffmpeg");
        env::set_var("AV1_CONVERT_FFPROBE", "/usr/local/bin/ffprobe");
        config.apply_env_overrides();
        clear_env_vars();

        assert_eq!(config.tools.ffmpeg, PathBuf::from("/usr/local/bin/ffmpeg"));
        assert_eq!(config.tools.ffprobe, PathBuf::from("/usr/local/bin/ffprobe"));
    }

    #[test]
    fn test_unparseable_env_value_is_ignored() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env_vars();

        let mut config = Config::default();
        env::set_var("AV1_CONVERT_QUALITY", "best");
        config.apply_env_overrides();
        clear_env_vars();

        assert_eq!(config.encode.quality, DEFAULT_QUALITY);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.encode.nvenc_preset = "slow".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.encode.aom_cpu_used = 9;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.safety.disk_space_multiplier = 0.5;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.safety.disk_space_multiplier = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.log.file_name = "logs/convert.csv".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_dot_log_names() {
        for name in ["", ".", "..", "./", "convert.csv/"] {
            let mut config = Config::default();
            config.log.file_name = name.to_string();
            assert!(
                matches!(config.validate(), Err(ConfigError::Invalid(_))),
                "accepted log name '{}'",
                name
            );
        }

        let mut config = Config::default();
        config.log.file_name = ".convert_log.csv".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_malformed_toml_is_parse_error() {
        let result = Config::parse_toml("[encode\nquality = ");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }
}
