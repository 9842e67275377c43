//! AV1 batch converter
//!
//! Sequential pipeline that converts the videos of a directory to AV1 with
//! ffmpeg, preferring the NVENC hardware encoder.

pub mod converter;
pub mod encode;
pub mod job;
pub mod naming;
pub mod probe;
pub mod report;
pub mod scan;
pub mod settings;
pub mod space_gate;
pub mod startup;

pub use av1_convert_config as config;
pub use av1_convert_config::Config;
pub use converter::{Converter, JobError, RunError};
pub use encode::{build_ffmpeg_args, encode, run_ffmpeg, EncodeError};
pub use job::{ConversionJob, ConversionResult, EncoderMode, JobState, Outcome};
pub use naming::{desired_output_path, unique_path, NameResolver, Resolution};
pub use probe::{probe_source, ProbeError, SourceInfo};
pub use report::{ConversionLog, RunSummary};
pub use scan::{scan_input_dir, ScanCandidate};
pub use settings::{ConverterSettings, SettingsError};
pub use space_gate::{available_space, check_capacity, SpaceCheck};
pub use startup::{
    check_tool_available, parse_ffmpeg_version, probe_hardware_av1, run_startup_checks,
    select_encoder, StartupError,
};
