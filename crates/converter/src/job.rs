//! Job types for the conversion pipeline
//!
//! A `ConversionJob` describes one source file and where its AV1 output goes.
//! Running it produces exactly one `ConversionResult`.

use std::path::PathBuf;
use std::time::Duration;

/// Which AV1 encoder ffmpeg is asked to use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderMode {
    /// GPU encoder (`av1_nvenc`)
    Hardware,
    /// CPU encoder (`libaom-av1`)
    Software,
}

impl EncoderMode {
    /// ffmpeg codec name passed to `-c:v`
    pub fn codec_name(&self) -> &'static str {
        match self {
            EncoderMode::Hardware => "av1_nvenc",
            EncoderMode::Software => "libaom-av1",
        }
    }
}

impl std::fmt::Display for EncoderMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EncoderMode::Hardware => write!(f, "hardware"),
            EncoderMode::Software => write!(f, "software"),
        }
    }
}

/// A single source-to-AV1 conversion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionJob {
    /// Input video file
    pub source: PathBuf,
    /// Output file (the existing file for skipped jobs)
    pub destination: PathBuf,
    /// Encoder selected by the capability probe
    pub mode: EncoderMode,
    /// Quality value 0-51
    pub quality: u8,
}

impl ConversionJob {
    pub fn new(source: PathBuf, destination: PathBuf, mode: EncoderMode, quality: u8) -> Self {
        Self {
            source,
            destination,
            mode,
            quality,
        }
    }

    /// Source file name for display and logging
    pub fn file_name(&self) -> String {
        self.source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.source.to_string_lossy().into_owned())
    }
}

/// Per-file state machine
///
/// `Discovered -> {Skipped | SpaceCheckFailed | Converting -> {Succeeded | Failed | Interrupted}}`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Discovered,
    Skipped,
    SpaceCheckFailed,
    Converting,
    Succeeded,
    Failed,
    /// Stopped by Ctrl-C while ffmpeg was running
    Interrupted,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Discovered => "discovered",
            JobState::Skipped => "skipped",
            JobState::SpaceCheckFailed => "space_check_failed",
            JobState::Converting => "converting",
            JobState::Succeeded => "succeeded",
            JobState::Failed => "failed",
            JobState::Interrupted => "interrupted",
        }
    }

    /// Everything except `Discovered` and `Converting` is final
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobState::Discovered | JobState::Converting)
    }

    /// Outcome tag for terminal states; `None` while the job is still moving
    pub fn outcome(&self) -> Option<Outcome> {
        match self {
            JobState::Discovered | JobState::Converting => None,
            JobState::Succeeded => Some(Outcome::Success),
            JobState::Skipped => Some(Outcome::Skipped),
            JobState::SpaceCheckFailed | JobState::Failed | JobState::Interrupted => {
                Some(Outcome::Failure)
            }
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome tag written to the log and counted in the summary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
    Skipped,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Failure => "failure",
            Outcome::Skipped => "skipped",
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of running one job to a terminal state
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionResult {
    pub job: ConversionJob,
    /// Terminal state reached by the job
    pub state: JobState,
    /// Wall time spent on the job, zero for jobs that never spawned ffmpeg
    pub elapsed: Duration,
    /// Error message or note, if any
    pub detail: Option<String>,
}

impl ConversionResult {
    pub fn succeeded(job: ConversionJob, elapsed: Duration) -> Self {
        Self {
            job,
            state: JobState::Succeeded,
            elapsed,
            detail: None,
        }
    }

    pub fn skipped(job: ConversionJob, reason: impl Into<String>) -> Self {
        Self {
            job,
            state: JobState::Skipped,
            elapsed: Duration::ZERO,
            detail: Some(reason.into()),
        }
    }

    pub fn failed(
        job: ConversionJob,
        state: JobState,
        elapsed: Duration,
        detail: impl Into<String>,
    ) -> Self {
        debug_assert!(matches!(
            state,
            JobState::Failed | JobState::SpaceCheckFailed | JobState::Interrupted
        ));
        Self {
            job,
            state,
            elapsed,
            detail: Some(detail.into()),
        }
    }

    pub fn outcome(&self) -> Outcome {
        self.state.outcome().unwrap_or(Outcome::Failure)
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}
