//! Conversion run: startup sequence and the sequential per-file loop.

use crate::encode::{encode, interrupt_requested, EncodeError};
use crate::job::{ConversionJob, ConversionResult, EncoderMode, JobState};
use crate::naming::{desired_output_path, NameResolver, Resolution};
use crate::probe::probe_source;
use crate::report::{encode_progress_bar, format_progress_line, ConversionLog, RunSummary};
use crate::scan::{scan_input_dir, ScanCandidate};
use crate::settings::{ConverterSettings, SettingsError};
use crate::space_gate::{available_space, check_capacity, SpaceCheck};
use crate::startup::{prepare_directories, run_startup_checks, StartupError};
use av1_convert_config::Config;
use human_repr::HumanCount;
use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Fatal errors: the run does not start (or cannot enumerate its input)
#[derive(Debug, Error)]
pub enum RunError {
    /// Settings failed validation
    #[error("Invalid settings: {0}")]
    Settings(#[from] SettingsError),

    /// Startup check failed
    #[error("Startup check failed: {0}")]
    Startup(#[from] StartupError),

    /// The CSV log could not be opened for appending
    #[error("Cannot open conversion log {}: {source}", .path.display())]
    LogOpen {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The input directory could not be listed
    #[error("Cannot read input directory {}: {source}", .path.display())]
    Scan {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Per-file errors: recorded as a failure, the run continues
#[derive(Debug, Error)]
pub enum JobError {
    /// Encoding failed
    #[error("Encode failed: {0}")]
    Encode(#[from] EncodeError),

    /// Not enough free space at the destination
    #[error(
        "Insufficient disk space: need {} free, {} available",
        .required.human_count_bytes(),
        .available.human_count_bytes()
    )]
    InsufficientSpace { required: u64, available: u64 },

    /// Free space could not be determined
    #[error("Free space query failed for {}: {source}", .path.display())]
    SpaceQuery {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// A prepared conversion run
///
/// Construction runs every fatal check; `run` then processes the input
/// directory one file at a time.
#[derive(Debug)]
pub struct Converter {
    settings: ConverterSettings,
    config: Config,
    mode: EncoderMode,
    log: ConversionLog,
}

impl Converter {
    /// Validate settings and environment before any file is touched
    ///
    /// Steps, in order:
    /// 1. Validate the settings
    /// 2. Check ffmpeg and ffprobe, probe the hardware encoder once
    /// 3. Validate the input directory, create the output directory
    /// 4. Open the CSV log in the output directory
    pub fn prepare(settings: ConverterSettings, config: Config) -> Result<Self, RunError> {
        settings.validate()?;

        let mode = run_startup_checks(
            &config.tools.ffmpeg,
            &config.tools.ffprobe,
            settings.allow_software,
        )?;
        info!("Using {} encoder ({})", mode, mode.codec_name());

        prepare_directories(&settings.input_dir, &settings.output_dir)?;

        let log_path = settings.output_dir.join(&config.log.file_name);
        let log = ConversionLog::open(&log_path).map_err(|source| RunError::LogOpen {
            path: log_path.clone(),
            source,
        })?;
        debug!("Appending results to {}", log_path.display());

        Ok(Self {
            settings,
            config,
            mode,
            log,
        })
    }

    /// Encoder selected at startup
    pub fn mode(&self) -> EncoderMode {
        self.mode
    }

    /// Process every video file in the input directory
    ///
    /// Each processed file yields one result, which is printed, appended to the
    /// log and counted. When `interrupt` flips to `true` the running ffprobe or
    /// ffmpeg is killed, that file is recorded as interrupted, and the loop stops.
    pub async fn run(mut self, mut interrupt: watch::Receiver<bool>) -> Result<RunSummary, RunError> {
        let candidates = scan_input_dir(&self.settings.input_dir).map_err(|source| RunError::Scan {
            path: self.settings.input_dir.clone(),
            source,
        })?;
        let total = candidates.len();
        info!(
            "Found {} video file(s) in {}",
            total,
            self.settings.input_dir.display()
        );

        let mut resolver = NameResolver::new(self.settings.skip_existing);
        let mut summary = RunSummary::new(self.log.path().to_path_buf());

        for (index, candidate) in candidates.iter().enumerate() {
            if *interrupt.borrow() {
                summary.mark_interrupted(total - index);
                break;
            }

            let (result, note) = self
                .process(candidate, (index + 1, total), &mut resolver, &mut interrupt)
                .await;

            println!(
                "{}",
                format_progress_line(index + 1, total, &result, note.as_deref())
            );
            if let Err(e) = self.log.append(&result) {
                error!(
                    "Failed to write log entry for {} to {}: {}",
                    result.job.file_name(),
                    self.log.path().display(),
                    e
                );
            }
            summary.register(&result);

            if result.state == JobState::Interrupted {
                summary.mark_interrupted(total - index - 1);
                break;
            }
        }

        // Ctrl-C during the last file, after ffmpeg had already finished
        if *interrupt.borrow() && !summary.interrupted {
            summary.mark_interrupted(0);
        }

        if summary.interrupted {
            warn!(
                "Run interrupted, {} file(s) not processed",
                summary.not_processed
            );
        }
        Ok(summary)
    }

    /// Take one discovered file to a terminal state
    ///
    /// `position` is the 1-based `(index, total)` shown on the progress bar.
    /// Returns the result and an optional note for the console line.
    async fn process(
        &self,
        candidate: &ScanCandidate,
        position: (usize, usize),
        resolver: &mut NameResolver,
        interrupt: &mut watch::Receiver<bool>,
    ) -> (ConversionResult, Option<String>) {
        let desired = desired_output_path(&self.settings.output_dir, &candidate.path);

        let destination = match resolver.resolve(&desired) {
            Resolution::Skip { existing } => {
                let job = self.job_for(candidate, existing);
                return (ConversionResult::skipped(job, "output already exists"), None);
            }
            Resolution::Use(path) => path,
        };
        if destination != desired {
            info!(
                "{} is taken, writing {}",
                desired.display(),
                destination.display()
            );
        }
        let job = self.job_for(candidate, destination);

        if let Err(e) = self.check_space(candidate.size_bytes) {
            warn!("{}: {}", job.file_name(), e);
            let result =
                ConversionResult::failed(job, JobState::SpaceCheckFailed, Duration::ZERO, e.to_string());
            return (result, None);
        }

        let probed = tokio::select! {
            probed = probe_source(&self.config.tools.ffprobe, &job.source) => Some(probed),
            _ = interrupt_requested(interrupt) => None,
        };
        let Some(probed) = probed else {
            debug!("Interrupt received while reading {}", job.source.display());
            let result =
                ConversionResult::failed(job, JobState::Interrupted, Duration::ZERO, "interrupted");
            return (result, None);
        };
        let duration_secs = match probed {
            Ok(info) => {
                debug!(
                    "{}: container {}, duration {:?}s",
                    job.file_name(),
                    info.format_name.as_deref().unwrap_or("unknown"),
                    info.duration_secs
                );
                info.duration_secs
            }
            Err(e) => {
                debug!("ffprobe of {} failed: {}", job.source.display(), e);
                None
            }
        };

        let (index, total) = position;
        info!("[{}/{}] Converting {}", index, total, job.file_name());
        debug!("{}: {}", job.file_name(), JobState::Converting);
        let bar = encode_progress_bar(index, total, &job.file_name(), duration_secs);
        let started = Instant::now();
        let outcome = encode(
            &self.config.tools.ffmpeg,
            &job,
            &self.config.encode,
            interrupt,
            &bar,
        )
        .await;
        let elapsed = started.elapsed();
        bar.finish_and_clear();

        match outcome {
            Ok(output_bytes) => {
                let note = describe_output(candidate.size_bytes, output_bytes, duration_secs, elapsed);
                let mut result = ConversionResult::succeeded(job, elapsed);
                if self.settings.delete_original {
                    match fs::remove_file(&result.job.source) {
                        Ok(()) => debug!("Deleted original {}", result.job.source.display()),
                        Err(e) => {
                            warn!(
                                "Converted but failed to delete {}: {}",
                                result.job.source.display(),
                                e
                            );
                            result = result.with_detail(format!("original not deleted: {}", e));
                        }
                    }
                }
                (result, Some(note))
            }
            Err(EncodeError::Interrupted) => {
                let result =
                    ConversionResult::failed(job, JobState::Interrupted, elapsed, "interrupted");
                (result, None)
            }
            Err(e) => {
                let message = JobError::from(e).to_string();
                warn!("{}: {}", job.file_name(), message);
                let result = ConversionResult::failed(job, JobState::Failed, elapsed, message);
                (result, None)
            }
        }
    }

    fn job_for(&self, candidate: &ScanCandidate, destination: PathBuf) -> ConversionJob {
        ConversionJob::new(
            candidate.path.clone(),
            destination,
            self.mode,
            self.settings.quality,
        )
    }

    /// Disk-space guard for one source of `source_bytes`
    fn check_space(&self, source_bytes: u64) -> Result<(), JobError> {
        let dir = &self.settings.output_dir;
        let available = available_space(dir).map_err(|source| JobError::SpaceQuery {
            path: dir.clone(),
            source,
        })?;

        let Some(available) = available else {
            warn!("Free space unknown for {}, skipping check", dir.display());
            return Ok(());
        };

        match check_capacity(
            available,
            source_bytes,
            self.config.safety.disk_space_multiplier,
        ) {
            SpaceCheck::Sufficient => Ok(()),
            SpaceCheck::Insufficient {
                required,
                available,
            } => Err(JobError::InsufficientSpace {
                required,
                available,
            }),
        }
    }
}

/// Console note for a finished encode: output size, ratio and speed
fn describe_output(
    source_bytes: u64,
    output_bytes: u64,
    duration_secs: Option<f64>,
    elapsed: Duration,
) -> String {
    let mut note = output_bytes.human_count_bytes().to_string();
    if source_bytes > 0 {
        let percent = output_bytes as f64 / source_bytes as f64 * 100.0;
        note.push_str(&format!(" ({:.0}% of source)", percent));
    }
    if let Some(duration) = duration_secs {
        let secs = elapsed.as_secs_f64();
        if secs > 0.0 {
            note.push_str(&format!(", {:.2}x realtime", duration / secs));
        }
    }
    note
}
