//! Reporting module
//!
//! Run summary counters, the append-only CSV conversion log, the per-file
//! progress bar and the console lines printed as files finish.

use crate::job::{ConversionResult, Outcome};
use chrono::{Local, SecondsFormat};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::borrow::Cow;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};

/// Header row of the conversion log
pub const LOG_HEADER: &str = "timestamp,filename,output,encoder,outcome,duration_secs,detail";

/// Aggregate counters for one run
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub total: usize,
    pub success: usize,
    pub failure: usize,
    pub skipped: usize,
    /// Path of the CSV log the run appended to
    pub log_path: PathBuf,
    /// The run was stopped by Ctrl-C
    pub interrupted: bool,
    /// Files discovered but never started because of the interrupt
    pub not_processed: usize,
}

impl RunSummary {
    pub fn new(log_path: PathBuf) -> Self {
        Self {
            total: 0,
            success: 0,
            failure: 0,
            skipped: 0,
            log_path,
            interrupted: false,
            not_processed: 0,
        }
    }

    /// Count one result
    pub fn register(&mut self, result: &ConversionResult) {
        self.total += 1;
        match result.outcome() {
            Outcome::Success => self.success += 1,
            Outcome::Failure => self.failure += 1,
            Outcome::Skipped => self.skipped += 1,
        }
    }

    /// Record that the run stopped early with `remaining` files untouched
    pub fn mark_interrupted(&mut self, remaining: usize) {
        self.interrupted = true;
        self.not_processed = remaining;
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Conversion Summary ===")?;
        writeln!(f, "Total   : {}", self.total)?;
        writeln!(f, "Success : {}", self.success)?;
        writeln!(f, "Failed  : {}", self.failure)?;
        writeln!(f, "Skipped : {}", self.skipped)?;
        if self.interrupted {
            writeln!(f, "Interrupted: {} file(s) not processed", self.not_processed)?;
        }
        write!(f, "Log file: {}", self.log_path.display())
    }
}

/// Quote a CSV field when it contains a delimiter, quote or line break
pub fn csv_field(value: &str) -> Cow<'_, str> {
    if value.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", value.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(value)
    }
}

/// Format one log row (without the trailing newline)
pub fn format_log_row(timestamp: &str, result: &ConversionResult) -> String {
    let filename = result.job.source.to_string_lossy();
    let output = result.job.destination.to_string_lossy();
    let encoder = result.job.mode.codec_name();
    let duration = format!("{:.2}", result.elapsed.as_secs_f64());
    let detail = result.detail.as_deref().unwrap_or("");

    let fields: [&str; 7] = [
        timestamp,
        &filename,
        &output,
        encoder,
        result.outcome().as_str(),
        &duration,
        detail,
    ];
    fields
        .iter()
        .map(|field| csv_field(field))
        .collect::<Vec<_>>()
        .join(",")
}

/// Append-only CSV log shared across runs
#[derive(Debug)]
pub struct ConversionLog {
    path: PathBuf,
    file: File,
}

impl ConversionLog {
    /// Open (or create) the log, writing the header if the file is empty
    pub fn open(path: &Path) -> io::Result<Self> {
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        if file.metadata()?.len() == 0 {
            writeln!(file, "{}", LOG_HEADER)?;
            file.flush()?;
        }
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one row for `result`, timestamped now
    pub fn append(&mut self, result: &ConversionResult) -> io::Result<()> {
        let timestamp = Local::now().to_rfc3339_opts(SecondsFormat::Secs, false);
        writeln!(self.file, "{}", format_log_row(&timestamp, result))?;
        self.file.flush()
    }
}

/// Console line for one finished file, e.g. `[2/5] clip.mp4: success (12.4s)`
pub fn format_progress_line(
    index: usize,
    total: usize,
    result: &ConversionResult,
    note: Option<&str>,
) -> String {
    let mut line = format!(
        "[{}/{}] {}: {}",
        index,
        total,
        result.job.file_name(),
        result.outcome()
    );
    if !result.elapsed.is_zero() {
        line.push_str(&format!(" ({:.1}s)", result.elapsed.as_secs_f64()));
    }
    if let Some(note) = note {
        line.push_str(&format!(", {}", note));
    }
    if let Some(detail) = &result.detail {
        line.push_str(&format!(" - {}", detail));
    }
    line
}

/// Progress bar for one encode, prefixed `[i/N] <file>`
///
/// With a known source duration the bar length is that duration in
/// milliseconds and ffmpeg's reported position fills it; otherwise a spinner
/// shows the elapsed time. Drawn on stderr only when it is a terminal.
pub fn encode_progress_bar(
    index: usize,
    total: usize,
    file_name: &str,
    duration_secs: Option<f64>,
) -> ProgressBar {
    let target = if io::stderr().is_terminal() {
        ProgressDrawTarget::stderr()
    } else {
        ProgressDrawTarget::hidden()
    };

    let length = duration_secs
        .filter(|secs| secs.is_finite() && *secs > 0.0)
        .map(|secs| (secs * 1000.0).round() as u64);

    let bar = ProgressBar::with_draw_target(length, target);
    match length {
        Some(_) => {
            bar.set_style(
                ProgressStyle::with_template(
                    "{prefix} [{bar:30.cyan/blue}] {percent:>3}% {msg} ETA {eta}",
                )
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
            );
        }
        None => {
            bar.set_style(
                ProgressStyle::with_template("{spinner:.green} {prefix} {msg} [{elapsed_precise}]")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            bar.enable_steady_tick(std::time::Duration::from_millis(120));
        }
    }
    bar.set_prefix(format!("[{}/{}] {}", index, total, file_name));
    bar
}
