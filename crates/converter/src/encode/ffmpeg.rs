//! ffmpeg encoder module
//!
//! Builds and executes the ffmpeg invocation that converts one source to AV1,
//! either with the NVENC hardware encoder or with libaom-av1.

use super::progress::track_progress;
use crate::job::{ConversionJob, EncoderMode};
use av1_convert_config::EncodeConfig;
use indicatif::ProgressBar;
use std::collections::VecDeque;
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{ChildStderr, Command};
use tokio::sync::watch;
use tracing::{debug, warn};

/// Number of trailing stderr lines kept for error reports
pub const STDERR_TAIL_LINES: usize = 20;

/// Error type for encoding operations
#[derive(Debug, Error)]
pub enum EncodeError {
    /// ffmpeg exited with non-zero status
    #[error("ffmpeg failed with exit code {code}{}", tail_suffix(.stderr_tail))]
    FfmpegFailed { code: i32, stderr_tail: String },

    /// ffmpeg was terminated by a signal
    #[error("ffmpeg was terminated by signal{}", tail_suffix(.stderr_tail))]
    FfmpegTerminated { stderr_tail: String },

    /// ffmpeg reported success but wrote no file
    #[error("ffmpeg exited successfully but produced no output at {0}")]
    MissingOutput(PathBuf),

    /// ffmpeg reported success but the file is empty
    #[error("ffmpeg produced an empty output file at {0}")]
    EmptyOutput(PathBuf),

    /// The destination appeared before ffmpeg was started
    #[error("output already exists: {0}")]
    OutputExists(PathBuf),

    /// The run was interrupted while ffmpeg was running
    #[error("interrupted")]
    Interrupted,

    /// IO error during encoding
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

fn tail_suffix(stderr_tail: &str) -> String {
    if stderr_tail.is_empty() {
        String::new()
    } else {
        format!(": {}", stderr_tail)
    }
}

/// Build the ffmpeg argument list for a job
///
/// Produces:
/// - Quiet, non-interactive flags; `-n` so an existing file is never overwritten
/// - Machine-readable progress on stdout (`-progress pipe:1`)
/// - Input path
/// - Video codec and rate control for the job's encoder mode
///   (`-cq <q> -b:v 0 -preset <p>` for NVENC, `-crf <q> -b:v 0 -cpu-used <n>` for libaom)
/// - Audio stream copy
/// - Output path
///
/// # Arguments
/// * `job` - The conversion job (paths, encoder mode, quality)
/// * `tuning` - Encoder tuning from the configuration file
pub fn build_ffmpeg_args(job: &ConversionJob, tuning: &EncodeConfig) -> Vec<OsString> {
    let mut args: Vec<OsString> = [
        "-hide_banner",
        "-nostdin",
        "-n",
        "-loglevel",
        "error",
        "-nostats",
        "-progress",
        "pipe:1",
    ]
    .iter()
    .map(OsString::from)
    .collect();

    args.push("-i".into());
    args.push(job.source.clone().into_os_string());

    args.push("-c:v".into());
    args.push(job.mode.codec_name().into());

    let quality = job.quality.to_string();
    match job.mode {
        EncoderMode::Hardware => {
            args.push("-cq".into());
            args.push(quality.into());
            args.push("-b:v".into());
            args.push("0".into());
            args.push("-preset".into());
            args.push(tuning.nvenc_preset.clone().into());
        }
        EncoderMode::Software => {
            args.push("-crf".into());
            args.push(quality.into());
            args.push("-b:v".into());
            args.push("0".into());
            args.push("-cpu-used".into());
            args.push(tuning.aom_cpu_used.to_string().into());
        }
    }

    args.push("-c:a".into());
    args.push("copy".into());

    args.push(job.destination.clone().into_os_string());
    args
}

/// Resolves once the interrupt flag is set; never if the sender is gone
pub async fn interrupt_requested(interrupt: &mut watch::Receiver<bool>) {
    if interrupt.wait_for(|requested| *requested).await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Read stderr to the end, keeping only the last `STDERR_TAIL_LINES` lines
async fn collect_stderr_tail(stderr: ChildStderr) -> String {
    let mut reader = BufReader::new(stderr);
    let mut tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf).trim_end().to_string();
                if line.is_empty() {
                    continue;
                }
                if tail.len() == STDERR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
        }
    }

    Vec::from(tail).join("\n")
}

/// Execute ffmpeg with the given arguments
///
/// Stdin is closed, stderr is captured and the progress written to stdout
/// advances `progress`. If the interrupt flag is raised while ffmpeg runs, the
/// child is killed and `EncodeError::Interrupted` is returned. A Ctrl-C from a
/// terminal also reaches ffmpeg itself, so the flag is checked again after
/// ffmpeg exits on its own.
///
/// # Returns
/// * `Ok(())` - ffmpeg exited with status 0
/// * `Err(EncodeError)` - ffmpeg failed, was killed, or could not be started
pub async fn run_ffmpeg(
    ffmpeg: &Path,
    args: &[OsString],
    interrupt: &mut watch::Receiver<bool>,
    progress: &ProgressBar,
) -> Result<(), EncodeError> {
    if *interrupt.borrow() {
        return Err(EncodeError::Interrupted);
    }

    let mut child = Command::new(ffmpeg)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    let stderr_task = child
        .stderr
        .take()
        .map(|stderr| tokio::spawn(collect_stderr_tail(stderr)));
    let progress_task = child
        .stdout
        .take()
        .map(|stdout| tokio::spawn(track_progress(stdout, progress.clone())));

    let status = tokio::select! {
        status = child.wait() => status?,
        _ = interrupt_requested(interrupt) => {
            debug!("Interrupt received, killing ffmpeg");
            child.kill().await?;
            if let Some(task) = stderr_task {
                let _ = task.await;
            }
            if let Some(task) = progress_task {
                let _ = task.await;
            }
            return Err(EncodeError::Interrupted);
        }
    };

    if let Some(task) = progress_task {
        let _ = task.await;
    }

    let stderr_tail = match stderr_task {
        Some(task) => task.await.unwrap_or_default(),
        None => String::new(),
    };

    if *interrupt.borrow() {
        debug!("ffmpeg exited with {} after an interrupt", status);
        return Err(EncodeError::Interrupted);
    }

    if status.success() {
        if !stderr_tail.is_empty() {
            debug!("ffmpeg stderr: {}", stderr_tail);
        }
        Ok(())
    } else {
        match status.code() {
            Some(code) => Err(EncodeError::FfmpegFailed { code, stderr_tail }),
            None => Err(EncodeError::FfmpegTerminated { stderr_tail }),
        }
    }
}

/// Check that the output exists and is non-empty
pub fn verify_output(path: &Path) -> Result<u64, EncodeError> {
    match fs::metadata(path) {
        Ok(metadata) if metadata.len() > 0 => Ok(metadata.len()),
        Ok(_) => Err(EncodeError::EmptyOutput(path.to_path_buf())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            Err(EncodeError::MissingOutput(path.to_path_buf()))
        }
        Err(e) => Err(EncodeError::Io(e)),
    }
}

/// Remove a partially written output, if any
pub fn remove_partial_output(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => debug!("Removed partial output {}", path.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove partial output {}: {}", path.display(), e),
    }
}

/// Run one conversion job to completion
///
/// Succeeds iff ffmpeg exits with status 0 and the destination exists and is
/// non-empty. On any failure the partially written destination is removed.
///
/// # Returns
/// Size of the output file in bytes
pub async fn encode(
    ffmpeg: &Path,
    job: &ConversionJob,
    tuning: &EncodeConfig,
    interrupt: &mut watch::Receiver<bool>,
    progress: &ProgressBar,
) -> Result<u64, EncodeError> {
    // Never touch a file that is not ours
    if job.destination.exists() {
        return Err(EncodeError::OutputExists(job.destination.clone()));
    }

    let args = build_ffmpeg_args(job, tuning);
    debug!("Running {} {:?}", ffmpeg.display(), args);

    let result = match run_ffmpeg(ffmpeg, &args, interrupt, progress).await {
        Ok(()) => verify_output(&job.destination),
        Err(e) => Err(e),
    };

    if result.is_err() {
        remove_partial_output(&job.destination);
    }
    result
}
