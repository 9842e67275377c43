//! ffmpeg progress tracking
//!
//! ffmpeg is run with `-progress pipe:1`, which writes `key=value` blocks to
//! stdout, each closed by a `progress=continue` (or `progress=end`) line.
//! The encoded position drives the per-file progress bar.

use indicatif::ProgressBar;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::ChildStdout;

/// One meaningful line of `-progress` output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    /// Position reached in the output timeline
    OutTime(Duration),
    /// End of a progress block
    Continue,
    /// Final block; ffmpeg is about to exit
    End,
}

/// Parse a single `key=value` line
///
/// `out_time_us` and `out_time_ms` both carry microseconds. Unknown keys,
/// `N/A` and negative times (seen before the first packet) yield `None`.
pub fn parse_progress_line(line: &str) -> Option<ProgressEvent> {
    let (key, value) = line.trim().split_once('=')?;
    let value = value.trim();
    match key.trim() {
        "out_time_us" | "out_time_ms" => value
            .parse::<i64>()
            .ok()
            .filter(|us| *us >= 0)
            .map(|us| ProgressEvent::OutTime(Duration::from_micros(us as u64))),
        "progress" if value == "end" => Some(ProgressEvent::End),
        "progress" => Some(ProgressEvent::Continue),
        _ => None,
    }
}

/// `HH:MM:SS` for the bar message
pub fn format_position(position: Duration) -> String {
    let secs = position.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}

/// Follow ffmpeg's progress output until stdout closes
///
/// The bar position is in milliseconds of output, clamped to the bar length
/// when one is set.
pub async fn track_progress(stdout: ChildStdout, bar: ProgressBar) {
    let mut reader = BufReader::new(stdout);
    let mut buf = Vec::new();
    let mut position = Duration::ZERO;

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }

        let line = String::from_utf8_lossy(&buf);
        match parse_progress_line(&line) {
            Some(ProgressEvent::OutTime(out_time)) => position = out_time,
            Some(ProgressEvent::Continue) | Some(ProgressEvent::End) => {
                let millis = position.as_millis() as u64;
                let millis = match bar.length() {
                    Some(len) if len > 0 => millis.min(len),
                    _ => millis,
                };
                bar.set_position(millis);
                bar.set_message(format!("{} encoded", format_position(position)));
            }
            None => {}
        }
    }
}
