//! Encoding modules for the AV1 converter

pub mod ffmpeg;
pub mod progress;

pub use ffmpeg::{
    build_ffmpeg_args, encode, interrupt_requested, run_ffmpeg, verify_output, EncodeError,
};
pub use progress::{parse_progress_line, ProgressEvent};
