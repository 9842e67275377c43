//! CLI entry point for the AV1 batch converter
//!
//! Parses command line arguments, sets up logging and Ctrl-C handling, and
//! runs one conversion pass over the input directory.

use av1_convert::{Config, Converter, ConverterSettings};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::sync::watch;
use tracing::{debug, error};

/// Exit status used when the run was stopped by Ctrl-C
const EXIT_INTERRUPTED: u8 = 130;

/// Convert every video in a directory to AV1 (NVENC, or libaom-av1 as fallback)
#[derive(Parser, Debug)]
#[command(name = "converter")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory containing the source videos (not searched recursively)
    input_dir: PathBuf,

    /// Directory for the .mkv outputs and convert_log.csv (created if missing)
    output_dir: PathBuf,

    /// Quality 0-51, lower is better [default: 28, or the config file value]
    #[arg(short, long)]
    quality: Option<u8>,

    /// Write to a numbered name (name_1.mkv, ...) instead of skipping existing outputs
    #[arg(long)]
    no_skip_existing: bool,

    /// Delete each source after it converted successfully
    #[arg(long)]
    delete_original: bool,

    /// Use libaom-av1 when the NVENC AV1 encoder is unavailable
    #[arg(long)]
    allow_software: bool,

    /// Path to an optional TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // RUST_LOG wins; otherwise info, or debug with --verbose
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if args.verbose {
            "av1_convert=debug,av1_convert_cli=debug".to_string()
        } else {
            "av1_convert=info,av1_convert_cli=info".to_string()
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    let config = match &args.config {
        Some(path) => Config::load(path),
        None => Config::from_env(),
    };
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            eprintln!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let settings = ConverterSettings {
        input_dir: args.input_dir,
        output_dir: args.output_dir,
        quality: args.quality.unwrap_or(config.encode.quality),
        skip_existing: !args.no_skip_existing,
        delete_original: args.delete_original,
        allow_software: args.allow_software,
    };
    debug!("Settings: {:?}", settings);

    println!("Input directory : {}", settings.input_dir.display());
    println!("Output directory: {}", settings.output_dir.display());
    println!("Quality         : {}", settings.quality);

    let converter = match Converter::prepare(settings, config) {
        Ok(converter) => converter,
        Err(e) => {
            eprintln!("Failed to start conversion: {}", e);
            return ExitCode::FAILURE;
        }
    };
    println!(
        "Encoder         : {} ({})",
        converter.mode().codec_name(),
        converter.mode()
    );

    let (interrupt_tx, interrupt_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl-C handler: {}", e);
            return;
        }
        eprintln!(
            "Interrupt received, stopping the current conversion (Ctrl-C again to quit now)..."
        );
        let _ = interrupt_tx.send(true);

        // A second Ctrl-C exits without waiting for cleanup
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Second interrupt, exiting");
            std::process::exit(i32::from(EXIT_INTERRUPTED));
        }
    });

    match converter.run(interrupt_rx).await {
        Ok(summary) => {
            println!();
            println!("{}", summary);
            if summary.interrupted {
                ExitCode::from(EXIT_INTERRUPTED)
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(e) => {
            eprintln!("Conversion failed: {}", e);
            ExitCode::FAILURE
        }
    }
}
