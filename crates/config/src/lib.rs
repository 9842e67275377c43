//! Configuration module for the AV1 batch converter
//!
//! Handles loading tuning knobs from an optional TOML file and environment variable overrides.

pub mod config;

pub use config::*;
