//! Disk Space Gate Module
//!
//! Pre-encode check that the output filesystem has room for the result.

use std::io;
use std::path::Path;

/// Result of the disk space check
#[derive(Debug, Clone, PartialEq)]
pub enum SpaceCheck {
    /// Enough free space for the conversion
    Sufficient,
    /// Free space is below the required amount
    Insufficient { required: u64, available: u64 },
}

/// Bytes that must be free before converting a source of `source_bytes`
pub fn required_bytes(source_bytes: u64, multiplier: f64) -> u64 {
    // f64 -> u64 casts saturate
    (source_bytes as f64 * multiplier).ceil() as u64
}

/// Check whether `available` bytes are enough for a source of `source_bytes`.
///
/// Returns `Sufficient` iff `available >= ceil(source_bytes * multiplier)`.
///
/// # Arguments
/// * `available` - Free bytes on the output filesystem
/// * `source_bytes` - Size of the source file in bytes
/// * `multiplier` - Safety factor applied to the source size (>= 1.0)
pub fn check_capacity(available: u64, source_bytes: u64, multiplier: f64) -> SpaceCheck {
    let required = required_bytes(source_bytes, multiplier);
    if available >= required {
        SpaceCheck::Sufficient
    } else {
        SpaceCheck::Insufficient {
            required,
            available,
        }
    }
}

/// Free bytes available to unprivileged users on the filesystem holding `dir`.
///
/// Returns `Ok(None)` on platforms where the query is not supported.
#[cfg(unix)]
pub fn available_space(dir: &Path) -> io::Result<Option<u64>> {
    let stat = nix::sys::statvfs::statvfs(dir).map_err(io::Error::from)?;
    Ok(Some(
        (stat.blocks_available() as u64).saturating_mul(stat.fragment_size() as u64),
    ))
}

#[cfg(not(unix))]
pub fn available_space(_dir: &Path) -> io::Result<Option<u64>> {
    Ok(None)
}
