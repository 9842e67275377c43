//! Output naming
//!
//! Maps a source file to its `.mkv` destination and resolves collisions with
//! files already on disk and with destinations claimed earlier in the run.

use std::collections::HashSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Container extension of every output
pub const OUTPUT_EXTENSION: &str = "mkv";

/// Desired output path: `<output_dir>/<source stem>.mkv`
pub fn desired_output_path(output_dir: &Path, source: &Path) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_os_string())
        .unwrap_or_else(|| OsString::from("output"));
    let mut name = stem;
    name.push(".");
    name.push(OUTPUT_EXTENSION);
    output_dir.join(name)
}

/// Path with `_<n>` appended to the stem, keeping the extension
fn numbered_path(path: &Path, n: u32) -> PathBuf {
    let stem = path.file_stem().map(|s| s.to_os_string()).unwrap_or_default();
    let mut name = stem;
    name.push(format!("_{}", n));
    if let Some(ext) = path.extension() {
        name.push(".");
        name.push(ext);
    }
    path.with_file_name(name)
}

/// First path among `path`, `stem_1.ext`, `stem_2.ext`, ... for which `is_taken` is false
pub fn unique_path(path: &Path, is_taken: impl Fn(&Path) -> bool) -> PathBuf {
    if !is_taken(path) {
        return path.to_path_buf();
    }
    let mut n = 1u32;
    loop {
        let candidate = numbered_path(path, n);
        if !is_taken(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

/// What to do with a source whose desired output name is known
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Encode into this path
    Use(PathBuf),
    /// Leave the existing output alone and skip the source
    Skip { existing: PathBuf },
}

/// Resolves output names for one run
///
/// Every path handed out is remembered, so outputs within a run are pairwise
/// distinct even when an earlier conversion failed and its file was removed.
#[derive(Debug, Default)]
pub struct NameResolver {
    skip_existing: bool,
    claimed: HashSet<PathBuf>,
}

impl NameResolver {
    pub fn new(skip_existing: bool) -> Self {
        Self {
            skip_existing,
            claimed: HashSet::new(),
        }
    }

    fn is_taken(&self, path: &Path) -> bool {
        self.claimed.contains(path) || path.exists()
    }

    /// Resolve the destination for `desired`
    ///
    /// In skip mode an existing (or already claimed) path yields `Skip`.
    /// Otherwise the first free numbered variant is claimed and returned.
    pub fn resolve(&mut self, desired: &Path) -> Resolution {
        if self.skip_existing && self.is_taken(desired) {
            return Resolution::Skip {
                existing: desired.to_path_buf(),
            };
        }

        let path = unique_path(desired, |p| self.is_taken(p));
        self.claimed.insert(path.clone());
        Resolution::Use(path)
    }
}
