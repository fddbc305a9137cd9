//! Discovery of the live access log and its numbered rotations.
//!
//! Rotation tools rename `access.log` to `access.log.1`, shift older files to
//! higher numbers, and create a fresh `access.log`. The highest suffix is
//! therefore the oldest file, and the live file is always the newest.

use glob::{glob, Pattern};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const DEFAULT_MAX_ROTATED: usize = 100;

#[derive(Debug, Clone)]
pub struct RotationScanner {
    max_rotated: usize,
}

impl Default for RotationScanner {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ROTATED)
    }
}

impl RotationScanner {
    pub fn new(max_rotated: usize) -> Self {
        Self { max_rotated }
    }

    /// Existing log files for `base_path`, oldest first.
    ///
    /// Returns `base.N` for every existing numeric suffix `1..=max_rotated` in
    /// descending `N`, followed by `base` itself when it exists. Suffixes above
    /// the bound are dropped without error.
    pub fn discover(&self, base_path: &Path) -> Vec<PathBuf> {
        let mut rotated = self.rotated_files(base_path);
        rotated.sort_by(|a, b| b.0.cmp(&a.0));

        let mut files: Vec<PathBuf> = rotated.into_iter().map(|(_, path)| path).collect();
        if base_path.is_file() {
            files.push(base_path.to_path_buf());
        }

        debug!(base = %base_path.display(), files = files.len(), "Discovered log files");
        files
    }

    fn rotated_files(&self, base_path: &Path) -> Vec<(usize, PathBuf)> {
        let base = base_path.to_string_lossy();
        let pattern = format!("{}.*", Pattern::escape(&base));

        let entries = match glob(&pattern) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(pattern = %pattern, error = %e, "Invalid rotation pattern");
                return Vec::new();
            }
        };

        let mut found = Vec::new();
        let mut over_bound = 0usize;
        for path in entries.flatten() {
            if !path.is_file() {
                continue;
            }
            let Some(index) = rotation_index(&base, &path) else {
                continue;
            };
            if index == 0 {
                continue;
            }
            if index > self.max_rotated {
                over_bound += 1;
                continue;
            }
            found.push((index, path));
        }

        if over_bound > 0 {
            debug!(
                skipped = over_bound,
                max_rotated = self.max_rotated,
                "Ignoring rotated files beyond scan bound"
            );
        }

        found
    }
}

/// Numeric rotation suffix of `path` relative to `base`, if it is `base.N`.
fn rotation_index(base: &str, path: &Path) -> Option<usize> {
    let name = path.to_string_lossy();
    let suffix = name.strip_prefix(base)?.strip_prefix('.')?;
    if suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    suffix.parse().ok()
}
