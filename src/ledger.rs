//! Persistent byte offsets per physical log file.
//!
//! Offsets are keyed by [`FileIdentity`], not by path: rotation renames the
//! live file (`access.log` -> `access.log.1`) and creates a fresh one at the
//! old path, so a path-keyed ledger would re-read the renamed file from zero.

use crate::store::write_atomic;
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fmt;
use std::fs::{self, Metadata};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Rename-stable identity of a file's data stream.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FileIdentity(String);

impl FileIdentity {
    /// `<device>:<inode>` on Unix.
    #[cfg(unix)]
    pub fn from_metadata(metadata: &Metadata, _path: &Path) -> Self {
        use std::os::unix::fs::MetadataExt;
        Self(format!("{}:{}", metadata.dev(), metadata.ino()))
    }

    /// No stable inode equivalent is exposed on this platform; the canonical
    /// path is used, which does not survive rename-based rotation.
    #[cfg(not(unix))]
    pub fn from_metadata(_metadata: &Metadata, path: &Path) -> Self {
        let canonical = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        Self(canonical.to_string_lossy().into_owned())
    }

    pub fn of(path: &Path) -> std::io::Result<(Self, Metadata)> {
        let metadata = fs::metadata(path)?;
        Ok((Self::from_metadata(&metadata, path), metadata))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FileIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FileIdentity {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Map of file identity to consumed byte offset, backed by a JSON file.
#[derive(Debug, Default)]
pub struct OffsetLedger {
    path: Option<PathBuf>,
    offsets: BTreeMap<String, u64>,
}

impl OffsetLedger {
    /// Ledger that is never persisted.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Load the ledger at `path`.
    ///
    /// A missing or unreadable ledger degrades to an empty one, which means a
    /// full replay of whatever log files exist.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let offsets = match fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<BTreeMap<String, u64>>(&content) {
                Ok(offsets) => {
                    debug!(path = %path.display(), entries = offsets.len(), "Loaded offset ledger");
                    offsets
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Corrupt offset ledger, starting empty");
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read offset ledger, starting empty");
                BTreeMap::new()
            }
        };

        Self {
            path: Some(path),
            offsets,
        }
    }

    pub fn get(&self, identity: &FileIdentity) -> u64 {
        self.offsets.get(identity.as_str()).copied().unwrap_or(0)
    }

    pub fn set(&mut self, identity: &FileIdentity, offset: u64) {
        self.offsets.insert(identity.as_str().to_string(), offset);
    }

    pub fn offsets(&self) -> &BTreeMap<String, u64> {
        &self.offsets
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Persist the whole mapping atomically.
    pub fn flush(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let json = serde_json::to_vec_pretty(&self.offsets).context("Failed to serialize offset ledger")?;
        write_atomic(path, &json)
            .with_context(|| format!("Failed to write offset ledger: {}", path.display()))
    }
}
