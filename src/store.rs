//! On-disk session store: one pretty-printed JSON file per session.
//!
//! Files are replaced atomically (write to a sibling temp file, fsync, rename)
//! so external readers never see a torn session. Readers still retry briefly
//! on parse failure, since files may be produced by other writers.

use crate::models::Session;
use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::fmt::Write as _;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

const READ_ATTEMPTS: usize = 3;
const READ_RETRY_DELAY: Duration = Duration::from_millis(50);

/// Replace `path` with `contents` atomically, creating parent directories.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    // Fixed-length temp name, independent of the target name length.
    let temp_path = path.with_file_name(format!(".{}.tmp", Uuid::new_v4().simple()));

    let result = (|| -> Result<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_path)
            .with_context(|| format!("Failed to create temp file: {}", temp_path.display()))?;
        file.write_all(contents)
            .with_context(|| format!("Failed to write temp file: {}", temp_path.display()))?;
        file.sync_all()
            .with_context(|| format!("Failed to sync temp file: {}", temp_path.display()))?;
        fs::rename(&temp_path, path)
            .with_context(|| format!("Failed to rename into place: {}", path.display()))?;
        Ok(())
    })();

    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    result
}

/// Longest encoded stem kept verbatim; longer ones are cut and hashed.
const MAX_STEM_BYTES: usize = 160;
const HASH_SUFFIX_HEX: usize = 16;

/// File name used for a session id.
///
/// The encoding is injective: `%`, `~`, path separators, NUL and a leading
/// `.` are percent-encoded, so distinct ids never share a file, no id can
/// escape the store directory and no session file is hidden. Stems longer
/// than `MAX_STEM_BYTES` are cut and suffixed with `~` plus a SHA-256 prefix
/// of the full id; `~` never appears unescaped otherwise.
pub fn session_file_name(session_id: &str) -> String {
    let mut stem = String::with_capacity(session_id.len());
    for (i, c) in session_id.chars().enumerate() {
        match c {
            '%' | '~' | '/' | '\\' | '\0' => push_escaped(&mut stem, c),
            '.' if i == 0 => push_escaped(&mut stem, c),
            c => stem.push(c),
        }
    }
    if stem.is_empty() {
        // A bare `%` is never produced by the encoding above.
        stem.push('%');
    }

    if stem.len() > MAX_STEM_BYTES {
        let mut cut = MAX_STEM_BYTES - HASH_SUFFIX_HEX - 1;
        while !stem.is_char_boundary(cut) {
            cut -= 1;
        }
        // Do not split a `%XX` escape.
        if let Some(pct) = stem[..cut].rfind('%').filter(|&p| p + 3 > cut) {
            cut = pct;
        }
        let digest = hex_digest(&Sha256::digest(session_id.as_bytes()));
        stem.truncate(cut);
        stem.push('~');
        stem.push_str(&digest[..HASH_SUFFIX_HEX]);
    }

    format!("{}.json", stem)
}

fn push_escaped(out: &mut String, c: char) {
    let mut buf = [0u8; 4];
    for byte in c.encode_utf8(&mut buf).bytes() {
        let _ = write!(out, "%{:02X}", byte);
    }
}

fn hex_digest(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(out, "{:02x}", byte);
    }
    out
}

#[derive(Debug, Clone)]
pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    /// Open the store, creating the directory if needed.
    pub fn create(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create session directory: {}", dir.display()))?;
        Ok(Self { dir })
    }

    /// Open an existing store without creating anything.
    pub fn open_existing(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        if !dir.is_dir() {
            anyhow::bail!("Session data directory not found: {}", dir.display());
        }
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, session_id: &str) -> PathBuf {
        self.dir.join(session_file_name(session_id))
    }

    pub fn save(&self, session: &Session) -> Result<()> {
        let path = self.path_for(&session.session_id);
        let json = serde_json::to_vec_pretty(session)
            .with_context(|| format!("Failed to serialize session {}", session.session_id))?;
        write_atomic(&path, &json)?;
        debug!(session_id = %session.session_id, path = %path.display(), "Saved session");
        Ok(())
    }

    /// Load one session. `Ok(None)` when no file exists for the id.
    pub fn load(&self, session_id: &str) -> Result<Option<Session>> {
        let path = self.path_for(session_id);
        if !path.is_file() {
            return Ok(None);
        }
        read_session(&path).map(Some)
    }

    /// Load every session file in the store.
    ///
    /// Unreadable files are logged and skipped; the returned order is by file
    /// name.
    pub fn load_all(&self) -> Result<Vec<Session>> {
        let mut paths: Vec<PathBuf> = fs::read_dir(&self.dir)
            .with_context(|| format!("Failed to read session directory: {}", self.dir.display()))?
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| is_session_file(path))
            .collect();
        paths.sort();

        let mut sessions = Vec::with_capacity(paths.len());
        for path in paths {
            match read_session(&path) {
                Ok(session) => sessions.push(session),
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to load session"),
            }
        }
        Ok(sessions)
    }
}

fn is_session_file(path: &Path) -> bool {
    let hidden = path
        .file_name()
        .map(|n| n.to_string_lossy().starts_with('.'))
        .unwrap_or(true);
    !hidden && path.is_file() && path.extension().and_then(|e| e.to_str()) == Some("json")
}

fn read_session(path: &Path) -> Result<Session> {
    let mut attempt = 1;
    loop {
        let parsed = fs::read_to_string(path)
            .with_context(|| format!("Failed to read session file: {}", path.display()))
            .and_then(|content| {
                serde_json::from_str::<Session>(&content)
                    .with_context(|| format!("Failed to parse session file: {}", path.display()))
            });

        match parsed {
            Ok(session) => return Ok(session),
            Err(e) if attempt < READ_ATTEMPTS => {
                debug!(path = %path.display(), attempt, error = %e, "Retrying session read");
                attempt += 1;
                thread::sleep(READ_RETRY_DELAY);
            }
            Err(e) => return Err(e),
        }
    }
}
