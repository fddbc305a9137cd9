#![allow(dead_code)]

use agent_session_monitor::config::Config;
use agent_session_monitor::{IncrementalTailer, SessionAggregator, SessionStore};
use serde_json::{json, Value};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// One access-log line carrying `payload` as a JSON-encoded `ai_log` string.
pub fn ai_log_line(payload: Value) -> String {
    format!("{}\n", json!({ "ai_log": payload.to_string() }))
}

pub fn usage_line(session: &str, model: &str, input: u64, output: u64) -> String {
    ai_log_line(json!({
        "session_id": session,
        "model": model,
        "input_token": input,
        "output_token": output,
    }))
}

pub fn append(path: &Path, content: &str) {
    let mut file = OpenOptions::new().create(true).append(true).open(path).unwrap();
    file.write_all(content.as_bytes()).unwrap();
}

/// Temporary log directory plus session directory, mirroring a deployment.
pub struct TestEnv {
    pub dir: TempDir,
    pub log_path: PathBuf,
    pub output_dir: PathBuf,
}

impl TestEnv {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let log_path = dir.path().join("access.log");
        let output_dir = dir.path().join("sessions");
        Self {
            dir,
            log_path,
            output_dir,
        }
    }

    pub fn config(&self) -> Config {
        let mut config = Config::default();
        config.paths.log_path = self.log_path.clone();
        config.paths.output_dir = self.output_dir.clone();
        config
    }

    pub fn rotated(&self, n: usize) -> PathBuf {
        PathBuf::from(format!("{}.{}", self.log_path.display(), n))
    }

    /// Tailer and aggregator as a freshly started process would build them.
    pub fn start(&self) -> (IncrementalTailer, SessionAggregator) {
        let config = self.config();
        let store = SessionStore::create(&self.output_dir).unwrap();
        (
            IncrementalTailer::from_config(&config),
            SessionAggregator::open(store).unwrap(),
        )
    }

    pub fn write_log(&self, content: &str) {
        fs::write(&self.log_path, content).unwrap();
    }
}
