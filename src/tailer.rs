//! Incremental, rotation-aware reading of the access log.
//!
//! One call to [`IncrementalTailer::tail`] is one ingestion pass: every file
//! reported by the [`RotationScanner`] is read from its recorded offset to EOF,
//! each complete line goes through the [`RecordExtractor`], and usage records
//! are handed to a [`RecordSink`]. Offsets are kept per [`FileIdentity`] and
//! the ledger is flushed once at the end of the pass.
//!
//! ## Offsets
//!
//! - A file smaller than its recorded offset was truncated or replaced in
//!   place; its offset is reset to 0 and the file is read from the start.
//! - On the live file, a trailing fragment without `\n` is left unconsumed and
//!   picked up on the next pass once the writer finishes the line. Rotated
//!   files are final and are read to EOF.
//! - If the sink or the read fails mid-file, the offset stops just before the
//!   offending line so applied lines are never applied twice.

use crate::config::Config;
use crate::extractor::{Extraction, RecordExtractor};
use crate::ledger::{FileIdentity, OffsetLedger};
use crate::models::UsageRecord;
use crate::rotation::RotationScanner;
use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const DEFAULT_PROGRESS_EVERY: usize = 1000;

/// Consumer of extracted usage records.
pub trait RecordSink {
    fn update(&mut self, record: UsageRecord) -> Result<()>;
}

/// Collects records in memory.
impl RecordSink for Vec<UsageRecord> {
    fn update(&mut self, record: UsageRecord) -> Result<()> {
        self.push(record);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FileStatus {
    /// New bytes were consumed.
    Read,
    /// Size equals the recorded offset.
    Unchanged,
    /// The file could not be read to the end; the message says why.
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct FileReport {
    pub path: PathBuf,
    pub identity: Option<String>,
    pub start_offset: u64,
    pub end_offset: u64,
    pub records: usize,
    /// Offset was reset to 0 because the file shrank.
    pub truncated: bool,
    pub status: FileStatus,
}

impl FileReport {
    fn failed(path: &Path, identity: Option<&FileIdentity>, offset: u64, reason: String) -> Self {
        Self {
            path: path.to_path_buf(),
            identity: identity.map(|i| i.to_string()),
            start_offset: offset,
            end_offset: offset,
            records: 0,
            truncated: false,
            status: FileStatus::Failed(reason),
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, FileStatus::Failed(_))
    }
}

/// Outcome of one ingestion pass.
#[derive(Debug, Clone, Default)]
pub struct TailReport {
    pub files: Vec<FileReport>,
    /// Records handed to the sink successfully.
    pub records_processed: usize,
    /// Usage payloads dropped for lacking a session id.
    pub records_rejected: usize,
    pub lines_read: usize,
    pub bytes_read: u64,
}

impl TailReport {
    pub fn failed_files(&self) -> impl Iterator<Item = &FileReport> {
        self.files.iter().filter(|f| f.is_failed())
    }

    pub fn has_failures(&self) -> bool {
        self.files.iter().any(FileReport::is_failed)
    }
}

/// Progress through one file, returned even when reading stops early.
struct ReadProgress {
    end_offset: u64,
    records: usize,
    error: Option<anyhow::Error>,
}

pub struct IncrementalTailer {
    scanner: RotationScanner,
    ledger: OffsetLedger,
    extractor: RecordExtractor,
    progress_every: usize,
}

impl IncrementalTailer {
    pub fn new(scanner: RotationScanner, ledger: OffsetLedger, extractor: RecordExtractor) -> Self {
        Self {
            scanner,
            ledger,
            extractor,
            progress_every: DEFAULT_PROGRESS_EVERY,
        }
    }

    /// Tailer wired from configuration, with the ledger loaded from the state file.
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            RotationScanner::new(config.monitor.max_rotated_files),
            OffsetLedger::load(config.paths.state_file()),
            RecordExtractor::new(&config.ingest),
        )
        .with_progress_every(config.monitor.progress_every)
    }

    pub fn with_progress_every(mut self, every: usize) -> Self {
        self.progress_every = every.max(1);
        self
    }

    /// Run one ingestion pass over `base_path` and its rotations.
    pub fn tail<S>(&mut self, base_path: &Path, sink: &mut S) -> Result<TailReport>
    where
        S: RecordSink + ?Sized,
    {
        let files = self.scanner.discover(base_path);
        let mut report = TailReport::default();

        if files.is_empty() {
            debug!(base = %base_path.display(), "No log files found");
        }

        for path in &files {
            let is_live = path.as_path() == base_path;
            let file_report = self.tail_file(path, is_live, sink, &mut report);
            if let FileStatus::Failed(reason) = &file_report.status {
                warn!(path = %path.display(), error = %reason, "Failed to read log file");
            }
            report.files.push(file_report);
        }

        self.ledger.flush().context("Failed to persist offset ledger")?;

        debug!(
            files = report.files.len(),
            records = report.records_processed,
            rejected = report.records_rejected,
            bytes = report.bytes_read,
            "Ingestion pass complete"
        );
        Ok(report)
    }

    fn tail_file<S>(
        &mut self,
        path: &Path,
        is_live: bool,
        sink: &mut S,
        report: &mut TailReport,
    ) -> FileReport
    where
        S: RecordSink + ?Sized,
    {
        let (identity, metadata) = match FileIdentity::of(path) {
            Ok(found) => found,
            Err(e) => return FileReport::failed(path, None, 0, format!("stat failed: {}", e)),
        };

        let size = metadata.len();
        let recorded = self.ledger.get(&identity);
        let truncated = size < recorded;
        let start_offset = if truncated {
            warn!(
                path = %path.display(),
                identity = %identity,
                recorded_offset = recorded,
                size,
                "Log file shrank, re-reading from start"
            );
            0
        } else {
            recorded
        };

        if size == start_offset {
            if truncated {
                self.ledger.set(&identity, 0);
            }
            return FileReport {
                path: path.to_path_buf(),
                identity: Some(identity.to_string()),
                start_offset,
                end_offset: start_offset,
                records: 0,
                truncated,
                status: FileStatus::Unchanged,
            };
        }

        let progress = match self.read_from(path, start_offset, is_live, sink, report) {
            Ok(progress) => progress,
            Err(e) => {
                return FileReport::failed(path, Some(&identity), recorded, format!("{:#}", e));
            }
        };

        self.ledger.set(&identity, progress.end_offset);

        let status = match progress.error {
            Some(e) => FileStatus::Failed(format!("{:#}", e)),
            None => FileStatus::Read,
        };

        FileReport {
            path: path.to_path_buf(),
            identity: Some(identity.to_string()),
            start_offset,
            end_offset: progress.end_offset,
            records: progress.records,
            truncated,
            status,
        }
    }

    /// Read complete lines from `offset`. Errors before the first byte is
    /// consumed are returned as `Err`; later ones are carried in the progress.
    fn read_from<S>(
        &self,
        path: &Path,
        offset: u64,
        is_live: bool,
        sink: &mut S,
        report: &mut TailReport,
    ) -> Result<ReadProgress>
    where
        S: RecordSink + ?Sized,
    {
        let file = File::open(path).with_context(|| format!("open failed: {}", path.display()))?;
        let mut reader = BufReader::new(file);
        reader
            .seek(SeekFrom::Start(offset))
            .with_context(|| format!("seek to {} failed", offset))?;

        let mut position = offset;
        let mut records = 0usize;
        let mut buf = Vec::with_capacity(4096);

        loop {
            buf.clear();
            let read = match reader.read_until(b'\n', &mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    return Ok(ReadProgress {
                        end_offset: position,
                        records,
                        error: Some(anyhow::Error::new(e).context(format!("read failed at byte {}", position))),
                    });
                }
            };

            if is_live && buf.last() != Some(&b'\n') {
                debug!(path = %path.display(), pending = read, "Holding back partial line");
                break;
            }

            report.lines_read += 1;
            let line = String::from_utf8_lossy(&buf);

            match self.extractor.classify(&line) {
                Extraction::Record(record) => {
                    if let Err(e) = sink.update(record) {
                        return Ok(ReadProgress {
                            end_offset: position,
                            records,
                            error: Some(e.context(format!("record at byte {} not applied", position))),
                        });
                    }
                    records += 1;
                    report.records_processed += 1;
                    if report.records_processed % self.progress_every == 0 {
                        info!(
                            records = report.records_processed,
                            file = %path.display(),
                            "Ingestion progress"
                        );
                    }
                }
                Extraction::MissingSession => report.records_rejected += 1,
                Extraction::Ignored => {}
            }

            position += read as u64;
            report.bytes_read += read as u64;
        }

        Ok(ReadProgress {
            end_offset: position,
            records,
            error: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs::{self, OpenOptions};
    use std::io::Write;

    fn usage_line(session: &str, input: u64) -> String {
        let payload = json!({"session_id": session, "model": "GPT-4", "input_token": input, "output_token": 1});
        format!("{}\n", json!({"ai_log": payload.to_string()}))
    }

    fn tailer() -> IncrementalTailer {
        IncrementalTailer::new(
            RotationScanner::default(),
            OffsetLedger::in_memory(),
            RecordExtractor::default(),
        )
    }

    struct FailingSink {
        accept: usize,
        seen: Vec<UsageRecord>,
    }

    impl RecordSink for FailingSink {
        fn update(&mut self, record: UsageRecord) -> Result<()> {
            if self.seen.len() == self.accept {
                anyhow::bail!("disk full");
            }
            self.seen.push(record);
            Ok(())
        }
    }

    #[test]
    fn test_second_pass_reads_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("access.log");
        fs::write(&log, usage_line("s1", 1) + &usage_line("s2", 2)).unwrap();

        let mut tailer = tailer();
        let mut sink = Vec::new();
        let first = tailer.tail(&log, &mut sink).unwrap();
        assert_eq!(first.records_processed, 2);

        let second = tailer.tail(&log, &mut sink).unwrap();
        assert_eq!(second.records_processed, 0);
        assert_eq!(second.files[0].status, FileStatus::Unchanged);
        assert_eq!(sink.len(), 2);
    }

    #[test]
    fn test_partial_line_held_back_on_live_file() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("access.log");
        let complete = usage_line("s1", 1);
        let pending = usage_line("s2", 2);
        let (head, tail) = pending.split_at(10);
        fs::write(&log, format!("{}{}", complete, head)).unwrap();

        let mut tailer = tailer();
        let mut sink = Vec::new();
        let report = tailer.tail(&log, &mut sink).unwrap();
        assert_eq!(report.records_processed, 1);
        assert_eq!(report.files[0].end_offset, complete.len() as u64);

        OpenOptions::new().append(true).open(&log).unwrap().write_all(tail.as_bytes()).unwrap();
        let report = tailer.tail(&log, &mut sink).unwrap();
        assert_eq!(report.records_processed, 1);
        assert_eq!(sink[1].session_id, "s2");
        assert_eq!(report.files[0].end_offset, fs::metadata(&log).unwrap().len());
    }

    #[test]
    fn test_rotated_file_read_to_eof_without_newline() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("access.log");
        let rotated = dir.path().join("access.log.1");
        let line = usage_line("old", 5);
        fs::write(&rotated, line.trim_end()).unwrap();

        let mut sink = Vec::new();
        let report = tailer().tail(&log, &mut sink).unwrap();
        assert_eq!(report.records_processed, 1);
        assert_eq!(report.files[0].end_offset, fs::metadata(&rotated).unwrap().len());
    }

    #[test]
    fn test_sink_failure_stops_before_failing_line() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("access.log");
        let lines = [usage_line("a", 1), usage_line("b", 2), usage_line("c", 3)];
        fs::write(&log, lines.concat()).unwrap();

        let mut tailer = tailer();
        let mut sink = FailingSink { accept: 1, seen: Vec::new() };
        let report = tailer.tail(&log, &mut sink).unwrap();
        assert!(report.has_failures());
        assert_eq!(report.files[0].end_offset, lines[0].len() as u64);

        sink.accept = usize::MAX;
        let report = tailer.tail(&log, &mut sink).unwrap();
        assert_eq!(report.records_processed, 2);
        let ids: Vec<_> = sink.seen.iter().map(|r| r.session_id.as_str()).collect();
        assert_eq!(ids, ["a", "b", "c"]);
    }

    #[test]
    fn test_invalid_utf8_does_not_abort_file() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("access.log");
        let mut bytes = b"\xff\xfe garbage\n".to_vec();
        bytes.extend_from_slice(usage_line("s1", 1).as_bytes());
        fs::write(&log, bytes).unwrap();

        let mut sink = Vec::new();
        let report = tailer().tail(&log, &mut sink).unwrap();
        assert_eq!(report.lines_read, 2);
        assert_eq!(report.records_processed, 1);
    }

    #[test]
    fn test_rejected_records_are_counted() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("access.log");
        let orphan = format!("{}\n", json!({"ai_log": json!({"model": "Qwen"}).to_string()}));
        fs::write(&log, orphan + &usage_line("s1", 1)).unwrap();

        let mut sink = Vec::new();
        let report = tailer().tail(&log, &mut sink).unwrap();
        assert_eq!(report.records_rejected, 1);
        assert_eq!(report.records_processed, 1);
    }
}
