//! Session Analysis
//!
//! Read-only queries over a session directory written by the monitor. The
//! analyzer never writes session files and tolerates files being replaced
//! underneath it.
//!
//! ## Queries
//!
//! - [`SessionAnalyzer::load_session`] / [`SessionAnalyzer::load_all_sessions`]
//! - [`SessionAnalyzer::list_sessions`] - sorted by update time, cost or tokens
//! - [`SessionAnalyzer::stats_by_model`] - sessions grouped by their current model
//! - [`SessionAnalyzer::stats_by_date`] - sessions grouped by creation date (UTC)
//! - [`SessionAnalyzer::export_report`] - FinOps report as JSON or two CSV files
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use agent_session_monitor::analyzer::{SessionAnalyzer, SortKey};
//!
//! # fn example() -> anyhow::Result<()> {
//! let analyzer = SessionAnalyzer::new("./sessions")?;
//! let listing = analyzer.list_sessions(SortKey::Cost, 10)?;
//! for session in &listing.sessions {
//!     println!("{} {}", session.session_id, session.messages_count);
//! }
//! # Ok(())
//! # }
//! ```

use crate::models::Session;
use crate::pricing;
use crate::store::{write_atomic, SessionStore};
use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use clap::ValueEnum;
use serde::Serialize;
use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::info;

pub const DEFAULT_LIST_LIMIT: usize = 20;
pub const DEFAULT_STATS_DAYS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SortKey {
    /// Most recently updated first
    Updated,
    /// Highest estimated cost first
    Cost,
    /// Most input + output tokens first
    Tokens,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    Json,
    Csv,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ModelStats {
    pub session_count: usize,
    pub total_input: u64,
    pub total_output: u64,
    pub total_reasoning: u64,
    pub total_cost: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DateStats {
    pub session_count: usize,
    pub total_input: u64,
    pub total_output: u64,
    pub total_reasoning: u64,
    pub total_cost: f64,
    pub models: BTreeSet<String>,
}

#[derive(Debug, Clone)]
pub struct SessionListing {
    /// Number of sessions before the limit was applied.
    pub total: usize,
    pub sessions: Vec<Session>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportSummary {
    pub total_sessions: usize,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_cost_usd: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FinOpsReport {
    pub generated_at: DateTime<Utc>,
    pub summary: ReportSummary,
    pub by_model: BTreeMap<String, ModelStats>,
    pub by_date: BTreeMap<String, DateStats>,
}

pub struct SessionAnalyzer {
    store: SessionStore,
}

impl SessionAnalyzer {
    /// Fails when `data_dir` does not exist.
    pub fn new(data_dir: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self {
            store: SessionStore::open_existing(data_dir)?,
        })
    }

    pub fn data_dir(&self) -> &Path {
        self.store.dir()
    }

    pub fn load_session(&self, session_id: &str) -> Result<Option<Session>> {
        self.store.load(session_id)
    }

    pub fn load_all_sessions(&self) -> Result<Vec<Session>> {
        self.store.load_all()
    }

    pub fn list_sessions(&self, sort_by: SortKey, limit: usize) -> Result<SessionListing> {
        let mut sessions = self.load_all_sessions()?;

        match sort_by {
            SortKey::Updated => sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at)),
            SortKey::Cost => sessions.sort_by(|a, b| {
                pricing::session_cost(b).total_cmp(&pricing::session_cost(a))
            }),
            SortKey::Tokens => sessions.sort_by(|a, b| b.io_tokens().cmp(&a.io_tokens())),
        }

        let total = sessions.len();
        sessions.truncate(limit);
        Ok(SessionListing { total, sessions })
    }

    pub fn stats_by_model(&self) -> Result<BTreeMap<String, ModelStats>> {
        Ok(model_stats(&self.load_all_sessions()?))
    }

    /// Per-day stats for sessions created within the last `days` days.
    pub fn stats_by_date(&self, days: i64) -> Result<BTreeMap<String, DateStats>> {
        Ok(date_stats(&self.load_all_sessions()?, days, Utc::now()))
    }

    pub fn build_report(&self) -> Result<FinOpsReport> {
        let sessions = self.load_all_sessions()?;
        let now = Utc::now();
        let by_model = model_stats(&sessions);
        let by_date = date_stats(&sessions, DEFAULT_STATS_DAYS, now);

        let summary = ReportSummary {
            total_sessions: by_model.values().map(|s| s.session_count).sum(),
            total_input_tokens: by_model
                .values()
                .fold(0u64, |acc, s| acc.saturating_add(s.total_input)),
            total_output_tokens: by_model
                .values()
                .fold(0u64, |acc, s| acc.saturating_add(s.total_output)),
            total_cost_usd: by_model.values().map(|s| s.total_cost).sum(),
        };

        Ok(FinOpsReport {
            generated_at: now,
            summary,
            by_model,
            by_date,
        })
    }

    /// Write the FinOps report and return the files written.
    ///
    /// JSON goes to `path` as-is. CSV produces `<stem>.model.csv` and
    /// `<stem>.date.csv` next to `path`.
    pub fn export_report(&self, path: &Path, format: ReportFormat) -> Result<Vec<PathBuf>> {
        let report = self.build_report()?;

        let written = match format {
            ReportFormat::Json => {
                let json = serde_json::to_vec_pretty(&report).context("Failed to serialize report")?;
                write_atomic(path, &json)?;
                vec![path.to_path_buf()]
            }
            ReportFormat::Csv => {
                let model_path = path.with_extension("model.csv");
                let date_path = path.with_extension("date.csv");
                write_atomic(&model_path, model_csv(&report.by_model).as_bytes())?;
                write_atomic(&date_path, date_csv(&report.by_date).as_bytes())?;
                vec![model_path, date_path]
            }
        };

        info!(files = ?written, sessions = report.summary.total_sessions, "Exported report");
        Ok(written)
    }
}

fn model_stats(sessions: &[Session]) -> BTreeMap<String, ModelStats> {
    let mut stats: BTreeMap<String, ModelStats> = BTreeMap::new();
    for session in sessions {
        let entry = stats.entry(session.model.clone()).or_default();
        entry.session_count += 1;
        entry.total_input = entry.total_input.saturating_add(session.total_input_tokens);
        entry.total_output = entry.total_output.saturating_add(session.total_output_tokens);
        entry.total_reasoning = entry.total_reasoning.saturating_add(session.total_reasoning_tokens);
        entry.total_cost += pricing::session_cost(session);
    }
    stats
}

/// Sessions created within `days` of `now`. A window reaching past the
/// representable calendar covers every session.
fn date_stats(sessions: &[Session], days: i64, now: DateTime<Utc>) -> BTreeMap<String, DateStats> {
    let cutoff = Duration::try_days(days).and_then(|window| now.checked_sub_signed(window));
    let mut stats: BTreeMap<String, DateStats> = BTreeMap::new();

    for session in sessions
        .iter()
        .filter(|s| cutoff.map_or(true, |cutoff| s.created_at >= cutoff))
    {
        let key = session.created_at.format("%Y-%m-%d").to_string();
        let entry = stats.entry(key).or_default();
        entry.session_count += 1;
        entry.total_input = entry.total_input.saturating_add(session.total_input_tokens);
        entry.total_output = entry.total_output.saturating_add(session.total_output_tokens);
        entry.total_reasoning = entry.total_reasoning.saturating_add(session.total_reasoning_tokens);
        entry.total_cost += pricing::session_cost(session);
        entry.models.insert(session.model.clone());
    }
    stats
}

fn csv_field(value: &str) -> Cow<'_, str> {
    if value.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", value.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(value)
    }
}

fn model_csv(stats: &BTreeMap<String, ModelStats>) -> String {
    let mut csv = String::from("Model,Sessions,Input Tokens,Output Tokens,Cost (USD)\n");
    for (model, data) in stats {
        csv.push_str(&format!(
            "{},{},{},{},{:.6}\n",
            csv_field(model),
            data.session_count,
            data.total_input,
            data.total_output,
            data.total_cost
        ));
    }
    csv
}

fn date_csv(stats: &BTreeMap<String, DateStats>) -> String {
    let mut csv = String::from("Date,Sessions,Input Tokens,Output Tokens,Cost (USD),Models\n");
    for (date, data) in stats {
        let models = data.models.iter().cloned().collect::<Vec<_>>().join(", ");
        csv.push_str(&format!(
            "{},{},{},{},{:.6},{}\n",
            date,
            data.session_count,
            data.total_input,
            data.total_output,
            data.total_cost,
            csv_field(&models)
        ));
    }
    csv
}
