//! Agent Session Monitor Library
//!
//! Incremental ingestion of LLM gateway access logs into durable,
//! per-conversation usage records with running token and cost totals.
//!
//! ## Core Features
//!
//! - **Rotation-aware tailing**: follows `access.log` and its numbered
//!   rotations (`access.log.1`, `access.log.2`, ...) without losing or
//!   re-reading data
//! - **Restart safety**: byte offsets are keyed by file identity (device and
//!   inode) and persisted atomically after every pass
//! - **Durable sessions**: one JSON file per session, replaced atomically on
//!   every update
//! - **Live view**: a polling monitor that renders aggregate state each tick
//! - **Analysis**: listing, per-model and per-date statistics, FinOps export
//!
//! ## Architecture Overview
//!
//! - [`extractor`] - access-log line to [`UsageRecord`]
//! - [`ledger`] - persistent per-file byte offsets
//! - [`rotation`] - discovery of the live log and its rotations
//! - [`tailer`] - one incremental ingestion pass into a [`tailer::RecordSink`]
//! - [`aggregator`] - in-memory sessions, persisted through [`store`]
//! - [`monitor`] - interval-driven ingestion and rendering
//! - [`analyzer`] - read-only queries over the session directory
//! - [`pricing`] - static per-model rates and cost calculation
//! - [`display`] - terminal rendering
//! - [`config`] - configuration with file and environment overrides
//! - [`logging`] - structured logging with JSON and pretty-print formats
//!
//! ## Main Entry Point
//!
//! ```rust,no_run
//! use agent_session_monitor::{IncrementalTailer, SessionAggregator, SessionStore};
//! use agent_session_monitor::config::Config;
//!
//! # fn example() -> anyhow::Result<()> {
//! let config = Config::default();
//! let mut aggregator = SessionAggregator::open(SessionStore::create(&config.paths.output_dir)?)?;
//! let mut tailer = IncrementalTailer::from_config(&config);
//!
//! let report = tailer.tail(&config.paths.log_path, &mut aggregator)?;
//! println!("{} new records", report.records_processed);
//! println!("${:.4} total", aggregator.summary().total_cost_usd);
//! # Ok(())
//! # }
//! ```

pub mod aggregator;
pub mod analyzer;
pub mod config;
pub mod display;
pub mod extractor;
pub mod ledger;
pub mod logging;
pub mod models;
pub mod monitor;
pub mod pricing;
pub mod rotation;
pub mod store;
pub mod tailer;

pub use aggregator::SessionAggregator;
pub use analyzer::SessionAnalyzer;
pub use extractor::RecordExtractor;
pub use ledger::{FileIdentity, OffsetLedger};
pub use models::*;
pub use monitor::{MonitorState, PollingMonitor, StatusView};
pub use rotation::RotationScanner;
pub use store::SessionStore;
pub use tailer::{IncrementalTailer, RecordSink, TailReport};
