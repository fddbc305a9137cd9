//! Polling Monitor
//!
//! Drives ingestion on a fixed interval and hands the resulting state to a
//! [`StatusView`] after every tick.
//!
//! ## Lifecycle
//!
//! ```text
//! Running --(interrupt)--> Stopped
//! ```
//!
//! - Each tick runs one [`IncrementalTailer::tail`] pass into the
//!   [`SessionAggregator`], then calls [`StatusView::render_tick`].
//! - A failing tick is logged and the loop keeps going.
//! - The interrupt is only observed between ticks; a tick in progress always
//!   completes.
//! - On stop, [`StatusView::render_final`] is called exactly once.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use agent_session_monitor::config::Config;
//! use agent_session_monitor::display::TerminalView;
//! use agent_session_monitor::monitor::PollingMonitor;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = Config::default();
//! let mut monitor = PollingMonitor::from_config(&config)?;
//! let mut view = TerminalView::new();
//!
//! // Blocks until Ctrl+C
//! monitor.run(&mut view).await?;
//! # Ok(())
//! # }
//! ```

use crate::aggregator::SessionAggregator;
use crate::config::Config;
use crate::store::SessionStore;
use crate::tailer::{IncrementalTailer, TailReport};
use anyhow::Result;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Running,
    Stopped,
}

/// Presentation of monitor state.
pub trait StatusView {
    /// Called after every tick that completed its ingestion pass.
    fn render_tick(&mut self, aggregator: &SessionAggregator, report: &TailReport) -> Result<()>;

    /// Called once when the monitor stops.
    fn render_final(&mut self, aggregator: &SessionAggregator) -> Result<()>;
}

pub struct PollingMonitor {
    tailer: IncrementalTailer,
    aggregator: SessionAggregator,
    log_path: PathBuf,
    refresh: Duration,
    state: MonitorState,
}

impl PollingMonitor {
    pub fn new(
        tailer: IncrementalTailer,
        aggregator: SessionAggregator,
        log_path: impl Into<PathBuf>,
        refresh: Duration,
    ) -> Self {
        Self {
            tailer,
            aggregator,
            log_path: log_path.into(),
            refresh,
            state: MonitorState::Running,
        }
    }

    /// Monitor wired from configuration. Fails when the session directory
    /// cannot be created.
    pub fn from_config(config: &Config) -> Result<Self> {
        let store = SessionStore::create(&config.paths.output_dir)?;
        let aggregator = SessionAggregator::open(store)?;
        Ok(Self::new(
            IncrementalTailer::from_config(config),
            aggregator,
            &config.paths.log_path,
            Duration::from_secs(config.monitor.refresh_interval_secs),
        ))
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    pub fn aggregator(&self) -> &SessionAggregator {
        &self.aggregator
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// One ingestion pass.
    pub fn tick(&mut self) -> Result<TailReport> {
        self.tailer.tail(&self.log_path, &mut self.aggregator)
    }

    /// Poll until `shutdown` resolves, then render the final summary.
    pub async fn run_until<V, F>(&mut self, view: &mut V, shutdown: F) -> Result<()>
    where
        V: StatusView + ?Sized,
        F: Future<Output = ()>,
    {
        let mut interval = time::interval(self.refresh);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        self.state = MonitorState::Running;
        info!(
            log_path = %self.log_path.display(),
            refresh_secs = self.refresh.as_secs_f64(),
            "Monitor started"
        );

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    debug!("Shutdown requested");
                    break;
                }
                _ = interval.tick() => {
                    match self.tick() {
                        Ok(report) => {
                            if let Err(e) = view.render_tick(&self.aggregator, &report) {
                                warn!(error = %e, "Failed to render monitor state");
                            }
                        }
                        Err(e) => error!(error = %format!("{:#}", e), "Monitor tick failed"),
                    }
                }
            }
        }

        self.state = MonitorState::Stopped;
        info!(sessions = self.aggregator.len(), "Monitor stopped");
        view.render_final(&self.aggregator)
    }

    /// Poll until Ctrl+C.
    pub async fn run<V>(&mut self, view: &mut V) -> Result<()>
    where
        V: StatusView + ?Sized,
    {
        self.run_until(view, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for Ctrl+C");
            }
        })
        .await
    }
}
