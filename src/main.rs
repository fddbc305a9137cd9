use agent_session_monitor::analyzer::{ReportFormat, SessionAnalyzer, SortKey, DEFAULT_LIST_LIMIT};
use agent_session_monitor::config::Config;
use agent_session_monitor::display::{DisplayManager, TerminalView};
use agent_session_monitor::logging::init_logging;
use agent_session_monitor::monitor::PollingMonitor;
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::io::IsTerminal;
use std::path::PathBuf;
use std::process;
use tracing::{debug, error};

#[derive(Parser)]
#[command(name = "agent-session-monitor")]
#[command(about = "Track per-session LLM token usage and cost from gateway access logs")]
#[command(version)]
struct Cli {
    /// Gateway access log (rotations are read from <path>.N)
    #[arg(long, global = true)]
    log_path: Option<PathBuf>,

    /// Session data directory
    #[arg(long, global = true)]
    output_dir: Option<PathBuf>,

    /// Offset state file (default: <output-dir>/.state.json)
    #[arg(long, global = true)]
    state_file: Option<PathBuf>,

    /// Monitor refresh interval in seconds
    #[arg(long, global = true)]
    refresh_interval: Option<u64>,

    /// Configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest continuously and show live totals (default)
    Watch,
    /// Run a single ingestion pass and print the summary
    Ingest,
    /// Show one session in detail
    Show {
        session_id: String,
        /// Hide per-round conversation content
        #[arg(long)]
        no_messages: bool,
    },
    /// List sessions
    List {
        #[arg(long, value_enum, default_value = "updated")]
        sort_by: SortKey,
        #[arg(long, default_value_t = DEFAULT_LIST_LIMIT)]
        limit: usize,
    },
    /// Token and cost totals per model
    StatsModel,
    /// Token and cost totals per day
    StatsDate {
        #[arg(long, default_value_t = 30, value_parser = clap::value_parser!(i64).range(1..))]
        days: i64,
    },
    /// Export a FinOps report
    Export {
        output: PathBuf,
        #[arg(long, value_enum, default_value = "json")]
        format: ReportFormat,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match build_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Configuration error: {:#}", e);
            process::exit(1);
        }
    };

    let _guard = match init_logging(&config.logging, &config.paths.log_directory) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("❌ Failed to initialize logging: {:#}", e);
            process::exit(1);
        }
    };
    debug!(?config, "Configuration loaded");

    if let Err(e) = run(cli.command.unwrap_or(Commands::Watch), &config).await {
        error!(error = %format!("{:#}", e), "Command failed");
        eprintln!("❌ Error: {:#}", e);
        process::exit(1);
    }
}

fn build_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::load(cli.config.as_deref())?;

    if let Some(path) = &cli.log_path {
        config.paths.log_path = path.clone();
    }
    if let Some(dir) = &cli.output_dir {
        config.paths.output_dir = dir.clone();
    }
    if let Some(path) = &cli.state_file {
        config.paths.state_file = Some(path.clone());
    }
    if let Some(secs) = cli.refresh_interval {
        config.monitor.refresh_interval_secs = secs;
    }

    config.validate()?;
    Ok(config)
}

async fn run(command: Commands, config: &Config) -> Result<()> {
    let display = DisplayManager::new();

    match command {
        Commands::Watch => {
            display.display_banner(&config.paths.log_path, &config.paths.output_dir, "watch");
            let mut monitor = PollingMonitor::from_config(config)?;
            let mut view = if std::io::stdout().is_terminal() {
                TerminalView::new()
            } else {
                TerminalView::without_clearing()
            };
            monitor.run(&mut view).await
        }
        Commands::Ingest => {
            display.display_banner(&config.paths.log_path, &config.paths.output_dir, "ingest");
            let mut monitor = PollingMonitor::from_config(config)?;
            let report = monitor.tick()?;
            display.display_ingest_report(&report);
            display.display_summary(&monitor.aggregator().summary(), &config.paths.output_dir);
            Ok(())
        }
        Commands::Show { session_id, no_messages } => {
            let analyzer = SessionAnalyzer::new(&config.paths.output_dir)?;
            let session = analyzer.load_session(&session_id)?;
            display.display_session_detail(&session_id, session.as_ref(), !no_messages);
            Ok(())
        }
        Commands::List { sort_by, limit } => {
            let analyzer = SessionAnalyzer::new(&config.paths.output_dir)?;
            let listing = analyzer.list_sessions(sort_by, limit)?;
            display.display_session_list(&listing, sort_by);
            Ok(())
        }
        Commands::StatsModel => {
            let analyzer = SessionAnalyzer::new(&config.paths.output_dir)?;
            display.display_model_stats(&analyzer.stats_by_model()?);
            Ok(())
        }
        Commands::StatsDate { days } => {
            let analyzer = SessionAnalyzer::new(&config.paths.output_dir)?;
            display.display_date_stats(&analyzer.stats_by_date(days)?, days);
            Ok(())
        }
        Commands::Export { output, format } => {
            let analyzer = SessionAnalyzer::new(&config.paths.output_dir)?;
            let written = analyzer.export_report(&output, format)?;
            display.display_export(&written);
            Ok(())
        }
    }
}
