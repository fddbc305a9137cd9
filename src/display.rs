//! Terminal Output
//!
//! Human-readable, colored rendering for every command:
//!
//! - [`TerminalView`] - the live monitor screen (implements [`StatusView`])
//! - [`DisplayManager`] - one-shot reports: ingest results, session detail,
//!   session list, per-model and per-date statistics, export results
//!
//! Everything here writes to stdout except failures, which go to stderr.

use crate::aggregator::SessionAggregator;
use crate::analyzer::{DateStats, ModelStats, SessionListing, SortKey};
use crate::models::{Session, Summary};
use crate::monitor::StatusView;
use crate::pricing;
use crate::tailer::{FileStatus, TailReport};
use anyhow::{Context, Result};
use colored::Colorize;
use crossterm::{
    cursor::MoveTo,
    execute,
    terminal::{Clear, ClearType},
};
use serde_json::Value;
use std::collections::BTreeMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Sessions shown in the live table.
const MONITOR_TABLE_ROWS: usize = 10;
const PREVIEW_CHARS: usize = 150;

/// Format an integer with thousands separators.
pub fn format_number(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Truncate to `max` characters, marking the cut.
fn preview(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        let cut: String = text.chars().take(max).collect();
        format!("{}...", cut)
    } else {
        text.to_string()
    }
}

fn fit(text: &str, width: usize) -> String {
    text.chars().take(width).collect()
}

fn print_token_statistics(summary: &Summary) {
    let totals = &summary.totals;
    println!("{}", "📈 Token Statistics".bright_white().bold());
    println!("   Total Input:     {} tokens", format_number(totals.input_tokens));
    println!("   Total Output:    {} tokens", format_number(totals.output_tokens));
    if totals.reasoning_tokens > 0 {
        println!("   Total Reasoning: {} tokens", format_number(totals.reasoning_tokens));
    }
    println!("   Total Cached:    {} tokens", format_number(totals.cached_tokens));
    println!("   Total Tokens:    {} tokens", format_number(summary.total_tokens));
    println!(
        "   Total Cost:      {}",
        format!("${:.4}", summary.total_cost_usd).bright_green()
    );
}

/// Live monitor screen.
pub struct TerminalView {
    clear: bool,
}

impl Default for TerminalView {
    fn default() -> Self {
        Self::new()
    }
}

impl TerminalView {
    pub fn new() -> Self {
        Self { clear: true }
    }

    /// View that appends instead of redrawing, for non-interactive output.
    pub fn without_clearing() -> Self {
        Self { clear: false }
    }

    fn clear_screen(&self) -> Result<()> {
        if self.clear {
            execute!(io::stdout(), Clear(ClearType::All), MoveTo(0, 0))
                .context("Failed to clear terminal")?;
        }
        Ok(())
    }

    fn print_session_table(aggregator: &SessionAggregator) {
        let mut sessions: Vec<&Session> = aggregator.sessions().collect();
        if sessions.is_empty() {
            return;
        }
        sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));

        println!("┌──────────────────────────┬─────────┬────────────┬────────────┐");
        println!("│ Session ID               │ Msgs    │ Input      │ Output     │");
        println!("├──────────────────────────┼─────────┼────────────┼────────────┤");
        for session in sessions.iter().take(MONITOR_TABLE_ROWS) {
            println!(
                "│ {:<24} │ {:>7} │ {:>10} │ {:>10} │",
                fit(&session.session_id, 24),
                session.messages_count,
                format_number(session.total_input_tokens),
                format_number(session.total_output_tokens)
            );
        }
        println!("└──────────────────────────┴─────────┴────────────┴────────────┘");
        if sessions.len() > MONITOR_TABLE_ROWS {
            println!(
                "{}",
                format!("   ... and {} more", sessions.len() - MONITOR_TABLE_ROWS).dimmed()
            );
        }
    }
}

impl StatusView for TerminalView {
    fn render_tick(&mut self, aggregator: &SessionAggregator, report: &TailReport) -> Result<()> {
        self.clear_screen()?;
        let summary = aggregator.summary();

        println!("{}", "=".repeat(64).bright_cyan());
        println!("{}", "🔍 Agent Session Monitor - Active".bright_white().bold());
        println!("{}", "=".repeat(64).bright_cyan());
        println!();
        println!("📊 Sessions: {}", summary.session_count.to_string().bright_yellow());
        if report.records_processed > 0 {
            println!("📝 New records this tick: {}", report.records_processed);
        }
        for failed in report.failed_files() {
            if let FileStatus::Failed(reason) = &failed.status {
                eprintln!("{} {}: {}", "❌".red(), failed.path.display(), reason);
            }
        }
        println!();

        Self::print_session_table(aggregator);
        println!();
        print_token_statistics(&summary);
        println!();
        println!("{}", "Press Ctrl+C to stop...".dimmed());

        io::stdout().flush().context("Failed to flush stdout")
    }

    fn render_final(&mut self, aggregator: &SessionAggregator) -> Result<()> {
        let summary = aggregator.summary();

        println!();
        println!("{}", "=".repeat(64).bright_cyan());
        println!("{}", "📊 Session Monitor - Summary".bright_white().bold());
        println!("{}", "=".repeat(64).bright_cyan());
        println!();
        println!("   Total Sessions:  {}", summary.session_count);
        print_token_statistics(&summary);
        println!("{}", "=".repeat(64).bright_cyan());
        println!();
        println!("💾 Session data saved to: {}", aggregator.store().dir().display());

        io::stdout().flush().context("Failed to flush stdout")
    }
}

pub struct DisplayManager;

impl Default for DisplayManager {
    fn default() -> Self {
        Self::new()
    }
}

impl DisplayManager {
    pub fn new() -> Self {
        Self
    }

    pub fn display_banner(&self, log_path: &Path, output_dir: &Path, mode: &str) {
        println!("{}", "=".repeat(64).bright_cyan());
        println!("{}", "🔍 Agent Session Monitor".bright_white().bold());
        println!("{}", "=".repeat(64).bright_cyan());
        println!();
        println!("📂 Log path:   {}", log_path.display());
        println!("📁 Output dir: {}", output_dir.display());
        println!("📺 Mode:       {}", mode);
        println!("{}", "=".repeat(64).bright_cyan());
        println!();
    }

    /// Per-file results of one ingestion pass.
    pub fn display_ingest_report(&self, report: &TailReport) {
        if report.files.is_empty() {
            eprintln!("{} No log files found", "❌".red());
            return;
        }

        println!("📂 Found {} log file(s):", report.files.len());
        for file in &report.files {
            let path = file.path.display();
            if file.truncated {
                println!("   📝 File truncated or recreated, read from start: {}", path);
            }
            match &file.status {
                FileStatus::Read => println!(
                    "   {} {} new record(s) from {} (bytes {}..{})",
                    "✅".green(),
                    file.records,
                    path,
                    file.start_offset,
                    file.end_offset
                ),
                FileStatus::Unchanged => println!("   ⏭️  No new content in: {}", path),
                FileStatus::Failed(reason) => {
                    eprintln!("   {} Error reading {}: {}", "❌".red(), path, reason)
                }
            }
        }

        if report.records_rejected > 0 {
            println!(
                "   {}",
                format!(
                    "{} usage record(s) without session_id were dropped",
                    report.records_rejected
                )
                .yellow()
            );
        }
        println!();
    }

    pub fn display_summary(&self, summary: &Summary, output_dir: &Path) {
        println!("{}", "=".repeat(64).bright_cyan());
        println!("{}", "📊 Session Summary".bright_white().bold());
        println!("{}", "=".repeat(64).bright_cyan());
        println!();
        println!("   Total Sessions:  {}", summary.session_count);
        print_token_statistics(summary);
        println!("{}", "=".repeat(64).bright_cyan());
        println!();
        println!("💾 Session data saved to: {}", output_dir.display());
    }

    pub fn display_session_detail(&self, session_id: &str, session: Option<&Session>, show_messages: bool) {
        let Some(session) = session else {
            eprintln!("{} Session not found: {}", "❌".red(), session_id);
            return;
        };

        println!("\n{}", "=".repeat(70).bright_cyan());
        println!("{}", format!("📊 Session Detail: {}", session_id).bright_white().bold());
        println!("{}\n", "=".repeat(70).bright_cyan());

        println!("🕐 Created:  {}", session.created_at.to_rfc3339());
        println!("🕑 Updated:  {}", session.updated_at.to_rfc3339());
        println!("🤖 Model:    {}", session.model);
        println!("💬 Messages: {}", session.messages_count);
        println!();

        let totals = session.totals();
        println!("{}", "📈 Token Statistics:".bright_white());
        if totals.cached_tokens > 0 {
            println!("   Input:       {:>12} tokens (regular)", format_number(totals.regular_input_tokens()));
            println!("   Cached:      {:>12} tokens (from cache)", format_number(totals.cached_tokens));
            println!("   Total Input: {:>12} tokens", format_number(totals.input_tokens));
        } else {
            println!("   Input:       {:>12} tokens", format_number(totals.input_tokens));
        }
        println!("   Output:      {:>12} tokens", format_number(totals.output_tokens));
        if totals.reasoning_tokens > 0 {
            println!("   Reasoning:   {:>12} tokens", format_number(totals.reasoning_tokens));
        }
        println!("   ──────────────────────────");
        println!("   Total:       {:>12} tokens", format_number(totals.total()));
        println!();
        println!(
            "💰 Estimated Cost: {}",
            format!("${:.8} USD", pricing::session_cost(session)).bright_green()
        );
        println!();

        if show_messages {
            self.display_rounds(session);
        }

        println!("\n{}\n", "=".repeat(70).bright_cyan());
    }

    fn display_rounds(&self, session: &Session) {
        println!("📝 Conversation Rounds ({}):", session.rounds.len());
        println!("{}", "─".repeat(70));

        for round in &session.rounds {
            println!("\n  Round {} @ {}", round.round, round.timestamp.to_rfc3339());
            println!(
                "    Tokens: {} in → {} out",
                format_number(round.input_tokens),
                format_number(round.output_tokens)
            );
            if round.has_tool_calls {
                println!("    🔧 Tool calls: Yes");
            }
            if round.response_type != "normal" {
                println!("    Type: {}", round.response_type);
            }

            if !round.messages.is_empty() {
                println!("    Messages ({}):", round.messages.len());
                let skip = round.messages.len().saturating_sub(3);
                for message in round.messages.iter().skip(skip) {
                    let role = message.get("role").and_then(Value::as_str).unwrap_or("unknown");
                    let content = match message.get("content") {
                        Some(Value::String(text)) => text.clone(),
                        Some(other) => other.to_string(),
                        None => String::new(),
                    };
                    println!("      [{}] {}", role, preview(&content, 100));
                }
            }

            if !round.question.is_empty() {
                println!("    ❓ Question: {}", preview(&round.question, PREVIEW_CHARS));
            }
            if !round.answer.is_empty() {
                println!("    ✅ Answer: {}", preview(&round.answer, PREVIEW_CHARS));
            }
            if !round.reasoning.is_empty() {
                println!("    🧠 Reasoning: {}", preview(&round.reasoning, PREVIEW_CHARS));
            }

            if !round.tool_calls.is_empty() {
                println!("    🛠️  Tool Calls:");
                for call in &round.tool_calls {
                    let function = call.get("function");
                    let name = function
                        .and_then(|f| f.get("name"))
                        .and_then(Value::as_str)
                        .unwrap_or("unknown");
                    let args = function
                        .and_then(|f| f.get("arguments"))
                        .and_then(Value::as_str)
                        .unwrap_or("");
                    println!("       - {}({})", name, preview(args, 80));
                }
            }

            if !round.input_token_details.is_empty() {
                println!("    📊 Input Token Details: {}", Value::Object(round.input_token_details.clone()));
            }
            if !round.output_token_details.is_empty() {
                println!("    📊 Output Token Details: {}", Value::Object(round.output_token_details.clone()));
            }
        }

        println!("\n{}", "─".repeat(70));
    }

    pub fn display_session_list(&self, listing: &SessionListing, sort_by: SortKey) {
        let sort_name = match sort_by {
            SortKey::Updated => "updated",
            SortKey::Cost => "cost",
            SortKey::Tokens => "tokens",
        };

        println!("\n{}", "=".repeat(100).bright_cyan());
        println!(
            "{}",
            format!(
                "📋 Sessions (sorted by {}, showing {} of {})",
                sort_name,
                listing.sessions.len(),
                listing.total
            )
            .bright_white()
            .bold()
        );
        println!("{}\n", "=".repeat(100).bright_cyan());

        println!(
            "{:<30} {:<20} {:<15} {:<6} {:>12} {:>10}",
            "Session ID", "Updated", "Model", "Msgs", "Tokens", "Cost"
        );
        println!("{}", "─".repeat(100));

        for session in &listing.sessions {
            let id = if session.session_id.chars().count() > 30 {
                format!("{}..", fit(&session.session_id, 28))
            } else {
                session.session_id.clone()
            };
            println!(
                "{:<30} {:<20} {:<15} {:<6} {:>12} {:>10}",
                id,
                session.updated_at.format("%Y-%m-%dT%H:%M:%S").to_string(),
                fit(&session.model, 13),
                session.messages_count,
                format_number(session.io_tokens()),
                format!("${:.4}", pricing::session_cost(session))
            );
        }

        println!("\n{}\n", "=".repeat(100).bright_cyan());
    }

    pub fn display_model_stats(&self, stats: &BTreeMap<String, ModelStats>) {
        println!("\n{}", "=".repeat(80).bright_cyan());
        println!("{}", "📊 Statistics by Model".bright_white().bold());
        println!("{}\n", "=".repeat(80).bright_cyan());

        println!(
            "{:<20} {:<10} {:>14} {:>14} {:>14}",
            "Model", "Sessions", "Input", "Output", "Cost (USD)"
        );
        println!("{}", "─".repeat(80));

        let mut rows: Vec<_> = stats.iter().collect();
        rows.sort_by(|a, b| b.1.total_cost.total_cmp(&a.1.total_cost));

        let mut total = ModelStats::default();
        for (model, data) in rows {
            println!(
                "{:<20} {:<10} {:>14} {:>14} {:>14}",
                fit(model, 20),
                data.session_count,
                format_number(data.total_input),
                format_number(data.total_output),
                format!("${:.6}", data.total_cost)
            );
            total.session_count += data.session_count;
            total.total_input += data.total_input;
            total.total_output += data.total_output;
            total.total_cost += data.total_cost;
        }

        println!("{}", "─".repeat(80));
        let total_line = format!(
            "{:<20} {:<10} {:>14} {:>14} {:>14}",
            "TOTAL",
            total.session_count,
            format_number(total.total_input),
            format_number(total.total_output),
            format!("${:.6}", total.total_cost)
        );
        println!("{}", total_line.bold());
        println!("\n{}\n", "=".repeat(80).bright_cyan());
    }

    pub fn display_date_stats(&self, stats: &BTreeMap<String, DateStats>, days: i64) {
        println!("\n{}", "=".repeat(90).bright_cyan());
        println!(
            "{}",
            format!("📊 Statistics by Date (Last {} days)", days).bright_white().bold()
        );
        println!("{}\n", "=".repeat(90).bright_cyan());

        println!(
            "{:<12} {:<10} {:>14} {:>14} {:>12}  {}",
            "Date", "Sessions", "Input", "Output", "Cost (USD)", "Models"
        );
        println!("{}", "─".repeat(90));

        let mut total = DateStats::default();
        for (date, data) in stats {
            let shown: Vec<&str> = data.models.iter().map(String::as_str).take(3).collect();
            let mut models_str = shown.join(", ");
            let extra = data.models.len().saturating_sub(3);
            if extra > 0 {
                models_str.push_str(&format!(" +{}", extra));
            }

            println!(
                "{:<12} {:<10} {:>14} {:>14} {:>12}  {}",
                date,
                data.session_count,
                format_number(data.total_input),
                format_number(data.total_output),
                format!("${:.4}", data.total_cost),
                models_str
            );
            total.session_count += data.session_count;
            total.total_input += data.total_input;
            total.total_output += data.total_output;
            total.total_cost += data.total_cost;
        }

        println!("{}", "─".repeat(90));
        let total_line = format!(
            "{:<12} {:<10} {:>14} {:>14} {:>12}",
            "TOTAL",
            total.session_count,
            format_number(total.total_input),
            format_number(total.total_output),
            format!("${:.4}", total.total_cost)
        );
        println!("{}", total_line.bold());
        println!("\n{}\n", "=".repeat(90).bright_cyan());
    }

    pub fn display_export(&self, written: &[PathBuf]) {
        match written {
            [single] => println!("{} FinOps report exported to: {}", "✅".green(), single.display()),
            files => {
                println!("{} FinOps report exported to:", "✅".green());
                for file in files {
                    println!("   {}", file.display());
                }
            }
        }
    }
}
