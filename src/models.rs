//! Core Data Models
//!
//! This module defines the data structures that flow through the ingestion
//! pipeline, from a single decoded log line to the durable per-session record.
//!
//! ## Data Flow
//!
//! 1. **Raw Data**: [`UsageRecord`] - one usage payload extracted from an access-log line
//! 2. **Aggregation**: [`Session`] - running totals plus the append-only [`Round`] history
//! 3. **Output**: [`Summary`] - aggregate view across every in-memory session
//!
//! ## Persisted Format
//!
//! [`Session`] and [`Round`] serialize with snake_case field names. The session
//! files are read by external tooling, so renaming a field is a breaking change.
//!
//! ## Token Accounting
//!
//! Cached tokens are a *subset* of input tokens. Totals therefore never add
//! cached tokens on top of input tokens when reporting a token count.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Characters per token used when a record carries reasoning text but no
/// explicit reasoning token count.
pub const CHARS_PER_TOKEN: usize = 4;

/// Token breakdown in canonical structured form.
///
/// Upstream sends these either as JSON objects or as JSON-encoded strings;
/// the extractor normalizes both into this type.
pub type TokenDetails = Map<String, Value>;

/// A single usage record extracted from one log line.
#[derive(Debug, Clone, PartialEq)]
pub struct UsageRecord {
    pub session_id: String,
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    /// Explicit reasoning token count, when the gateway reported one.
    pub reasoning_tokens: Option<u64>,
    pub cached_tokens: u64,
    pub messages: Vec<Value>,
    pub question: String,
    pub answer: String,
    pub reasoning: String,
    pub tool_calls: Vec<Value>,
    pub input_token_details: TokenDetails,
    pub output_token_details: TokenDetails,
    pub response_type: String,
}

impl UsageRecord {
    /// Reasoning tokens attributed to this record.
    ///
    /// Falls back to `len(reasoning) / 4` when no explicit (non-zero) count was
    /// reported. The estimate is a rough heuristic, not an exact count.
    pub fn effective_reasoning_tokens(&self) -> u64 {
        match self.reasoning_tokens {
            Some(tokens) if tokens > 0 => tokens,
            _ => (self.reasoning.chars().count() / CHARS_PER_TOKEN) as u64,
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// One request/response exchange appended to a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Round {
    /// 1-based ordinal, equal to the session's message count at append time.
    pub round: u64,
    pub timestamp: DateTime<Utc>,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub reasoning_tokens: u64,
    pub cached_tokens: u64,
    pub model: String,
    pub has_tool_calls: bool,
    pub response_type: String,
    #[serde(default)]
    pub messages: Vec<Value>,
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub answer: String,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub tool_calls: Vec<Value>,
    #[serde(default)]
    pub input_token_details: TokenDetails,
    #[serde(default)]
    pub output_token_details: TokenDetails,
}

/// Durable per-conversation aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub messages_count: u64,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    #[serde(default)]
    pub total_reasoning_tokens: u64,
    #[serde(default)]
    pub total_cached_tokens: u64,
    pub model: String,
    #[serde(default)]
    pub rounds: Vec<Round>,
}

impl Session {
    pub fn new(session_id: String, model: String, now: DateTime<Utc>) -> Self {
        Self {
            session_id,
            created_at: now,
            updated_at: now,
            messages_count: 0,
            total_input_tokens: 0,
            total_output_tokens: 0,
            total_reasoning_tokens: 0,
            total_cached_tokens: 0,
            model,
            rounds: Vec::new(),
        }
    }

    /// Fold one record into the running totals and append its round.
    pub fn apply(&mut self, record: UsageRecord, now: DateTime<Utc>) {
        let reasoning_tokens = record.effective_reasoning_tokens();
        let has_tool_calls = record.has_tool_calls();

        self.updated_at = now;
        self.model = record.model.clone();

        // Counters saturate so totals never decrease on hostile counts.
        self.total_input_tokens = self.total_input_tokens.saturating_add(record.input_tokens);
        self.total_output_tokens = self.total_output_tokens.saturating_add(record.output_tokens);
        self.total_reasoning_tokens = self.total_reasoning_tokens.saturating_add(reasoning_tokens);
        self.total_cached_tokens = self.total_cached_tokens.saturating_add(record.cached_tokens);
        self.messages_count += 1;

        self.rounds.push(Round {
            round: self.messages_count,
            timestamp: now,
            input_tokens: record.input_tokens,
            output_tokens: record.output_tokens,
            reasoning_tokens,
            cached_tokens: record.cached_tokens,
            model: record.model,
            has_tool_calls,
            response_type: record.response_type,
            messages: record.messages,
            question: record.question,
            answer: record.answer,
            reasoning: record.reasoning,
            tool_calls: record.tool_calls,
            input_token_details: record.input_token_details,
            output_token_details: record.output_token_details,
        });
    }

    pub fn totals(&self) -> TokenTotals {
        TokenTotals {
            input_tokens: self.total_input_tokens,
            output_tokens: self.total_output_tokens,
            reasoning_tokens: self.total_reasoning_tokens,
            cached_tokens: self.total_cached_tokens,
        }
    }

    /// Input plus output tokens, the figure used to rank sessions.
    pub fn io_tokens(&self) -> u64 {
        self.total_input_tokens.saturating_add(self.total_output_tokens)
    }
}

/// The four running counters shared by sessions and summaries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenTotals {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub reasoning_tokens: u64,
    pub cached_tokens: u64,
}

impl TokenTotals {
    pub fn add(&mut self, other: &TokenTotals) {
        self.input_tokens = self.input_tokens.saturating_add(other.input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(other.output_tokens);
        self.reasoning_tokens = self.reasoning_tokens.saturating_add(other.reasoning_tokens);
        self.cached_tokens = self.cached_tokens.saturating_add(other.cached_tokens);
    }

    /// Billable token count. Cached tokens are already part of input.
    pub fn total(&self) -> u64 {
        self.input_tokens
            .saturating_add(self.output_tokens)
            .saturating_add(self.reasoning_tokens)
    }

    /// Input tokens that were not served from the prompt cache.
    pub fn regular_input_tokens(&self) -> u64 {
        self.input_tokens.saturating_sub(self.cached_tokens)
    }
}

/// Aggregate view over every session held by an aggregator.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Summary {
    pub session_count: usize,
    pub totals: TokenTotals,
    pub total_tokens: u64,
    pub total_cost_usd: f64,
    pub session_ids: Vec<String>,
}
