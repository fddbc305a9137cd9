//! Usage record extraction from gateway access-log lines.
//!
//! Each access-log line is a JSON object. Lines produced for LLM traffic carry
//! a payload field (`ai_log` by default) whose value is itself a JSON-encoded
//! usage object. Every other line (plain access entries, partial lines,
//! non-JSON noise) is expected and yields nothing.

use crate::config::{IngestConfig, MissingSessionPolicy};
use crate::models::{TokenDetails, UsageRecord};
use serde::Deserialize;
use serde_json::Value;
use tracing::trace;

/// Wire shape of the usage payload. Field names follow the gateway.
#[derive(Debug, Deserialize)]
struct UsagePayload {
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    input_token: Option<u64>,
    #[serde(default)]
    output_token: Option<u64>,
    #[serde(default)]
    reasoning_tokens: Option<u64>,
    #[serde(default)]
    cached_tokens: Option<u64>,
    #[serde(default)]
    messages: Option<Vec<Value>>,
    #[serde(default)]
    question: Option<String>,
    #[serde(default)]
    answer: Option<String>,
    #[serde(default)]
    reasoning: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<Value>>,
    #[serde(default)]
    input_token_details: Option<TokenDetailsField>,
    #[serde(default)]
    output_token_details: Option<TokenDetailsField>,
    #[serde(default)]
    response_type: Option<String>,
}

/// Token details arrive either structured or as a JSON string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TokenDetailsField {
    Structured(TokenDetails),
    Encoded(String),
}

impl TokenDetailsField {
    fn normalize(self) -> TokenDetails {
        match self {
            Self::Structured(details) => details,
            Self::Encoded(raw) => serde_json::from_str(&raw).unwrap_or_default(),
        }
    }
}

/// Outcome of examining one line.
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    Record(UsageRecord),
    /// Not a usage line, or undecodable.
    Ignored,
    /// A usage payload without `session_id`, dropped by policy.
    MissingSession,
}

impl Extraction {
    pub fn into_record(self) -> Option<UsageRecord> {
        match self {
            Self::Record(record) => Some(record),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RecordExtractor {
    payload_field: String,
    missing_session: MissingSessionPolicy,
    default_session_id: String,
}

impl Default for RecordExtractor {
    fn default() -> Self {
        Self::new(&IngestConfig::default())
    }
}

impl RecordExtractor {
    pub fn new(config: &IngestConfig) -> Self {
        Self {
            payload_field: config.payload_field.clone(),
            missing_session: config.missing_session,
            default_session_id: config.default_session_id.clone(),
        }
    }

    /// Extract a usage record from a raw log line, if it holds one.
    pub fn extract(&self, line: &str) -> Option<UsageRecord> {
        self.classify(line).into_record()
    }

    pub fn classify(&self, line: &str) -> Extraction {
        let line = line.trim();
        if line.is_empty() {
            return Extraction::Ignored;
        }

        let Some(mut payload) = self.decode_payload(line) else {
            return Extraction::Ignored;
        };

        let session_id = match payload.session_id.take() {
            Some(id) if !id.is_empty() => id,
            _ => match self.missing_session {
                MissingSessionPolicy::Bucket => self.default_session_id.clone(),
                MissingSessionPolicy::Reject => {
                    trace!("Dropping usage payload without session_id");
                    return Extraction::MissingSession;
                }
            },
        };

        Extraction::Record(Self::into_record(session_id, payload))
    }

    fn decode_payload(&self, line: &str) -> Option<UsagePayload> {
        let mut outer: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(e) => {
                trace!(error = %e, "Skipping non-JSON log line");
                return None;
            }
        };

        let nested = outer.get_mut(self.payload_field.as_str())?.take();
        let decoded = match nested {
            Value::String(raw) => serde_json::from_str::<UsagePayload>(&raw),
            value @ Value::Object(_) => serde_json::from_value::<UsagePayload>(value),
            _ => return None,
        };

        match decoded {
            Ok(payload) => Some(payload),
            Err(e) => {
                trace!(error = %e, "Skipping undecodable usage payload");
                None
            }
        }
    }

    fn into_record(session_id: String, payload: UsagePayload) -> UsageRecord {
        UsageRecord {
            session_id,
            model: payload.model.unwrap_or_else(|| "unknown".to_string()),
            input_tokens: payload.input_token.unwrap_or(0),
            output_tokens: payload.output_token.unwrap_or(0),
            reasoning_tokens: payload.reasoning_tokens,
            cached_tokens: payload.cached_tokens.unwrap_or(0),
            messages: payload.messages.unwrap_or_default(),
            question: payload.question.unwrap_or_default(),
            answer: payload.answer.unwrap_or_default(),
            reasoning: payload.reasoning.unwrap_or_default(),
            tool_calls: payload.tool_calls.unwrap_or_default(),
            input_token_details: payload
                .input_token_details
                .map(TokenDetailsField::normalize)
                .unwrap_or_default(),
            output_token_details: payload
                .output_token_details
                .map(TokenDetailsField::normalize)
                .unwrap_or_default(),
            response_type: payload
                .response_type
                .unwrap_or_else(|| "normal".to_string()),
        }
    }
}
