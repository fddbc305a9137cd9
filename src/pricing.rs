//! Static per-model token pricing.
//!
//! Rates are USD per 1M tokens. Models missing from the table are priced as
//! [`FALLBACK_MODEL`].

use crate::models::{Session, TokenTotals};

pub const FALLBACK_MODEL: &str = "GPT-4";

const PER_MILLION: f64 = 1_000_000.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelRates {
    pub input: f64,
    pub output: f64,
    pub cached: Option<f64>,
    pub reasoning: Option<f64>,
}

const fn rates(input: f64, output: f64, cached: f64, reasoning: Option<f64>) -> ModelRates {
    ModelRates {
        input,
        output,
        cached: Some(cached),
        reasoning,
    }
}

static PRICING_TABLE: &[(&str, ModelRates)] = &[
    ("Qwen", rates(0.0002, 0.0006, 0.0001, None)),
    ("Qwen3-rerank", rates(0.0003, 0.0012, 0.00015, None)),
    ("Qwen-Max", rates(0.0005, 0.002, 0.00025, None)),
    ("GPT-4", rates(0.003, 0.006, 0.0015, None)),
    ("GPT-4o", rates(0.0025, 0.01, 0.00125, None)),
    ("GPT-4-32k", rates(0.01, 0.03, 0.005, None)),
    ("o1", rates(0.015, 0.06, 0.0075, Some(0.06))),
    ("o1-mini", rates(0.003, 0.012, 0.0015, Some(0.012))),
    ("Claude", rates(0.015, 0.075, 0.0015, None)),
    ("DeepSeek-R1", rates(0.004, 0.012, 0.002, Some(0.002))),
];

/// Look up the rates for `model`, exact match only.
pub fn lookup(model: &str) -> Option<ModelRates> {
    PRICING_TABLE
        .iter()
        .find(|(name, _)| *name == model)
        .map(|(_, rates)| *rates)
}

/// Rates for `model`, falling back to [`FALLBACK_MODEL`].
pub fn rates_for(model: &str) -> ModelRates {
    lookup(model)
        .or_else(|| lookup(FALLBACK_MODEL))
        .unwrap_or(ModelRates {
            input: 0.0,
            output: 0.0,
            cached: None,
            reasoning: None,
        })
}

/// Cost in USD of a token mix.
///
/// `cached_tokens` is a subset of `input_tokens`: it is subtracted from the
/// input count and billed separately at the cached rate.
pub fn cost(
    model: &str,
    input_tokens: u64,
    output_tokens: u64,
    reasoning_tokens: u64,
    cached_tokens: u64,
) -> f64 {
    let rates = rates_for(model);
    let regular_input = input_tokens.saturating_sub(cached_tokens);

    let input_cost = regular_input as f64 * rates.input / PER_MILLION;
    let output_cost = output_tokens as f64 * rates.output / PER_MILLION;

    let reasoning_cost = match rates.reasoning {
        Some(rate) if reasoning_tokens > 0 => reasoning_tokens as f64 * rate / PER_MILLION,
        _ => 0.0,
    };

    let cached_cost = match rates.cached {
        Some(rate) if cached_tokens > 0 => cached_tokens as f64 * rate / PER_MILLION,
        _ => 0.0,
    };

    input_cost + output_cost + reasoning_cost + cached_cost
}

pub fn cost_of_totals(model: &str, totals: &TokenTotals) -> f64 {
    cost(
        model,
        totals.input_tokens,
        totals.output_tokens,
        totals.reasoning_tokens,
        totals.cached_tokens,
    )
}

/// Estimated cost of a session, priced at its current model.
pub fn session_cost(session: &Session) -> f64 {
    cost_of_totals(&session.model, &session.totals())
}
