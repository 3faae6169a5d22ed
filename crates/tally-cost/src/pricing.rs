// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Provider pricing tables and cost calculation.
//!
//! Anthropic, per MTok: Haiku input=$1.00 output=$5.00, Sonnet input=$3.00
//! output=$15.00, Opus input=$15.00 output=$75.00.
//! OpenAI, per MTok: see [`OPENAI_PRICING`].
//! Ollama and the Claude CLI bridge are free at the point of use.

use tally_core::TokenUsage;
use tracing::debug;

/// Per-model pricing in USD per million tokens.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelPricing {
    pub input_per_mtok: f64,
    pub output_per_mtok: f64,
}

impl ModelPricing {
    pub const FREE: Self = Self {
        input_per_mtok: 0.0,
        output_per_mtok: 0.0,
    };

    const fn new(input_per_mtok: f64, output_per_mtok: f64) -> Self {
        Self {
            input_per_mtok,
            output_per_mtok,
        }
    }
}

/// OpenAI model families, longest prefix first so `gpt-4o-mini` wins over `gpt-4o`.
pub const OPENAI_PRICING: &[(&str, ModelPricing)] = &[
    ("gpt-4o-mini", ModelPricing::new(0.15, 0.60)),
    ("gpt-4-turbo", ModelPricing::new(10.0, 30.0)),
    ("o1-preview", ModelPricing::new(15.0, 60.0)),
    ("gpt-4o", ModelPricing::new(2.50, 10.0)),
    ("o1-mini", ModelPricing::new(3.0, 12.0)),
];

/// Anthropic pricing by model family substring. Unknown models price as Sonnet.
fn anthropic_pricing(model: &str) -> ModelPricing {
    let lower = model.to_lowercase();
    if lower.contains("opus") {
        ModelPricing::new(15.0, 75.0)
    } else if lower.contains("haiku") {
        ModelPricing::new(1.0, 5.0)
    } else {
        ModelPricing::new(3.0, 15.0)
    }
}

fn openai_pricing(model: &str) -> ModelPricing {
    let lower = model.to_lowercase();
    OPENAI_PRICING
        .iter()
        .find(|(family, _)| lower.contains(family))
        .map(|(_, pricing)| *pricing)
        .unwrap_or_else(|| {
            debug!(model, "no OpenAI pricing for model, recording zero cost");
            ModelPricing::FREE
        })
}

/// Look up pricing for a provider/model pair.
pub fn get_pricing(provider: &str, model: &str) -> ModelPricing {
    match provider {
        "anthropic" => anthropic_pricing(model),
        "openai" => openai_pricing(model),
        _ => ModelPricing::FREE,
    }
}

/// Cost in USD: (tokens / 1M) * price for input and output.
pub fn calculate_cost(usage: &TokenUsage, pricing: &ModelPricing) -> f64 {
    let input = (f64::from(usage.input_tokens) / 1_000_000.0) * pricing.input_per_mtok;
    let output = (f64::from(usage.output_tokens) / 1_000_000.0) * pricing.output_per_mtok;
    input + output
}
