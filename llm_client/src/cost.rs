//! Per-1M-token pricing table from spec §6, and the estimator the Gateway's
//! pre-flight cost gate calls before every LLM round-trip.

use crate::provider::LLMModel;

/// `(input_per_million_usd, output_per_million_usd)`.
struct Pricing {
    input_per_million: f64,
    output_per_million: f64,
}

const GPT4O: Pricing = Pricing {
    input_per_million: 3.00,
    output_per_million: 10.00,
};
const GPT4O_MINI: Pricing = Pricing {
    input_per_million: 0.15,
    output_per_million: 0.60,
};
const CLAUDE_35_SONNET: Pricing = Pricing {
    input_per_million: 3.00,
    output_per_million: 15.00,
};
const CLAUDE_3_HAIKU: Pricing = Pricing {
    input_per_million: 0.25,
    output_per_million: 1.25,
};

/// Unknown models default to the most expensive row, per spec §6, so a
/// misconfigured or brand-new model name never silently underestimates cost.
const MOST_EXPENSIVE: Pricing = Pricing {
    input_per_million: 3.00,
    output_per_million: 15.00,
};

fn pricing_for(model: &LLMModel) -> &'static Pricing {
    match model {
        LLMModel::Gpt4o => &GPT4O,
        LLMModel::Gpt4oMini => &GPT4O_MINI,
        LLMModel::Claude35Sonnet => &CLAUDE_35_SONNET,
        LLMModel::Claude3Haiku => &CLAUDE_3_HAIKU,
        LLMModel::Custom(_) => &MOST_EXPENSIVE,
    }
}

/// Estimated or actual cost in USD for a call with the given token counts.
pub fn estimate_cost(model: &LLMModel, input_tokens: usize, output_tokens: usize) -> f64 {
    let pricing = pricing_for(model);
    (input_tokens as f64 / 1_000_000.0) * pricing.input_per_million
        + (output_tokens as f64 / 1_000_000.0) * pricing.output_per_million
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_s5_cost_gate_threshold() {
        // spec §8 S5: gpt-4o, in=10_000, out=2_000 -> $0.050
        let cost = estimate_cost(&LLMModel::Gpt4o, 10_000, 2_000);
        assert!((cost - 0.050).abs() < 1e-9);
    }

    #[test]
    fn unknown_model_uses_most_expensive_row() {
        let custom = estimate_cost(&LLMModel::Custom("mystery".into()), 1_000_000, 0);
        let sonnet = estimate_cost(&LLMModel::Claude35Sonnet, 1_000_000, 0);
        assert_eq!(custom, sonnet);
    }

    #[test]
    fn zero_tokens_is_zero_cost() {
        assert_eq!(estimate_cost(&LLMModel::Gpt4o, 0, 0), 0.0);
    }
}
