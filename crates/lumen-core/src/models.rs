use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Model id assumed when a trigger does not name one.
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

/// Static pricing and accounting metadata for one model id.
///
/// Prices are USD per 1000 tokens. The `extra_tokens_*` constants are the
/// per-message and per-reply overheads the backend adds on top of the
/// tokenized field values; they are part of the billing contract and must
/// match what the provider actually charges.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub provider: String,
    pub unit_price_input: f64,
    pub unit_price_output: f64,
    pub extra_tokens_per_message: u64,
    pub extra_tokens_for_reply: u64,
}

impl ModelInfo {
    /// Billing cost for a usage pair. Computed on demand, never stored.
    #[allow(clippy::cast_precision_loss)] // token counts never approach 2^52
    pub fn cost(&self, input_tokens: u64, output_tokens: u64) -> f64 {
        input_tokens as f64 / 1000.0 * self.unit_price_input
            + output_tokens as f64 / 1000.0 * self.unit_price_output
    }
}

/// Explicit model metadata registry.
///
/// Passed into sessions at construction instead of living in process-wide
/// state, so tests can substitute their own tables. Read-only once built;
/// share via `Arc`.
#[derive(Clone, Debug, Default)]
pub struct ModelRegistry {
    models: HashMap<String, ModelInfo>,
}

impl ModelRegistry {
    pub fn empty() -> Self {
        Self { models: HashMap::new() }
    }

    /// Registry preloaded with the OpenAI chat model table.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.insert(DEFAULT_MODEL, openai(0.0015, 0.0002));
        registry.insert("gpt-3.5-turbo-16k", openai(0.003, 0.004));
        registry.insert("gpt-4", openai(0.03, 0.06));
        registry.insert("gpt-4-turbo", openai(0.01, 0.03));
        registry.insert("gpt-4o", openai(0.005, 0.015));
        registry.insert("gpt-4o-mini", openai(0.00015, 0.0006));
        registry
    }

    pub fn insert(&mut self, id: impl Into<String>, info: ModelInfo) {
        let _ = self.models.insert(id.into(), info);
    }

    pub fn get(&self, id: &str) -> Option<&ModelInfo> {
        self.models.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.models.contains_key(id)
    }
}

fn openai(unit_price_input: f64, unit_price_output: f64) -> ModelInfo {
    ModelInfo {
        provider: "openai".into(),
        unit_price_input,
        unit_price_output,
        // Per-message framing overhead plus reply priming, as charged by the
        // chat completion endpoints.
        extra_tokens_per_message: 3,
        extra_tokens_for_reply: 3,
    }
}
