//! Token-usage accounting.
//!
//! Every model-invoking node appends a [`TokenDataPoint`] to the run's
//! ledger channel. The ledger is append-only for the lifetime of the run;
//! [`aggregate_by_model`] rolls it up for external reporting.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One model invocation's worth of token usage.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenDataPoint {
    /// Model identifier as reported by the provider.
    pub model: String,
    /// Tokens consumed by the prompt.
    pub prompt_tokens: u64,
    /// Tokens produced in the completion.
    pub completion_tokens: u64,
    /// When the invocation finished.
    pub timestamp: DateTime<Utc>,
    /// The graph node that made the call.
    pub node: String,
}

impl TokenDataPoint {
    /// Records a data point stamped with the current time.
    #[must_use]
    pub fn now(
        model: impl Into<String>,
        prompt_tokens: u64,
        completion_tokens: u64,
        node: impl Into<String>,
    ) -> Self {
        Self {
            model: model.into(),
            prompt_tokens,
            completion_tokens,
            timestamp: Utc::now(),
            node: node.into(),
        }
    }

    /// Total tokens for this invocation.
    #[must_use]
    pub fn total_tokens(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// Per-model roll-up of a run's ledger, the shape pushed to the tracker.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelUsage {
    pub model: String,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub invocations: u64,
}

/// Aggregates ledger entries per model, preserving first-seen model order so
/// repeated pushes for the same ledger serialize identically.
#[must_use]
pub fn aggregate_by_model(ledger: &[TokenDataPoint]) -> Vec<ModelUsage> {
    let mut out: Vec<ModelUsage> = Vec::new();
    for point in ledger {
        match out.iter_mut().find(|u| u.model == point.model) {
            Some(usage) => {
                usage.prompt_tokens += point.prompt_tokens;
                usage.completion_tokens += point.completion_tokens;
                usage.invocations += 1;
            }
            None => out.push(ModelUsage {
                model: point.model.clone(),
                prompt_tokens: point.prompt_tokens,
                completion_tokens: point.completion_tokens,
                invocations: 1,
            }),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregation_preserves_first_seen_order() {
        let ledger = vec![
            TokenDataPoint::now("gpt-a", 10, 5, "plan"),
            TokenDataPoint::now("gpt-b", 1, 1, "act"),
            TokenDataPoint::now("gpt-a", 7, 3, "act"),
        ];
        let agg = aggregate_by_model(&ledger);
        assert_eq!(agg.len(), 2);
        assert_eq!(agg[0].model, "gpt-a");
        assert_eq!(agg[0].prompt_tokens, 17);
        assert_eq!(agg[0].completion_tokens, 8);
        assert_eq!(agg[0].invocations, 2);
        assert_eq!(agg[1].model, "gpt-b");
    }
}
