//! Two-stage coordination. A producing capability runs first; an optional
//! post-processor then receives a transformed copy of the producer's outcome
//! as its own trigger attributes. Both outcomes are kept so callers can bill
//! each stage.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{instrument, warn};

use lumen_core::envelope::Outcome;
use lumen_core::models::ModelRegistry;

use crate::agent::Agent;

/// Builds the post-processor's trigger attributes from the producer's
/// finished outcome.
pub type OutcomeAdapter = Box<dyn Fn(&Outcome) -> Value + Send + Sync>;

/// Default adapter: forward the producer's reply text on the same model.
pub fn forward_content(outcome: &Outcome) -> Value {
    json!({
        "content": outcome.content,
        "model": outcome.trigger.model,
    })
}

pub struct Coordinator {
    producer: Arc<dyn Agent>,
    post_processor: Option<(Arc<dyn Agent>, OutcomeAdapter)>,
}

impl Coordinator {
    pub fn new(producer: Arc<dyn Agent>) -> Self {
        Self { producer, post_processor: None }
    }

    pub fn with_post_processor(mut self, agent: Arc<dyn Agent>, adapter: OutcomeAdapter) -> Self {
        self.post_processor = Some((agent, adapter));
        self
    }

    /// Run the chain. The post-processor only runs when the producer
    /// succeeded; a failed producer short-circuits the chain.
    #[instrument(skip_all, fields(producer = self.producer.name()))]
    pub async fn coordinate(&self, attrs: Value) -> CoordinatedOutcome {
        let produced = self.producer.act(attrs).await;
        let Some((agent, adapter)) = &self.post_processor else {
            return CoordinatedOutcome { produced, processed: None };
        };
        if !produced.success {
            warn!(
                error = %produced.error_message,
                "producer failed, skipping post-processor"
            );
            return CoordinatedOutcome { produced, processed: None };
        }
        let attrs = adapter(&produced);
        let processed = agent.act(attrs).await;
        CoordinatedOutcome { produced, processed: Some(processed) }
    }
}

/// Outcomes of both chain stages. The producer's is always present; the
/// post-processor's only when it ran.
#[derive(Clone, Debug)]
pub struct CoordinatedOutcome {
    pub produced: Outcome,
    pub processed: Option<Outcome>,
}

impl CoordinatedOutcome {
    /// The chain's terminal outcome: the post-processor's when it ran,
    /// otherwise the producer's.
    pub fn terminal(&self) -> &Outcome {
        self.processed.as_ref().unwrap_or(&self.produced)
    }

    /// True only when every stage that ran succeeded.
    pub fn success(&self) -> bool {
        self.produced.success && self.processed.as_ref().map_or(true, |o| o.success)
    }

    /// Combined billing cost of the stages. `None` when any stage ran on a
    /// model the registry does not know.
    pub fn cost(&self, registry: &ModelRegistry) -> Option<f64> {
        let mut total = self.produced.cost(registry)?;
        if let Some(processed) = &self.processed {
            total += processed.cost(registry)?;
        }
        Some(total)
    }
}
