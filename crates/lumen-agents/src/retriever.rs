//! Structured search capability. Queries two local sources and returns the
//! concatenated matches as the outcome's payload; no model calls, no token
//! usage.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use lumen_core::envelope::Outcome;
use lumen_core::errors::FaultKind;

use crate::agent::Agent;

/// One search hit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Match {
    /// Which source produced the hit.
    pub source: String,
    /// Source-specific grouping, e.g. a prompt collection or command family.
    pub category: String,
    /// The matched record itself.
    pub data: Value,
    /// Field names the query matched on.
    pub match_fields: Vec<String>,
    /// The matched values, parallel to `match_fields`.
    pub match_field_values: Vec<String>,
}

/// Saved prompt lookup.
pub trait PromptStore: Send + Sync {
    fn search(&self, query: &str) -> Vec<Match>;
}

/// Installed command lookup.
pub trait CommandIndex: Send + Sync {
    fn search(&self, query: &str) -> Vec<Match>;
}

pub struct RetrieverAgent {
    store: Arc<dyn PromptStore>,
    commands: Arc<dyn CommandIndex>,
}

impl RetrieverAgent {
    pub fn new(store: Arc<dyn PromptStore>, commands: Arc<dyn CommandIndex>) -> Self {
        Self { store, commands }
    }
}

#[async_trait]
impl Agent for RetrieverAgent {
    fn name(&self) -> &str {
        "retriever"
    }

    /// Store matches first, command matches after, order within each source
    /// preserved.
    async fn execute(&self, outcome: &mut Outcome) {
        let query = outcome.trigger.content.clone();
        let mut matches = self.store.search(&query);
        matches.extend(self.commands.search(&query));
        debug!(count = matches.len(), "retrieval finished");
        match serde_json::to_value(&matches) {
            Ok(payload) => outcome.payload = Some(payload),
            Err(e) => outcome.fail(FaultKind::Unknown, format!("serializing matches: {e}")),
        }
    }
}
