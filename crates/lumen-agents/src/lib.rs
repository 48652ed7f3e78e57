//! # lumen-agents
//!
//! The capability lifecycle and the capabilities built on it.
//!
//! - `agent` — the six-phase `Agent` trait and its `act` driver
//! - `chat_agent` — conversational capability over a `ChatSession`
//! - `retriever` — structured search capability, no model calls
//! - `coordinator` — two-stage producer / post-processor chaining

#![deny(unsafe_code)]

pub mod agent;
pub mod chat_agent;
pub mod coordinator;
pub mod retriever;

pub use agent::{Agent, Phase};
pub use chat_agent::ChatAgent;
pub use coordinator::{forward_content, CoordinatedOutcome, Coordinator, OutcomeAdapter};
pub use retriever::{CommandIndex, Match, PromptStore, RetrieverAgent};
