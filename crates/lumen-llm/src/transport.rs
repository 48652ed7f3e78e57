//! Backend seam. A `ChatTransport` knows how to carry one chat exchange to
//! some model backend and back; everything above it (accounting, chunking,
//! cancellation) is backend-agnostic.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::Serialize;

use lumen_core::chat::ChatMessage;
use lumen_core::envelope::Trigger;
use lumen_core::errors::TransportError;

/// Outbound request handed to a transport.
#[derive(Clone, Debug, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f64,
    pub stream: bool,
}

impl ChatRequest {
    /// Request for a trigger: its history followed by the new user turn.
    pub fn from_trigger(trigger: &Trigger, stream: bool) -> Self {
        Self {
            model: trigger.model.clone(),
            messages: trigger.messages(),
            temperature: trigger.temperature,
            stream,
        }
    }
}

/// One complete (non-streamed) exchange as reported by the backend.
///
/// The reported token counters are advisory; billing always uses locally
/// counted usage so every backend is held to the same contract.
#[derive(Clone, Debug, PartialEq)]
pub struct Completion {
    pub content: String,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

/// Incremental reply text as the backend produces it. Fragments are arbitrary
/// slices of the reply, not aligned to token or word boundaries. Dropping the
/// stream releases the underlying connection.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, TransportError>> + Send>>;

#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &str;

    /// Send the full message list and wait for one complete reply.
    async fn complete(&self, request: &ChatRequest) -> Result<Completion, TransportError>;

    /// Open an incremental delivery stream for the same request shape.
    async fn open_stream(&self, request: &ChatRequest) -> Result<FragmentStream, TransportError>;
}
