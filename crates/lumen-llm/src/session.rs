//! Streaming chat session.
//!
//! A session reconciles arbitrarily-fragmented transport output with exact
//! token accounting. Each streamed exchange runs in its own worker task and
//! hands updates to the consumer over a capacity-one channel, so the worker
//! suspends after every chunk until the consumer pulls again. Cancellation is
//! cooperative through a token checked at every suspension point; whatever
//! text accumulated before the signal is kept and billed.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use lumen_core::envelope::{Outcome, Trigger};
use lumen_core::errors::{FaultKind, TransportError};
use lumen_core::ids::RequestId;
use lumen_core::models::ModelRegistry;

use crate::tokenizer::Tokenizer;
use crate::transport::{ChatRequest, ChatTransport};
use crate::usage::{prompt_token_usage, reply_token_usage};

/// Default minimum pending-buffer size, in tokens, before a chunk is flushed.
pub const DEFAULT_CUTOFF: usize = 10;

const FRAGMENT_TIMEOUT: Duration = Duration::from_secs(90);

/// Tuning knobs for streamed exchanges.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Tokens accumulated before a chunk is surfaced. Lower values trade
    /// update overhead for responsiveness.
    pub cutoff: usize,
    /// Longest silence tolerated between fragments before the exchange is
    /// treated as a broken connection.
    pub fragment_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { cutoff: DEFAULT_CUTOFF, fragment_timeout: FRAGMENT_TIMEOUT }
    }
}

/// Exchange lifecycle. Transitions are strictly forward.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SessionState {
    Init,
    Streaming,
    Cancelled,
    Completed,
}

fn transition(from: SessionState, to: SessionState) -> SessionState {
    debug!(?from, ?to, "session state");
    to
}

/// Update pulled by the consumer of a streamed exchange.
#[derive(Clone, Debug)]
pub enum ChatUpdate {
    /// Flushed partial reply text, in arrival order.
    Chunk(String),
    /// Terminal result carrying the full reply and exact usage. Emitted
    /// exactly once, after the last chunk.
    Finished(Outcome),
}

/// Pull handle for one in-flight streamed exchange.
///
/// Dropping the handle cancels the exchange and releases its connection.
pub struct StreamingChat {
    updates: mpsc::Receiver<ChatUpdate>,
    cancel: CancellationToken,
}

impl StreamingChat {
    /// Next update, in order. Returns `None` only after the terminal update
    /// has been delivered.
    pub async fn next_update(&mut self) -> Option<ChatUpdate> {
        self.updates.recv().await
    }

    /// Signal cooperative cancellation. Takes effect at the worker's next
    /// suspension point; keep pulling to receive the remainder flush and the
    /// terminal update.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

impl Drop for StreamingChat {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Drives chat exchanges against one transport with exact token accounting.
///
/// Holds no conversation state; callers own history and pass it in with each
/// trigger. Construction wires the three seams explicitly so tests can swap
/// any of them.
pub struct ChatSession {
    transport: Arc<dyn ChatTransport>,
    tokenizer: Arc<dyn Tokenizer>,
    registry: Arc<ModelRegistry>,
    config: SessionConfig,
}

impl ChatSession {
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        tokenizer: Arc<dyn Tokenizer>,
        registry: Arc<ModelRegistry>,
    ) -> Self {
        Self { transport, tokenizer, registry, config: SessionConfig::default() }
    }

    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Single-shot exchange: send, wait for the full reply, fill the outcome
    /// in place. Usage counters come from local accounting; the transport's
    /// reported numbers are only cross-checked for drift.
    #[instrument(skip_all, fields(transport = self.transport.name(), model = %outcome.trigger.model))]
    pub async fn complete(&self, outcome: &mut Outcome) {
        let model = outcome.trigger.model.clone();
        let Some(info) = self.registry.get(&model).cloned() else {
            outcome.fail(FaultKind::Validation, format!("unknown model: {model}"));
            return;
        };
        let request = ChatRequest::from_trigger(&outcome.trigger, false);
        match self.transport.complete(&request).await {
            Ok(completion) => {
                let input = prompt_token_usage(&request.messages, &info, self.tokenizer.as_ref());
                let output = reply_token_usage(&completion.content, self.tokenizer.as_ref());
                if completion.prompt_tokens != input || completion.completion_tokens != output {
                    debug!(
                        reported_prompt = completion.prompt_tokens,
                        counted_prompt = input,
                        reported_completion = completion.completion_tokens,
                        counted_completion = output,
                        "reported usage differs from local accounting"
                    );
                }
                outcome.content = completion.content;
                outcome.input_token_usage = input;
                outcome.output_token_usage = output;
            }
            Err(e) => {
                warn!(error = %e, kind = e.error_kind(), "completion failed");
                outcome.fail(e.fault_kind(), e.to_string());
            }
        }
    }

    /// Open a streamed exchange. The worker task starts immediately; the
    /// returned handle is the only way to observe or cancel it.
    pub fn open(&self, trigger: Trigger) -> StreamingChat {
        let (updates, handle_rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        let worker = SessionWorker {
            transport: Arc::clone(&self.transport),
            tokenizer: Arc::clone(&self.tokenizer),
            registry: Arc::clone(&self.registry),
            config: self.config.clone(),
            cancel: cancel.clone(),
            updates,
        };
        tokio::spawn(worker.run(RequestId::new(), trigger));
        StreamingChat { updates: handle_rx, cancel }
    }
}

enum Delivery {
    Delivered,
    Cancelled,
    Closed,
}

struct SessionWorker {
    transport: Arc<dyn ChatTransport>,
    tokenizer: Arc<dyn Tokenizer>,
    registry: Arc<ModelRegistry>,
    config: SessionConfig,
    cancel: CancellationToken,
    updates: mpsc::Sender<ChatUpdate>,
}

impl SessionWorker {
    #[instrument(skip_all, fields(request_id = %request_id, transport = self.transport.name(), model = %trigger.model))]
    async fn run(self, request_id: RequestId, trigger: Trigger) {
        let mut state = SessionState::Init;
        let mut outcome = Outcome::new(trigger);

        let model = outcome.trigger.model.clone();
        let Some(info) = self.registry.get(&model).cloned() else {
            outcome.fail(FaultKind::Validation, format!("unknown model: {model}"));
            let _ = self.updates.send(ChatUpdate::Finished(outcome)).await;
            return;
        };

        let request = ChatRequest::from_trigger(&outcome.trigger, true);
        let mut fragments = match self.transport.open_stream(&request).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!(error = %e, kind = e.error_kind(), "failed to open stream");
                outcome.fail(e.fault_kind(), e.to_string());
                let _ = self.updates.send(ChatUpdate::Finished(outcome)).await;
                return;
            }
        };
        state = transition(state, SessionState::Streaming);

        let mut reply = String::new();
        let mut pending = String::new();
        let mut failure: Option<TransportError> = None;
        let mut consumer_gone = false;

        'stream: loop {
            let timed = tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    state = transition(state, SessionState::Cancelled);
                    break 'stream;
                }
                timed = tokio::time::timeout(self.config.fragment_timeout, fragments.next()) => timed,
            };
            let item = match timed {
                Ok(item) => item,
                Err(_) => {
                    failure = Some(TransportError::IdleTimeout(self.config.fragment_timeout));
                    break 'stream;
                }
            };
            match item {
                None => break 'stream,
                Some(Err(e)) => {
                    failure = Some(e);
                    break 'stream;
                }
                Some(Ok(fragment)) => {
                    pending.push_str(&fragment);
                    // The unflushed tail is re-tokenized each fragment; it is
                    // bounded by the cutoff so this stays cheap on long replies.
                    if self.tokenizer.count(&pending) < self.config.cutoff {
                        continue;
                    }
                    let chunk = std::mem::take(&mut pending);
                    match self.deliver(ChatUpdate::Chunk(chunk.clone())).await {
                        Delivery::Delivered => reply.push_str(&chunk),
                        Delivery::Cancelled => {
                            // Never observed by the consumer; put it back so
                            // the terminal content still carries it.
                            pending = chunk;
                            state = transition(state, SessionState::Cancelled);
                            break 'stream;
                        }
                        Delivery::Closed => {
                            pending = chunk;
                            consumer_gone = true;
                            state = transition(state, SessionState::Cancelled);
                            break 'stream;
                        }
                    }
                }
            }
        }

        // Release the connection before final delivery; a cancelled exchange
        // must not hold it open while the consumer drains.
        drop(fragments);

        if state == SessionState::Streaming {
            state = transition(state, SessionState::Completed);
        }

        if !pending.is_empty() {
            reply.push_str(&pending);
            if !consumer_gone {
                let _ = self.updates.send(ChatUpdate::Chunk(std::mem::take(&mut pending))).await;
            }
        }

        outcome.content = reply;
        if failure.is_none() || !outcome.content.is_empty() {
            outcome.input_token_usage =
                prompt_token_usage(&request.messages, &info, self.tokenizer.as_ref());
            outcome.output_token_usage =
                reply_token_usage(&outcome.content, self.tokenizer.as_ref());
        }
        if let Some(e) = failure {
            warn!(error = %e, kind = e.error_kind(), "stream failed");
            outcome.fail(e.fault_kind(), e.to_string());
        }
        debug!(?state, reply_chars = outcome.content.len(), "exchange finished");
        let _ = self.updates.send(ChatUpdate::Finished(outcome)).await;
    }

    /// Hand one update to the consumer. Blocks until pulled; a cancellation
    /// signalled while blocked wins so the worker never deadlocks against a
    /// consumer that stopped pulling.
    async fn deliver(&self, update: ChatUpdate) -> Delivery {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Delivery::Cancelled,
            sent = self.updates.send(update) => match sent {
                Ok(()) => Delivery::Delivered,
                Err(_) => Delivery::Closed,
            },
        }
    }
}
