//! Scripted transport for deterministic tests. Each call consumes the next
//! exchange from the script, so a test states the backend's behavior up front
//! and never touches the network.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;

use lumen_core::errors::TransportError;

use crate::transport::{ChatRequest, ChatTransport, Completion, FragmentStream};

/// One scripted backend exchange.
#[derive(Clone, Debug)]
pub enum MockExchange {
    /// Complete reply for the non-streaming path.
    Reply(Completion),
    /// Fragment sequence delivered in order, then a clean end of stream.
    Fragments(Vec<String>),
    /// Fragments followed by a mid-stream transport failure.
    FragmentsThenError(Vec<String>, TransportError),
    /// Fragments followed by indefinite silence. For cancellation and idle
    /// timeout tests.
    FragmentsThenStall(Vec<String>),
    /// Failure of the call itself, before any data.
    Error(TransportError),
}

pub struct ScriptedTransport {
    script: Mutex<VecDeque<MockExchange>>,
    calls: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new(script: Vec<MockExchange>) -> Self {
        Self { script: Mutex::new(script.into()), calls: AtomicUsize::new(0) }
    }

    /// Single complete reply with no reported usage.
    pub fn reply_text(text: &str) -> Self {
        Self::new(vec![MockExchange::Reply(Completion {
            content: text.to_string(),
            prompt_tokens: 0,
            completion_tokens: 0,
        })])
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_exchange(&self) -> Result<MockExchange, TransportError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.script
            .lock()
            .pop_front()
            .ok_or_else(|| TransportError::Malformed(format!("no scripted exchange for call {call}")))
    }
}

#[async_trait]
impl ChatTransport for ScriptedTransport {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, _request: &ChatRequest) -> Result<Completion, TransportError> {
        match self.next_exchange()? {
            MockExchange::Reply(completion) => Ok(completion),
            MockExchange::Error(e) => Err(e),
            other => Err(TransportError::Malformed(format!(
                "scripted exchange {other:?} is not a completion"
            ))),
        }
    }

    async fn open_stream(&self, _request: &ChatRequest) -> Result<FragmentStream, TransportError> {
        let (fragments, tail) = match self.next_exchange()? {
            MockExchange::Fragments(f) => (f, Tail::End),
            MockExchange::FragmentsThenError(f, e) => (f, Tail::Error(e)),
            MockExchange::FragmentsThenStall(f) => (f, Tail::Stall),
            MockExchange::Error(e) => return Err(e),
            MockExchange::Reply(_) => {
                return Err(TransportError::Malformed(
                    "scripted completion used on the streaming path".into(),
                ))
            }
        };
        let head = stream::iter(fragments.into_iter().map(Ok));
        Ok(match tail {
            Tail::End => Box::pin(head),
            Tail::Error(e) => Box::pin(head.chain(stream::iter([Err(e)]))),
            Tail::Stall => Box::pin(head.chain(stream::pending())),
        })
    }
}

enum Tail {
    End,
    Error(TransportError),
    Stall,
}
