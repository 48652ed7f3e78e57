//! Conversational capability. Thin lifecycle adapter over a [`ChatSession`];
//! all accounting and streaming mechanics live in the session.

use async_trait::async_trait;
use serde_json::Value;

use lumen_core::envelope::Outcome;
use lumen_llm::{ChatSession, StreamingChat};

use crate::agent::Agent;

pub struct ChatAgent {
    session: ChatSession,
}

impl ChatAgent {
    pub fn new(session: ChatSession) -> Self {
        Self { session }
    }

    /// Streamed variant of the side-effecting phase. Warm-up validation
    /// applies as usual; a rejected trigger comes back as the finished
    /// outcome instead of a stream.
    pub fn stream_chat(&self, attrs: Value) -> Result<StreamingChat, Outcome> {
        let outcome = self.warm_up(attrs);
        if !outcome.success {
            return Err(outcome);
        }
        Ok(self.session.open(outcome.trigger))
    }
}

#[async_trait]
impl Agent for ChatAgent {
    fn name(&self) -> &str {
        "chat"
    }

    async fn execute(&self, outcome: &mut Outcome) {
        self.session.complete(outcome).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use serde_json::json;

    use lumen_core::errors::FaultKind;
    use lumen_core::models::ModelRegistry;
    use lumen_llm::mock::{MockExchange, ScriptedTransport};
    use lumen_llm::transport::Completion;
    use lumen_llm::{ChatUpdate, SessionConfig, WhitespaceTokenizer};

    fn agent_with(transport: Arc<ScriptedTransport>) -> ChatAgent {
        let session = ChatSession::new(
            transport as Arc<dyn lumen_llm::ChatTransport>,
            Arc::new(WhitespaceTokenizer),
            Arc::new(ModelRegistry::builtin()),
        )
        .with_config(SessionConfig { cutoff: 1, ..SessionConfig::default() });
        ChatAgent::new(session)
    }

    #[tokio::test]
    async fn act_completes_a_chat_exchange() {
        let transport = Arc::new(ScriptedTransport::new(vec![MockExchange::Reply(Completion {
            content: "a short answer".into(),
            prompt_tokens: 0,
            completion_tokens: 0,
        })]));
        let agent = agent_with(Arc::clone(&transport));
        let outcome = agent.act(json!({"content": "a question"})).await;
        assert!(outcome.success);
        assert_eq!(outcome.content, "a short answer");
        assert!(outcome.input_token_usage > 0);
        assert_eq!(outcome.output_token_usage, 3);
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test]
    async fn act_rejects_blank_content_without_a_call() {
        let transport = Arc::new(ScriptedTransport::new(vec![]));
        let agent = agent_with(Arc::clone(&transport));
        let outcome = agent.act(json!({"content": ""})).await;
        assert!(!outcome.success);
        assert_eq!(outcome.error, Some(FaultKind::Validation));
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn act_surfaces_connection_failures() {
        let transport = Arc::new(ScriptedTransport::new(vec![MockExchange::Error(
            lumen_core::errors::TransportError::Connection("down".into()),
        )]));
        let agent = agent_with(transport);
        let outcome = agent.act(json!({"content": "hello"})).await;
        assert!(!outcome.success);
        assert_eq!(outcome.error, Some(FaultKind::Connection));
        assert_eq!(outcome.input_token_usage, 0);
        assert_eq!(outcome.output_token_usage, 0);
    }

    #[tokio::test]
    async fn stream_chat_yields_chunks_then_the_outcome() {
        let transport = Arc::new(ScriptedTransport::new(vec![MockExchange::Fragments(vec![
            "first ".into(),
            "second".into(),
        ])]));
        let agent = agent_with(transport);
        let mut chat = agent.stream_chat(json!({"content": "go", "stream": true})).unwrap();
        let mut chunks = Vec::new();
        let outcome = loop {
            match chat.next_update().await.expect("stream ended early") {
                ChatUpdate::Chunk(text) => chunks.push(text),
                ChatUpdate::Finished(outcome) => break outcome,
            }
        };
        assert_eq!(chunks.concat(), "first second");
        assert!(outcome.success);
        assert_eq!(outcome.content, "first second");
    }

    #[tokio::test]
    async fn stream_chat_rejects_invalid_triggers_inline() {
        let transport = Arc::new(ScriptedTransport::new(vec![]));
        let agent = agent_with(Arc::clone(&transport));
        let Err(outcome) = agent.stream_chat(json!({"content": "  "})) else {
            panic!("expected a validation rejection");
        };
        assert!(!outcome.success);
        assert_eq!(outcome.error, Some(FaultKind::Validation));
        assert_eq!(transport.call_count(), 0);
    }
}
