use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::chat::ChatMessage;
use crate::errors::FaultKind;
use crate::ids::ConversationId;
use crate::models::{ModelRegistry, DEFAULT_MODEL};

/// Immutable input envelope describing one requested operation.
///
/// Built once by the lifecycle's warm-up phase from a raw attribute map and
/// never mutated afterwards. Invariant: `content` must be non-empty for the
/// side-effecting phases to run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Trigger {
    #[serde(default)]
    pub content: String,
    #[serde(default = "default_model_id")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default)]
    pub conversation_id: ConversationId,
    /// Advisory: records whether the caller asked for streamed delivery.
    /// The delivery mode itself is chosen by the entry point (`act` for a
    /// single-shot exchange, `stream_chat` for a streamed one).
    #[serde(default)]
    pub stream: bool,
    /// Prior turns, chronological order significant.
    #[serde(default)]
    pub history: Vec<ChatMessage>,
}

fn default_model_id() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_temperature() -> f64 {
    0.5
}

impl Default for Trigger {
    fn default() -> Self {
        Self {
            content: String::new(),
            model: default_model_id(),
            temperature: default_temperature(),
            conversation_id: ConversationId::new(),
            stream: false,
            history: Vec::new(),
        }
    }
}

impl Trigger {
    pub fn new(content: impl Into<String>) -> Self {
        Self { content: content.into(), ..Self::default() }
    }

    /// Parse a raw attribute map. Unknown model names are allowed here; they
    /// are rejected later against the registry.
    pub fn from_attrs(attrs: Value) -> Result<Self, String> {
        serde_json::from_value(attrs).map_err(|e| format!("invalid trigger attributes: {e}"))
    }

    /// Full outbound message list: history followed by the new user turn.
    pub fn messages(&self) -> Vec<ChatMessage> {
        let mut messages = self.history.clone();
        messages.push(ChatMessage::user(&self.content));
        messages
    }
}

/// Mutable output envelope threaded through the lifecycle phases.
///
/// Owns its originating [`Trigger`]; the trigger never references back.
/// Created alongside the trigger during warm-up, mutated in place by later
/// phases, and handed to the caller as the terminal value of `act`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Outcome {
    pub trigger: Trigger,
    pub content: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<FaultKind>,
    #[serde(default)]
    pub error_message: String,
    #[serde(default)]
    pub input_token_usage: u64,
    #[serde(default)]
    pub output_token_usage: u64,
    /// Structured result data for capabilities whose output is not plain
    /// text (e.g. search matches). Absent for chat.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl Outcome {
    pub fn new(trigger: Trigger) -> Self {
        Self {
            trigger,
            content: String::new(),
            success: true,
            error: None,
            error_message: String::new(),
            input_token_usage: 0,
            output_token_usage: 0,
            payload: None,
        }
    }

    pub fn failed(trigger: Trigger, kind: FaultKind, message: impl Into<String>) -> Self {
        let mut outcome = Self::new(trigger);
        outcome.fail(kind, message);
        outcome
    }

    /// Mark this outcome failed in place.
    pub fn fail(&mut self, kind: FaultKind, message: impl Into<String>) {
        self.success = false;
        self.error = Some(kind);
        self.error_message = message.into();
    }

    /// Billing cost derived from the token counters and a pricing lookup.
    /// Recomputed on every call, never cached. `None` when the trigger's
    /// model is not in the registry.
    pub fn cost(&self, registry: &ModelRegistry) -> Option<f64> {
        registry
            .get(&self.trigger.model)
            .map(|info| info.cost(self.input_token_usage, self.output_token_usage))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ModelInfo;
    use serde_json::json;

    #[test]
    fn trigger_from_minimal_attrs() {
        let trigger = Trigger::from_attrs(json!({"content": "Hello"})).unwrap();
        assert_eq!(trigger.content, "Hello");
        assert_eq!(trigger.model, DEFAULT_MODEL);
        assert_eq!(trigger.temperature, 0.5);
        assert!(!trigger.stream);
        assert!(trigger.history.is_empty());
        assert!(trigger.conversation_id.as_str().starts_with("conv_"));
    }

    #[test]
    fn trigger_from_full_attrs() {
        let trigger = Trigger::from_attrs(json!({
            "content": "summarize this",
            "model": "gpt-4",
            "temperature": 0.2,
            "conversation_id": "conv_existing",
            "stream": true,
            "history": [
                {"role": "user", "content": "earlier question"},
                {"role": "assistant", "content": "earlier answer"}
            ]
        }))
        .unwrap();
        assert_eq!(trigger.model, "gpt-4");
        assert_eq!(trigger.temperature, 0.2);
        assert_eq!(trigger.conversation_id.as_str(), "conv_existing");
        assert!(trigger.stream);
        assert_eq!(trigger.history.len(), 2);
    }

    #[test]
    fn trigger_rejects_malformed_attrs() {
        let err = Trigger::from_attrs(json!({"history": "not-a-list"})).unwrap_err();
        assert!(err.contains("invalid trigger attributes"), "got: {err}");
    }

    #[test]
    fn messages_appends_user_turn_after_history() {
        let mut trigger = Trigger::new("and now?");
        trigger.history = vec![
            ChatMessage::user("first"),
            ChatMessage::assistant("second"),
        ];
        let messages = trigger.messages();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[2], ChatMessage::user("and now?"));
    }

    #[test]
    fn new_outcome_is_successful_and_empty() {
        let outcome = Outcome::new(Trigger::new("hi"));
        assert!(outcome.success);
        assert!(outcome.error.is_none());
        assert!(outcome.content.is_empty());
        assert_eq!(outcome.input_token_usage, 0);
        assert_eq!(outcome.output_token_usage, 0);
    }

    #[test]
    fn fail_mutates_in_place() {
        let mut outcome = Outcome::new(Trigger::new("hi"));
        outcome.fail(FaultKind::Connection, "api unreachable");
        assert!(!outcome.success);
        assert_eq!(outcome.error, Some(FaultKind::Connection));
        assert_eq!(outcome.error_message, "api unreachable");
    }

    #[test]
    fn cost_derived_from_counters_and_registry() {
        let registry = ModelRegistry::builtin();
        let mut outcome = Outcome::new(Trigger::new("hi"));
        outcome.input_token_usage = 2000;
        outcome.output_token_usage = 500;
        let cost = outcome.cost(&registry).unwrap();
        assert!((cost - 0.0031).abs() < 1e-12, "got {cost}");
    }

    #[test]
    fn cost_none_for_unknown_model() {
        let registry = ModelRegistry::builtin();
        let mut outcome = Outcome::new(Trigger::new("hi"));
        outcome.trigger.model = "unlisted-model".into();
        assert!(outcome.cost(&registry).is_none());
    }

    #[test]
    fn cost_not_cached_between_calls() {
        let mut registry = ModelRegistry::builtin();
        let mut outcome = Outcome::new(Trigger::new("hi"));
        outcome.input_token_usage = 1000;
        let first = outcome.cost(&registry).unwrap();
        registry.insert(
            DEFAULT_MODEL,
            ModelInfo {
                provider: "openai".into(),
                unit_price_input: 1.0,
                unit_price_output: 1.0,
                extra_tokens_per_message: 3,
                extra_tokens_for_reply: 3,
            },
        );
        let second = outcome.cost(&registry).unwrap();
        assert!(second > first, "cost must be recomputed per call");
    }

    #[test]
    fn outcome_serde_roundtrip() {
        let mut outcome = Outcome::new(Trigger::new("hi"));
        outcome.fail(FaultKind::Unknown, "boom");
        let json = serde_json::to_string(&outcome).unwrap();
        let parsed: Outcome = serde_json::from_str(&json).unwrap();
        assert!(!parsed.success);
        assert_eq!(parsed.error, Some(FaultKind::Unknown));
        assert_eq!(parsed.trigger.content, "hi");
    }
}
