//! Token accounting. Usage counters on an outcome must equal what these
//! functions return for the sent message list and the accumulated reply; cost
//! is then derived from them, never from transport-reported numbers.

use lumen_core::chat::ChatMessage;
use lumen_core::models::ModelInfo;

use crate::tokenizer::Tokenizer;

/// Exact prompt-side usage for a message list.
///
/// Per message: the fixed per-message overhead, plus the token counts of the
/// role string and the content, plus the name's count and one extra token
/// when a name is present. One reply-priming overhead is added at the end.
pub fn prompt_token_usage(
    messages: &[ChatMessage],
    info: &ModelInfo,
    tokenizer: &dyn Tokenizer,
) -> u64 {
    let mut total = 0u64;
    for message in messages {
        total += info.extra_tokens_per_message;
        total += tokenizer.count(message.role.as_str()) as u64;
        total += tokenizer.count(&message.content) as u64;
        if let Some(name) = &message.name {
            total += tokenizer.count(name) as u64 + 1;
        }
    }
    total + info.extra_tokens_for_reply
}

/// Reply-side usage: the count of whatever reply text exists, whether the
/// exchange completed or was cancelled partway.
pub fn reply_token_usage(reply: &str, tokenizer: &dyn Tokenizer) -> u64 {
    tokenizer.count(reply) as u64
}
