//! Tokenizer seam. Accounting only ever observes encoded length, but the
//! trait exposes the full encoding so callers can reuse it for chunk cutoff
//! decisions against the same vocabulary the backend bills with.

use tiktoken_rs::{cl100k_base, get_bpe_from_model, CoreBPE};

/// Text-to-token encoder matching a model's billing vocabulary.
pub trait Tokenizer: Send + Sync {
    fn encode(&self, text: &str) -> Vec<u32>;

    fn count(&self, text: &str) -> usize {
        self.encode(text).len()
    }
}

#[derive(Debug, thiserror::Error)]
#[error("no tokenizer available for model {model}: {message}")]
pub struct TokenizerError {
    pub model: String,
    pub message: String,
}

/// BPE tokenizer backed by the tiktoken vocabularies.
pub struct BpeTokenizer {
    bpe: CoreBPE,
}

impl BpeTokenizer {
    /// Tokenizer for the given model id. Unrecognized ids fall back to the
    /// `cl100k_base` vocabulary shared by the chat model family.
    pub fn for_model(model: &str) -> Result<Self, TokenizerError> {
        let bpe = get_bpe_from_model(model)
            .or_else(|_| cl100k_base())
            .map_err(|e| TokenizerError { model: model.to_string(), message: e.to_string() })?;
        Ok(Self { bpe })
    }
}

impl Tokenizer for BpeTokenizer {
    fn encode(&self, text: &str) -> Vec<u32> {
        self.bpe
            .encode_ordinary(text)
            .into_iter()
            .map(|token| token as u32)
            .collect()
    }
}

/// Whitespace-splitting tokenizer. Deterministic and vocabulary-free; used by
/// tests and offline estimates where exact billing parity is not required.
#[derive(Clone, Copy, Debug, Default)]
pub struct WhitespaceTokenizer;

impl Tokenizer for WhitespaceTokenizer {
    fn encode(&self, text: &str) -> Vec<u32> {
        (0..text.split_whitespace().count() as u32).collect()
    }
}
