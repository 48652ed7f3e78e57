//! # lumen-llm
//!
//! The chat exchange core: transport and tokenizer seams, exact token
//! accounting, and the token-streamed session with cooperative cancellation.
//!
//! - `transport` — the `ChatTransport` trait every backend implements
//! - `tokenizer` — the `Tokenizer` trait plus the tiktoken-backed BPE impl
//! - `usage` — the billing-correctness accounting contract
//! - `session` — `ChatSession`: streaming and single-shot exchanges
//! - `openai` — OpenAI-compatible HTTP transport (SSE streaming)
//! - `mock` — scripted transport for deterministic tests

#![deny(unsafe_code)]

pub mod mock;
pub mod openai;
pub mod session;
pub mod tokenizer;
pub mod transport;
pub mod usage;

pub use session::{ChatSession, ChatUpdate, SessionConfig, StreamingChat};
pub use tokenizer::{BpeTokenizer, Tokenizer, WhitespaceTokenizer};
pub use transport::{ChatRequest, ChatTransport, Completion, FragmentStream};
