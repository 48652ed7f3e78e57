//! # lumen-core
//!
//! Foundation types for the lumen launcher backend.
//!
//! This crate provides the shared vocabulary that the other lumen crates
//! depend on:
//!
//! - **Envelopes**: `Trigger` (immutable input) and `Outcome` (mutable output)
//!   threaded through every agent invocation
//! - **Chat messages**: `ChatMessage` with role, content, and optional name
//! - **Errors**: the closed `FaultKind` taxonomy plus the `TransportError`
//!   hierarchy via `thiserror`
//! - **Branded IDs**: `ConversationId`, `RequestId` as newtypes for type safety
//! - **Model registry**: per-model pricing and token-accounting constants

#![deny(unsafe_code)]

pub mod chat;
pub mod envelope;
pub mod errors;
pub mod ids;
pub mod models;
