//! Run progress events: wire shape of everything the engine publishes.
//!
//! This crate defines the typed events a run emits while executing (status
//! changes, per-model progress, streamed tokens, judge verdicts). It does not
//! depend on the engine; both the engine's bus and the HTTP layer serialize
//! [`RunEvent`] with `to_json` and write the result as one SSE data line.

pub mod event;

pub use event::{to_json, RunEvent, TokenKind, Verdict};
