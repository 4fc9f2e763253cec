//! trivium - Short numeric trivia cards from an unreliable text backend.
//!
//! ## Architecture
//!
//! trivium turns free-form chat-completions output into validated cards:
//! - **Parser**: Tiered extraction, from strict JSON down to labeled lines
//! - **Validator**: Ordered style rules that reject off-genre questions
//! - **Generator**: Budgeted batching with per-run deduplication
//! - **Pool**: Buffered card supply, refilled by a background task
//!
//! ## Card sources
//!
//! - **LLM**: Chat-completions backend behind the pool
//! - **CSV**: Offline shuffled deck for play without a backend
//!
//! ## Epistemic Design
//!
//! - K_i (Knowledge): Compile-time enforced invariants (types, enums)
//! - B_i (Beliefs): Runtime fallible operations (Result, Option)
//! - I^R (Resolvable): User-configurable parameters
//! - I^B (Bounded): Network/backend uncertainties (retry, backoff)

pub mod client;
pub mod front;
pub mod generate;
pub mod models;
pub mod pool;
pub mod source;

// Re-exports for convenience
pub use client::{LlmClient, TriviaBackend};
pub use generate::{CardGenerator, StyleValidator, parse_card, parse_cards};
pub use models::{Card, Config, Result, TriviumError};
pub use pool::CardPool;
pub use source::{CardSupply, CsvDeck};
