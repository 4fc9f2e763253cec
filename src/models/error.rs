//! Error types for trivium.
//!
//! Epistemic taxonomy:
//! - B_i falsified: Expected failures (unparseable content, rejected cards)
//! - I^B materialized: Infrastructure failures (network, timeout)
//! - K_i violated: Internal invariant violations (bugs)

use std::time::Duration;
use thiserror::Error;

/// Top-level error type for trivium.
#[derive(Debug, Error)]
pub enum TriviumError {
    // ═══════════════════════════════════════════════════════════════════
    // B_i FALSIFIED — Belief proven wrong (expected failures)
    // ═══════════════════════════════════════════════════════════════════

    #[error("Configuration error: {0}")]
    Config(#[from] super::ConfigError),

    #[error("Invalid card: {0}")]
    InvalidCard(String),

    #[error("Card rejected: {0}")]
    Rejected(RejectReason),

    #[error("No valid cards generated after {calls} backend calls")]
    NoValidCards { calls: u32 },

    // ═══════════════════════════════════════════════════════════════════
    // I^B MATERIALIZED — Bounded ignorance became known-bad
    // ═══════════════════════════════════════════════════════════════════

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Pool has no card ready")]
    EmptyPool,

    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // ═══════════════════════════════════════════════════════════════════
    // K_i VIOLATED — Invariant broken (bug, should not happen)
    // ═══════════════════════════════════════════════════════════════════

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Why the style validator refused a card.
///
/// The first matching rule wins; the reason names that rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Question reads like an algebra/combinatorics puzzle.
    MathPuzzle,
    /// Question leans on technical or physics vocabulary.
    TooTechnical,
    /// Question or explanation asks the player to compute something.
    CalculationTask,
    /// Explanation contains arithmetic instead of a factual justification.
    ArithmeticExplanation,
    /// Question length outside the allowed window.
    QuestionLength,
    /// Answer outside the allowed numeric range.
    AnswerRange,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RejectReason::MathPuzzle => "question looks like a math puzzle",
            RejectReason::TooTechnical => "question is too technical",
            RejectReason::CalculationTask => "question asks for a calculation",
            RejectReason::ArithmeticExplanation => "explanation contains arithmetic",
            RejectReason::QuestionLength => "question length out of range",
            RejectReason::AnswerRange => "answer out of range",
        };
        write!(f, "{s}")
    }
}

/// Errors from the chat-completions backend.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Authentication failed: invalid API key")]
    AuthenticationFailed,

    #[error("Rate limited: {message}")]
    RateLimited {
        message: String,
        retry_after_secs: Option<f64>,
    },

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Request timeout after {0:?}")]
    RequestTimeout(Duration),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Request failed after {attempts} attempts: {last_error}")]
    MaxRetriesExceeded { attempts: u32, last_error: String },
}

impl BackendError {
    /// Check if this error is worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. } | Self::Network(_) | Self::RequestTimeout(_) => true,
            Self::Api { status, .. } => *status == 408 || *status >= 500,
            _ => false,
        }
    }
}

impl TriviumError {
    /// Create an IO error with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Backend(e) if e.is_retryable())
    }

    /// Get retry delay hint in seconds, if applicable.
    pub fn retry_after(&self) -> Option<f64> {
        match self {
            Self::Backend(BackendError::RateLimited {
                retry_after_secs, ..
            }) => *retry_after_secs,
            _ => None,
        }
    }
}

/// Result type alias for trivium.
pub type Result<T> = std::result::Result<T, TriviumError>;
