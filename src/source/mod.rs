//! Card sources - where front ends draw their cards from.
//!
//! Two supplies exist: a self-replenishing pool over a chat backend, and
//! an offline deck loaded from CSV files. `CardSupply` folds both behind
//! one draw/stop surface so the front ends stay source-agnostic.

mod csv;

pub use csv::*;

use crate::client::LlmClient;
use crate::generate::{CardGenerator, StyleValidator};
use crate::models::{Card, Config, ConfigError, Result, SourceKind};
use crate::pool::CardPool;
use std::time::Duration;

/// Grace period for a pool that reports cards ready.
const READY_WAIT: Duration = Duration::from_millis(200);

/// A front end's card supply, built from `[source]` config.
pub enum CardSupply {
    /// LLM-generated cards, buffered and refilled in the background
    Pool(CardPool<LlmClient>),
    /// Shuffled CSV deck, dealt instantly
    Deck(CsvDeck),
}

impl CardSupply {
    /// Build the supply the config asks for.
    pub fn from_config(config: &Config) -> Result<Self> {
        match config.source.kind {
            SourceKind::Llm => {
                let backend = LlmClient::new(config.llm()?.clone())?;
                let validator = StyleValidator::new(&config.style)?;
                let generator = CardGenerator::new(backend, validator);
                Ok(Self::Pool(CardPool::new(generator, config.pool)?))
            }
            SourceKind::Csv => {
                let dir = config.source.csv_dir.as_ref().ok_or(ConfigError::Invalid {
                    field: "source.csv_dir",
                    reason: "required when source.kind = \"csv\"".to_string(),
                })?;
                let deck = CsvDeck::from_dir(dir, config.source.delimiter_byte()?)?;
                Ok(Self::Deck(deck))
            }
        }
    }

    /// Begin background refills. No-op for a deck.
    pub async fn start(&self) {
        if let Self::Pool(pool) = self {
            pool.start().await;
        }
    }

    /// Draw the next card.
    ///
    /// An empty pool is given `empty_wait` to come up with a card; a
    /// stocked pool only gets a short grace period. A deck deals
    /// instantly and never runs out.
    pub async fn draw(&self, empty_wait: Duration) -> Result<Card> {
        match self {
            Self::Pool(pool) => {
                let wait = if pool.size() == 0 {
                    empty_wait
                } else {
                    READY_WAIT
                };
                pool.acquire(wait).await
            }
            Self::Deck(deck) => Ok(deck.next_card().await),
        }
    }

    /// Stop background refills. Already-drawn state is unaffected and a
    /// deck keeps dealing.
    pub fn stop(&self) {
        if let Self::Pool(pool) = self {
            pool.stop();
        }
    }
}
