//! CSV card source for offline play.
//!
//! Epistemic foundation:
//! - K_i: A directory of CSV files with `question` and `answer` columns
//!   is a complete card supply; no backend involved
//! - B_i: Individual rows may be blank or non-numeric → skip, not fail
//! - I^R: Delimiter and directory are resolved in config

use crate::generate::parse_numeric;
use crate::models::{Card, ConfigError, Result, TriviumError};
use rand::seq::SliceRandom;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Explanation attached to rows whose file carries no `explanation` column.
const DEFAULT_EXPLANATION: &str = "Source: CSV file.";

/// Load cards from every `*.csv` file in a directory.
///
/// Files are read in sorted order. Headers are matched case-insensitively;
/// `question` and `answer` are required, `explanation` is optional. Rows
/// with a blank question or answer are skipped silently; rows with a
/// non-numeric answer are skipped with a warning.
pub fn load_cards_from_csv_dir(dir: &Path, delimiter: u8) -> Result<Vec<Card>> {
    if !dir.is_dir() {
        return Err(ConfigError::Invalid {
            field: "source.csv_dir",
            reason: format!("does not exist or is not a directory: {}", dir.display()),
        }
        .into());
    }

    let paths = csv_paths(dir)?;
    if paths.is_empty() {
        return Err(ConfigError::Invalid {
            field: "source.csv_dir",
            reason: format!("no CSV files found in {}", dir.display()),
        }
        .into());
    }

    let mut cards = Vec::new();
    for path in &paths {
        read_csv_file(path, delimiter, &mut cards)?;
    }

    if cards.is_empty() {
        return Err(ConfigError::Invalid {
            field: "source.csv_dir",
            reason: format!("no valid cards loaded from {}", dir.display()),
        }
        .into());
    }

    info!(
        cards = cards.len(),
        files = paths.len(),
        dir = %dir.display(),
        "Loaded cards from CSV directory"
    );
    Ok(cards)
}

fn csv_paths(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir)
        .map_err(|e| TriviumError::io(format!("reading CSV directory {}", dir.display()), e))?;

    let mut paths = Vec::new();
    for entry in entries {
        let entry =
            entry.map_err(|e| TriviumError::io("reading CSV directory entry".to_string(), e))?;
        let path = entry.path();
        let is_csv = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
        if path.is_file() && is_csv {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

fn read_csv_file(path: &Path, delimiter: u8, cards: &mut Vec<Card>) -> Result<()> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_path(path)
        .map_err(|e| {
            TriviumError::io(
                format!("opening CSV file {}", path.display()),
                std::io::Error::other(e),
            )
        })?;

    let headers = reader
        .headers()
        .map_err(|e| {
            TriviumError::io(
                format!("reading CSV headers from {}", path.display()),
                std::io::Error::other(e),
            )
        })?
        .clone();

    // A file with no header row holds nothing worth erroring over.
    if headers.iter().all(|h| h.trim().is_empty()) {
        return Ok(());
    }

    let mut question_col = None;
    let mut answer_col = None;
    let mut explanation_col = None;
    for (idx, name) in headers.iter().enumerate() {
        match name.trim().to_lowercase().as_str() {
            "question" => question_col = Some(idx),
            "answer" => answer_col = Some(idx),
            "explanation" => explanation_col = Some(idx),
            _ => {}
        }
    }

    let (question_col, answer_col) = match (question_col, answer_col) {
        (Some(q), Some(a)) => (q, a),
        _ => {
            return Err(ConfigError::Invalid {
                field: "source.csv_dir",
                reason: format!(
                    "{} must contain 'question' and 'answer' columns (found: {:?})",
                    path.display(),
                    headers.iter().collect::<Vec<_>>()
                ),
            }
            .into())
        }
    };

    for record in reader.records() {
        let record = match record {
            Ok(record) => record,
            Err(err) => {
                warn!(file = %path.display(), error = %err, "Skipping unreadable CSV record");
                continue;
            }
        };

        let question = record.get(question_col).unwrap_or("").trim();
        let raw_answer = record.get(answer_col).unwrap_or("").trim();
        if question.is_empty() || raw_answer.is_empty() {
            continue;
        }

        let Some(answer) = parse_numeric(raw_answer) else {
            warn!(
                file = %path.display(),
                answer = %raw_answer,
                "Skipping row with non-numeric answer"
            );
            continue;
        };

        let explanation = explanation_col
            .and_then(|idx| record.get(idx))
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_EXPLANATION);

        match Card::new(question, answer, explanation) {
            Ok(card) => cards.push(card),
            Err(err) => {
                warn!(file = %path.display(), error = %err, "Skipping invalid CSV row");
            }
        }
    }

    Ok(())
}

struct DeckState {
    order: Vec<usize>,
    pos: usize,
}

/// Shuffled cycling deck of CSV cards.
///
/// Deals every card once per pass in random order, then reshuffles and
/// starts over. Never runs out.
pub struct CsvDeck {
    cards: Vec<Card>,
    state: Mutex<DeckState>,
}

impl CsvDeck {
    /// Build a deck from loaded cards.
    pub fn new(cards: Vec<Card>) -> Result<Self> {
        if cards.is_empty() {
            return Err(TriviumError::Internal(
                "CSV deck requires at least one card".to_string(),
            ));
        }
        let order = shuffled_order(cards.len());
        Ok(Self {
            cards,
            state: Mutex::new(DeckState { order, pos: 0 }),
        })
    }

    /// Load every CSV file in `dir` and build a deck.
    pub fn from_dir(dir: &Path, delimiter: u8) -> Result<Self> {
        Self::new(load_cards_from_csv_dir(dir, delimiter)?)
    }

    /// Number of distinct cards in the deck.
    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    /// Deal the next card, reshuffling once a pass is exhausted.
    pub async fn next_card(&self) -> Card {
        let mut state = self.state.lock().await;
        if state.pos >= state.order.len() {
            state.order = shuffled_order(self.cards.len());
            state.pos = 0;
        }
        let idx = state.order[state.pos];
        state.pos += 1;
        self.cards[idx].clone()
    }
}

fn shuffled_order(len: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..len).collect();
    order.shuffle(&mut rand::thread_rng());
    order
}
