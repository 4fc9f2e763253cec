//! Card type for trivium.
//!
//! K_i: A card is the unit of data flowing from generation to players.

use crate::models::{Result, TriviumError};
use serde::Serialize;

/// A single numeric trivia card.
///
/// K_i: Construction is checked. A `Card` always holds a trimmed,
/// non-empty question and explanation and a finite answer, and never
/// changes after construction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Card {
    /// The trivia question shown to players
    question: String,

    /// The numeric answer
    answer: f64,

    /// One-sentence justification of the answer
    explanation: String,
}

impl Card {
    /// Build a card, enforcing the schema.
    ///
    /// B_i(fields are usable) → Result
    pub fn new(
        question: impl Into<String>,
        answer: f64,
        explanation: impl Into<String>,
    ) -> Result<Self> {
        let question = question.into().trim().to_string();
        let explanation = explanation.into().trim().to_string();

        if question.is_empty() {
            return Err(TriviumError::InvalidCard("empty question".to_string()));
        }
        if explanation.is_empty() {
            return Err(TriviumError::InvalidCard("empty explanation".to_string()));
        }
        if !answer.is_finite() {
            return Err(TriviumError::InvalidCard(format!(
                "answer is not a finite number: {answer}"
            )));
        }

        Ok(Self {
            question,
            answer,
            explanation,
        })
    }

    pub fn question(&self) -> &str {
        &self.question
    }

    pub fn answer(&self) -> f64 {
        self.answer
    }

    pub fn explanation(&self) -> &str {
        &self.explanation
    }

    /// Lowercased, whitespace-collapsed question used for duplicate detection.
    pub fn dedup_key(&self) -> String {
        self.question
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase()
    }

    /// Answer rendered without a trailing `.0` for whole numbers.
    pub fn answer_text(&self) -> String {
        if self.answer.fract() == 0.0 && self.answer.abs() < 1e15 {
            format!("{}", self.answer as i64)
        } else {
            format!("{}", self.answer)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_card_trims_fields() {
        let card = Card::new("  How many moons does Mars have?  ", 2.0, " Phobos and Deimos. ")
            .unwrap();
        assert_eq!(card.question(), "How many moons does Mars have?");
        assert_eq!(card.explanation(), "Phobos and Deimos.");
    }

    #[test]
    fn test_card_rejects_blank_question() {
        let err = Card::new("   ", 1.0, "why");
        assert!(err.is_err());
    }

    #[test]
    fn test_card_rejects_non_finite_answer() {
        assert!(Card::new("How tall?", f64::NAN, "because").is_err());
        assert!(Card::new("How tall?", f64::INFINITY, "because").is_err());
    }

    #[test]
    fn test_dedup_key_collapses_whitespace_and_case() {
        let a = Card::new("How  many LEGS\ndoes a spider have?", 8.0, "Arachnid.").unwrap();
        let b = Card::new("how many legs does a spider have?", 8.0, "Arachnid.").unwrap();
        assert_eq!(a.dedup_key(), b.dedup_key());
    }

    #[test]
    fn test_answer_text_drops_trailing_zero() {
        let whole = Card::new("How many planets?", 8.0, "Since 2006.").unwrap();
        assert_eq!(whole.answer_text(), "8");
        let frac = Card::new("How long in metres?", 12.5, "Measured.").unwrap();
        assert_eq!(frac.answer_text(), "12.5");
    }
}
