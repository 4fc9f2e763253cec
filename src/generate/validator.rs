//! Style gate for generated cards.
//!
//! The mechanism is an ordered list of rejection rules; the first rule
//! that matches decides the [`RejectReason`]. The rule data (keyword
//! lists, patterns, bounds) comes from [`StylePolicy`] so deployments
//! can tune what counts as acceptable party-trivia style without
//! touching this module.

use crate::models::{Card, ConfigError, RejectReason, Result, StylePolicy};
use regex::Regex;

/// Compiled rejection rules for party-trivia style.
pub struct StyleValidator {
    puzzle_keywords: Vec<String>,
    puzzle_patterns: Vec<Regex>,
    technical_keywords: Vec<String>,
    calculation_keywords: Vec<String>,
    arithmetic_patterns: Vec<Regex>,
    min_question_chars: usize,
    max_question_chars: usize,
    min_answer: f64,
    max_answer: f64,
}

fn compile_patterns(field: &'static str, patterns: &[String]) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|pattern| {
            Regex::new(pattern).map_err(|e| {
                ConfigError::Invalid {
                    field,
                    reason: format!("bad pattern {pattern:?}: {e}"),
                }
                .into()
            })
        })
        .collect()
}

fn lowered(keywords: &[String]) -> Vec<String> {
    keywords.iter().map(|k| k.to_lowercase()).collect()
}

impl StyleValidator {
    /// Compile a policy into a validator. Pattern syntax errors in
    /// user-supplied policy data surface here, before anything runs.
    pub fn new(policy: &StylePolicy) -> Result<Self> {
        Ok(Self {
            puzzle_keywords: lowered(&policy.puzzle_keywords),
            puzzle_patterns: compile_patterns("style.puzzle_patterns", &policy.puzzle_patterns)?,
            technical_keywords: lowered(&policy.technical_keywords),
            calculation_keywords: lowered(&policy.calculation_keywords),
            arithmetic_patterns: compile_patterns(
                "style.arithmetic_patterns",
                &policy.arithmetic_patterns,
            )?,
            min_question_chars: policy.min_question_chars,
            max_question_chars: policy.max_question_chars,
            min_answer: policy.min_answer,
            max_answer: policy.max_answer,
        })
    }

    /// Apply the rules in order; the first match rejects the card.
    pub fn check(&self, card: &Card) -> std::result::Result<(), RejectReason> {
        let question = card.question().to_lowercase();

        if self
            .puzzle_keywords
            .iter()
            .any(|k| question.contains(k.as_str()))
            || self.puzzle_patterns.iter().any(|p| p.is_match(&question))
        {
            return Err(RejectReason::MathPuzzle);
        }

        if self
            .technical_keywords
            .iter()
            .any(|k| question.contains(k.as_str()))
        {
            return Err(RejectReason::TooTechnical);
        }

        if self
            .calculation_keywords
            .iter()
            .any(|k| question.contains(k.as_str()))
        {
            return Err(RejectReason::CalculationTask);
        }

        if self
            .arithmetic_patterns
            .iter()
            .any(|p| p.is_match(card.explanation()))
        {
            return Err(RejectReason::ArithmeticExplanation);
        }

        let length = card.question().chars().count();
        if length < self.min_question_chars || length > self.max_question_chars {
            return Err(RejectReason::QuestionLength);
        }

        if !(self.min_answer..=self.max_answer).contains(&card.answer()) {
            return Err(RejectReason::AnswerRange);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> StyleValidator {
        StyleValidator::new(&StylePolicy::default()).unwrap()
    }

    fn card(question: &str, answer: f64, explanation: &str) -> Card {
        Card::new(question, answer, explanation).unwrap()
    }

    #[test]
    fn test_accepts_party_trivia() {
        let result = validator().check(&card(
            "How many milliliters are in a standard can of cola?",
            330.0,
            "Most cans hold a third of a liter.",
        ));
        assert_eq!(result, Ok(()));
    }

    #[test]
    fn test_rejects_combinatorics_question() {
        let result = validator().check(&card(
            "How many ways can you arrange five books on a shelf?",
            120.0,
            "Permutations of five items.",
        ));
        assert_eq!(result, Err(RejectReason::MathPuzzle));
    }

    #[test]
    fn test_rejects_inline_arithmetic_in_question() {
        let result = validator().check(&card(
            "What do you get when you add 7 + 5 together?",
            12.0,
            "Simple addition.",
        ));
        assert_eq!(result, Err(RejectReason::MathPuzzle));
    }

    #[test]
    fn test_rejects_technical_phrasing() {
        let result = validator().check(&card(
            "What is the radius of the Moon in kilometers?",
            1737.0,
            "Mean lunar radius.",
        ));
        assert_eq!(result, Err(RejectReason::TooTechnical));
    }

    #[test]
    fn test_rejects_scoring_task() {
        let result = validator().check(&card(
            "What is the value of all court cards in a deck of cards?",
            60.0,
            "Court cards score highly in many games.",
        ));
        assert_eq!(result, Err(RejectReason::CalculationTask));
    }

    #[test]
    fn test_rejects_arithmetic_in_explanation() {
        let result = validator().check(&card(
            "How many squares are on a chessboard grid?",
            64.0,
            "A chessboard is 8 x 8 squares.",
        ));
        assert_eq!(result, Err(RejectReason::ArithmeticExplanation));
    }

    #[test]
    fn test_rejects_short_question() {
        let result = validator().check(&card("How many?", 4.0, "Too terse to guess."));
        assert_eq!(result, Err(RejectReason::QuestionLength));
    }

    #[test]
    fn test_rejects_out_of_range_answer() {
        let result = validator().check(&card(
            "How many grains of sand are on a typical beach?",
            5e12,
            "Orders of magnitude beyond guessing.",
        ));
        assert_eq!(result, Err(RejectReason::AnswerRange));

        let result = validator().check(&card(
            "How many kilograms does a feather weigh, roughly?",
            0.0001,
            "Well under a gram.",
        ));
        assert_eq!(result, Err(RejectReason::AnswerRange));
    }

    #[test]
    fn test_rule_order_puzzle_wins_over_length() {
        // Short AND mathy: the puzzle rule fires first.
        let result = validator().check(&card("2 + 2 = ?", 4.0, "Basic sum."));
        assert_eq!(result, Err(RejectReason::MathPuzzle));
    }

    #[test]
    fn test_bad_user_pattern_fails_construction() {
        let policy = StylePolicy {
            puzzle_patterns: vec!["(unclosed".to_string()],
            ..StylePolicy::default()
        };
        assert!(StyleValidator::new(&policy).is_err());
    }
}
