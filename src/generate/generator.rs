//! Budgeted card generation against an unreliable backend.
//!
//! One `generate_batch` call spends a bounded number of backend calls
//! and returns however many validated, unique cards it accumulated.
//! Parse failures, rejected cards and transient backend errors all
//! burn budget without aborting the batch; only a fully exhausted
//! budget with zero accepted cards is an error.

use crate::client::TriviaBackend;
use crate::generate::{parse_cards, StyleValidator};
use crate::models::{Card, Result, TriviumError};
use std::collections::HashSet;
use tracing::{debug, warn};

/// Rough tokens-per-card cost used to size batch requests. Asking for
/// more cards than the reply budget can carry truncates the JSON.
const TOKENS_PER_CARD: u32 = 220;

const SYSTEM_PROMPT: &str = "You are a question generator for a party game in the style of Wits & Wagers. \
This is NOT a school quiz and NOT a math exercise. \
Questions must be light, fun, surprising, drawn from everyday life and pop culture, so that players GUESS numbers. \
Avoid a scientific or encyclopedic tone. \
Do not include any calculations or formulas. \
Return ONLY valid JSON.";

const STYLE_RULES: &str = r#"Style criteria (very important):
- It must sound like a party game question, not a textbook exercise.
- Prefer topics: food and drink (volumes/amounts), parties, sport (records and scores, no counting), movies/series/music, animals, the human body (fun facts), everyday objects, money/prices, shopping, games/internet (when numeric).
- AVOID: technical topics that call for formulas (circumferences, radii, speeds in m/s, physical units), math puzzles, combinatorics, probability, equations.
- The answer must be a single number that can be estimated.
- explanation: 1-2 sentences on where the number comes from (source/assumption), with no arithmetic.
- Keep the explanation short and free of jargon.

Examples of GOOD style (do not copy them verbatim):
- How many minutes does a typical feature film run in cinemas?
- How many liters are in a standard bottle of wine?
- How many teeth does an adult human have?
- How many meters long is an Olympic swimming pool?
- Roughly how many milligrams of caffeine are in a single espresso?
- Roughly how many grams does a bar of chocolate weigh?

First silently pick a topic and estimate the number, but do NOT show your reasoning. Return only the JSON.
"#;

/// How many cards one backend call may request.
fn per_request_limit(max_tokens: u32) -> usize {
    ((max_tokens / TOKENS_PER_CARD) as usize).clamp(1, 8)
}

/// How many backend calls one batch may spend.
fn call_budget(target_count: usize) -> usize {
    (target_count * 3).clamp(2, 12)
}

/// Generates validated, deduplicated cards from a backend.
pub struct CardGenerator<B> {
    backend: B,
    validator: StyleValidator,
}

impl<B: TriviaBackend> CardGenerator<B> {
    pub fn new(backend: B, validator: StyleValidator) -> Self {
        Self { backend, validator }
    }

    fn build_call_prompt(&self, requested_count: usize) -> String {
        if requested_count == 1 {
            format!(
                r#"Generate 1 numeric trivia card in English.
Return ONE JSON OBJECT with keys: question (string), answer (number), explanation (string).
Do not return a list. Do not add any text outside the JSON.
The first character of your reply must be '{{'. Do not use markdown.
If you cannot return JSON, return exactly 3 lines: 'Question: ...', 'Answer: ...', 'Explanation: ...'.

{STYLE_RULES}"#
            )
        } else {
            format!(
                r#"Generate {requested_count} different numeric trivia cards in English.
Each card is a JSON object with keys: question (string), answer (number), explanation (string).
Return ONE JSON OBJECT shaped as: {{"cards": [ ... ]}} and nothing else.
The first character of your reply must be '{{'. Do not use markdown.

{STYLE_RULES}"#
            )
        }
    }

    /// Accumulate up to `target_count` cards across several small
    /// backend calls. Best-effort: may return fewer than requested.
    pub async fn generate_batch(&self, target_count: usize) -> Result<Vec<Card>> {
        if target_count == 0 {
            return Ok(Vec::new());
        }

        let max_per_request = per_request_limit(self.backend.max_tokens());
        let max_calls = call_budget(target_count);

        let mut accepted: Vec<Card> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut calls_made: u32 = 0;

        for _ in 0..max_calls {
            let remaining = target_count - accepted.len();
            if remaining == 0 {
                break;
            }

            let requested_count = remaining.min(max_per_request);
            let prompt = self.build_call_prompt(requested_count);

            calls_made += 1;
            let raw = match self.backend.complete(SYSTEM_PROMPT, &prompt).await {
                Ok(raw) => raw,
                Err(e) => {
                    warn!("Backend call failed: {}", e);
                    continue;
                }
            };

            let candidates = match parse_cards(&raw) {
                Ok(candidates) => candidates,
                Err(e) => {
                    let snippet: String = raw.trim().replace('\n', " ").chars().take(250).collect();
                    warn!(
                        content_length = raw.len(),
                        snippet = %snippet,
                        "Discarding unparseable reply: {}",
                        e
                    );
                    continue;
                }
            };

            for card in candidates {
                if let Err(reason) = self.validator.check(&card) {
                    warn!(%reason, question = %card.question(), "Rejected card");
                    continue;
                }

                let key = card.dedup_key();
                if !seen.insert(key) {
                    continue;
                }
                accepted.push(card);

                if accepted.len() >= target_count {
                    break;
                }
            }
        }

        if accepted.is_empty() {
            return Err(TriviumError::NoValidCards { calls: calls_made });
        }

        debug!(
            accepted = accepted.len(),
            target = target_count,
            calls = calls_made,
            "Batch complete"
        );
        Ok(accepted)
    }

    /// Generate exactly one card.
    pub async fn generate_card(&self) -> Result<Card> {
        let mut cards = self.generate_batch(1).await?;
        // generate_batch never returns Ok with an empty vec
        Ok(cards.swap_remove(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BackendError, StylePolicy};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Backend that replays a fixed script. `None` entries fail the
    /// call; an exhausted script also fails.
    struct ScriptedBackend {
        replies: Mutex<VecDeque<Option<String>>>,
        max_tokens: u32,
    }

    impl ScriptedBackend {
        fn new(replies: Vec<Option<&str>>) -> Self {
            Self {
                replies: Mutex::new(
                    replies
                        .into_iter()
                        .map(|r| r.map(str::to_string))
                        .collect(),
                ),
                max_tokens: 256,
            }
        }
    }

    #[async_trait]
    impl TriviaBackend for ScriptedBackend {
        async fn complete(&self, _system_prompt: &str, _user_prompt: &str) -> Result<String> {
            match self.replies.lock().unwrap().pop_front() {
                Some(Some(text)) => Ok(text),
                _ => Err(BackendError::InvalidResponse("scripted failure".to_string()).into()),
            }
        }

        fn max_tokens(&self) -> u32 {
            self.max_tokens
        }
    }

    fn generator(replies: Vec<Option<&str>>) -> CardGenerator<ScriptedBackend> {
        let validator = StyleValidator::new(&StylePolicy::default()).unwrap();
        CardGenerator::new(ScriptedBackend::new(replies), validator)
    }

    const COLA: &str = r#"{"question": "How many milliliters are in a standard can of cola?", "answer": 330, "explanation": "Most cans hold a third of a liter."}"#;
    const TEETH: &str = r#"{"question": "How many teeth does an adult human have?", "answer": 32, "explanation": "Including the wisdom teeth."}"#;
    const PIN_PUZZLE: &str = r#"{"question": "How many 4-digit PIN codes exist without repetition?", "answer": 5040, "explanation": "A combinatorics count."}"#;

    #[tokio::test]
    async fn test_rejected_card_burns_budget_then_succeeds() {
        let generator = generator(vec![Some(PIN_PUZZLE), Some(COLA)]);
        let cards = generator.generate_batch(1).await.unwrap();
        assert_eq!(cards.len(), 1);
        assert_eq!(
            cards[0].question(),
            "How many milliliters are in a standard can of cola?"
        );
    }

    #[tokio::test]
    async fn test_duplicates_are_dropped_within_batch() {
        let generator = generator(vec![Some(COLA), Some(COLA), Some(TEETH)]);
        let cards = generator.generate_batch(2).await.unwrap();
        assert_eq!(cards.len(), 2);
        assert_ne!(cards[0].dedup_key(), cards[1].dedup_key());
    }

    #[tokio::test]
    async fn test_exhausted_budget_with_no_cards_is_an_error() {
        let generator = generator(vec![Some(PIN_PUZZLE), Some(PIN_PUZZLE), Some(PIN_PUZZLE)]);
        let result = generator.generate_batch(1).await;
        match result {
            Err(TriviumError::NoValidCards { calls }) => assert_eq!(calls, 3),
            other => panic!("expected NoValidCards, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_backend_failures_never_escape_the_batch() {
        let generator = generator(vec![None, Some(COLA)]);
        let cards = generator.generate_batch(1).await.unwrap();
        assert_eq!(cards.len(), 1);
    }

    #[tokio::test]
    async fn test_unparseable_reply_burns_budget() {
        let generator = generator(vec![Some("pure prose, nothing usable"), Some(TEETH)]);
        let cards = generator.generate_batch(1).await.unwrap();
        assert_eq!(cards[0].answer(), 32.0);
    }

    #[tokio::test]
    async fn test_multi_card_reply_fills_batch_in_one_call() {
        let multi = format!(r#"{{"cards": [{COLA}, {TEETH}]}}"#);
        let mut backend = ScriptedBackend::new(vec![]);
        backend.max_tokens = 2000;
        backend
            .replies
            .lock()
            .unwrap()
            .push_back(Some(multi));
        let validator = StyleValidator::new(&StylePolicy::default()).unwrap();
        let generator = CardGenerator::new(backend, validator);

        let cards = generator.generate_batch(2).await.unwrap();
        assert_eq!(cards.len(), 2);
    }

    #[tokio::test]
    async fn test_zero_target_is_a_no_op() {
        let generator = generator(vec![]);
        let cards = generator.generate_batch(0).await.unwrap();
        assert!(cards.is_empty());
    }

    #[test]
    fn test_per_request_limit_scales_with_token_budget() {
        assert_eq!(per_request_limit(0), 1);
        assert_eq!(per_request_limit(256), 1);
        assert_eq!(per_request_limit(660), 3);
        assert_eq!(per_request_limit(10_000), 8);
    }

    #[test]
    fn test_call_budget_bounds() {
        assert_eq!(call_budget(1), 3);
        assert_eq!(call_budget(4), 12);
        assert_eq!(call_budget(100), 12);
    }
}
