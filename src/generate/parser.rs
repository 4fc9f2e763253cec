//! Tolerant parsing of raw backend text into cards.
//!
//! Backends rarely return the clean JSON they were asked for. Parsing
//! runs an ordered chain of strategies and stops at the first success:
//!
//! 1. Strip code fences, parse the whole text as JSON
//! 2. Extract the first `{`..`}` (or `[`..`]`) span, retry strict JSON
//! 3. Scan for labeled lines ("Question:"/"Pytanie:", ...)
//! 4. Relaxed pattern match for an inline question/answer/explanation
//!    triple inside otherwise broken JSON
//!
//! Epistemic note: every tier downgrades a belief, not knowledge.
//! B_i(backend returned JSON) fails often enough that tiers 3 and 4
//! carry real traffic.

use crate::models::{Card, Result, TriviumError};
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;
use tracing::warn;

/// Explanation used when a labeled-line reply omits one.
const DEFAULT_EXPLANATION: &str = "Estimate based on a typical or standard value.";

static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^```(?:json)?\s*|\s*```$").expect("Invalid fence pattern")
});

static ANSWER_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^(?:odpowiedź|answer)\s*[:\-]\s*(?P<value>[-+]?\d+(?:[\s.,]\d+)*)\s*$")
        .expect("Invalid answer line pattern")
});

static QUESTION_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^(?:pytanie|question)\s*[:\-]\s*(?P<value>.+?)\s*$")
        .expect("Invalid question line pattern")
});

static EXPLANATION_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^(?:wyjaśnienie|explanation)\s*[:\-]\s*(?P<value>.+?)\s*$")
        .expect("Invalid explanation line pattern")
});

static RELAXED_TRIPLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?is)"question"\s*:\s*"(?P<question>.*?)"\s*,\s*"answer"\s*:\s*(?P<answer>[-+]?\d+(?:[\s.,]\d+)*)\s*,\s*"explanation"\s*:\s*"(?P<explanation>.*?)""#,
    )
    .expect("Invalid relaxed triple pattern")
});

fn strip_code_fences(text: &str) -> String {
    FENCE_RE.replace_all(text.trim(), "").trim().to_string()
}

/// Normalize a numeric token: drop whitespace, decimal comma to dot.
pub(crate) fn parse_numeric(raw: &str) -> Option<f64> {
    let normalized: String = raw
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| if c == ',' { '.' } else { c })
        .collect();
    let value: f64 = normalized.parse().ok()?;
    value.is_finite().then_some(value)
}

fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

fn extract_json_array(text: &str) -> Option<&str> {
    let start = text.find('[')?;
    let end = text.rfind(']')?;
    (end > start).then(|| &text[start..=end])
}

/// Build a card from a parsed JSON value; schema violations are errors.
fn card_from_value(value: &Value) -> Result<Card> {
    let obj = value
        .as_object()
        .ok_or_else(|| TriviumError::InvalidCard("Card must be an object".to_string()))?;

    let question = obj.get("question").and_then(Value::as_str).ok_or_else(|| {
        TriviumError::InvalidCard("Field 'question' must be a non-empty string".to_string())
    })?;

    let explanation = obj.get("explanation").and_then(Value::as_str).ok_or_else(|| {
        TriviumError::InvalidCard("Field 'explanation' must be a non-empty string".to_string())
    })?;

    let answer = match obj.get("answer") {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => parse_numeric(s),
        _ => None,
    }
    .ok_or_else(|| TriviumError::InvalidCard("Field 'answer' must be a number".to_string()))?;

    Card::new(question, answer, explanation)
}

/// Tier 3: bilingual labeled lines. The answer label is mandatory;
/// question falls back to the first line with a '?', then the first
/// non-empty line.
fn parse_card_labeled(text: &str) -> Option<Card> {
    let cleaned = strip_code_fences(text);

    let answer_caps = ANSWER_LINE_RE.captures(&cleaned)?;
    let answer = parse_numeric(&answer_caps["value"])?;

    let question = QUESTION_LINE_RE
        .captures(&cleaned)
        .map(|caps| caps["value"].trim().to_string())
        .filter(|q| !q.is_empty())
        .or_else(|| {
            let lines: Vec<&str> = cleaned
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .collect();
            lines
                .iter()
                .find(|line| line.contains('?'))
                .or_else(|| lines.first())
                .map(|line| line.to_string())
        })?;

    let explanation = EXPLANATION_LINE_RE
        .captures(&cleaned)
        .map(|caps| caps["value"].trim().to_string())
        .filter(|e| !e.is_empty())
        .unwrap_or_else(|| DEFAULT_EXPLANATION.to_string());

    Card::new(question, answer, explanation).ok()
}

/// Tier 4: pull question/answer/explanation triples out of text that
/// is almost JSON (truncated arrays, stray prose, unescaped quotes).
fn parse_cards_relaxed(text: &str) -> Vec<Card> {
    let cleaned = strip_code_fences(text);
    let mut cards = Vec::new();

    for caps in RELAXED_TRIPLE_RE.captures_iter(&cleaned) {
        let question = caps["question"].trim().replace('\n', " ");
        let explanation = caps["explanation"].trim().replace('\n', " ");
        let Some(answer) = parse_numeric(&caps["answer"]) else {
            continue;
        };
        if let Ok(card) = Card::new(question, answer, explanation) {
            cards.push(card);
        }
    }

    cards
}

/// Parse backend text expected to contain exactly one card.
pub fn parse_card(text: &str) -> Result<Card> {
    let cleaned = strip_code_fences(text);

    if let Ok(value) = serde_json::from_str::<Value>(&cleaned) {
        return card_from_value(&value);
    }

    if let Some(span) = extract_json_object(&cleaned) {
        if let Ok(value) = serde_json::from_str::<Value>(span) {
            return card_from_value(&value);
        }
        if let Some(card) = parse_card_labeled(span) {
            return Ok(card);
        }
        if let Some(card) = parse_cards_relaxed(span).into_iter().next() {
            return Ok(card);
        }
        return Err(TriviumError::InvalidCard(
            "Backend did not return valid JSON".to_string(),
        ));
    }

    if let Some(card) = parse_card_labeled(&cleaned) {
        return Ok(card);
    }
    if let Some(card) = parse_cards_relaxed(&cleaned).into_iter().next() {
        return Ok(card);
    }
    Err(TriviumError::InvalidCard(
        "Backend did not return valid JSON".to_string(),
    ))
}

/// Parse backend text that may contain several cards: a bare array,
/// an object wrapping an array under "cards", or a single object.
///
/// Malformed elements inside an otherwise valid array are skipped with
/// a warning; only a text with no recoverable card at all is an error.
pub fn parse_cards(text: &str) -> Result<Vec<Card>> {
    let cleaned = strip_code_fences(text);

    let value = match serde_json::from_str::<Value>(&cleaned) {
        Ok(value) => value,
        Err(_) => {
            let span = extract_json_array(&cleaned).or_else(|| extract_json_object(&cleaned));
            match span {
                Some(span) => match serde_json::from_str::<Value>(span) {
                    Ok(value) => value,
                    Err(_) => {
                        if let Some(card) = parse_card_labeled(span) {
                            return Ok(vec![card]);
                        }
                        let relaxed = parse_cards_relaxed(span);
                        if !relaxed.is_empty() {
                            return Ok(relaxed);
                        }
                        return Err(TriviumError::InvalidCard(
                            "Backend did not return valid JSON".to_string(),
                        ));
                    }
                },
                None => {
                    if let Some(card) = parse_card_labeled(&cleaned) {
                        return Ok(vec![card]);
                    }
                    let relaxed = parse_cards_relaxed(&cleaned);
                    if !relaxed.is_empty() {
                        return Ok(relaxed);
                    }
                    return Err(TriviumError::InvalidCard(
                        "Backend did not return valid JSON".to_string(),
                    ));
                }
            }
        }
    };

    match value {
        Value::Object(ref obj) => {
            if let Some(Value::Array(items)) = obj.get("cards") {
                Ok(collect_cards(items))
            } else {
                Ok(vec![card_from_value(&value)?])
            }
        }
        Value::Array(ref items) => Ok(collect_cards(items)),
        _ => Err(TriviumError::InvalidCard(
            "JSON root must be an object or an array".to_string(),
        )),
    }
}

fn collect_cards(items: &[Value]) -> Vec<Card> {
    let mut cards = Vec::new();
    for item in items {
        match card_from_value(item) {
            Ok(card) => cards.push(card),
            Err(e) => warn!("Skipping malformed card: {}", e),
        }
    }
    cards
}
