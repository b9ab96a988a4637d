//! Maps recognized text onto a choice index.
//!
//! ## Policy
//!
//! 1. Take the highest-confidence result; anything below the intention's
//!    confidence floor is dropped.
//! 2. Normalize (case fold, punctuation to spaces except apostrophes,
//!    whitespace collapsed) and look for an exact phrase match.
//! 3. `Decide` only: score every choice by token overlap (Dice coefficient)
//!    and accept the best one if it clears `fuzzy_threshold` and strictly
//!    beats the runner-up. `Confirm` never guesses.

use std::cmp::Ordering;
use std::collections::HashSet;

use tracing::debug;

use super::{Grammar, RecognitionResult, SpeechConfig};
use crate::prompt::choice::Intention;

/// Canonical form used on both sides of the comparison.
pub fn normalize(text: &str) -> String {
    let folded: String = text
        .chars()
        .map(|c| match c {
            '\u{2019}' | '\u{2018}' | '`' => '\'',
            c if c.is_alphanumeric() || c == '\'' => c,
            _ => ' ',
        })
        .collect();

    folded
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

fn tokens(normalized: &str) -> HashSet<&str> {
    normalized.split(' ').filter(|t| !t.is_empty()).collect()
}

/// Dice coefficient over token sets, in [0.0, 1.0].
fn overlap(a: &str, b: &str) -> f32 {
    let a = tokens(a);
    let b = tokens(b);
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let shared = a.intersection(&b).count();
    2.0 * shared as f32 / (a.len() + b.len()) as f32
}

fn top_result(results: &[RecognitionResult]) -> Option<&RecognitionResult> {
    results.iter().max_by(|a, b| {
        a.confidence
            .partial_cmp(&b.confidence)
            .unwrap_or_else(|| {
                // NaN sorts lowest.
                if a.confidence.is_nan() {
                    Ordering::Less
                } else {
                    Ordering::Greater
                }
            })
    })
}

/// Choice index for a recognition event, or `None` when nothing matches
/// confidently enough.
pub fn match_results(
    config: &SpeechConfig,
    grammar: &Grammar,
    results: &[RecognitionResult],
) -> Option<usize> {
    let top = top_result(results)?;
    let floor = config.min_confidence(grammar.intention());
    if top.confidence.is_nan() || top.confidence < floor {
        debug!(
            confidence = top.confidence,
            floor, "recognition below confidence floor"
        );
        return None;
    }

    let heard = normalize(&top.text);
    if heard.is_empty() {
        return None;
    }

    // `Choices::new` keeps utterances unique across choices, so at most one
    // rule can hold the heard phrase.
    if let Some(rule) = grammar
        .rules()
        .iter()
        .find(|rule| rule.phrases.iter().any(|p| *p == heard))
    {
        return Some(rule.index);
    }

    if grammar.intention() == Intention::Confirm {
        return None;
    }

    let mut scored: Vec<(usize, f32)> = grammar
        .rules()
        .iter()
        .map(|rule| {
            let best = rule
                .phrases
                .iter()
                .map(|p| overlap(&heard, p))
                .fold(0.0f32, f32::max);
            (rule.index, best)
        })
        .collect();
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));

    let (index, best) = *scored.first()?;
    let runner_up = scored.get(1).map(|s| s.1).unwrap_or(0.0);
    if best >= config.fuzzy_threshold && best > runner_up {
        debug!(index, score = best, "best-effort speech match");
        Some(index)
    } else {
        None
    }
}
