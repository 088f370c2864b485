//! Word Frequency Scorer
//!
//! Lexical plausibility of recognized tokens. Known words take their table score;
//! unknown words fall back on their character makeup. Recognizer hallucinations
//! tend to be rare character combinations, so a low mean flags a suspicious chunk.

use std::sync::Arc;

use super::{char_class, CharClass};
use crate::error::ScoreError;
use crate::lexicon::Lexicon;
use crate::Scored;

// =============================================================================
// Constants
// =============================================================================

/// Score of an empty token list
pub const NEUTRAL_SCORE: f32 = 0.5;

const DIGIT_SCORE: f32 = 0.6;
const LATIN_SCORE: f32 = 0.4;
const FUNCTION_CHAR_SCORE: f32 = 0.9;
const RARE_CHAR_SCORE: f32 = 0.3;
const UNKNOWN_SCORE: f32 = 0.2;

/// Compounds at least this long are scored from their best known substring
const COMPOUND_MIN_CHARS: usize = 4;
const COMPOUND_DISCOUNT: f32 = 0.8;
/// Compound score when no known word is found inside it
const COMPOUND_FLOOR: f32 = 0.5;

/// Tokens within this share of either end of the utterance get `EDGE_BONUS`
const EDGE_SPAN: f32 = 0.2;
const EDGE_BONUS: f32 = 1.1;

pub struct WordFrequencyScorer {
    lexicon: Arc<Lexicon>,
}

impl WordFrequencyScorer {
    pub fn new(lexicon: Arc<Lexicon>) -> Self {
        Self { lexicon }
    }

    /// Mean adjusted plausibility of `tokens`, 0.5 when there are none.
    pub fn score(&self, tokens: &[String]) -> Scored<f32> {
        Scored::from_result(self.mean_score(tokens), || NEUTRAL_SCORE)
    }

    fn mean_score(&self, tokens: &[String]) -> Result<f32, ScoreError> {
        if tokens.is_empty() {
            return Err(ScoreError::Empty);
        }
        let n = tokens.len() as f32;
        let edge_span = EDGE_SPAN * n;
        let last = tokens.len() - 1;
        let total: f32 = tokens
            .iter()
            .enumerate()
            .map(|(i, token)| {
                let edge = (i as f32) < edge_span || ((last - i) as f32) < edge_span;
                let position = if edge { EDGE_BONUS } else { 1.0 };
                self.token_score(token) * position * length_factor(token)
            })
            .sum();
        let mean = total / n;
        if !mean.is_finite() {
            return Err(ScoreError::NoEstimate);
        }
        Ok(mean.clamp(0.0, 1.0))
    }

    /// Unadjusted plausibility of one token.
    pub fn token_score(&self, token: &str) -> f32 {
        if let Some(score) = self.lexicon.word_score(token) {
            return score;
        }

        let mut chars = token.chars();
        let first = match chars.next() {
            Some(c) => c,
            None => return UNKNOWN_SCORE,
        };
        let char_count = 1 + chars.count();
        let all = |class: CharClass| token.chars().all(|c| char_class(c) == class);

        if all(CharClass::Digit) {
            DIGIT_SCORE
        } else if all(CharClass::Latin) {
            LATIN_SCORE
        } else if char_count == 1 && char_class(first) == CharClass::Cjk {
            if self.lexicon.is_function_word(token) {
                FUNCTION_CHAR_SCORE
            } else {
                RARE_CHAR_SCORE
            }
        } else if char_count >= COMPOUND_MIN_CHARS {
            self.best_substring_score(token)
                .map_or(COMPOUND_FLOOR, |s| COMPOUND_DISCOUNT * s)
        } else {
            UNKNOWN_SCORE
        }
    }

    /// Best table score among known words of two or more chars inside `token`.
    fn best_substring_score(&self, token: &str) -> Option<f32> {
        self.lexicon
            .scored_words()
            .filter(|(word, _)| word.chars().count() >= 2 && token.contains(word))
            .map(|(_, score)| score)
            .fold(None, |best: Option<f32>, s| Some(best.map_or(s, |b| b.max(s))))
    }
}

fn length_factor(token: &str) -> f32 {
    match token.chars().count() {
        0 | 1 => 0.8,
        2 => 1.0,
        3 => 1.1,
        _ => 1.2,
    }
}
