//! Context Coherence Scorer
//!
//! Three views of whether a chunk "reads like" live commentary:
//!
//! - **Internal**: share of adjacent token pairs that form a known collocation or
//!   grammar pattern, on a 0.3 base.
//! - **External**: overlap with the last `window_size` tokens of earlier chunks, half
//!   literal token overlap and half topical-bucket Jaccard.
//! - **Pattern**: discourse connectives plus host call-outs (double weight), floored
//!   at 0.3.
//!
//! `final = 0.4·internal + 0.35·external + 0.25·pattern`.

use std::collections::HashSet;
use std::sync::Arc;

use super::count_occurrences;
use crate::error::ScoreError;
use crate::history::BoundedHistory;
use crate::lexicon::{Lexicon, Topic};
use crate::Scored;

pub const NEUTRAL_SCORE: f32 = 0.5;

const INTERNAL_BASE: f32 = 0.3;
const PATTERN_FLOOR: f32 = 0.3;
/// Weighted marker count that saturates the pattern score
const PATTERN_SATURATION: f32 = 3.0;
const HOST_PATTERN_WEIGHT: f32 = 2.0;

const INTERNAL_WEIGHT: f32 = 0.4;
const EXTERNAL_WEIGHT: f32 = 0.35;
const PATTERN_WEIGHT: f32 = 0.25;

pub struct ContextCoherenceScorer {
    lexicon: Arc<Lexicon>,
    window_size: usize,
}

impl ContextCoherenceScorer {
    pub fn new(lexicon: Arc<Lexicon>, window_size: usize) -> Self {
        Self {
            lexicon,
            window_size: window_size.max(1),
        }
    }

    /// `lowered` is the chunk text already lower-cased; `tokens` its tokenization.
    pub fn score(
        &self,
        lowered: &str,
        tokens: &[String],
        history: &BoundedHistory<String>,
    ) -> Scored<f32> {
        Scored::from_result(self.blend(lowered, tokens, history), || NEUTRAL_SCORE)
    }

    fn blend(
        &self,
        lowered: &str,
        tokens: &[String],
        history: &BoundedHistory<String>,
    ) -> Result<f32, ScoreError> {
        if tokens.is_empty() {
            return Err(ScoreError::Empty);
        }
        let score = INTERNAL_WEIGHT * self.internal(tokens)
            + EXTERNAL_WEIGHT * self.external(tokens, history)
            + PATTERN_WEIGHT * self.pattern(lowered);
        if !score.is_finite() {
            return Err(ScoreError::NoEstimate);
        }
        Ok(score.clamp(0.0, 1.0))
    }

    pub fn internal(&self, tokens: &[String]) -> f32 {
        if tokens.len() < 2 {
            return NEUTRAL_SCORE;
        }
        let pairs = tokens.len() - 1;
        let matched = tokens
            .windows(2)
            .filter(|pair| {
                self.lexicon.is_collocation(&pair[0], &pair[1])
                    || self.lexicon.matches_grammar(&pair[0], &pair[1])
            })
            .count();
        (INTERNAL_BASE + matched as f32 / pairs as f32).min(1.0)
    }

    pub fn external(&self, tokens: &[String], history: &BoundedHistory<String>) -> f32 {
        let recent: HashSet<&str> = history
            .recent(self.window_size)
            .map(String::as_str)
            .collect();
        if recent.is_empty() {
            return NEUTRAL_SCORE;
        }
        let current: HashSet<&str> = tokens.iter().map(String::as_str).collect();

        let overlap = current.intersection(&recent).count() as f32 / current.len().max(1) as f32;

        let topics_of = |words: &HashSet<&str>| -> HashSet<Topic> {
            words
                .iter()
                .flat_map(|w| self.lexicon.topics(w).iter().copied())
                .collect()
        };
        let current_topics = topics_of(&current);
        let recent_topics = topics_of(&recent);
        let union = current_topics.union(&recent_topics).count();
        // neither side is topical: no evidence either way
        let topical = if union == 0 {
            NEUTRAL_SCORE
        } else {
            current_topics.intersection(&recent_topics).count() as f32 / union as f32
        };

        0.5 * overlap + 0.5 * topical
    }

    pub fn pattern(&self, lowered: &str) -> f32 {
        let connectives: usize = self
            .lexicon
            .connectives()
            .map(|(_, marker)| count_occurrences(lowered, marker))
            .sum();
        let host: usize = self
            .lexicon
            .host_patterns()
            .iter()
            .map(|p| count_occurrences(lowered, p))
            .sum();
        let weighted = connectives as f32 + HOST_PATTERN_WEIGHT * host as f32;
        (weighted / PATTERN_SATURATION).clamp(PATTERN_FLOOR, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::tokenize;

    fn scorer() -> ContextCoherenceScorer {
        ContextCoherenceScorer::new(Lexicon::builtin(), 5)
    }

    fn history(words: &[&str]) -> BoundedHistory<String> {
        let mut h = BoundedHistory::new(50);
        h.extend(words.iter().map(|w| w.to_string()));
        h
    }

    fn toks(text: &str) -> Vec<String> {
        tokenize(text, &Lexicon::builtin())
    }

    #[test]
    fn test_empty_is_neutral_default() {
        let s = scorer().score("", &[], &history(&[]));
        assert_eq!(s.value, NEUTRAL_SCORE);
        assert!(s.is_defaulted());
    }

    #[test]
    fn test_internal_coherence() {
        let s = scorer();
        assert_eq!(s.internal(&toks("好看")), NEUTRAL_SCORE);
        // 非常|好看 is both a collocation and degree→sentiment
        assert!((s.internal(&toks("非常好看")) - 1.0).abs() < 1e-6);
        // no pair matches
        assert!((s.internal(&toks("饕餮 zorblax")) - INTERNAL_BASE).abs() < 1e-6);
    }

    #[test]
    fn test_external_without_history_is_neutral() {
        assert_eq!(scorer().external(&toks("价格优惠"), &history(&[])), NEUTRAL_SCORE);
    }

    #[test]
    fn test_external_rewards_topic_continuity() {
        let s = scorer();
        let h = history(&["这个", "价格", "优惠"]);
        let on_topic = s.external(&toks("价格"), &h);
        let off_topic = s.external(&toks("明天"), &h);
        assert!((on_topic - 1.0).abs() < 1e-6);
        assert!(off_topic < on_topic);
    }

    #[test]
    fn test_external_only_reads_window() {
        let s = ContextCoherenceScorer::new(Lexicon::builtin(), 2);
        let h = history(&["价格", "饕", "餮"]);
        // 价格 fell out of the two-token window
        assert!(s.external(&toks("价格"), &h) < 0.5 + 1e-6);
    }

    #[test]
    fn test_pattern_floor_and_host_weight() {
        let s = scorer();
        assert_eq!(s.pattern("今天天气"), PATTERN_FLOOR);
        let conn = s.pattern("因为便宜所以买");
        let host = s.pattern("家人们");
        assert!((conn - 2.0 / 3.0).abs() < 1e-6);
        assert!((host - 2.0 / 3.0).abs() < 1e-6);
        assert_eq!(s.pattern("家人们 因为 所以 但是"), 1.0);
    }

    #[test]
    fn test_final_blend_bounds() {
        let s = scorer();
        let h = history(&["家人们", "价格"]);
        let text = "家人们,因为价格非常优惠所以马上下单";
        let v = s.score(text, &toks(text), &h).value;
        assert!((0.0..=1.0).contains(&v));
        assert!(v > NEUTRAL_SCORE);
    }
}
