//! Confidence Fusion Engine
//!
//! # Purpose
//! Combines the recognizer's own confidence with lexical plausibility, discourse
//! coherence and audio quality into one `final_confidence`, plus a small bonus
//! when the speaker is clearly emotional (emotional speech is harder to recognize
//! but is exactly what viewers want captioned).
//!
//! # Design Notes
//! - Weights are renormalized at construction.
//! - Scoring (`score_text`, `fuse_text`, `evaluate`, `fuse`) is read-only. The chunk's tokens only enter the
//!   token history through `commit_tokens`, so a discarded chunk leaves no trace.
//! - Non-finite inputs never reach the caller: fusion falls back to a passthrough
//!   breakdown carrying the recognizer confidence.

use std::sync::Arc;

use log::{trace, warn};

use crate::config::{FusionConfig, TextConfig};
use crate::error::{ConfigError, ScoreError};
use crate::history::BoundedHistory;
use crate::lexicon::Lexicon;
use crate::text::{tokenize, ContextCoherenceScorer, WordFrequencyScorer};
use crate::{
    sanitize_unit, AudioQuality, Component, ConfidenceBreakdown, DegradeReason, EmotionFeatures,
    Scored,
};

/// Scores fused for one chunk.
#[derive(Clone, Debug, PartialEq)]
pub struct FusionInputs {
    pub recognizer_confidence: f32,
    pub word_frequency: Scored<f32>,
    pub context_coherence: Scored<f32>,
    /// Overall audio quality score, 0.0..=1.0
    pub audio_quality: Scored<f32>,
    pub emotion: Option<Scored<EmotionFeatures>>,
    /// Emotion-keyword occurrences in the raw text
    pub emotion_lexicon_hits: usize,
}

impl FusionInputs {
    /// All scores measured, no emotion.
    pub fn new(
        recognizer_confidence: f32,
        word_frequency: f32,
        context_coherence: f32,
        audio_quality: f32,
    ) -> Self {
        Self {
            recognizer_confidence,
            word_frequency: Scored::computed(word_frequency),
            context_coherence: Scored::computed(context_coherence),
            audio_quality: Scored::computed(audio_quality),
            emotion: None,
            emotion_lexicon_hits: 0,
        }
    }
}

/// Result of scoring a chunk's text and fusing it. `tokens` are what
/// [`ConfidenceFusionEngine::commit_tokens`] should append once the chunk is kept.
#[derive(Clone, Debug, PartialEq)]
pub struct FusionOutcome {
    pub breakdown: ConfidenceBreakdown,
    pub tokens: Vec<String>,
}

/// Lexical scores for one chunk, independent of its audio.
#[derive(Clone, Debug, PartialEq)]
pub struct TextScores {
    pub tokens: Vec<String>,
    pub word_frequency: Scored<f32>,
    pub context_coherence: Scored<f32>,
    pub emotion_lexicon_hits: usize,
}

/// Which text scorers to skip for this chunk (e.g. the latency budget is spent).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TextOverrides {
    pub word_frequency: Option<DegradeReason>,
    pub context_coherence: Option<DegradeReason>,
}

pub struct ConfidenceFusionEngine {
    config: FusionConfig,
    lexicon: Arc<Lexicon>,
    word_frequency: WordFrequencyScorer,
    coherence: ContextCoherenceScorer,
    token_history: BoundedHistory<String>,
}

impl ConfidenceFusionEngine {
    pub fn new(
        config: FusionConfig,
        text: TextConfig,
        lexicon: Arc<Lexicon>,
    ) -> Result<Self, ConfigError> {
        let config = config.validate()?;
        let text = text.validate()?;
        Ok(Self {
            config,
            word_frequency: WordFrequencyScorer::new(Arc::clone(&lexicon)),
            coherence: ContextCoherenceScorer::new(Arc::clone(&lexicon), text.window_size),
            token_history: BoundedHistory::new(text.token_history_capacity),
            lexicon,
        })
    }

    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    pub fn token_history(&self) -> &BoundedHistory<String> {
        &self.token_history
    }

    /// Score `text` against the current token history and fuse. Read-only.
    pub fn evaluate(
        &self,
        text: &str,
        recognizer_confidence: f32,
        audio_quality: &Scored<AudioQuality>,
        emotion: Option<&Scored<EmotionFeatures>>,
    ) -> FusionOutcome {
        self.evaluate_with(
            text,
            recognizer_confidence,
            audio_quality,
            emotion,
            TextOverrides::default(),
        )
    }

    pub fn evaluate_with(
        &self,
        text: &str,
        recognizer_confidence: f32,
        audio_quality: &Scored<AudioQuality>,
        emotion: Option<&Scored<EmotionFeatures>>,
        overrides: TextOverrides,
    ) -> FusionOutcome {
        let scores = self.score_text(text, overrides);
        self.fuse_text(scores, recognizer_confidence, audio_quality, emotion)
    }

    /// Tokenize `text` and run the lexical scorers against the current token history.
    pub fn score_text(&self, text: &str, overrides: TextOverrides) -> TextScores {
        let lowered = text.to_lowercase();
        let tokens = tokenize(&lowered, &self.lexicon);

        let word_frequency = match overrides.word_frequency {
            Some(reason) => Scored::defaulted(ConfidenceBreakdown::NEUTRAL_SCORE, reason),
            None => self.word_frequency.score(&tokens),
        };
        let context_coherence = match overrides.context_coherence {
            Some(reason) => Scored::defaulted(ConfidenceBreakdown::NEUTRAL_SCORE, reason),
            None => self.coherence.score(&lowered, &tokens, &self.token_history),
        };
        trace!(
            "text scores: word_frequency={:.3} context={:.3} tokens={}",
            word_frequency.value,
            context_coherence.value,
            tokens.len()
        );

        TextScores {
            emotion_lexicon_hits: self.lexicon.emotion_hits(&lowered),
            tokens,
            word_frequency,
            context_coherence,
        }
    }

    /// Fuse text scores from [`Self::score_text`] with the chunk's acoustics.
    pub fn fuse_text(
        &self,
        scores: TextScores,
        recognizer_confidence: f32,
        audio_quality: &Scored<AudioQuality>,
        emotion: Option<&Scored<EmotionFeatures>>,
    ) -> FusionOutcome {
        let inputs = FusionInputs {
            recognizer_confidence,
            word_frequency: scores.word_frequency,
            context_coherence: scores.context_coherence,
            audio_quality: audio_quality.clone().map(|q| q.overall_quality()),
            emotion: emotion.cloned(),
            emotion_lexicon_hits: scores.emotion_lexicon_hits,
        };

        FusionOutcome {
            breakdown: self.fuse(&inputs),
            tokens: scores.tokens,
        }
    }

    /// Fuse precomputed scores into a breakdown. Never fails.
    pub fn fuse(&self, inputs: &FusionInputs) -> ConfidenceBreakdown {
        match self.try_fuse(inputs) {
            Ok(breakdown) => breakdown,
            Err(err) => {
                warn!("Fusion fell back to recognizer confidence: {err}");
                ConfidenceBreakdown::passthrough(inputs.recognizer_confidence)
            }
        }
    }

    fn try_fuse(&self, inputs: &FusionInputs) -> Result<ConfidenceBreakdown, ScoreError> {
        let scores = [
            inputs.recognizer_confidence,
            inputs.word_frequency.value,
            inputs.context_coherence.value,
            inputs.audio_quality.value,
        ];
        if scores.iter().any(|s| !s.is_finite()) {
            return Err(ScoreError::NonFinite);
        }
        let [recognizer, word_frequency, context, audio] = scores.map(sanitize_unit);

        let weighted: f32 = self
            .config
            .weights()
            .iter()
            .zip([recognizer, word_frequency, context, audio])
            .map(|(w, s)| w * s)
            .sum();

        // a defaulted emotion is a placeholder, not a measurement
        let emotion_boost = self.emotion_boost(
            inputs
                .emotion
                .as_ref()
                .filter(|e| !e.is_defaulted())
                .map(|e| &e.value),
            inputs.emotion_lexicon_hits,
        );

        let final_confidence = weighted + emotion_boost;
        if !final_confidence.is_finite() {
            return Err(ScoreError::NoEstimate);
        }

        let mut degraded = Vec::new();
        if inputs.word_frequency.is_defaulted() {
            degraded.push(Component::WordFrequency);
        }
        if inputs.context_coherence.is_defaulted() {
            degraded.push(Component::ContextCoherence);
        }
        if inputs.audio_quality.is_defaulted() {
            degraded.push(Component::AudioQuality);
        }
        if inputs.emotion.as_ref().map_or(false, Scored::is_defaulted) {
            degraded.push(Component::Emotion);
        }

        Ok(ConfidenceBreakdown {
            recognizer_confidence: recognizer,
            word_frequency_score: word_frequency,
            context_coherence_score: context,
            audio_quality_score: audio,
            emotion_boost,
            final_confidence: final_confidence.clamp(0.0, 1.0),
            degraded,
        })
    }

    /// `min(intensity·tone·0.5, cap)` plus a capped bonus per emotion-keyword hit;
    /// the total is capped again.
    pub fn emotion_boost(&self, emotion: Option<&EmotionFeatures>, lexicon_hits: usize) -> f32 {
        let cfg = &self.config;
        let prosodic = emotion.map_or(0.0, |e| {
            (sanitize_unit(e.intensity) * sanitize_unit(e.tone_confidence) * 0.5)
                .clamp(0.0, cfg.prosody_boost_cap)
        });
        let lexical = (cfg.lexicon_hit_boost * lexicon_hits as f32).min(cfg.lexicon_boost_cap);
        (prosodic + lexical).min(cfg.emotion_boost_cap)
    }

    /// Append a kept chunk's tokens to the history.
    pub fn commit_tokens(&mut self, tokens: Vec<String>) {
        self.token_history.extend(tokens);
    }

    /// Evaluate and commit in one step.
    pub fn process(
        &mut self,
        text: &str,
        recognizer_confidence: f32,
        audio_quality: &Scored<AudioQuality>,
        emotion: Option<&Scored<EmotionFeatures>>,
    ) -> ConfidenceBreakdown {
        let outcome = self.evaluate(text, recognizer_confidence, audio_quality, emotion);
        self.commit_tokens(outcome.tokens);
        outcome.breakdown
    }

    pub fn clear_history(&mut self) {
        self.token_history.clear();
    }
}
