//! Emotion Classifier
//!
//! Text decides the class; speech rate and prosody only shape how much the result
//! is trusted.
//!
//! 1. **Text pass**: weighted keyword hits per class (salient ×1.5, particles ×1.2,
//!    baseline ×1.0) over `hits + 1`, arg-max wins, scaled by degree adverbs
//!    (×1.5 / ×1.2 / ×0.8 each, product capped at 2.0).
//! 2. **Speech-rate pass**: words per minute against each class's plausible band.
//! 3. **Prosody pass**: voiced-range F0 and a clean signal raise the self-trust.
//! 4. **Fusion**: intensity = text × 0.6 (+0.1 when the rate agrees), tone from the
//!    prosody pass, discounted on unclear audio.
//!
//! Empty text yields the neutral fallback.

use std::sync::Arc;

use log::trace;

use super::{count_occurrences, word_count};
use crate::dsp::prosody::{ENERGY_VARIANCE_CAP, PITCH_VARIANCE_CAP_HZ};
use crate::error::ScoreError;
use crate::lexicon::Lexicon;
use crate::{AudioQuality, EmotionFeatures, EmotionType, ProsodyFeatures, Scored, WordBoundary};

// =============================================================================
// Constants
// =============================================================================

/// Text intensity when no emotion keyword is present
const NEUTRAL_TEXT_INTENSITY: f32 = 0.5;

const DEGREE_FACTOR_CAP: f32 = 2.0;

/// Share of the text intensity kept in the final intensity
const TEXT_INTENSITY_SCALE: f32 = 0.6;

/// Added when the speech-rate pass agrees with the text pass
const RATE_AGREEMENT_BONUS: f32 = 0.1;
const RATE_AGREEMENT_PROXIMITY: f32 = 0.7;

const PROSODY_BASE_CONFIDENCE: f32 = 0.5;
const VOICED_F0_BONUS: f32 = 0.2;
const VOICED_F0_MIN_HZ: f32 = 80.0;
const VOICED_F0_MAX_HZ: f32 = 300.0;
const SIGNAL_BONUS_MAX: f32 = 0.3;

/// Tone-confidence blend: fixed text trust + prosody trust
const TONE_TEXT_WEIGHT: f32 = 0.6;
const TONE_PROSODY_WEIGHT: f32 = 0.4;

/// Clarity below this discounts tone confidence by `UNCLEAR_TONE_FACTOR`
const UNCLEAR_CLARITY: f32 = 0.5;
const UNCLEAR_TONE_FACTOR: f32 = 0.8;

/// Everything the classifier may use for one chunk. Only `text` is required.
#[derive(Clone, Copy, Debug, Default)]
pub struct EmotionCues<'a> {
    pub text: &'a str,
    pub duration_secs: f32,
    pub word_boundaries: Option<&'a [WordBoundary]>,
    pub prosody: Option<&'a ProsodyFeatures>,
    pub audio_quality: Option<&'a AudioQuality>,
}

impl<'a> EmotionCues<'a> {
    pub fn text(text: &'a str) -> Self {
        Self {
            text,
            ..Self::default()
        }
    }
}

pub struct EmotionClassifier {
    lexicon: Arc<Lexicon>,
}

impl EmotionClassifier {
    pub fn new(lexicon: Arc<Lexicon>) -> Self {
        Self { lexicon }
    }

    pub fn classify(&self, cues: &EmotionCues<'_>) -> Scored<EmotionFeatures> {
        let result = self.infer(cues);
        if let Err(err) = &result {
            trace!("emotion defaulted: {err}");
        }
        Scored::from_result(result, EmotionFeatures::fallback)
    }

    fn infer(&self, cues: &EmotionCues<'_>) -> Result<EmotionFeatures, ScoreError> {
        let lowered = cues.text.trim().to_lowercase();
        if lowered.is_empty() {
            return Err(ScoreError::Empty);
        }

        // 1) Text pass
        let (emotion_type, text_intensity) = self.text_emotion(&lowered);

        // 2) Speech-rate pass
        let speech_rate = speech_rate_wpm(cues);
        let rate_agrees = self
            .top_rate_candidate(speech_rate)
            .map_or(false, |(top, proximity)| {
                top == emotion_type && proximity > RATE_AGREEMENT_PROXIMITY
            });

        // 3) Prosody pass
        let prosody_confidence = prosody_confidence(cues.prosody, cues.audio_quality);

        // 4) Fusion
        let mut intensity = text_intensity * TEXT_INTENSITY_SCALE;
        if rate_agrees {
            intensity += RATE_AGREEMENT_BONUS;
        }
        let mut tone_confidence = (TONE_TEXT_WEIGHT + TONE_PROSODY_WEIGHT * prosody_confidence)
            / (TONE_TEXT_WEIGHT + TONE_PROSODY_WEIGHT);
        if cues
            .audio_quality
            .map_or(false, |q| q.clarity_score < UNCLEAR_CLARITY)
        {
            tone_confidence *= UNCLEAR_TONE_FACTOR;
        }

        if !(intensity.is_finite() && tone_confidence.is_finite()) {
            return Err(ScoreError::NoEstimate);
        }

        Ok(EmotionFeatures {
            emotion_type,
            intensity: intensity.clamp(0.0, 1.0),
            speech_rate,
            tone_confidence: tone_confidence.clamp(0.0, 1.0),
            pause_pattern: cues.word_boundaries.map(pause_pattern).unwrap_or_default(),
            voice_stress: cues.prosody.map_or(0.0, voice_stress),
        })
    }

    /// Arg-max class of the keyword pass and its degree-scaled intensity.
    /// Text without any keyword reads as neutral at 0.5.
    pub fn text_emotion(&self, lowered: &str) -> (EmotionType, f32) {
        let mut best = (EmotionType::Neutral, 0.0f32);
        for emotion in EmotionType::ALL {
            if emotion == EmotionType::Neutral {
                continue;
            }
            let groups = match self.lexicon.keyword_groups(emotion) {
                Some(groups) => groups,
                None => continue,
            };
            let mut hits = 0usize;
            let mut weighted = 0.0f32;
            for (keyword, weight) in groups.weighted() {
                let n = count_occurrences(lowered, keyword);
                hits += n;
                weighted += n as f32 * weight;
            }
            let score = weighted / (hits + 1) as f32;
            if score > best.1 {
                best = (emotion, score);
            }
        }

        if best.1 <= 0.0 {
            return (EmotionType::Neutral, NEUTRAL_TEXT_INTENSITY);
        }
        let intensity = (best.1 * self.degree_factor(lowered)).min(1.0);
        (best.0, intensity)
    }

    /// Product of the degree-adverb factors found in `lowered`, capped at 2.0.
    pub fn degree_factor(&self, lowered: &str) -> f32 {
        let mut remaining = lowered.to_string();
        let mut factor = 1.0f32;
        for (word, level) in self.lexicon.degree_modifiers() {
            let hits = count_occurrences(&remaining, word);
            if hits == 0 {
                continue;
            }
            factor *= level.factor().powi(hits as i32);
            // consume CJK modifiers so "超" is not counted again inside "超级"
            if !word.is_ascii() {
                remaining = remaining.replace(word.as_str(), " ");
            }
        }
        factor.min(DEGREE_FACTOR_CAP)
    }

    /// How close `wpm` sits to the centre of the emotion's plausible band.
    /// 1.0 at the centre, 0.5 at the band edge, fading to 0 one half-width outside.
    pub fn rate_proximity(&self, emotion: EmotionType, wpm: f32) -> Option<f32> {
        let (min, max) = self.lexicon.speech_rate_band(emotion)?;
        let half = 0.5 * (max - min);
        if half <= 0.0 {
            return None;
        }
        let center = min + half;
        let proximity = if (min..=max).contains(&wpm) {
            1.0 - 0.5 * (wpm - center).abs() / half
        } else {
            let outside = if wpm < min { min - wpm } else { wpm - max };
            (0.5 - 0.5 * outside / half).max(0.0)
        };
        Some(proximity)
    }

    /// Best-matching emotion for a speech rate. `None` without a usable rate.
    pub fn top_rate_candidate(&self, wpm: f32) -> Option<(EmotionType, f32)> {
        if !(wpm.is_finite() && wpm > 0.0) {
            return None;
        }
        EmotionType::ALL
            .iter()
            .filter_map(|&e| self.rate_proximity(e, wpm).map(|p| (e, p)))
            .fold(None, |best: Option<(EmotionType, f32)>, cand| match best {
                Some(b) if b.1 >= cand.1 => Some(b),
                _ => Some(cand),
            })
    }
}

/// Words per minute over the chunk. Word boundaries, when present, supply the
/// word count and (without a chunk duration) the speaking span.
pub fn speech_rate_wpm(cues: &EmotionCues<'_>) -> f32 {
    let (words, span) = match cues.word_boundaries {
        Some(b) if !b.is_empty() => {
            let span = b[b.len() - 1].end_secs - b[0].start_secs;
            (b.len() as f32, span)
        }
        _ => (word_count(cues.text), 0.0),
    };
    let duration = if cues.duration_secs.is_finite() && cues.duration_secs > 0.0 {
        cues.duration_secs
    } else {
        span
    };
    if !(duration.is_finite() && duration > 0.0) {
        return 0.0;
    }
    words / duration * 60.0
}

/// 0.5 base, +0.2 for a voiced-range F0, up to +0.3 for a clear, quiet signal.
pub fn prosody_confidence(prosody: Option<&ProsodyFeatures>, quality: Option<&AudioQuality>) -> f32 {
    let mut confidence = PROSODY_BASE_CONFIDENCE;
    if let Some(p) = prosody {
        if (VOICED_F0_MIN_HZ..=VOICED_F0_MAX_HZ).contains(&p.f0) {
            confidence += VOICED_F0_BONUS;
        }
    }
    if let Some(q) = quality {
        let signal = 0.5 * q.clarity_score + 0.5 * (1.0 - q.noise_level);
        confidence += SIGNAL_BONUS_MAX * signal.clamp(0.0, 1.0);
    }
    confidence.clamp(0.0, 1.0)
}

/// Silent gaps between consecutive words (seconds).
pub fn pause_pattern(boundaries: &[WordBoundary]) -> Vec<f32> {
    boundaries
        .windows(2)
        .map(|w| (w[1].start_secs - w[0].end_secs).max(0.0))
        .collect()
}

/// Even blend of normalized pitch and energy variability.
pub fn voice_stress(prosody: &ProsodyFeatures) -> f32 {
    let pitch = (prosody.pitch_variance / PITCH_VARIANCE_CAP_HZ).clamp(0.0, 1.0);
    let energy = (prosody.energy_variance / ENERGY_VARIANCE_CAP).clamp(0.0, 1.0);
    let stress = 0.5 * pitch + 0.5 * energy;
    if stress.is_finite() {
        stress
    } else {
        0.0
    }
}
