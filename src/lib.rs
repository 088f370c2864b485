//! Caption acceptance gating for live speech recognition.
//!
//! Every chunk of a live broadcast comes back from the recognizer with some text and
//! an opaque confidence. This crate decides whether that text is trustworthy enough to
//! surface as a caption: it measures the audio, extracts prosody, guesses the
//! speaker's emotion, checks the text for lexical plausibility and discourse
//! coherence, fuses all of it into a final confidence and compares that against a
//! threshold that keeps re-tuning itself from audio conditions and outcome feedback.
//!
//! One [`CaptionSession`] per live stream. Sessions share nothing mutable, so any
//! number of them can run side by side.

pub mod config;
pub mod dsp;
pub mod error;
pub mod fusion;
pub mod history;
pub mod lexicon;
pub mod session;
pub mod text;
pub mod threshold;

use serde::{Deserialize, Serialize};

use crate::error::ScoreError;

pub use config::{EngineConfig, FusionConfig, TextConfig, ThresholdConfig};
pub use dsp::{AudioQualityEstimator, ProsodyExtractor};
pub use error::ConfigError;
pub use fusion::{ConfidenceFusionEngine, FusionInputs, TextOverrides, TextScores};
pub use history::BoundedHistory;
pub use lexicon::Lexicon;
pub use session::{CaptionSession, ChunkInput, ChunkOutcome, ForceReason, GateDecision, SessionStats};
pub use text::{ContextCoherenceScorer, EmotionClassifier, EmotionCues, WordFrequencyScorer};
pub use threshold::{
    AdaptiveThresholdController, ComponentFactors, PerformanceHistoryTracker, ThresholdState,
    ThresholdUpdate, MAX_THRESHOLD, MIN_THRESHOLD,
};

/// Number of cepstral coefficients kept by the MFCC extractor.
pub const MFCC_COEFFS: usize = 13;

// =============================================================================
// Provenance
// =============================================================================

/// Why a sub-scorer returned its documented default instead of a measurement.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradeReason {
    /// Empty, too short or non-finite input.
    MalformedInput,
    /// Input was well formed but carried nothing to measure (silence, no voiced frames).
    InsufficientSignal,
    /// The chunk's latency budget ran out before this stage started.
    DeadlineExceeded,
}

impl From<ScoreError> for DegradeReason {
    fn from(err: ScoreError) -> Self {
        match err {
            ScoreError::Empty | ScoreError::TooShort | ScoreError::NonFinite => {
                DegradeReason::MalformedInput
            }
            ScoreError::Silent | ScoreError::NoEstimate => DegradeReason::InsufficientSignal,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "reason")]
pub enum Provenance {
    Computed,
    Defaulted(DegradeReason),
}

/// A sub-scorer result tagged with whether it was measured or defaulted.
#[derive(Clone, Debug, PartialEq)]
pub struct Scored<T> {
    pub value: T,
    pub provenance: Provenance,
}

impl<T> Scored<T> {
    pub fn computed(value: T) -> Self {
        Self {
            value,
            provenance: Provenance::Computed,
        }
    }

    pub fn defaulted(value: T, reason: DegradeReason) -> Self {
        Self {
            value,
            provenance: Provenance::Defaulted(reason),
        }
    }

    #[inline]
    pub fn is_defaulted(&self) -> bool {
        matches!(self.provenance, Provenance::Defaulted(_))
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Scored<U> {
        Scored {
            value: f(self.value),
            provenance: self.provenance,
        }
    }

    pub(crate) fn from_result(result: Result<T, ScoreError>, default: impl FnOnce() -> T) -> Self {
        match result {
            Ok(value) => Self::computed(value),
            Err(err) => Self::defaulted(default(), err.into()),
        }
    }
}

/// Pipeline components that can fall back to defaults.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Component {
    AudioQuality,
    Prosody,
    Emotion,
    WordFrequency,
    ContextCoherence,
}

// =============================================================================
// Per-chunk measurements
// =============================================================================

/// Scalar quality metrics of one chunk of audio. All levels are 0.0..=1.0.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AudioQuality {
    pub noise_level: f32,
    pub volume_level: f32,
    pub clarity_score: f32,
    pub sample_rate: u32,
}

impl AudioQuality {
    pub const NEUTRAL_LEVEL: f32 = 0.5;

    pub fn neutral(sample_rate: u32) -> Self {
        Self {
            noise_level: Self::NEUTRAL_LEVEL,
            volume_level: Self::NEUTRAL_LEVEL,
            clarity_score: Self::NEUTRAL_LEVEL,
            sample_rate,
        }
    }

    /// `0.4·(1−noise) + 0.3·volume + 0.3·clarity`, in 0.0..=1.0.
    pub fn overall_quality(&self) -> f32 {
        (0.4 * (1.0 - self.noise_level) + 0.3 * self.volume_level + 0.3 * self.clarity_score)
            .clamp(0.0, 1.0)
    }
}

/// Pitch, energy and spectral descriptors of one chunk.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProsodyFeatures {
    /// Fundamental frequency (Hz)
    pub f0: f32,
    /// Std-dev of per-frame F0 (Hz)
    pub pitch_variance: f32,
    /// Std-dev of per-frame energy over mean energy
    pub energy_variance: f32,
    /// PSD-weighted mean frequency (Hz)
    pub spectral_centroid: f32,
    pub zero_crossing_rate: f32,
    pub mfcc: [f32; MFCC_COEFFS],
}

impl Default for ProsodyFeatures {
    fn default() -> Self {
        Self {
            f0: dsp::prosody::DEFAULT_F0_HZ,
            pitch_variance: dsp::prosody::DEFAULT_PITCH_VARIANCE_HZ,
            energy_variance: dsp::prosody::DEFAULT_ENERGY_VARIANCE,
            spectral_centroid: dsp::prosody::DEFAULT_SPECTRAL_CENTROID_HZ,
            zero_crossing_rate: dsp::prosody::DEFAULT_ZCR,
            mfcc: dsp::mfcc::default_mfcc(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmotionType {
    Excited,
    Joyful,
    Calm,
    Frustrated,
    Anxious,
    Neutral,
}

impl EmotionType {
    pub const ALL: [EmotionType; 6] = [
        EmotionType::Excited,
        EmotionType::Joyful,
        EmotionType::Calm,
        EmotionType::Frustrated,
        EmotionType::Anxious,
        EmotionType::Neutral,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            EmotionType::Excited => "excited",
            EmotionType::Joyful => "joyful",
            EmotionType::Calm => "calm",
            EmotionType::Frustrated => "frustrated",
            EmotionType::Anxious => "anxious",
            EmotionType::Neutral => "neutral",
        }
    }
}

impl Default for EmotionType {
    fn default() -> Self {
        EmotionType::Neutral
    }
}

/// Word timing reported by the recognizer, relative to the chunk start.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WordBoundary {
    pub word: String,
    pub start_secs: f32,
    pub end_secs: f32,
}

/// Emotion inferred for one chunk.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EmotionFeatures {
    pub emotion_type: EmotionType,
    /// 0.0..=1.0
    pub intensity: f32,
    /// Words per minute
    pub speech_rate: f32,
    /// How far the classifier trusts itself, 0.0..=1.0
    pub tone_confidence: f32,
    /// Gaps between consecutive words (seconds), empty without word boundaries
    pub pause_pattern: Vec<f32>,
    /// 0.0..=1.0
    pub voice_stress: f32,
}

impl EmotionFeatures {
    pub const FALLBACK_INTENSITY: f32 = 0.3;
    pub const FALLBACK_TONE_CONFIDENCE: f32 = 0.3;

    /// Safe result returned whenever classification cannot complete.
    pub fn fallback() -> Self {
        Self {
            emotion_type: EmotionType::Neutral,
            intensity: Self::FALLBACK_INTENSITY,
            speech_rate: 0.0,
            tone_confidence: Self::FALLBACK_TONE_CONFIDENCE,
            pause_pattern: Vec::new(),
            voice_stress: 0.0,
        }
    }
}

/// Everything the fusion engine knew when it produced `final_confidence`.
///
/// All scores lie in 0.0..=1.0. `degraded` lists the components that fell back to
/// their defaults for this chunk; an empty list means everything was measured.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceBreakdown {
    pub recognizer_confidence: f32,
    pub word_frequency_score: f32,
    pub context_coherence_score: f32,
    pub audio_quality_score: f32,
    pub emotion_boost: f32,
    pub final_confidence: f32,
    #[serde(default)]
    pub degraded: Vec<Component>,
}

impl ConfidenceBreakdown {
    pub const NEUTRAL_SCORE: f32 = 0.5;

    /// Breakdown used when fusion itself cannot run: every sub-score neutral and the
    /// recognizer's own confidence passed through.
    pub fn passthrough(recognizer_confidence: f32) -> Self {
        let recognizer_confidence = sanitize_unit(recognizer_confidence);
        Self {
            recognizer_confidence,
            word_frequency_score: Self::NEUTRAL_SCORE,
            context_coherence_score: Self::NEUTRAL_SCORE,
            audio_quality_score: Self::NEUTRAL_SCORE,
            emotion_boost: 0.0,
            final_confidence: recognizer_confidence,
            degraded: vec![
                Component::WordFrequency,
                Component::ContextCoherence,
                Component::AudioQuality,
            ],
        }
    }

    #[inline]
    pub fn is_degraded(&self) -> bool {
        !self.degraded.is_empty()
    }

    /// `0.4·recognizer + 0.25·wordfreq + 0.2·context + 0.15·audio`, before any boost.
    pub fn overall_quality(&self) -> f32 {
        (0.4 * self.recognizer_confidence
            + 0.25 * self.word_frequency_score
            + 0.2 * self.context_coherence_score
            + 0.15 * self.audio_quality_score)
            .clamp(0.0, 1.0)
    }
}

/// Outcome metrics for a span of emitted captions, supplied by an external evaluator.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSample {
    pub accuracy: f32,
    pub precision: f32,
    pub recall: f32,
    pub f1: f32,
    pub false_positive_rate: f32,
    pub false_negative_rate: f32,
    pub sample_count: u32,
}

impl PerformanceSample {
    /// Sample with only accuracy/precision/recall known; F1 is derived.
    pub fn from_prf(accuracy: f32, precision: f32, recall: f32) -> Self {
        let denom = precision + recall;
        let f1 = if denom > f32::EPSILON {
            2.0 * precision * recall / denom
        } else {
            0.0
        };
        Self {
            accuracy,
            precision,
            recall,
            f1,
            false_positive_rate: (1.0 - precision).clamp(0.0, 1.0),
            false_negative_rate: (1.0 - recall).clamp(0.0, 1.0),
            sample_count: 1,
        }
    }
}

/// Clamp to 0.0..=1.0, mapping NaN to 0.0.
#[inline]
pub(crate) fn sanitize_unit(x: f32) -> f32 {
    if x.is_finite() {
        x.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overall_audio_quality() {
        let q = AudioQuality {
            noise_level: 0.05,
            volume_level: 0.7,
            clarity_score: 0.9,
            sample_rate: 16000,
        };
        assert!((q.overall_quality() - 0.86).abs() < 1e-5);
        assert!((AudioQuality::neutral(16000).overall_quality() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_passthrough_breakdown() {
        let b = ConfidenceBreakdown::passthrough(0.72);
        assert_eq!(b.final_confidence, 0.72);
        assert_eq!(b.word_frequency_score, 0.5);
        assert!(b.is_degraded());

        let nan = ConfidenceBreakdown::passthrough(f32::NAN);
        assert_eq!(nan.final_confidence, 0.0);
    }

    #[test]
    fn test_scored_from_result() {
        let ok: Scored<f32> = Scored::from_result(Ok(0.7), || 0.5);
        assert!(!ok.is_defaulted());

        let err: Scored<f32> = Scored::from_result(Err(ScoreError::Empty), || 0.5);
        assert_eq!(err.value, 0.5);
        assert_eq!(
            err.provenance,
            Provenance::Defaulted(DegradeReason::MalformedInput)
        );
    }

    #[test]
    fn test_f1_from_prf() {
        let s = PerformanceSample::from_prf(0.8, 0.75, 0.75);
        assert!((s.f1 - 0.75).abs() < 1e-6);
        let zero = PerformanceSample::from_prf(0.0, 0.0, 0.0);
        assert_eq!(zero.f1, 0.0);
    }
}
