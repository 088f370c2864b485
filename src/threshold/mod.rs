//! Adaptive Threshold Controller
//!
//! # Purpose
//! Keeps the caption acceptance threshold tuned to the stream: lower when audio is
//! clean and the speaker is animated (more captions get through), higher when audio
//! is poor, the speaker is agitated, or recent feedback says too much junk got out.
//!
//! # Control Law
//! Four independent terms, each clipped to its own range:
//!
//! | term        | source                                   | range  |
//! |-------------|------------------------------------------|--------|
//! | audio       | quality tier match, else linear fallback | ±0.3   |
//! | emotion     | per-class base + intensity/tone offsets  | ±0.2   |
//! | historical  | target gap × threshold/outcome correlation | ±0.2 |
//! | real-time   | overall quality of the latest breakdown  | ±0.1   |
//!
//! `total = Σ wᵢ·termᵢ`, rate-limited to ±`adaptation_speed`, then
//! `threshold = clip(base + total, 0.3, 0.9)`.
//!
//! # Design Notes
//! - `propose` is read-only; `commit` applies an update. A chunk abandoned between
//!   the two leaves the state untouched.
//! - Feedback samples are kept by the owned [`PerformanceHistoryTracker`].

pub mod history;
pub mod tiers;

use std::time::Instant;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::config::ThresholdConfig;
use crate::error::ConfigError;
use crate::{AudioQuality, ConfidenceBreakdown, EmotionFeatures, EmotionType, PerformanceSample};

pub use history::{pearson, MetricMeans, PerformanceHistoryTracker, PerformanceRecord};
pub use tiers::{best_tier, QualityTier, QUALITY_TIERS};

// =============================================================================
// Constants
// =============================================================================

pub const MIN_THRESHOLD: f32 = 0.3;
pub const MAX_THRESHOLD: f32 = 0.9;

/// Term limits
const AUDIO_LIMIT: f32 = 0.3;
const EMOTION_LIMIT: f32 = 0.2;
const HISTORICAL_LIMIT: f32 = 0.2;
const REAL_TIME_LIMIT: f32 = 0.1;

/// Tier adjustments apply only above this match ratio
const TIER_MATCH_MIN: f32 = 0.5;
/// Linear audio fallback: `(pivot − overall) × slope`
const AUDIO_PIVOT: f32 = 0.7;
const AUDIO_SLOPE: f32 = 0.3;

const EMOTION_INTENSITY_SLOPE: f32 = 0.2;
const EMOTION_TONE_SLOPE: f32 = 0.1;

/// Records averaged by the historical term
const HISTORY_RECENT_WINDOW: usize = 20;

/// (target, weight) for accuracy, precision, recall, f1
const ACCURACY_TARGET: (f32, f32) = (0.8, 0.4);
const PRECISION_TARGET: (f32, f32) = (0.75, 0.2);
const RECALL_TARGET: (f32, f32) = (0.8, 0.3);
const F1_TARGET: (f32, f32) = (0.77, 0.1);

const GAP_GAIN: f32 = 0.5;
/// Gain on a negative gap (outcomes beat their targets)
const SURPLUS_GAIN: f32 = 0.2;

const REAL_TIME_HIGH_QUALITY: f32 = 0.8;
const REAL_TIME_LOW_QUALITY: f32 = 0.4;
const REAL_TIME_STEP: f32 = 0.05;
const REAL_TIME_PIVOT: f32 = 0.6;
const REAL_TIME_SLOPE: f32 = 0.1;

/// Self-trust when nothing is known yet
const DEFAULT_CONFIDENCE_LEVEL: f32 = 0.5;

/// Per-class threshold shift: agitated speakers need a stricter gate.
fn emotion_base(emotion: EmotionType) -> f32 {
    match emotion {
        EmotionType::Excited => -0.1,
        EmotionType::Joyful => -0.05,
        EmotionType::Calm => 0.05,
        EmotionType::Frustrated => 0.1,
        EmotionType::Anxious => 0.08,
        EmotionType::Neutral => 0.0,
    }
}

/// How strongly intensity moves the threshold for each class.
fn intensity_factor(emotion: EmotionType) -> f32 {
    match emotion {
        EmotionType::Excited => 1.2,
        EmotionType::Joyful => 1.0,
        EmotionType::Calm => 0.8,
        EmotionType::Frustrated => 1.1,
        EmotionType::Anxious => 1.1,
        EmotionType::Neutral => 1.0,
    }
}

#[inline]
fn finite_or_zero(x: f32) -> f32 {
    if x.is_finite() {
        x
    } else {
        0.0
    }
}

// =============================================================================
// State
// =============================================================================

/// Latest value of each adjustment term.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentFactors {
    pub audio: f32,
    pub emotion: f32,
    pub historical: f32,
    pub real_time: f32,
}

impl ComponentFactors {
    fn weighted_sum(&self, weights: [f32; 4]) -> f32 {
        let [audio, emotion, historical, real_time] = weights;
        audio * self.audio
            + emotion * self.emotion
            + historical * self.historical
            + real_time * self.real_time
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ThresholdState {
    pub current_threshold: f32,
    pub component_factors: ComponentFactors,
    #[serde(skip)]
    pub last_update_time: Option<Instant>,
    pub confidence_level: f32,
    pub update_count: u64,
}

impl ThresholdState {
    pub fn new(base_threshold: f32) -> Self {
        Self {
            current_threshold: base_threshold,
            component_factors: ComponentFactors::default(),
            last_update_time: None,
            confidence_level: DEFAULT_CONFIDENCE_LEVEL,
            update_count: 0,
        }
    }
}

/// A computed but not yet applied threshold change.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ThresholdUpdate {
    pub factors: ComponentFactors,
    /// Weighted sum after rate limiting
    pub total_adjustment: f32,
    pub new_threshold: f32,
    pub confidence_level: f32,
}

// =============================================================================
// Controller
// =============================================================================

#[derive(Debug)]
pub struct AdaptiveThresholdController {
    config: ThresholdConfig,
    state: ThresholdState,
    history: PerformanceHistoryTracker,
}

impl AdaptiveThresholdController {
    pub fn new(config: ThresholdConfig) -> Result<Self, ConfigError> {
        let config = config.validate()?;
        Ok(Self {
            state: ThresholdState::new(config.base_threshold),
            history: PerformanceHistoryTracker::new(config.history_window_size),
            config,
        })
    }

    pub fn config(&self) -> &ThresholdConfig {
        &self.config
    }

    pub fn state(&self) -> &ThresholdState {
        &self.state
    }

    #[inline]
    pub fn current_threshold(&self) -> f32 {
        self.state.current_threshold
    }

    pub fn history(&self) -> &PerformanceHistoryTracker {
        &self.history
    }

    // -------------------------------------------------------------------------
    // Terms
    // -------------------------------------------------------------------------

    pub fn audio_adjustment(&self, q: &AudioQuality) -> f32 {
        let (tier, ratio) = best_tier(q);
        let raw = if ratio > TIER_MATCH_MIN {
            tier.adjustment * ratio
        } else {
            (AUDIO_PIVOT - q.overall_quality()) * AUDIO_SLOPE
        };
        finite_or_zero(raw * self.config.quality_sensitivity).clamp(-AUDIO_LIMIT, AUDIO_LIMIT)
    }

    pub fn emotion_adjustment(&self, e: &EmotionFeatures) -> f32 {
        let kind = e.emotion_type;
        let raw = emotion_base(kind)
            + (e.intensity - 0.5) * intensity_factor(kind) * EMOTION_INTENSITY_SLOPE
            + (e.tone_confidence - 0.5) * EMOTION_TONE_SLOPE;
        finite_or_zero(raw * self.config.emotion_sensitivity).clamp(-EMOTION_LIMIT, EMOTION_LIMIT)
    }

    /// Zero until `min_history_samples` records exist.
    pub fn historical_adjustment(&self) -> f32 {
        if self.history.len() < self.config.min_history_samples.max(1) {
            return 0.0;
        }
        let means = match self.history.recent_means(HISTORY_RECENT_WINDOW) {
            Some(means) => means,
            None => return 0.0,
        };
        let gap = weighted_gap(&means);
        let correlation = self.history.threshold_correlation(HISTORY_RECENT_WINDOW);

        let raw = if gap > 0.0 {
            // short of target: move the way that has historically helped
            if correlation > 0.0 {
                -GAP_GAIN * gap
            } else {
                GAP_GAIN * gap
            }
        } else {
            -SURPLUS_GAIN * gap
        };
        finite_or_zero(raw).clamp(-HISTORICAL_LIMIT, HISTORICAL_LIMIT)
    }

    pub fn real_time_adjustment(breakdown: &ConfidenceBreakdown) -> f32 {
        let quality = breakdown.overall_quality();
        let raw = if quality > REAL_TIME_HIGH_QUALITY {
            -REAL_TIME_STEP
        } else if quality < REAL_TIME_LOW_QUALITY {
            REAL_TIME_STEP
        } else {
            (REAL_TIME_PIVOT - quality) * REAL_TIME_SLOPE
        };
        finite_or_zero(raw).clamp(-REAL_TIME_LIMIT, REAL_TIME_LIMIT)
    }

    // -------------------------------------------------------------------------
    // Update cycle
    // -------------------------------------------------------------------------

    /// Compute the next threshold from whatever this chunk measured. Read-only.
    pub fn propose(
        &self,
        audio: Option<&AudioQuality>,
        emotion: Option<&EmotionFeatures>,
        breakdown: Option<&ConfidenceBreakdown>,
    ) -> ThresholdUpdate {
        let factors = ComponentFactors {
            audio: audio.map_or(0.0, |q| self.audio_adjustment(q)),
            emotion: emotion.map_or(0.0, |e| self.emotion_adjustment(e)),
            historical: self.historical_adjustment(),
            real_time: breakdown.map_or(0.0, Self::real_time_adjustment),
        };

        let speed = self.config.adaptation_speed;
        let total = finite_or_zero(factors.weighted_sum(self.config.weights())).clamp(-speed, speed);
        let new_threshold = (self.config.base_threshold + total).clamp(MIN_THRESHOLD, MAX_THRESHOLD);

        ThresholdUpdate {
            factors,
            total_adjustment: total,
            new_threshold,
            confidence_level: self.confidence_level(audio, emotion, breakdown),
        }
    }

    /// Apply a proposed update.
    pub fn commit(&mut self, update: &ThresholdUpdate) {
        debug!(
            "threshold {:.3} -> {:.3} (audio {:+.3}, emotion {:+.3}, historical {:+.3}, real-time {:+.3}, total {:+.3})",
            self.state.current_threshold,
            update.new_threshold,
            update.factors.audio,
            update.factors.emotion,
            update.factors.historical,
            update.factors.real_time,
            update.total_adjustment
        );
        self.state.current_threshold = update.new_threshold;
        self.state.component_factors = update.factors;
        self.state.confidence_level = update.confidence_level;
        self.state.last_update_time = Some(Instant::now());
        self.state.update_count += 1;
    }

    /// `propose` + `commit`.
    pub fn update(
        &mut self,
        audio: Option<&AudioQuality>,
        emotion: Option<&EmotionFeatures>,
        breakdown: Option<&ConfidenceBreakdown>,
    ) -> ThresholdUpdate {
        let update = self.propose(audio, emotion, breakdown);
        self.commit(&update);
        update
    }

    /// Append a feedback sample measured under `threshold_used`.
    pub fn record_performance(&mut self, sample: PerformanceSample, threshold_used: f32) {
        debug!(
            "feedback: accuracy {:.3}, precision {:.3}, recall {:.3} at threshold {:.3}",
            sample.accuracy, sample.precision, sample.recall, threshold_used
        );
        self.history.record(sample, threshold_used);
    }

    /// Back to `base_threshold` with zeroed factors. Feedback history is kept.
    pub fn reset(&mut self) {
        info!("Threshold reset to base {:.3}", self.config.base_threshold);
        self.state = ThresholdState::new(self.config.base_threshold);
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    /// Mean of the available trust signals, 0.5 when none are.
    fn confidence_level(
        &self,
        audio: Option<&AudioQuality>,
        emotion: Option<&EmotionFeatures>,
        breakdown: Option<&ConfidenceBreakdown>,
    ) -> f32 {
        let signals = [
            audio.map(AudioQuality::overall_quality),
            emotion.map(|e| e.tone_confidence),
            breakdown.map(|b| b.final_confidence),
            self.history
                .recent_means(HISTORY_RECENT_WINDOW)
                .map(|m| 0.5 * (m.accuracy + m.f1)),
        ];
        let available: Vec<f32> = signals
            .iter()
            .flatten()
            .copied()
            .filter(|v| v.is_finite())
            .collect();
        if available.is_empty() {
            return DEFAULT_CONFIDENCE_LEVEL;
        }
        (available.iter().sum::<f32>() / available.len() as f32).clamp(0.0, 1.0)
    }
}

/// Weighted shortfall of the recent means against their targets. Positive when
/// outcomes are below target.
fn weighted_gap(m: &MetricMeans) -> f32 {
    [
        (m.accuracy, ACCURACY_TARGET),
        (m.precision, PRECISION_TARGET),
        (m.recall, RECALL_TARGET),
        (m.f1, F1_TARGET),
    ]
    .iter()
    .map(|&(value, (target, weight))| weight * (target - value))
    .sum()
}
