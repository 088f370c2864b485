//! Caption Session
//!
//! # Purpose
//! One live stream's gate. Owns the extractors, the fusion engine (and its token
//! history) and the threshold controller (and its feedback history). Nothing is
//! shared between sessions except the immutable lexicon.
//!
//! # Pipeline (per chunk)
//! 1. Word frequency and context coherence from the text.
//! 2. Audio quality and prosody from the PCM samples (skipped without audio).
//! 3. Emotion from text, word timing and the acoustic measurements.
//! 4. Fusion, then a threshold proposal from this chunk's measurements.
//! 5. Gate: accept iff `final_confidence ≥ threshold`, or the caller forces it.
//! 6. Commit: token history, threshold state and statistics, in that order.
//!
//! Steps 1-4 only read session state, so dropping a chunk mid-way leaves the
//! session exactly as it was. The text scores run first and always; acoustic
//! stages that start after the latency budget is spent return their neutral
//! defaults tagged `DeadlineExceeded`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info, trace, warn};
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::dsp::{AudioQualityEstimator, ProsodyExtractor};
use crate::error::ConfigError;
use crate::fusion::{ConfidenceFusionEngine, TextOverrides};
use crate::lexicon::Lexicon;
use crate::text::{EmotionClassifier, EmotionCues};
use crate::threshold::{AdaptiveThresholdController, ThresholdState, ThresholdUpdate};
use crate::{
    AudioQuality, Component, ConfidenceBreakdown, DegradeReason, EmotionFeatures,
    PerformanceSample, ProsodyFeatures, Provenance, Scored, WordBoundary,
};

/// Weight of the running mean in the session's smoothed statistics
const STATS_SMOOTHING: f32 = 0.98;

// =============================================================================
// Chunk I/O
// =============================================================================

/// One recognizer result and the audio it came from.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkInput {
    pub text: String,
    /// Opaque recognizer confidence, 0.0..=1.0
    pub recognizer_confidence: f32,
    #[serde(default)]
    pub word_boundaries: Option<Vec<WordBoundary>>,
    pub duration_secs: f32,
    /// Mono PCM; may be empty for text-only chunks
    #[serde(default)]
    pub samples: Vec<f32>,
    #[serde(default)]
    pub sample_rate: u32,
}

impl ChunkInput {
    pub fn text_only(text: impl Into<String>, recognizer_confidence: f32, duration_secs: f32) -> Self {
        Self {
            text: text.into(),
            recognizer_confidence,
            duration_secs,
            ..Self::default()
        }
    }

    pub fn with_audio(mut self, samples: Vec<f32>, sample_rate: u32) -> Self {
        self.samples = samples;
        self.sample_rate = sample_rate;
        self
    }

    pub fn with_word_boundaries(mut self, boundaries: Vec<WordBoundary>) -> Self {
        self.word_boundaries = Some(boundaries);
        self
    }
}

/// Why the caller forced a chunk through the gate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForceReason {
    /// Pending text flushed after a stretch of silence
    SilenceFlush,
    EndOfStream,
    Manual,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "decision", content = "reason")]
pub enum GateDecision {
    Accepted,
    /// Below threshold but forced through by the caller
    ForcedAccept(ForceReason),
    Rejected,
}

impl GateDecision {
    pub fn decide(final_confidence: f32, threshold: f32, forced: Option<ForceReason>) -> Self {
        if final_confidence >= threshold {
            GateDecision::Accepted
        } else if let Some(reason) = forced {
            GateDecision::ForcedAccept(reason)
        } else {
            GateDecision::Rejected
        }
    }

    #[inline]
    pub fn is_accepted(&self) -> bool {
        !matches!(self, GateDecision::Rejected)
    }
}

/// Everything measured and decided for one chunk.
#[derive(Clone, Debug, PartialEq)]
pub struct ChunkOutcome {
    pub decision: GateDecision,
    pub breakdown: ConfidenceBreakdown,
    /// Threshold the chunk was gated against
    pub threshold: f32,
    pub threshold_update: ThresholdUpdate,
    pub audio_quality: Scored<AudioQuality>,
    /// `None` for text-only chunks
    pub prosody: Option<Scored<ProsodyFeatures>>,
    pub emotion: Scored<EmotionFeatures>,
    pub deadline_exceeded: bool,
    pub elapsed: Duration,
}

impl ChunkOutcome {
    #[inline]
    pub fn accepted(&self) -> bool {
        self.decision.is_accepted()
    }
}

// =============================================================================
// Statistics
// =============================================================================

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    pub chunks: u64,
    pub accepted: u64,
    pub forced: u64,
    pub rejected: u64,
    /// Chunks with at least one defaulted component
    pub degraded: u64,
    pub deadline_misses: u64,
    /// Exponentially smoothed final confidence
    pub mean_confidence: f32,
    /// Exponentially smoothed threshold
    pub mean_threshold: f32,
}

impl SessionStats {
    fn record(&mut self, outcome: &ChunkOutcome) {
        let confidence = outcome.breakdown.final_confidence;
        if self.chunks == 0 {
            self.mean_confidence = confidence;
            self.mean_threshold = outcome.threshold;
        } else {
            self.mean_confidence =
                STATS_SMOOTHING * self.mean_confidence + (1.0 - STATS_SMOOTHING) * confidence;
            self.mean_threshold =
                STATS_SMOOTHING * self.mean_threshold + (1.0 - STATS_SMOOTHING) * outcome.threshold;
        }
        self.chunks += 1;
        match outcome.decision {
            GateDecision::Accepted => self.accepted += 1,
            GateDecision::ForcedAccept(_) => self.forced += 1,
            GateDecision::Rejected => self.rejected += 1,
        }
        if outcome.breakdown.is_degraded() {
            self.degraded += 1;
        }
        if outcome.deadline_exceeded {
            self.deadline_misses += 1;
        }
    }

    /// Share of chunks let through, forced ones included.
    pub fn acceptance_rate(&self) -> f32 {
        if self.chunks == 0 {
            return 0.0;
        }
        (self.accepted + self.forced) as f32 / self.chunks as f32
    }
}

// =============================================================================
// Latency budget
// =============================================================================

struct Deadline {
    started: Instant,
    budget: Option<Duration>,
}

impl Deadline {
    fn new(budget: Option<Duration>) -> Self {
        Self {
            started: Instant::now(),
            budget,
        }
    }

    fn expired(&self) -> Option<DegradeReason> {
        match self.budget {
            Some(budget) if self.started.elapsed() >= budget => {
                Some(DegradeReason::DeadlineExceeded)
            }
            _ => None,
        }
    }

    /// Run `stage` unless the budget is spent, in which case return `fallback`.
    fn run<T>(
        &self,
        component: Component,
        stage: impl FnOnce() -> Scored<T>,
        fallback: impl FnOnce() -> T,
    ) -> Scored<T> {
        match self.expired() {
            Some(reason) => {
                trace!("{component:?} skipped: latency budget spent");
                Scored::defaulted(fallback(), reason)
            }
            None => stage(),
        }
    }
}

fn hit_deadline<T>(scored: &Scored<T>) -> bool {
    scored.provenance == Provenance::Defaulted(DegradeReason::DeadlineExceeded)
}

// =============================================================================
// Session
// =============================================================================

pub struct CaptionSession {
    config: EngineConfig,
    audio: AudioQualityEstimator,
    prosody: ProsodyExtractor,
    emotion: EmotionClassifier,
    fusion: ConfidenceFusionEngine,
    threshold: AdaptiveThresholdController,
    stats: SessionStats,
}

impl CaptionSession {
    /// Session over the built-in lexicon.
    pub fn new(config: EngineConfig) -> Result<Self, ConfigError> {
        Self::with_lexicon(config, Lexicon::builtin())
    }

    pub fn with_lexicon(config: EngineConfig, lexicon: Arc<Lexicon>) -> Result<Self, ConfigError> {
        let config = config.validate()?;
        let session = Self {
            audio: AudioQualityEstimator::new(),
            prosody: ProsodyExtractor::new(),
            emotion: EmotionClassifier::new(Arc::clone(&lexicon)),
            fusion: ConfidenceFusionEngine::new(config.fusion, config.text, lexicon)?,
            threshold: AdaptiveThresholdController::new(config.threshold)?,
            stats: SessionStats::default(),
            config,
        };
        info!(
            "Caption session created: base threshold {:.2}, latency budget {} ms",
            config.threshold.base_threshold, config.latency_budget_ms
        );
        Ok(session)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    pub fn threshold_state(&self) -> &ThresholdState {
        self.threshold.state()
    }

    pub fn controller(&self) -> &AdaptiveThresholdController {
        &self.threshold
    }

    pub fn fusion(&self) -> &ConfidenceFusionEngine {
        &self.fusion
    }

    fn budget(&self) -> Option<Duration> {
        match self.config.latency_budget_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    /// Score one chunk, gate it and commit the session state.
    pub fn process_chunk(&mut self, chunk: &ChunkInput, forced: Option<ForceReason>) -> ChunkOutcome {
        let deadline = Deadline::new(self.budget());
        let has_audio = !chunk.samples.is_empty();

        // 1) Text scores
        let text_scores = self.fusion.score_text(&chunk.text, TextOverrides::default());

        // 2) Acoustics
        let audio_quality = deadline.run(
            Component::AudioQuality,
            || self.audio.estimate(&chunk.samples, chunk.sample_rate),
            || AudioQuality::neutral(chunk.sample_rate),
        );
        let prosody = if has_audio {
            Some(deadline.run(
                Component::Prosody,
                || self.prosody.extract(&chunk.samples, chunk.sample_rate),
                ProsodyFeatures::default,
            ))
        } else {
            None
        };

        // Only measured values inform emotion and threshold control
        let measured_audio = Some(&audio_quality)
            .filter(|q| !q.is_defaulted())
            .map(|q| &q.value);
        let measured_prosody = prosody
            .as_ref()
            .filter(|p| !p.is_defaulted())
            .map(|p| &p.value);

        // 3) Emotion
        let cues = EmotionCues {
            text: &chunk.text,
            duration_secs: chunk.duration_secs,
            word_boundaries: chunk.word_boundaries.as_deref(),
            prosody: measured_prosody,
            audio_quality: measured_audio,
        };
        let emotion = deadline.run(
            Component::Emotion,
            || self.emotion.classify(&cues),
            EmotionFeatures::fallback,
        );

        // 4) Fusion
        let fused = self.fusion.fuse_text(
            text_scores,
            chunk.recognizer_confidence,
            &audio_quality,
            Some(&emotion),
        );
        let mut breakdown = fused.breakdown;
        if prosody.as_ref().map_or(false, Scored::is_defaulted) {
            breakdown.degraded.push(Component::Prosody);
        }

        // 5) Threshold
        let measured_emotion = Some(&emotion)
            .filter(|e| !e.is_defaulted())
            .map(|e| &e.value);
        let threshold_update = self
            .threshold
            .propose(measured_audio, measured_emotion, Some(&breakdown));
        let threshold = threshold_update.new_threshold;

        // 6) Gate
        let decision = GateDecision::decide(breakdown.final_confidence, threshold, forced);

        let deadline_exceeded = hit_deadline(&audio_quality)
            || prosody.as_ref().map_or(false, hit_deadline)
            || hit_deadline(&emotion);

        let outcome = ChunkOutcome {
            decision,
            breakdown,
            threshold,
            threshold_update,
            audio_quality,
            prosody,
            emotion,
            deadline_exceeded,
            elapsed: deadline.started.elapsed(),
        };

        // 7) Commit
        self.fusion.commit_tokens(fused.tokens);
        self.threshold.commit(&outcome.threshold_update);
        self.stats.record(&outcome);
        self.log_outcome(&outcome);
        outcome
    }

    fn log_outcome(&self, outcome: &ChunkOutcome) {
        let b = &outcome.breakdown;
        debug!(
            "fused: recognizer {:.3}, word_frequency {:.3}, context {:.3}, audio {:.3}, boost {:.3} -> {:.3}",
            b.recognizer_confidence,
            b.word_frequency_score,
            b.context_coherence_score,
            b.audio_quality_score,
            b.emotion_boost,
            b.final_confidence
        );
        if b.is_degraded() {
            warn!("Chunk scored with defaulted components: {:?}", b.degraded);
        }
        if outcome.deadline_exceeded {
            warn!(
                "Latency budget of {} ms exhausted ({:?} elapsed)",
                self.config.latency_budget_ms, outcome.elapsed
            );
        }
        match outcome.decision {
            GateDecision::Accepted => debug!(
                "Caption accepted: {:.3} >= threshold {:.3}",
                b.final_confidence, outcome.threshold
            ),
            GateDecision::ForcedAccept(reason) => info!(
                "Caption force-accepted ({reason:?}): {:.3} below threshold {:.3}",
                b.final_confidence, outcome.threshold
            ),
            GateDecision::Rejected => debug!(
                "Caption rejected: {:.3} < threshold {:.3}",
                b.final_confidence, outcome.threshold
            ),
        }
    }

    /// Feed back outcome metrics for a span emitted under `threshold_used`.
    pub fn record_feedback(&mut self, sample: PerformanceSample, threshold_used: f32) {
        self.threshold.record_performance(sample, threshold_used);
    }

    /// Back to the freshly constructed state: base threshold, no history, no stats.
    pub fn reset(&mut self) {
        self.threshold.reset();
        self.threshold.clear_history();
        self.fusion.clear_history();
        self.stats = SessionStats::default();
        info!("Caption session reset");
    }
}
