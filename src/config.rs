//! Engine configuration.
//!
//! Every option has a default, so an empty JSON object is a valid config. Weight
//! groups are renormalized to sum to 1.0 by [`EngineConfig::validate`]; a group whose
//! weights are all zero falls back to equal weights.

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::threshold::{MAX_THRESHOLD, MIN_THRESHOLD};

/// Threshold controller options (the session-facing configuration surface).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    pub base_threshold: f32,
    pub audio_quality_weight: f32,
    pub emotion_intensity_weight: f32,
    pub historical_weight: f32,
    pub real_time_weight: f32,
    pub quality_sensitivity: f32,
    pub emotion_sensitivity: f32,
    /// Largest total adjustment allowed in one update
    pub adaptation_speed: f32,
    /// Capacity of the performance-sample ring
    pub history_window_size: usize,
    /// Samples required before the historical term contributes
    pub min_history_samples: usize,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            base_threshold: 0.6,
            audio_quality_weight: 0.3,
            emotion_intensity_weight: 0.2,
            historical_weight: 0.3,
            real_time_weight: 0.2,
            quality_sensitivity: 0.5,
            emotion_sensitivity: 0.4,
            adaptation_speed: 0.1,
            history_window_size: 100,
            min_history_samples: 10,
        }
    }
}

impl ThresholdConfig {
    pub fn validate(mut self) -> Result<Self, ConfigError> {
        let [audio, emotion, historical, real_time] = normalize_weights(
            ["audio_quality_weight", "emotion_intensity_weight", "historical_weight", "real_time_weight"],
            [
                self.audio_quality_weight,
                self.emotion_intensity_weight,
                self.historical_weight,
                self.real_time_weight,
            ],
        )?;
        self.audio_quality_weight = audio;
        self.emotion_intensity_weight = emotion;
        self.historical_weight = historical;
        self.real_time_weight = real_time;

        if !(MIN_THRESHOLD..=MAX_THRESHOLD).contains(&self.base_threshold) {
            return Err(ConfigError::out_of_range(
                "base_threshold",
                self.base_threshold,
                MIN_THRESHOLD,
                MAX_THRESHOLD,
            ));
        }
        check_non_negative("quality_sensitivity", self.quality_sensitivity)?;
        check_non_negative("emotion_sensitivity", self.emotion_sensitivity)?;
        check_non_negative("adaptation_speed", self.adaptation_speed)?;
        if self.history_window_size == 0 {
            return Err(ConfigError::ZeroSize {
                name: "history_window_size",
            });
        }
        Ok(self)
    }

    /// `[audio, emotion, historical, real_time]`
    pub fn weights(&self) -> [f32; 4] {
        [
            self.audio_quality_weight,
            self.emotion_intensity_weight,
            self.historical_weight,
            self.real_time_weight,
        ]
    }
}

/// Confidence fusion weights and emotion boost limits.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    pub recognizer_weight: f32,
    pub word_frequency_weight: f32,
    pub context_weight: f32,
    pub audio_quality_weight: f32,
    /// Cap on the intensity × tone part of the boost
    pub prosody_boost_cap: f32,
    /// Boost per emotion-lexicon hit in the raw text
    pub lexicon_hit_boost: f32,
    pub lexicon_boost_cap: f32,
    /// Cap on the whole boost
    pub emotion_boost_cap: f32,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            recognizer_weight: 0.4,
            word_frequency_weight: 0.25,
            context_weight: 0.2,
            audio_quality_weight: 0.15,
            prosody_boost_cap: 0.1,
            lexicon_hit_boost: 0.02,
            lexicon_boost_cap: 0.08,
            emotion_boost_cap: 0.15,
        }
    }
}

impl FusionConfig {
    pub fn validate(mut self) -> Result<Self, ConfigError> {
        let [recognizer, word_frequency, context, audio] = normalize_weights(
            ["recognizer_weight", "word_frequency_weight", "context_weight", "audio_quality_weight"],
            [
                self.recognizer_weight,
                self.word_frequency_weight,
                self.context_weight,
                self.audio_quality_weight,
            ],
        )?;
        self.recognizer_weight = recognizer;
        self.word_frequency_weight = word_frequency;
        self.context_weight = context;
        self.audio_quality_weight = audio;

        for (name, value) in [
            ("prosody_boost_cap", self.prosody_boost_cap),
            ("lexicon_hit_boost", self.lexicon_hit_boost),
            ("lexicon_boost_cap", self.lexicon_boost_cap),
            ("emotion_boost_cap", self.emotion_boost_cap),
        ] {
            check_non_negative(name, value)?;
            if value > 1.0 {
                return Err(ConfigError::out_of_range(name, value, 0.0, 1.0));
            }
        }
        Ok(self)
    }

    /// `[recognizer, word_frequency, context, audio_quality]`
    pub fn weights(&self) -> [f32; 4] {
        [
            self.recognizer_weight,
            self.word_frequency_weight,
            self.context_weight,
            self.audio_quality_weight,
        ]
    }
}

/// Text scoring options.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextConfig {
    /// History tokens compared against the current chunk for external coherence
    pub window_size: usize,
    pub token_history_capacity: usize,
}

impl Default for TextConfig {
    fn default() -> Self {
        Self {
            window_size: 5,
            token_history_capacity: 50,
        }
    }
}

impl TextConfig {
    pub fn validate(self) -> Result<Self, ConfigError> {
        if self.window_size == 0 {
            return Err(ConfigError::ZeroSize {
                name: "window_size",
            });
        }
        if self.token_history_capacity == 0 {
            return Err(ConfigError::ZeroSize {
                name: "token_history_capacity",
            });
        }
        Ok(self)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub threshold: ThresholdConfig,
    pub fusion: FusionConfig,
    pub text: TextConfig,
    /// Per-chunk compute budget; later stages fall back to defaults once it is spent.
    /// 0 disables the budget.
    pub latency_budget_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            threshold: ThresholdConfig::default(),
            fusion: FusionConfig::default(),
            text: TextConfig::default(),
            latency_budget_ms: 10,
        }
    }
}

impl EngineConfig {
    pub fn validate(self) -> Result<Self, ConfigError> {
        Ok(Self {
            threshold: self.threshold.validate()?,
            fusion: self.fusion.validate()?,
            text: self.text.validate()?,
            latency_budget_ms: self.latency_budget_ms,
        })
    }

    /// Parse and validate a JSON config. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig =
            serde_json::from_str(json).map_err(|source| ConfigError::Parse { source })?;
        config.validate()
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::from_json_str(&json)
            .with_context(|| format!("Invalid config {}", path.display()))
    }
}

/// Scale a weight group to sum to 1.0. All-zero groups become equal weights.
pub fn normalize_weights<const N: usize>(
    names: [&'static str; N],
    weights: [f32; N],
) -> Result<[f32; N], ConfigError> {
    for (name, &w) in names.iter().zip(weights.iter()) {
        check_non_negative(*name, w)?;
    }
    // f64 sum: two f32::MAX weights overflow f32
    let sum: f64 = weights.iter().map(|&w| w as f64).sum();
    if sum == 0.0 {
        return Ok([1.0 / N as f32; N]);
    }
    let mut out = weights;
    for w in out.iter_mut() {
        *w = (*w as f64 / sum) as f32;
    }
    Ok(out)
}

fn check_non_negative(name: &'static str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::weight(name, value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn sum(w: &[f32]) -> f32 {
        w.iter().sum()
    }

    #[test]
    fn test_defaults_already_normalized() {
        let cfg = EngineConfig::default().validate().unwrap();
        assert!((sum(&cfg.threshold.weights()) - 1.0).abs() < 1e-6);
        assert!((sum(&cfg.fusion.weights()) - 1.0).abs() < 1e-6);
        assert!((cfg.fusion.recognizer_weight - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_random_weights_sum_to_one() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..500 {
            let w: [f32; 4] = [
                rng.gen_range(0.0..10.0),
                rng.gen_range(0.0..10.0),
                rng.gen_range(0.0..10.0),
                rng.gen_range(0.0..10.0),
            ];
            let n = normalize_weights(["a", "b", "c", "d"], w).unwrap();
            assert!((sum(&n) - 1.0).abs() < 1e-6);
        }

        let huge = normalize_weights(["a", "b", "c", "d"], [f32::MAX, f32::MAX, 0.0, 0.0]).unwrap();
        assert!((sum(&huge) - 1.0).abs() < 1e-6);
        assert!((huge[0] - 0.5).abs() < 1e-6);

        let tiny = normalize_weights(["a", "b", "c", "d"], [1e-8, 0.0, 0.0, 0.0]).unwrap();
        assert_eq!(tiny, [1.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_all_zero_weights_become_equal() {
        let n = normalize_weights(["a", "b", "c", "d"], [0.0; 4]).unwrap();
        assert_eq!(n, [0.25; 4]);
        assert!((sum(&n) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_negative_weight_rejected() {
        let cfg = FusionConfig {
            context_weight: -0.1,
            ..FusionConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::InvalidWeight {
                name: "context_weight",
                ..
            })
        ));

        let nan = normalize_weights(["x"], [f32::NAN]);
        assert!(nan.is_err());
    }

    #[test]
    fn test_base_threshold_bounds() {
        let cfg = ThresholdConfig {
            base_threshold: 0.95,
            ..ThresholdConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::OutOfRange { .. })));
    }

    #[test]
    fn test_zero_window_rejected() {
        let cfg = TextConfig {
            window_size: 0,
            ..TextConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_json_partial_config() {
        let cfg = EngineConfig::from_json_str(
            r#"{ "threshold": { "base_threshold": 0.5, "historical_weight": 0.0 },
                 "latency_budget_ms": 25 }"#,
        )
        .unwrap();
        assert_eq!(cfg.threshold.base_threshold, 0.5);
        assert_eq!(cfg.threshold.historical_weight, 0.0);
        assert!((sum(&cfg.threshold.weights()) - 1.0).abs() < 1e-6);
        assert!((cfg.threshold.audio_quality_weight - 0.3 / 0.7).abs() < 1e-6);
        assert_eq!(cfg.latency_budget_ms, 25);
        assert_eq!(cfg.text, TextConfig::default());
    }

    #[test]
    fn test_json_garbage_rejected() {
        assert!(matches!(
            EngineConfig::from_json_str("{ not json"),
            Err(ConfigError::Parse { .. })
        ));
    }
}
