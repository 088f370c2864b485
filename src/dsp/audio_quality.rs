//! Audio Quality Estimator
//!
//! Reduces one chunk of mono PCM to three scalar levels the threshold controller and
//! the fusion engine can reason about.
//!
//! - **Noise**: quiet-region energy (10th percentile of 20 ms frame energies) relative
//!   to the mean frame energy. Steady hiss lifts the quiet frames and the ratio with it.
//! - **Volume**: mean absolute amplitude against a reference level, clipped to 1.0.
//! - **Clarity**: blend of the loud/quiet energy ratio in dB and the share of energy
//!   in the 1–4 kHz presence band. Louder speech over the same floor reads clearer.
//!
//! Degenerate input (empty, non-finite, silent or shorter than three frames) yields
//! the neutral 0.5 levels. This stage never fails.

use log::trace;

use super::biquad::BandPass;
use super::utils::{check_frame, frames, mean_square, percentile, DB_EPS, SILENT_FRAME_ENERGY};
use crate::error::ScoreError;
use crate::{AudioQuality, Scored};

// =============================================================================
// Constants
// =============================================================================

/// Energy frame length (ms)
const FRAME_MS: f32 = 20.0;

/// Minimum frames for a percentile to mean anything
const MIN_FRAMES: usize = 3;

/// Percentile of frame energies treated as the noise floor
const NOISE_PERCENTILE: f32 = 10.0;

/// Mean absolute amplitude that maps to full volume
const VOLUME_REF: f32 = 0.25;

/// Presence band used for spectral sharpness (Hz)
const PRESENCE_LOW_HZ: f32 = 1000.0;
const PRESENCE_HIGH_HZ: f32 = 4000.0;

/// Presence share that counts as fully sharp
const PRESENCE_RATIO_FULL: f32 = 0.5;

/// Loud/quiet ratio (dB) that counts as fully clear
const SNR_FULL_DB: f32 = 30.0;

/// Weight of the SNR part of clarity (presence gets the rest)
const CLARITY_SNR_WEIGHT: f32 = 0.6;

#[derive(Debug, Clone, Copy, Default)]
pub struct AudioQualityEstimator;

impl AudioQualityEstimator {
    pub fn new() -> Self {
        Self
    }

    pub fn estimate(&self, samples: &[f32], sample_rate: u32) -> Scored<AudioQuality> {
        let result = self.measure(samples, sample_rate);
        if let Err(err) = &result {
            trace!("audio quality defaulted: {err}");
        }
        Scored::from_result(result, || AudioQuality::neutral(sample_rate))
    }

    fn measure(&self, samples: &[f32], sample_rate: u32) -> Result<AudioQuality, ScoreError> {
        check_frame(samples)?;
        if sample_rate == 0 {
            return Err(ScoreError::TooShort);
        }
        let sr = sample_rate as f32;
        let frame_len = ((FRAME_MS * 0.001 * sr) as usize).max(1);

        let energies: Vec<f32> = frames(samples, frame_len, frame_len).map(mean_square).collect();
        if energies.len() < MIN_FRAMES {
            return Err(ScoreError::TooShort);
        }

        let mean_energy = energies.iter().sum::<f32>() / energies.len() as f32;
        if mean_energy < SILENT_FRAME_ENERGY {
            return Err(ScoreError::Silent);
        }
        let floor_energy = percentile(&energies, NOISE_PERCENTILE).ok_or(ScoreError::NoEstimate)?;

        // 1) Noise
        let noise_level = (floor_energy / mean_energy).max(0.0).sqrt().clamp(0.0, 1.0);

        // 2) Volume
        let mean_abs = samples.iter().map(|v| v.abs()).sum::<f32>() / samples.len() as f32;
        let volume_level = (mean_abs / VOLUME_REF).clamp(0.0, 1.0);

        // 3) Clarity
        let snr_db = 10.0 * (mean_energy / floor_energy.max(DB_EPS)).log10();
        let snr_score = (snr_db / SNR_FULL_DB).clamp(0.0, 1.0);

        let mut band = BandPass::new(PRESENCE_LOW_HZ, PRESENCE_HIGH_HZ, sr);
        let presence = band.filter(samples);
        let presence_ratio = mean_square(&presence) / mean_square(samples).max(DB_EPS);
        let presence_score = (presence_ratio / PRESENCE_RATIO_FULL).clamp(0.0, 1.0);

        let clarity_score = (CLARITY_SNR_WEIGHT * snr_score
            + (1.0 - CLARITY_SNR_WEIGHT) * presence_score)
            .clamp(0.0, 1.0);

        Ok(AudioQuality {
            noise_level,
            volume_level,
            clarity_score,
            sample_rate,
        })
    }
}
