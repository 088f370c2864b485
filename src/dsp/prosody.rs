//! Prosody Extractor
//!
//! Pitch, energy and spectral descriptors of one chunk, independent of what was said.
//!
//! # Features
//! - **F0**: autocorrelation over the 50–400 Hz band, first strong peak in the valid
//!   lag range. Analyzed on the loudest stretch of the chunk (at most
//!   `MAX_F0_ANALYSIS_MS`).
//! - **Pitch variance**: std-dev of per-frame F0 (25 ms frames, 10 ms hop), skipping
//!   near-silent frames and frames without a voiced peak.
//!
//! Both pitch features share one voice band: band-passed once, then block-mean
//! decimated to about `PITCH_ANALYSIS_RATE_HZ` so the lag scans stay short.
//! - **Energy variance**: std-dev of per-frame energy over the mean frame energy.
//! - **Spectral centroid**: PSD-weighted mean frequency, PSD by Welch averaging.
//! - **Zero-crossing rate**: sign changes per sample.
//! - **MFCC**: see [`super::mfcc`].
//!
//! # Failure Contract
//! Every feature has a documented default and falls back to it on short, silent or
//! malformed input. Extraction never fails; the returned provenance says whether any
//! feature fell back.

use std::sync::Arc;

use log::trace;
use rustfft::{num_complex::Complex, Fft, FftPlanner};

use super::biquad::BandPass;
use super::mfcc::MfccExtractor;
use super::utils::{
    check_frame, decimate_mean, estimate_f0_autocorr, frames, make_hann_window, mean_square,
    mean_std, min_autocorr_len, DB_EPS,
};
use crate::error::ScoreError;
use crate::{DegradeReason, ProsodyFeatures, Scored};

// =============================================================================
// Constants
// =============================================================================

/// Voice band searched for F0 (Hz)
pub const F0_MIN_HZ: f32 = 50.0;
pub const F0_MAX_HZ: f32 = 400.0;

/// Normalized autocorrelation a peak must reach to count as voiced
const F0_STRONG_PEAK: f32 = 0.3;

/// Longest stretch analyzed for the chunk-level F0 (ms)
const MAX_F0_ANALYSIS_MS: f32 = 250.0;

/// Rate the voice band is decimated to before pitch tracking (Hz)
const PITCH_ANALYSIS_RATE_HZ: f32 = 4000.0;

/// Per-frame pitch/energy analysis (ms)
const PITCH_FRAME_MS: f32 = 25.0;
const PITCH_HOP_MS: f32 = 10.0;

/// Mean-square energy below which a pitch frame is skipped
const PITCH_SILENCE_ENERGY: f32 = 1e-5;

pub const PITCH_VARIANCE_CAP_HZ: f32 = 100.0;
pub const ENERGY_VARIANCE_CAP: f32 = 1.0;

/// Welch segment length (samples); shorter input is zero-padded
const WELCH_SEGMENT: usize = 256;

/// Below this many samples the spectrum is not worth estimating
const MIN_SPECTRAL_SAMPLES: usize = 16;

// Documented fallbacks
pub const DEFAULT_F0_HZ: f32 = 150.0;
pub const DEFAULT_PITCH_VARIANCE_HZ: f32 = 20.0;
pub const DEFAULT_ENERGY_VARIANCE: f32 = 0.1;
pub const DEFAULT_SPECTRAL_CENTROID_HZ: f32 = 1000.0;
pub const DEFAULT_ZCR: f32 = 0.1;

// =============================================================================
// Extractor
// =============================================================================

pub struct ProsodyExtractor {
    welch_fft: Arc<dyn Fft<f32>>,
    welch_window: Vec<f32>,
    mfcc: MfccExtractor,
}

impl Default for ProsodyExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl ProsodyExtractor {
    pub fn new() -> Self {
        let mut planner = FftPlanner::<f32>::new();
        let welch_fft = planner.plan_fft_forward(WELCH_SEGMENT);
        Self {
            welch_fft,
            welch_window: make_hann_window(WELCH_SEGMENT),
            mfcc: MfccExtractor::new(&mut planner),
        }
    }

    /// Extract every feature. Provenance is `Defaulted` with the first fallback's
    /// reason when any single feature fell back.
    pub fn extract(&self, samples: &[f32], sample_rate: u32) -> Scored<ProsodyFeatures> {
        let band = VoiceBand::new(samples, sample_rate);
        let f0 = f0_of(&band);
        let pitch_variance = pitch_variance_of(&band);
        let energy_variance = self.energy_variance(samples, sample_rate);
        let spectral_centroid = self.spectral_centroid(samples, sample_rate);
        let zero_crossing_rate = self.zero_crossing_rate(samples);
        let mfcc = self.mfcc.extract(samples, sample_rate);

        let first_fallback = [
            f0.provenance,
            pitch_variance.provenance,
            energy_variance.provenance,
            spectral_centroid.provenance,
            zero_crossing_rate.provenance,
            mfcc.provenance,
        ]
        .into_iter()
        .find_map(|p| match p {
            crate::Provenance::Defaulted(reason) => Some(reason),
            crate::Provenance::Computed => None,
        });

        let features = ProsodyFeatures {
            f0: f0.value,
            pitch_variance: pitch_variance.value,
            energy_variance: energy_variance.value,
            spectral_centroid: spectral_centroid.value,
            zero_crossing_rate: zero_crossing_rate.value,
            mfcc: mfcc.value,
        };

        match first_fallback {
            Some(reason) => Scored::defaulted(features, reason),
            None => Scored::computed(features),
        }
    }

    /// Chunk-level fundamental frequency (Hz). Falls back to 150 Hz.
    pub fn f0(&self, samples: &[f32], sample_rate: u32) -> Scored<f32> {
        f0_of(&VoiceBand::new(samples, sample_rate))
    }

    /// Std-dev of per-frame F0 (Hz), capped at 100 Hz. Falls back to 20 Hz with fewer
    /// than two voiced frames.
    pub fn pitch_variance(&self, samples: &[f32], sample_rate: u32) -> Scored<f32> {
        pitch_variance_of(&VoiceBand::new(samples, sample_rate))
    }

    /// Std-dev of per-frame energy normalized by mean energy, capped at 1.0.
    pub fn energy_variance(&self, samples: &[f32], sample_rate: u32) -> Scored<f32> {
        let result = check_frame(samples).and_then(|()| {
            let (frame_len, hop) = energy_framing(sample_rate)?;
            let energies: Vec<f32> = frames(samples, frame_len, hop).map(mean_square).collect();
            if energies.len() < 2 {
                return Err(ScoreError::TooShort);
            }
            let (mean, std) = mean_std(&energies).ok_or(ScoreError::NoEstimate)?;
            if mean < DB_EPS {
                return Err(ScoreError::Silent);
            }
            Ok((std / mean).min(ENERGY_VARIANCE_CAP))
        });
        log_fallback("energy_variance", &result);
        Scored::from_result(result, || DEFAULT_ENERGY_VARIANCE)
    }

    /// Welch PSD centroid (Hz), capped at Nyquist. Falls back to 1 kHz.
    pub fn spectral_centroid(&self, samples: &[f32], sample_rate: u32) -> Scored<f32> {
        let result = check_frame(samples).and_then(|()| {
            if samples.len() < MIN_SPECTRAL_SAMPLES || sample_rate == 0 {
                return Err(ScoreError::TooShort);
            }
            let psd = self.welch_psd(samples);
            let bin_hz = sample_rate as f32 / WELCH_SEGMENT as f32;
            let total: f32 = psd.iter().sum();
            if total < DB_EPS {
                return Err(ScoreError::Silent);
            }
            let weighted: f32 = psd
                .iter()
                .enumerate()
                .map(|(k, p)| k as f32 * bin_hz * p)
                .sum();
            let nyquist = 0.5 * sample_rate as f32;
            Ok((weighted / total).clamp(0.0, nyquist))
        });
        log_fallback("spectral_centroid", &result);
        Scored::from_result(result, || DEFAULT_SPECTRAL_CENTROID_HZ)
    }

    /// Sign changes per sample, capped at 1.0. Falls back to 0.1.
    pub fn zero_crossing_rate(&self, samples: &[f32]) -> Scored<f32> {
        let result = check_frame(samples).and_then(|()| {
            if samples.len() < 2 {
                return Err(ScoreError::TooShort);
            }
            let crossings = samples
                .windows(2)
                .filter(|w| (w[0] >= 0.0) != (w[1] >= 0.0))
                .count();
            Ok((crossings as f32 / samples.len() as f32).min(1.0))
        });
        log_fallback("zero_crossing_rate", &result);
        Scored::from_result(result, || DEFAULT_ZCR)
    }

    /// One-sided PSD averaged over 50%-overlapping Hann segments.
    fn welch_psd(&self, samples: &[f32]) -> Vec<f32> {
        let n = WELCH_SEGMENT;
        let hop = n / 2;
        let bins = n / 2 + 1;
        let mut psd = vec![0.0f32; bins];
        let mut scratch = vec![Complex::new(0.0f32, 0.0); n];

        let mut segments = 0usize;
        let mut start = 0usize;
        loop {
            for (i, slot) in scratch.iter_mut().enumerate() {
                let x = samples.get(start + i).copied().unwrap_or(0.0);
                *slot = Complex::new(x * self.welch_window[i], 0.0);
            }
            self.welch_fft.process(&mut scratch);
            for (k, p) in psd.iter_mut().enumerate() {
                *p += scratch[k].norm_sqr();
            }
            segments += 1;
            start += hop;
            if start + n > samples.len() {
                break;
            }
        }

        let scale = 1.0 / segments as f32;
        for p in psd.iter_mut() {
            *p *= scale;
        }
        psd
    }
}

// =============================================================================
// Pitch tracking
// =============================================================================

/// The 50–400 Hz band of a chunk at a reduced rate.
struct VoiceBand {
    samples: Vec<f32>,
    sample_rate: f32,
}

impl VoiceBand {
    fn new(samples: &[f32], sample_rate: u32) -> Result<Self, ScoreError> {
        check_frame(samples)?;
        if sample_rate == 0 {
            return Err(ScoreError::TooShort);
        }
        let sr = sample_rate as f32;
        let band = BandPass::new(F0_MIN_HZ, F0_MAX_HZ, sr).filter(samples);
        let factor = ((sr / PITCH_ANALYSIS_RATE_HZ) as usize).max(1);
        Ok(Self {
            samples: decimate_mean(&band, factor),
            sample_rate: sr / factor as f32,
        })
    }

    fn f0(&self) -> Result<f32, ScoreError> {
        let sr = self.sample_rate;
        let span = ((MAX_F0_ANALYSIS_MS * 0.001 * sr) as usize).max(1);
        let segment = loudest_segment(&self.samples, span, sr);
        estimate_f0_autocorr(segment, sr, F0_MIN_HZ, F0_MAX_HZ, F0_STRONG_PEAK)
    }

    fn pitch_variance(&self) -> Result<f32, ScoreError> {
        let sr = self.sample_rate;
        // 25 ms can fall a sample short of the 50 Hz lag at odd decimated rates
        let frame_len = ((PITCH_FRAME_MS * 0.001 * sr) as usize)
            .max(min_autocorr_len(sr, F0_MIN_HZ, F0_MAX_HZ));
        let hop = ((PITCH_HOP_MS * 0.001 * sr) as usize).max(1);
        let pitches: Vec<f32> = frames(&self.samples, frame_len, hop)
            .filter(|f| mean_square(f) >= PITCH_SILENCE_ENERGY)
            .filter_map(|f| estimate_f0_autocorr(f, sr, F0_MIN_HZ, F0_MAX_HZ, F0_STRONG_PEAK).ok())
            .collect();
        if pitches.len() < 2 {
            return Err(ScoreError::NoEstimate);
        }
        let (_, std) = mean_std(&pitches).ok_or(ScoreError::NoEstimate)?;
        Ok(std.min(PITCH_VARIANCE_CAP_HZ))
    }
}

fn f0_of(band: &Result<VoiceBand, ScoreError>) -> Scored<f32> {
    let result = band.as_ref().map_err(|e| *e).and_then(VoiceBand::f0);
    log_fallback("f0", &result);
    Scored::from_result(result, || DEFAULT_F0_HZ)
}

fn pitch_variance_of(band: &Result<VoiceBand, ScoreError>) -> Scored<f32> {
    let result = band.as_ref().map_err(|e| *e).and_then(VoiceBand::pitch_variance);
    log_fallback("pitch_variance", &result);
    Scored::from_result(result, || DEFAULT_PITCH_VARIANCE_HZ)
}

fn energy_framing(sample_rate: u32) -> Result<(usize, usize), ScoreError> {
    if sample_rate == 0 {
        return Err(ScoreError::TooShort);
    }
    let sr = sample_rate as f32;
    let frame_len = ((PITCH_FRAME_MS * 0.001 * sr) as usize).max(1);
    let hop = ((PITCH_HOP_MS * 0.001 * sr) as usize).max(1);
    Ok((frame_len, hop))
}

/// Highest-energy window of `span` samples, searched on a 10 ms grid.
fn loudest_segment(x: &[f32], span: usize, sample_rate: f32) -> &[f32] {
    if x.len() <= span {
        return x;
    }
    let step = ((0.01 * sample_rate) as usize).max(1);
    let mut best_start = 0usize;
    let mut best_energy = f32::MIN;
    let mut start = 0usize;
    while start + span <= x.len() {
        let e = mean_square(&x[start..start + span]);
        if e > best_energy {
            best_energy = e;
            best_start = start;
        }
        start += step;
    }
    &x[best_start..best_start + span]
}

fn log_fallback<T>(feature: &str, result: &Result<T, ScoreError>) {
    if let Err(err) = result {
        trace!(
            "prosody {feature} defaulted ({:?}): {err}",
            DegradeReason::from(*err)
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Provenance;
    use std::f32::consts::PI;

    const SR: u32 = 16000;

    fn tone(freq: f32, amp: f32, n: usize) -> Vec<f32> {
        (0..n)
            .map(|i| amp * (2.0 * PI * freq * i as f32 / SR as f32).sin())
            .collect()
    }

    /// Tone whose pitch glides linearly from `f_start` to `f_end`.
    fn glide(f_start: f32, f_end: f32, n: usize) -> Vec<f32> {
        let mut phase = 0.0f32;
        (0..n)
            .map(|i| {
                let f = f_start + (f_end - f_start) * i as f32 / n as f32;
                phase += 2.0 * PI * f / SR as f32;
                0.4 * phase.sin()
            })
            .collect()
    }

    #[test]
    fn test_empty_input_uses_documented_defaults() {
        let ex = ProsodyExtractor::new();
        let p = ex.extract(&[], SR);
        assert_eq!(p.value, ProsodyFeatures::default());
        assert_eq!(
            p.provenance,
            Provenance::Defaulted(DegradeReason::MalformedInput)
        );
        assert_eq!(p.value.f0, 150.0);
        assert_eq!(p.value.pitch_variance, 20.0);
        assert_eq!(p.value.energy_variance, 0.1);
        assert_eq!(p.value.spectral_centroid, 1000.0);
        assert_eq!(p.value.zero_crossing_rate, 0.1);
        assert_eq!(p.value.mfcc[0], 1.0);
        assert!(p.value.mfcc[1..].iter().all(|&c| c == 0.0));
    }

    #[test]
    fn test_defaults_are_deterministic() {
        let ex = ProsodyExtractor::new();
        let a = ex.extract(&[0.0; 10], SR);
        let b = ex.extract(&[0.0; 10], SR);
        assert_eq!(a, b);
    }

    #[test]
    fn test_f0_of_voiced_tone() {
        let ex = ProsodyExtractor::new();
        let f0 = ex.f0(&tone(180.0, 0.5, 8000), SR);
        assert!(!f0.is_defaulted());
        assert!((f0.value - 180.0).abs() < 6.0, "f0 = {}", f0.value);
    }

    #[test]
    fn test_f0_falls_back_on_short_input() {
        let ex = ProsodyExtractor::new();
        let f0 = ex.f0(&tone(180.0, 0.5, 64), SR);
        assert_eq!(f0.value, DEFAULT_F0_HZ);
        assert!(f0.is_defaulted());
    }

    #[test]
    fn test_pitch_variance_steady_vs_glide() {
        let ex = ProsodyExtractor::new();
        let steady = ex.pitch_variance(&tone(150.0, 0.4, 16000), SR);
        let moving = ex.pitch_variance(&glide(100.0, 300.0, 16000), SR);
        assert!(!steady.is_defaulted());
        assert!(!moving.is_defaulted());
        assert!(steady.value < 5.0, "steady = {}", steady.value);
        assert!(moving.value > steady.value + 20.0, "moving = {}", moving.value);
        assert!(moving.value <= PITCH_VARIANCE_CAP_HZ);
    }

    #[test]
    fn test_pitch_features_across_sample_rates() {
        let ex = ProsodyExtractor::new();
        for sr in [8000u32, 16000, 22050, 44100, 48000] {
            let voice: Vec<f32> = (0..sr as usize)
                .map(|i| 0.4 * (2.0 * PI * 200.0 * i as f32 / sr as f32).sin())
                .collect();
            let f0 = ex.f0(&voice, sr);
            assert!((f0.value - 200.0).abs() < 6.0, "sr {sr}: f0 = {}", f0.value);
            let pv = ex.pitch_variance(&voice, sr);
            assert!(!pv.is_defaulted(), "sr {sr}");
            assert!(pv.value < 5.0, "sr {sr}: pitch variance = {}", pv.value);
        }
    }

    #[test]
    fn test_pitch_variance_silence_defaults() {
        let ex = ProsodyExtractor::new();
        let pv = ex.pitch_variance(&vec![0.0; 16000], SR);
        assert_eq!(pv.value, DEFAULT_PITCH_VARIANCE_HZ);
    }

    #[test]
    fn test_energy_variance_bursty_is_higher() {
        let ex = ProsodyExtractor::new();
        let steady = ex.energy_variance(&tone(200.0, 0.3, 16000), SR).value;
        let bursty: Vec<f32> = tone(200.0, 0.3, 16000)
            .into_iter()
            .enumerate()
            .map(|(i, v)| if (i / 2000) % 2 == 0 { v } else { v * 0.05 })
            .collect();
        let bursty = ex.energy_variance(&bursty, SR).value;
        assert!(bursty > steady);
        assert!(bursty <= ENERGY_VARIANCE_CAP);
    }

    #[test]
    fn test_spectral_centroid_tracks_tone() {
        let ex = ProsodyExtractor::new();
        let low = ex.spectral_centroid(&tone(500.0, 0.5, 4096), SR).value;
        let high = ex.spectral_centroid(&tone(3000.0, 0.5, 4096), SR).value;
        assert!((low - 500.0).abs() < 150.0, "low = {low}");
        assert!((high - 3000.0).abs() < 150.0, "high = {high}");
        assert!(high <= 8000.0);
    }

    #[test]
    fn test_spectral_centroid_short_input_zero_padded() {
        let ex = ProsodyExtractor::new();
        let c = ex.spectral_centroid(&tone(1000.0, 0.5, 100), SR);
        assert!(!c.is_defaulted());
        assert!(c.value > 0.0 && c.value <= 8000.0);
    }

    #[test]
    fn test_zero_crossing_rate() {
        let ex = ProsodyExtractor::new();
        let alternating: Vec<f32> = (0..100).map(|i| if i % 2 == 0 { 0.5 } else { -0.5 }).collect();
        let zcr = ex.zero_crossing_rate(&alternating).value;
        assert!((zcr - 0.99).abs() < 1e-6);
        assert_eq!(ex.zero_crossing_rate(&[]).value, DEFAULT_ZCR);
    }
}
