//! Simplified MFCC
//!
//! pre-emphasis → Hann window → FFT magnitude (averaged over 50%-overlapping frames)
//! → 26-band triangular mel filterbank → log → DCT-II, truncated to 13 coefficients.
//!
//! Falls back to `[1.0, 0.0, …]` on empty, non-finite or silent input.

use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};

use super::utils::{check_frame, make_hann_window, DB_EPS};
use crate::error::ScoreError;
use crate::{Scored, MFCC_COEFFS};

const FFT_SIZE: usize = 1024;
const HOP: usize = FFT_SIZE / 2;
const MEL_BANDS: usize = 26;
const PRE_EMPHASIS: f32 = 0.97;
/// Floor applied before the log so empty bands stay finite
const LOG_FLOOR: f32 = 1e-10;

pub fn default_mfcc() -> [f32; MFCC_COEFFS] {
    let mut c = [0.0; MFCC_COEFFS];
    c[0] = 1.0;
    c
}

#[inline]
pub fn hz_to_mel(hz: f32) -> f32 {
    2595.0 * (1.0 + hz / 700.0).log10()
}

#[inline]
pub fn mel_to_hz(mel: f32) -> f32 {
    700.0 * (10.0f32.powf(mel / 2595.0) - 1.0)
}

/// `MEL_BANDS` triangular filters spanning 0 Hz..Nyquist over `bins` FFT bins.
pub fn mel_filterbank(sample_rate: f32, bins: usize) -> Vec<Vec<f32>> {
    let nyquist = 0.5 * sample_rate;
    let mel_max = hz_to_mel(nyquist);
    let edges: Vec<f32> = (0..MEL_BANDS + 2)
        .map(|i| mel_to_hz(mel_max * i as f32 / (MEL_BANDS + 1) as f32))
        .collect();
    let bin_hz = nyquist / (bins - 1).max(1) as f32;

    (0..MEL_BANDS)
        .map(|m| {
            let (left, center, right) = (edges[m], edges[m + 1], edges[m + 2]);
            (0..bins)
                .map(|k| {
                    let f = k as f32 * bin_hz;
                    if f >= left && f <= center && center > left {
                        (f - left) / (center - left)
                    } else if f > center && f <= right && right > center {
                        (right - f) / (right - center)
                    } else {
                        0.0
                    }
                })
                .collect()
        })
        .collect()
}

/// Orthonormal DCT-II, first `MFCC_COEFFS` outputs.
pub fn dct2(input: &[f32]) -> [f32; MFCC_COEFFS] {
    let m = input.len().max(1) as f32;
    let mut out = [0.0f32; MFCC_COEFFS];
    for (k, c) in out.iter_mut().enumerate() {
        let mut s = 0.0f32;
        for (i, &x) in input.iter().enumerate() {
            s += x * (std::f32::consts::PI * k as f32 * (i as f32 + 0.5) / m).cos();
        }
        let norm = if k == 0 { (1.0 / m).sqrt() } else { (2.0 / m).sqrt() };
        *c = s * norm;
    }
    out
}

pub struct MfccExtractor {
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
}

impl MfccExtractor {
    pub fn new(planner: &mut FftPlanner<f32>) -> Self {
        Self {
            fft: planner.plan_fft_forward(FFT_SIZE),
            window: make_hann_window(FFT_SIZE),
        }
    }

    pub fn extract(&self, samples: &[f32], sample_rate: u32) -> Scored<[f32; MFCC_COEFFS]> {
        Scored::from_result(self.compute(samples, sample_rate), default_mfcc)
    }

    fn compute(&self, samples: &[f32], sample_rate: u32) -> Result<[f32; MFCC_COEFFS], ScoreError> {
        check_frame(samples)?;
        if sample_rate == 0 || samples.len() < 2 {
            return Err(ScoreError::TooShort);
        }

        // 1) Pre-emphasis
        let mut emphasized = Vec::with_capacity(samples.len());
        emphasized.push(samples[0]);
        for w in samples.windows(2) {
            emphasized.push(w[1] - PRE_EMPHASIS * w[0]);
        }

        // 2) Windowed FFT magnitude, averaged over frames
        let bins = FFT_SIZE / 2 + 1;
        let mut mag = vec![0.0f32; bins];
        let mut scratch = vec![Complex::new(0.0f32, 0.0); FFT_SIZE];
        let mut frame_count = 0usize;
        let mut start = 0usize;
        loop {
            for (i, slot) in scratch.iter_mut().enumerate() {
                let x = emphasized.get(start + i).copied().unwrap_or(0.0);
                *slot = Complex::new(x * self.window[i], 0.0);
            }
            self.fft.process(&mut scratch);
            for (k, m) in mag.iter_mut().enumerate() {
                *m += scratch[k].norm();
            }
            frame_count += 1;
            start += HOP;
            if start + FFT_SIZE > emphasized.len() {
                break;
            }
        }
        let inv = 1.0 / frame_count as f32;
        for m in mag.iter_mut() {
            *m *= inv;
        }
        if mag.iter().sum::<f32>() < DB_EPS {
            return Err(ScoreError::Silent);
        }

        // 3) Mel energies → log
        let bank = mel_filterbank(sample_rate as f32, bins);
        let log_mel: Vec<f32> = bank
            .iter()
            .map(|filter| {
                let e: f32 = filter.iter().zip(mag.iter()).map(|(w, m)| w * m).sum();
                e.max(LOG_FLOOR).ln()
            })
            .collect();

        // 4) DCT-II
        let coeffs = dct2(&log_mel);
        if coeffs.iter().any(|c| !c.is_finite()) {
            return Err(ScoreError::NoEstimate);
        }
        Ok(coeffs)
    }
}
