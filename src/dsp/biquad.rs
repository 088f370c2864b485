//! Biquad Filter Implementation (IIR 2nd Order)
//!
//! Second-order recursive filters used by the analysis stages to band-limit a chunk
//! before measuring it: the pitch tracker looks only at the 50–400 Hz voice band and
//! the clarity estimate compares presence-band energy against the full band.
//!
//! # Design Notes
//! - RBJ cookbook coefficients
//! - Analysis only: filters run over a copy of the chunk, the input is never modified
//! - A cutoff at or above Nyquist disables that section instead of producing garbage

use std::f32::consts::PI;

/// Butterworth-ish Q used for the analysis band edges.
pub const BUTTERWORTH_Q: f32 = 0.707;

/// Biquad filter implementation (IIR 2nd order)
#[derive(Debug, Clone, Copy)]
pub struct Biquad {
    a0: f32,
    a1: f32,
    a2: f32,
    b1: f32,
    b2: f32,
    z1: f32,
    z2: f32,
}

impl Default for Biquad {
    fn default() -> Self {
        Self::new()
    }
}

impl Biquad {
    /// Identity filter.
    pub fn new() -> Self {
        Self {
            a0: 1.0,
            a1: 0.0,
            a2: 0.0,
            b1: 0.0,
            b2: 0.0,
            z1: 0.0,
            z2: 0.0,
        }
    }

    /// Process a single sample
    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        let out = input * self.a0 + self.z1;

        // Anti-denormal: tiny DC offset
        self.z1 = input * self.a1 + self.z2 - self.b1 * out + 1e-25;
        self.z2 = input * self.a2 - self.b2 * out + 1e-25;

        out
    }

    /// Clear filter delay state. Coefficient updates never do this implicitly.
    #[inline]
    pub fn reset(&mut self) {
        self.z1 = 0.0;
        self.z2 = 0.0;
    }

    // ---------------------------------------------------------------------
    // Filter design helpers (RBJ-style)
    // ---------------------------------------------------------------------

    pub fn update_hpf(&mut self, cutoff: f32, q: f32, sr: f32) {
        let w0 = 2.0 * PI * cutoff / sr;
        let alpha = w0.sin() / (2.0 * q.max(1e-6));
        let cw0 = w0.cos();

        let a0 = 1.0 + alpha;
        let inv_a0 = 1.0 / a0;

        self.a0 = ((1.0 + cw0) * 0.5) * inv_a0;
        self.a1 = -(1.0 + cw0) * inv_a0;
        self.a2 = ((1.0 + cw0) * 0.5) * inv_a0;
        self.b1 = (-2.0 * cw0) * inv_a0;
        self.b2 = (1.0 - alpha) * inv_a0;
    }

    pub fn update_lpf(&mut self, cutoff: f32, q: f32, sr: f32) {
        let w0 = 2.0 * PI * cutoff / sr;
        let alpha = w0.sin() / (2.0 * q.max(1e-6));
        let cw0 = w0.cos();

        let a0 = 1.0 + alpha;
        let inv_a0 = 1.0 / a0;

        self.a0 = ((1.0 - cw0) * 0.5) * inv_a0;
        self.a1 = (1.0 - cw0) * inv_a0;
        self.a2 = ((1.0 - cw0) * 0.5) * inv_a0;
        self.b1 = (-2.0 * cw0) * inv_a0;
        self.b2 = (1.0 - alpha) * inv_a0;
    }
}

/// High-pass + low-pass cascade isolating one band.
#[derive(Debug, Clone, Copy)]
pub struct BandPass {
    hp: Biquad,
    lp: Biquad,
}

impl BandPass {
    pub fn new(low_hz: f32, high_hz: f32, sample_rate: f32) -> Self {
        let nyquist = 0.5 * sample_rate;
        let mut hp = Biquad::new();
        let mut lp = Biquad::new();
        if low_hz > 0.0 && low_hz < nyquist {
            hp.update_hpf(low_hz, BUTTERWORTH_Q, sample_rate);
        }
        if high_hz > 0.0 && high_hz < nyquist * 0.95 {
            lp.update_lpf(high_hz, BUTTERWORTH_Q, sample_rate);
        }
        Self { hp, lp }
    }

    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        self.lp.process(self.hp.process(input))
    }

    /// Filter a whole buffer from a cleared state.
    pub fn filter(&mut self, input: &[f32]) -> Vec<f32> {
        self.reset();
        input.iter().map(|&x| self.process(x)).collect()
    }

    pub fn reset(&mut self) {
        self.hp.reset();
        self.lp.reset();
    }
}
