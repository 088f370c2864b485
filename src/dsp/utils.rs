use crate::error::ScoreError;

/// Floor used to keep ratios and logs finite.
pub const DB_EPS: f32 = 1e-12;

/// Mean-square energy below which a frame counts as silent.
pub const SILENT_FRAME_ENERGY: f32 = 1e-6;

/// Reject empty frames and frames carrying NaN/inf samples.
pub(crate) fn check_frame(x: &[f32]) -> Result<(), ScoreError> {
    if x.is_empty() {
        return Err(ScoreError::Empty);
    }
    if x.iter().any(|v| !v.is_finite()) {
        return Err(ScoreError::NonFinite);
    }
    Ok(())
}

pub fn mean_square(x: &[f32]) -> f32 {
    let mut s = 0.0f32;
    for &v in x {
        s += v * v;
    }
    s / (x.len().max(1) as f32)
}

pub fn frame_rms(x: &[f32]) -> f32 {
    mean_square(x).sqrt()
}

/// Fixed-size analysis frames stepping by `hop`. The tail shorter than `len` is dropped.
pub fn frames(x: &[f32], len: usize, hop: usize) -> impl Iterator<Item = &[f32]> {
    let len = len.max(1);
    let hop = hop.max(1);
    let count = if x.len() >= len {
        (x.len() - len) / hop + 1
    } else {
        0
    };
    (0..count).map(move |i| &x[i * hop..i * hop + len])
}

/// Symmetric Hann window.
pub fn make_hann_window(n: usize) -> Vec<f32> {
    if n <= 1 {
        return vec![1.0; n];
    }
    let denom = (n - 1) as f32;
    (0..n)
        .map(|i| 0.5 - 0.5 * (2.0 * std::f32::consts::PI * i as f32 / denom).cos())
        .collect()
}

/// Population mean and standard deviation. `None` for an empty slice.
pub fn mean_std(values: &[f32]) -> Option<(f32, f32)> {
    if values.is_empty() {
        return None;
    }
    let n = values.len() as f32;
    let mean = values.iter().sum::<f32>() / n;
    let var = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f32>() / n;
    Some((mean, var.max(0.0).sqrt()))
}

/// Linear-interpolated percentile, `p` in 0..=100.
pub fn percentile(values: &[f32], p: f32) -> Option<f32> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let rank = (p.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f32;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let t = rank - lo as f32;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * t)
}

/// Block-mean decimation by `factor`. Band-limit the input first; the block mean
/// alone is a weak anti-alias filter. The last block may be partial.
pub(crate) fn decimate_mean(x: &[f32], factor: usize) -> Vec<f32> {
    if factor <= 1 {
        return x.to_vec();
    }
    x.chunks(factor)
        .map(|block| block.iter().sum::<f32>() / block.len() as f32)
        .collect()
}

fn lag_range(sample_rate: f32, f0_min: f32, f0_max: f32) -> (usize, usize) {
    let lag_min = ((sample_rate / f0_max).floor() as usize).max(1);
    let lag_max = ((sample_rate / f0_min).ceil() as usize).max(lag_min + 2);
    (lag_min, lag_max)
}

/// Shortest frame [`estimate_f0_autocorr`] accepts for this rate and band.
pub(crate) fn min_autocorr_len(sample_rate: f32, f0_min: f32, f0_max: f32) -> usize {
    let (_, lag_max) = lag_range(sample_rate, f0_min, f0_max);
    lag_max + lag_max / 4
}

/// Autocorrelation F0 estimate restricted to `[f0_min, f0_max]`.
///
/// Walks the valid lag range from short to long and takes the first local maximum
/// of the normalized autocorrelation that reaches `strong_peak`, refined to a
/// fractional lag by a parabola through its neighbours. The frame must cover the
/// longest lag plus a quarter of it, otherwise it is too short to say anything.
pub(crate) fn estimate_f0_autocorr(
    frame: &[f32],
    sample_rate: f32,
    f0_min: f32,
    f0_max: f32,
    strong_peak: f32,
) -> Result<f32, ScoreError> {
    let n = frame.len();
    if n == 0 {
        return Err(ScoreError::Empty);
    }
    if sample_rate <= 0.0 || f0_min <= 0.0 || f0_max <= f0_min {
        return Err(ScoreError::NoEstimate);
    }

    let (lag_min, lag_max) = lag_range(sample_rate, f0_min, f0_max);
    if n < min_autocorr_len(sample_rate, f0_min, f0_max) {
        return Err(ScoreError::TooShort);
    }

    // Remove DC
    let mean = frame.iter().sum::<f32>() / n as f32;
    let x: Vec<f32> = frame.iter().map(|&v| v - mean).collect();

    // Energy gate
    if mean_square(&x) < SILENT_FRAME_ENERGY {
        return Err(ScoreError::Silent);
    }

    let mut r = Vec::with_capacity(lag_max - lag_min + 1);
    for lag in lag_min..=lag_max {
        let mut s = 0.0f32;
        let mut e1 = 0.0f32;
        let mut e2 = 0.0f32;
        for i in 0..(n - lag) {
            let a = x[i];
            let b = x[i + lag];
            s += a * b;
            e1 += a * a;
            e2 += b * b;
        }
        let denom = (e1 * e2).sqrt().max(DB_EPS);
        r.push((s / denom).clamp(-1.0, 1.0));
    }

    for i in 1..r.len().saturating_sub(1) {
        let (prev, peak, next) = (r[i - 1], r[i], r[i + 1]);
        if peak >= strong_peak && peak >= prev && peak >= next {
            let curvature = prev - 2.0 * peak + next;
            let offset = if curvature.abs() > DB_EPS {
                (0.5 * (prev - next) / curvature).clamp(-0.5, 0.5)
            } else {
                0.0
            };
            return Ok(sample_rate / ((lag_min + i) as f32 + offset));
        }
    }
    Err(ScoreError::NoEstimate)
}
