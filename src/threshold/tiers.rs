//! Named audio quality tiers and their threshold adjustments.
//!
//! Each tier is a box over {noise, volume, clarity}. A measurement matches the tier
//! with the most satisfied ranges (first tier wins ties); bounds are inclusive.

use crate::AudioQuality;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct QualityTier {
    pub name: &'static str,
    pub noise: (f32, f32),
    pub volume: (f32, f32),
    pub clarity: (f32, f32),
    /// Threshold shift at a full match, before sensitivity scaling
    pub adjustment: f32,
}

pub const QUALITY_TIERS: [QualityTier; 5] = [
    QualityTier {
        name: "very_poor",
        noise: (0.7, 1.0),
        volume: (0.0, 0.2),
        clarity: (0.0, 0.3),
        adjustment: 0.3,
    },
    QualityTier {
        name: "poor",
        noise: (0.5, 0.7),
        volume: (0.2, 0.4),
        clarity: (0.3, 0.5),
        adjustment: 0.15,
    },
    QualityTier {
        name: "medium",
        noise: (0.3, 0.5),
        volume: (0.4, 0.6),
        clarity: (0.5, 0.7),
        adjustment: 0.0,
    },
    QualityTier {
        name: "good",
        noise: (0.1, 0.3),
        volume: (0.5, 0.8),
        clarity: (0.7, 0.85),
        adjustment: -0.05,
    },
    QualityTier {
        name: "high_quality",
        noise: (0.0, 0.1),
        volume: (0.6, 1.0),
        clarity: (0.85, 1.0),
        adjustment: -0.1,
    },
];

#[inline]
fn within(value: f32, (lo, hi): (f32, f32)) -> bool {
    value >= lo && value <= hi
}

impl QualityTier {
    /// Satisfied ranges over three.
    pub fn match_ratio(&self, q: &AudioQuality) -> f32 {
        let matched = [
            within(q.noise_level, self.noise),
            within(q.volume_level, self.volume),
            within(q.clarity_score, self.clarity),
        ]
        .iter()
        .filter(|&&m| m)
        .count();
        matched as f32 / 3.0
    }
}

/// Best-matching tier and its match ratio.
pub fn best_tier(q: &AudioQuality) -> (&'static QualityTier, f32) {
    let mut best = (&QUALITY_TIERS[0], QUALITY_TIERS[0].match_ratio(q));
    for tier in QUALITY_TIERS.iter().skip(1) {
        let ratio = tier.match_ratio(q);
        if ratio > best.1 {
            best = (tier, ratio);
        }
    }
    best
}
