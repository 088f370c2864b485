//! Error types.
//!
//! Only static configuration can fail. Everything that goes wrong while a chunk is
//! being scored is a [`ScoreError`], which never leaves the sub-scorer that raised
//! it: the boundary turns it into a documented default and a [`DegradeReason`].
//!
//! [`DegradeReason`]: crate::DegradeReason

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("weight `{name}` must be finite and non-negative, got {value}")]
    InvalidWeight { name: &'static str, value: f32 },
    #[error("`{name}` must lie in [{min}, {max}], got {value}")]
    OutOfRange {
        name: &'static str,
        value: f32,
        min: f32,
        max: f32,
    },
    #[error("`{name}` must be greater than zero")]
    ZeroSize { name: &'static str },
    #[error("lexicon parse error: {source}")]
    Lexicon {
        #[source]
        source: serde_json::Error,
    },
    #[error("config parse error: {source}")]
    Parse {
        #[source]
        source: serde_json::Error,
    },
}

impl ConfigError {
    pub(crate) fn weight(name: &'static str, value: f32) -> Self {
        Self::InvalidWeight { name, value }
    }

    pub(crate) fn out_of_range(name: &'static str, value: f32, min: f32, max: f32) -> Self {
        Self::OutOfRange {
            name,
            value,
            min,
            max,
        }
    }
}

/// Internal failure of a single sub-scorer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub(crate) enum ScoreError {
    #[error("input is empty")]
    Empty,
    #[error("input is too short for analysis")]
    TooShort,
    #[error("input contains non-finite samples")]
    NonFinite,
    #[error("signal energy is below the analysis floor")]
    Silent,
    #[error("no valid estimate could be formed")]
    NoEstimate,
}
