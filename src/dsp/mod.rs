//! Signal analysis stages. Everything here reads audio; nothing here modifies it.

pub mod audio_quality;
pub mod biquad;
pub mod mfcc;
pub mod prosody;
pub mod utils;

pub use audio_quality::AudioQualityEstimator;
pub use biquad::{BandPass, Biquad};
pub use mfcc::MfccExtractor;
pub use prosody::ProsodyExtractor;
