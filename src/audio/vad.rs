//! Speech/silence classification for audio frames.
//!
//! The gate consumes a binary per-frame decision through the
//! [`SpeechClassifier`] trait, so the energy-based default can be swapped for
//! a model-based detector without touching segmentation logic.

use crate::defaults;

/// Trait for per-frame speech classification.
pub trait SpeechClassifier: Send {
    /// Returns true if the samples contain speech.
    fn is_speech(&mut self, samples: &[i16]) -> bool;
}

/// RMS-threshold classifier.
#[derive(Debug, Clone, Copy)]
pub struct EnergyClassifier {
    threshold: f32,
}

impl EnergyClassifier {
    /// Creates a classifier with the given RMS threshold (0.0 to 1.0).
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    /// Returns the configured threshold.
    pub fn threshold(&self) -> f32 {
        self.threshold
    }
}

impl Default for EnergyClassifier {
    fn default() -> Self {
        Self::new(defaults::VAD_THRESHOLD)
    }
}

impl SpeechClassifier for EnergyClassifier {
    fn is_speech(&mut self, samples: &[i16]) -> bool {
        calculate_rms(samples) > self.threshold
    }
}

/// Calculates the Root Mean Square (RMS) of audio samples.
///
/// # Returns
/// Normalized RMS value (0.0 to 1.0), where:
/// - 0.0 represents silence
/// - ~0.707 represents a full-scale sine wave
/// - 1.0 represents maximum amplitude
pub fn calculate_rms(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f64 = samples
        .iter()
        .map(|&sample| {
            let normalized = sample as f64 / i16::MAX as f64;
            normalized * normalized
        })
        .sum();

    let mean_square = sum_squares / samples.len() as f64;
    mean_square.sqrt() as f32
}
