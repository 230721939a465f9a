//! Signal-to-distortion metrics

use serde::{Deserialize, Serialize};

/// Added to the noise power so an exact estimate saturates instead of dividing by zero
pub const NOISE_FLOOR: f64 = 1e-10;

/// Residual samples at or below this fraction of the reference peak are ignored
/// by the thresholded SDR
pub const THRESHOLD_RATIO: f64 = 0.01;

/// Clean and thresholded SDR of one estimate against one reference, in dB
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SdrMetrics {
    /// SDR over the full residual
    #[serde(with = "decibels")]
    pub clean_sdr: f64,

    /// SDR over residual samples above the audibility threshold
    #[serde(with = "decibels")]
    pub thresholded_sdr: f64,
}

impl SdrMetrics {
    pub fn new(clean_sdr: f64, thresholded_sdr: f64) -> Self {
        Self {
            clean_sdr,
            thresholded_sdr,
        }
    }

    /// Both values are finite
    pub fn is_finite(&self) -> bool {
        self.clean_sdr.is_finite() && self.thresholded_sdr.is_finite()
    }
}

/// Score `estimated` against `reference`
///
/// Both signals are truncated to the shorter length. The score is not
/// symmetric: signal power always comes from `reference`. A silent reference
/// has zero signal power and scores `-inf`.
pub fn score(estimated: &[f64], reference: &[f64]) -> SdrMetrics {
    let len = estimated.len().min(reference.len());
    let estimated = &estimated[..len];
    let reference = &reference[..len];

    let peak = reference.iter().fold(0.0f64, |acc, r| acc.max(r.abs()));
    let threshold = THRESHOLD_RATIO * peak;

    let mut signal_power = 0.0;
    let mut noise_power = 0.0;
    let mut masked_noise_power = 0.0;

    for (&e, &r) in estimated.iter().zip(reference.iter()) {
        let noise = e - r;
        signal_power += r * r;
        noise_power += noise * noise;
        if noise.abs() > threshold {
            masked_noise_power += noise * noise;
        }
    }

    SdrMetrics {
        clean_sdr: sdr_db(signal_power, noise_power),
        thresholded_sdr: sdr_db(signal_power, masked_noise_power),
    }
}

fn sdr_db(signal_power: f64, noise_power: f64) -> f64 {
    10.0 * (signal_power / (NOISE_FLOOR + noise_power)).log10()
}

/// Serde adapter for dB values that may be `-inf` (silent reference) or
/// `NaN` (empty mean)
///
/// JSON has no number for either, so non-finite values are written as the
/// strings `"NaN"`, `"inf"` and `"-inf"`. Finite values stay plain numbers.
pub mod decibels {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() {
            serializer.serialize_f64(*value)
        } else if value.is_nan() {
            serializer.serialize_str("NaN")
        } else if value.is_sign_positive() {
            serializer.serialize_str("inf")
        } else {
            serializer.serialize_str("-inf")
        }
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Number(f64),
        Text(String),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        match Repr::deserialize(deserializer)? {
            Repr::Number(value) => Ok(value),
            Repr::Text(text) => match text.as_str() {
                "NaN" => Ok(f64::NAN),
                "inf" => Ok(f64::INFINITY),
                "-inf" => Ok(f64::NEG_INFINITY),
                other => Err(D::Error::custom(format!("invalid dB value '{}'", other))),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn ramp(len: usize) -> Vec<f64> {
        (0..len).map(|i| (i as f64 * 0.37).sin()).collect()
    }

    #[test]
    fn test_identical_signals_saturate() {
        let x = ramp(256);
        let power: f64 = x.iter().map(|s| s * s).sum();
        let metrics = score(&x, &x);

        let cap = 10.0 * (power / NOISE_FLOOR).log10();
        assert_relative_eq!(metrics.clean_sdr, cap, epsilon = 1e-9);
        assert_relative_eq!(metrics.thresholded_sdr, cap, epsilon = 1e-9);
        assert!(metrics.clean_sdr > 90.0);
    }

    #[test]
    fn test_known_value() {
        let reference = vec![1.0, -1.0, 1.0, -1.0];
        let estimated = vec![0.5, -0.5, 0.5, -0.5];
        // signal 4, noise 4 * 0.25 = 1 -> 10 * log10(4) dB
        let metrics = score(&estimated, &reference);
        assert_relative_eq!(metrics.clean_sdr, 10.0 * 4.0f64.log10(), epsilon = 1e-6);
        assert_relative_eq!(metrics.thresholded_sdr, metrics.clean_sdr, epsilon = 1e-12);
    }

    #[test]
    fn test_not_symmetric() {
        let a = vec![1.0, 0.5, -0.25, 0.8];
        let b = vec![0.2, 0.1, -0.05, 0.1];
        let ab = score(&a, &b);
        let ba = score(&b, &a);
        assert!((ab.clean_sdr - ba.clean_sdr).abs() > 1.0);
    }

    #[test]
    fn test_threshold_ignores_small_residual() {
        let reference = vec![1.0, -1.0, 0.5, -0.5];
        // Residual 0.005 everywhere, below 0.01 * peak
        let estimated: Vec<f64> = reference.iter().map(|r| r + 0.005).collect();
        let metrics = score(&estimated, &reference);

        assert!(metrics.clean_sdr.is_finite());
        assert!(metrics.thresholded_sdr > metrics.clean_sdr);
        assert_relative_eq!(
            metrics.thresholded_sdr,
            10.0 * (2.5 / NOISE_FLOOR).log10(),
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_truncates_to_shorter_signal() {
        let reference = vec![1.0, 1.0, 1.0, 1.0];
        let estimated = vec![1.0, 1.0];
        let short = score(&estimated, &reference);
        let same = score(&estimated, &reference[..2]);
        assert_eq!(short, same);
    }

    #[test]
    fn test_silent_reference_counts_every_residual() {
        let reference = vec![0.0; 8];
        let estimated = vec![1e-6; 8];
        let metrics = score(&estimated, &reference);
        assert_eq!(metrics.clean_sdr, f64::NEG_INFINITY);
        assert_eq!(metrics.thresholded_sdr, f64::NEG_INFINITY);
    }

    #[test]
    fn test_silent_estimate() {
        let reference = ramp(128);
        let estimated = vec![0.0; 128];
        let metrics = score(&estimated, &reference);
        // Noise equals the reference, so the ratio is ~1
        assert!(metrics.clean_sdr.abs() < 1e-6);
    }
}
