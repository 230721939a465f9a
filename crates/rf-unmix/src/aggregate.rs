//! Per-target accumulation of metrics across tracks

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::assignment::Assignment;
use crate::metrics::{decibels, SdrMetrics};
use crate::target::Target;

/// Mean scores for one target over every successfully evaluated track
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TargetSummary {
    pub target: Target,
    #[serde(with = "decibels")]
    pub mean_clean_sdr: f64,
    #[serde(with = "decibels")]
    pub mean_thresholded_sdr: f64,
    /// Tracks that contributed
    pub tracks: usize,
}

impl TargetSummary {
    /// `"<TARGET>: cSDR = <mean> dB, uSDR = <mean> dB"`
    pub fn metrics_line(&self) -> String {
        format!(
            "{}: cSDR = {:.2} dB, uSDR = {:.2} dB",
            self.target.label(),
            self.mean_clean_sdr,
            self.mean_thresholded_sdr
        )
    }
}

/// Append-only record of `SdrMetrics` per target
#[derive(Debug, Clone, Default)]
pub struct ResultsAggregate {
    targets: Vec<Target>,
    entries: HashMap<Target, Vec<SdrMetrics>>,
}

impl ResultsAggregate {
    /// Aggregate reporting `targets` in the given order
    pub fn new(targets: Vec<Target>) -> Self {
        let entries = targets.iter().map(|&t| (t, Vec::new())).collect();
        Self { targets, entries }
    }

    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    /// Append one track's metrics for `target`
    pub fn record(&mut self, target: Target, metrics: SdrMetrics) {
        if !self.entries.contains_key(&target) {
            self.targets.push(target);
        }
        self.entries.entry(target).or_default().push(metrics);
    }

    /// Append every entry of a track's assignment
    pub fn record_assignment(&mut self, assignment: &Assignment) {
        for entry in assignment.entries() {
            self.record(entry.target, entry.metrics);
        }
    }

    /// Append another aggregate's entries after this one's
    pub fn merge(&mut self, other: &ResultsAggregate) {
        for &target in &other.targets {
            if let Some(values) = other.entries.get(&target) {
                for &metrics in values {
                    self.record(target, metrics);
                }
            }
        }
    }

    pub fn entries(&self, target: Target) -> &[SdrMetrics] {
        self.entries.get(&target).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of metrics recorded for `target`
    pub fn count(&self, target: Target) -> usize {
        self.entries(target).len()
    }

    /// Arithmetic means per target; a target without entries reports NaN
    pub fn summarize(&self) -> Vec<TargetSummary> {
        self.targets
            .iter()
            .map(|&target| {
                let values = self.entries(target);
                TargetSummary {
                    target,
                    mean_clean_sdr: mean(values.iter().map(|m| m.clean_sdr)),
                    mean_thresholded_sdr: mean(values.iter().map(|m| m.thresholded_sdr)),
                    tracks: values.len(),
                }
            })
            .collect()
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if count == 0 {
        f64::NAN
    } else {
        sum / count as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_mean_of_three_tracks() {
        let mut aggregate = ResultsAggregate::new(vec![Target::Vocals]);
        for sdr in [10.0, 12.0, 14.0] {
            aggregate.record(Target::Vocals, SdrMetrics::new(sdr, sdr + 1.0));
        }

        let summary = aggregate.summarize();
        assert_eq!(summary.len(), 1);
        assert_relative_eq!(summary[0].mean_clean_sdr, 12.0, epsilon = 1e-12);
        assert_relative_eq!(summary[0].mean_thresholded_sdr, 13.0, epsilon = 1e-12);
        assert_eq!(summary[0].tracks, 3);
    }

    #[test]
    fn test_empty_target_is_nan() {
        let aggregate = ResultsAggregate::new(Target::PRIORITY.to_vec());
        let summary = aggregate.summarize();
        assert_eq!(summary.len(), 4);
        assert!(summary.iter().all(|s| s.mean_clean_sdr.is_nan() && s.tracks == 0));
    }

    #[test]
    fn test_summary_keeps_target_order() {
        let aggregate = ResultsAggregate::new(vec![Target::Bass, Target::Vocals]);
        let order: Vec<Target> = aggregate.summarize().iter().map(|s| s.target).collect();
        assert_eq!(order, vec![Target::Bass, Target::Vocals]);
    }

    #[test]
    fn test_merge_appends_in_order() {
        let mut first = ResultsAggregate::new(vec![Target::Drums]);
        first.record(Target::Drums, SdrMetrics::new(1.0, 1.0));
        let mut second = ResultsAggregate::new(vec![Target::Drums]);
        second.record(Target::Drums, SdrMetrics::new(2.0, 2.0));

        first.merge(&second);
        let clean: Vec<f64> = first.entries(Target::Drums).iter().map(|m| m.clean_sdr).collect();
        assert_eq!(clean, vec![1.0, 2.0]);
    }

    #[test]
    fn test_metrics_line_format() {
        let summary = TargetSummary {
            target: Target::Vocals,
            mean_clean_sdr: 3.14159,
            mean_thresholded_sdr: -2.0,
            tracks: 1,
        };
        assert_eq!(summary.metrics_line(), "VOCALS: cSDR = 3.14 dB, uSDR = -2.00 dB");
    }

    #[test]
    fn test_infinite_entry_propagates() {
        let mut aggregate = ResultsAggregate::new(vec![Target::Other]);
        aggregate.record(Target::Other, SdrMetrics::new(5.0, 5.0));
        aggregate.record(Target::Other, SdrMetrics::new(f64::NEG_INFINITY, f64::NEG_INFINITY));
        assert_eq!(aggregate.summarize()[0].mean_clean_sdr, f64::NEG_INFINITY);
    }
}
