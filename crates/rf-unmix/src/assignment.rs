//! Oracle assignment of clusters to reference targets
//!
//! Greedy sequential best-first: targets are visited in priority order and
//! each takes the unused cluster with the highest clean SDR against its
//! reference. Earlier targets get first choice; there is no backtracking, so
//! the result is not a globally optimal matching.

use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::{UnmixError, UnmixResult};
use crate::metrics::{score, SdrMetrics};
use crate::target::{Target, TrackReferences};

/// One target's chosen cluster and the metrics computed when it was chosen
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AssignmentEntry {
    pub target: Target,
    pub cluster_id: usize,
    pub metrics: SdrMetrics,
}

/// Injective target → cluster mapping, in priority order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    entries: Vec<AssignmentEntry>,
}

impl Assignment {
    pub fn entries(&self) -> &[AssignmentEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn cluster_for(&self, target: Target) -> Option<usize> {
        self.entry(target).map(|e| e.cluster_id)
    }

    pub fn metrics_for(&self, target: Target) -> Option<SdrMetrics> {
        self.entry(target).map(|e| e.metrics)
    }

    /// No cluster id appears twice
    pub fn is_injective(&self) -> bool {
        let mut seen = HashSet::new();
        self.entries.iter().all(|e| seen.insert(e.cluster_id))
    }

    fn entry(&self, target: Target) -> Option<&AssignmentEntry> {
        self.entries.iter().find(|e| e.target == target)
    }
}

/// Greedy oracle assigner over a fixed target priority order
#[derive(Debug, Clone)]
pub struct OracleAssigner {
    targets: Vec<Target>,
}

impl Default for OracleAssigner {
    fn default() -> Self {
        Self::new(Target::PRIORITY.to_vec())
    }
}

impl OracleAssigner {
    pub fn new(targets: Vec<Target>) -> Self {
        Self { targets }
    }

    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    /// Map every target to a distinct cluster signal
    ///
    /// Candidates are scanned in cluster-id order and a later cluster replaces
    /// the current pick only with a strictly higher clean SDR, so ties go to
    /// the lowest id. Fails with [`UnmixError::AssignmentExhausted`] when a
    /// target finds every cluster already taken.
    pub fn assign(
        &self,
        cluster_signals: &[Vec<f64>],
        references: &TrackReferences,
    ) -> UnmixResult<Assignment> {
        let mut used: HashSet<usize> = HashSet::with_capacity(cluster_signals.len());
        let mut entries = Vec::with_capacity(self.targets.len());

        for &target in &self.targets {
            let reference = references.get(target).ok_or_else(|| {
                UnmixError::InvalidInput(format!("missing reference signal for {}", target))
            })?;

            let mut best: Option<(usize, SdrMetrics)> = None;
            for (cluster_id, signal) in cluster_signals.iter().enumerate() {
                if used.contains(&cluster_id) {
                    continue;
                }
                let metrics = score(signal, reference);
                let better = match best {
                    Some((_, current)) => metrics.clean_sdr > current.clean_sdr,
                    None => true,
                };
                if better {
                    best = Some((cluster_id, metrics));
                }
            }

            let (cluster_id, metrics) = best.ok_or(UnmixError::AssignmentExhausted {
                target,
                clusters: cluster_signals.len(),
                targets: self.targets.len(),
            })?;

            debug!(
                "{} -> cluster {} (cSDR {:.2} dB, uSDR {:.2} dB)",
                target, cluster_id, metrics.clean_sdr, metrics.thresholded_sdr
            );
            used.insert(cluster_id);
            entries.push(AssignmentEntry {
                target,
                cluster_id,
                metrics,
            });
        }

        Ok(Assignment { entries })
    }
}
