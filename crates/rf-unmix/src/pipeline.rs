//! Evaluation orchestrator
//!
//! Per track: STFT → factorize → cluster → reconstruct every cluster →
//! oracle assignment → SDR. Metrics are appended to a [`ResultsAggregate`]
//! that outlives the tracks; everything else is dropped after the track.

use log::{debug, info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::aggregate::{ResultsAggregate, TargetSummary};
use crate::assignment::{Assignment, OracleAssigner};
use crate::cluster::{ClusterLabels, Clusterer, KMeansClusterer};
use crate::config::EvalConfig;
use crate::dataset::TrackEntry;
use crate::error::UnmixResult;
use crate::factorize::{Factorization, Factorizer, NmfFactorizer};
use crate::loader::TrackLoader;
use crate::reconstruct::reconstruct_all;
use crate::spectrogram_image::{ArtifactSink, SpectrogramKind};
use crate::stft::{SpectralTransform, Spectrogram};
use crate::target::{Target, TrackReferences};

// ═══════════════════════════════════════════════════════════════════════════
// RESULTS
// ═══════════════════════════════════════════════════════════════════════════

/// Everything the unsupervised stage produced for one mixture
#[derive(Debug, Clone)]
pub struct Separation {
    pub spectrogram: Spectrogram,
    pub factorization: Factorization,
    pub labels: ClusterLabels,
    /// Time-domain signal per cluster id
    pub cluster_signals: Vec<Vec<f64>>,
}

impl Separation {
    pub fn num_clusters(&self) -> usize {
        self.cluster_signals.len()
    }
}

/// Separation of one track plus its oracle assignment
#[derive(Debug, Clone)]
pub struct TrackEvaluation {
    pub name: String,
    pub separation: Separation,
    pub assignment: Assignment,
}

impl TrackEvaluation {
    /// Cluster signal assigned to `target`
    pub fn estimate_for(&self, target: Target) -> Option<&[f64]> {
        self.assignment
            .cluster_for(target)
            .and_then(|id| self.separation.cluster_signals.get(id))
            .map(Vec::as_slice)
    }
}

/// Per-track record kept after the track's buffers are released
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackRecord {
    pub name: String,
    pub assignment: Assignment,
    /// Components per cluster id
    pub cluster_sizes: Vec<usize>,
}

/// A track that was skipped
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackFailure {
    pub name: String,
    pub error: String,
}

/// Outcome of [`Evaluator::run`]
#[derive(Debug, Clone, Default)]
pub struct EvaluationRun {
    pub aggregate: ResultsAggregate,
    pub tracks: Vec<TrackRecord>,
    pub failures: Vec<TrackFailure>,
}

impl EvaluationRun {
    pub fn summaries(&self) -> Vec<TargetSummary> {
        self.aggregate.summarize()
    }

    /// Tracks attempted
    pub fn attempted(&self) -> usize {
        self.tracks.len() + self.failures.len()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// EVALUATOR
// ═══════════════════════════════════════════════════════════════════════════

/// Runs the separation pipeline with injected solvers
pub struct Evaluator<F: Factorizer, C: Clusterer> {
    config: EvalConfig,
    transform: SpectralTransform,
    factorizer: F,
    clusterer: C,
    assigner: OracleAssigner,
}

impl Evaluator<NmfFactorizer, KMeansClusterer> {
    /// NMF + k-means configured from `config`
    pub fn with_defaults(config: EvalConfig) -> UnmixResult<Self> {
        let factorizer = NmfFactorizer::new(config.nmf.clone());
        let clusterer = KMeansClusterer::new(config.kmeans.clone());
        Self::new(config, factorizer, clusterer)
    }
}

impl<F: Factorizer, C: Clusterer> Evaluator<F, C> {
    pub fn new(config: EvalConfig, factorizer: F, clusterer: C) -> UnmixResult<Self> {
        config.validate()?;
        let transform = SpectralTransform::new(config.frame_size, config.hop_size)?;
        let assigner = OracleAssigner::new(config.targets.clone());
        debug!(
            "evaluator: {} + {}, K={}, C={}, frame {}/{}",
            factorizer.name(),
            clusterer.name(),
            config.components,
            config.clusters,
            config.frame_size,
            config.hop_size
        );
        Ok(Self {
            config,
            transform,
            factorizer,
            clusterer,
            assigner,
        })
    }

    pub fn config(&self) -> &EvalConfig {
        &self.config
    }

    pub fn transform(&self) -> &SpectralTransform {
        &self.transform
    }

    /// Unsupervised separation of `mixture` into one signal per cluster id
    pub fn separate(&self, mixture: &[f64]) -> UnmixResult<Separation> {
        let spectrogram = self.transform.forward(mixture)?;
        debug!(
            "stft: {} bins x {} frames",
            spectrogram.num_bins(),
            spectrogram.num_frames()
        );

        let factorization = self
            .factorizer
            .decompose(&spectrogram.magnitude, self.config.components)?;
        let labels = self
            .clusterer
            .cluster(&factorization.basis, self.config.clusters)?;

        let empty = labels.empty_clusters();
        if !empty.is_empty() {
            warn!("clusters {:?} received no components and will be silent", empty);
        }

        let cluster_signals = reconstruct_all(&self.transform, &factorization, &spectrogram.phase, &labels)?;

        Ok(Separation {
            spectrogram,
            factorization,
            labels,
            cluster_signals,
        })
    }

    /// Separate `mixture` and assign clusters to `references`
    pub fn evaluate_track(
        &self,
        name: &str,
        mixture: &[f64],
        references: &TrackReferences,
    ) -> UnmixResult<TrackEvaluation> {
        let separation = self.separate(mixture)?;
        let assignment = self.assigner.assign(&separation.cluster_signals, references)?;
        Ok(TrackEvaluation {
            name: name.to_string(),
            separation,
            assignment,
        })
    }

    /// Evaluate every track, skipping (and recording) the ones that fail
    ///
    /// With `parallel` set, tracks are processed on the rayon pool and merged
    /// back in input order, so the aggregate matches a sequential run.
    pub fn run(&self, tracks: &[TrackEntry], loader: &dyn TrackLoader, sink: &dyn ArtifactSink) -> EvaluationRun {
        let outcomes: Vec<Result<TrackRecord, TrackFailure>> = if self.config.parallel {
            tracks
                .par_iter()
                .map(|track| self.process_track(track, loader, sink))
                .collect()
        } else {
            tracks
                .iter()
                .map(|track| self.process_track(track, loader, sink))
                .collect()
        };

        let mut run = EvaluationRun {
            aggregate: ResultsAggregate::new(self.config.targets.clone()),
            ..Default::default()
        };
        for outcome in outcomes {
            match outcome {
                Ok(record) => {
                    run.aggregate.record_assignment(&record.assignment);
                    run.tracks.push(record);
                }
                Err(failure) => run.failures.push(failure),
            }
        }

        info!(
            "evaluated {} of {} tracks ({} failed)",
            run.tracks.len(),
            run.attempted(),
            run.failures.len()
        );
        run
    }

    fn process_track(
        &self,
        track: &TrackEntry,
        loader: &dyn TrackLoader,
        sink: &dyn ArtifactSink,
    ) -> Result<TrackRecord, TrackFailure> {
        let start = Instant::now();
        info!("processing {}", track.name);

        self.try_process_track(track, loader, sink)
            .map(|record| {
                info!("{} done in {:.2}s", track.name, start.elapsed().as_secs_f64());
                record
            })
            .map_err(|e| {
                warn!("skipping {}: {}", track.name, e);
                TrackFailure {
                    name: track.name.clone(),
                    error: e.to_string(),
                }
            })
    }

    fn try_process_track(
        &self,
        track: &TrackEntry,
        loader: &dyn TrackLoader,
        sink: &dyn ArtifactSink,
    ) -> UnmixResult<TrackRecord> {
        let audio = loader.load(track, &self.config.targets, self.config.sample_rate)?;
        let evaluation = self.evaluate_track(&track.name, &audio.mixture, &audio.references)?;

        for entry in evaluation.assignment.entries() {
            debug!(
                "{} {}: cluster {}, cSDR {:.2} dB, uSDR {:.2} dB",
                track.name,
                entry.target.label(),
                entry.cluster_id,
                entry.metrics.clean_sdr,
                entry.metrics.thresholded_sdr
            );
        }

        if self.config.write_estimates {
            for entry in evaluation.assignment.entries() {
                let signal = &evaluation.separation.cluster_signals[entry.cluster_id];
                sink.write_estimate(&track.name, entry.target, signal, self.config.sample_rate)?;
            }
        }

        // Diagnostics only: the metrics above stand even if rendering fails
        if let Some(target) = self.config.spectrogram_target {
            if let Err(e) = self.write_spectrograms(target, &audio.references, &evaluation, sink) {
                warn!("{}: no spectrogram for {}: {}", track.name, target, e);
            }
        }

        Ok(TrackRecord {
            name: evaluation.name,
            cluster_sizes: evaluation.separation.labels.cluster_sizes(),
            assignment: evaluation.assignment,
        })
    }

    fn write_spectrograms(
        &self,
        target: Target,
        references: &TrackReferences,
        evaluation: &TrackEvaluation,
        sink: &dyn ArtifactSink,
    ) -> UnmixResult<()> {
        let (Some(reference), Some(estimate)) =
            (references.get(target), evaluation.estimate_for(target))
        else {
            return Ok(());
        };
        if reference.is_empty() || estimate.is_empty() {
            warn!(
                "{}: {} estimate is shorter than one hop, skipping spectrogram",
                evaluation.name, target
            );
            return Ok(());
        }

        let truth = self.transform.forward(reference)?;
        let predicted = self.transform.forward(estimate)?;
        sink.write_spectrogram(&evaluation.name, target, SpectrogramKind::GroundTruth, &truth.magnitude)?;
        sink.write_spectrogram(&evaluation.name, target, SpectrogramKind::Predicted, &predicted.magnitude)?;
        Ok(())
    }
}
