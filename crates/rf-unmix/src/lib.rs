//! # rf-unmix
//!
//! Unsupervised musical source separation with oracle evaluation.
//!
//! A mixture is transformed with an STFT, its magnitude is factorized with
//! NMF, the basis vectors are grouped by k-means, and each group is
//! resynthesized with the mixture phase. Clusters are then matched to the
//! reference stems greedily by SDR, and the scores are averaged per target
//! over a dataset.
//!
//! ## Features
//!
//! - **STFT**: centered Hann-window analysis and overlap-add synthesis
//! - **NMF**: multiplicative updates, KL or Frobenius, seeded
//! - **Clustering**: k-means++ with restarts, seeded
//! - **Oracle assignment**: greedy best-first in target priority order
//! - **Metrics**: clean and thresholded SDR
//! - **Reports**: `metrics.txt`, JSON and Markdown
//!
//! ## Example
//!
//! ```rust,ignore
//! use rf_unmix::{Dataset, EvalConfig, Evaluator, FsArtifactSink, WavTrackLoader};
//!
//! let dataset = Dataset::discover("musdb18hq", "test")?;
//! let evaluator = Evaluator::with_defaults(EvalConfig::musdb())?;
//! let sink = FsArtifactSink::new("outputs")?;
//! let run = evaluator.run(dataset.tracks(), &WavTrackLoader, &sink);
//!
//! for summary in run.summaries() {
//!     println!("{}", summary.metrics_line());
//! }
//! ```

pub mod aggregate;
pub mod assignment;
pub mod cluster;
pub mod config;
pub mod dataset;
pub mod error;
pub mod factorize;
pub mod loader;
pub mod metrics;
pub mod pipeline;
pub mod reconstruct;
pub mod report;
pub mod spectrogram_image;
pub mod stft;
pub mod target;

pub use aggregate::{ResultsAggregate, TargetSummary};
pub use assignment::{Assignment, AssignmentEntry, OracleAssigner};
pub use cluster::{ClusterLabels, Clusterer, KMeansClusterer};
pub use config::{Divergence, EvalConfig, KMeansConfig, NmfConfig};
pub use dataset::{Dataset, TrackEntry};
pub use error::{UnmixError, UnmixResult};
pub use factorize::{Factorization, Factorizer, NmfFactorizer};
pub use loader::{read_mono, write_mono, TrackAudio, TrackLoader, WavTrackLoader};
pub use metrics::{score, SdrMetrics};
pub use pipeline::{EvaluationRun, Evaluator, Separation, TrackEvaluation, TrackFailure, TrackRecord};
pub use reconstruct::{reconstruct, reconstruct_all};
pub use report::{EvaluationReport, ReportFormat};
pub use spectrogram_image::{
    render_spectrogram, ArtifactSink, FsArtifactSink, NullSink, SpectrogramImage, SpectrogramKind,
    SpectrogramOptions,
};
pub use stft::{SpectralTransform, Spectrogram};
pub use target::{Target, TrackReferences};
