//! Configuration for separation and evaluation runs

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::error::{UnmixError, UnmixResult};
use crate::target::Target;

/// Objective minimized by the NMF solver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Divergence {
    /// Generalized Kullback-Leibler divergence
    #[default]
    KullbackLeibler,
    /// Squared Frobenius norm
    Frobenius,
}

/// NMF solver parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NmfConfig {
    /// Iteration budget
    pub max_iter: usize,

    /// Objective
    pub divergence: Divergence,

    /// Seed for the random initialization
    pub seed: u64,

    /// Relative objective change below which iteration stops early (0 = never)
    pub tol: f64,
}

impl Default for NmfConfig {
    fn default() -> Self {
        Self {
            max_iter: 200,
            divergence: Divergence::KullbackLeibler,
            seed: 0,
            tol: 1e-4,
        }
    }
}

/// K-means solver parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KMeansConfig {
    /// Lloyd iterations per restart
    pub max_iter: usize,

    /// Number of k-means++ restarts; the lowest inertia wins
    pub n_init: usize,

    /// Centroid shift below which a restart has converged
    pub tol: f64,

    /// Seed for k-means++ seeding
    pub seed: u64,
}

impl Default for KMeansConfig {
    fn default() -> Self {
        Self {
            max_iter: 300,
            n_init: 10,
            tol: 1e-4,
            seed: 0,
        }
    }
}

/// Evaluation run configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalConfig {
    /// Sample rate every signal is brought to before analysis
    pub sample_rate: u32,

    /// STFT frame size
    pub frame_size: usize,

    /// STFT hop size
    pub hop_size: usize,

    /// NMF component count (K)
    pub components: usize,

    /// Cluster count (C)
    pub clusters: usize,

    /// Targets in assignment priority order
    pub targets: Vec<Target>,

    /// NMF parameters
    pub nmf: NmfConfig,

    /// K-means parameters
    pub kmeans: KMeansConfig,

    /// Target whose spectrograms are rendered for diagnostics
    pub spectrogram_target: Option<Target>,

    /// Write the assigned estimate of every target as WAV
    pub write_estimates: bool,

    /// Evaluate tracks on the rayon pool
    pub parallel: bool,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            frame_size: 2048,
            hop_size: 512,
            components: 8,
            clusters: 4,
            targets: Target::PRIORITY.to_vec(),
            nmf: NmfConfig::default(),
            kmeans: KMeansConfig::default(),
            spectrogram_target: Some(Target::Vocals),
            write_estimates: true,
            parallel: false,
        }
    }
}

impl EvalConfig {
    /// MUSDB18-HQ settings (44.1 kHz, 2048/512, K = 8)
    pub fn musdb() -> Self {
        Self::default()
    }

    /// Cheaper settings for smoke runs
    pub fn fast() -> Self {
        Self {
            sample_rate: 22050,
            frame_size: 1024,
            hop_size: 256,
            nmf: NmfConfig {
                max_iter: 50,
                ..Default::default()
            },
            kmeans: KMeansConfig {
                n_init: 3,
                ..Default::default()
            },
            spectrogram_target: None,
            ..Default::default()
        }
    }

    /// Load configuration from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> UnmixResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| UnmixError::Config(format!("{}: {}", path.display(), e)))?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| UnmixError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to pretty JSON
    pub fn to_json(&self) -> UnmixResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| UnmixError::Config(e.to_string()))
    }

    /// Check parameter consistency
    ///
    /// `clusters < targets.len()` is accepted here; it surfaces per track as
    /// [`UnmixError::AssignmentExhausted`].
    pub fn validate(&self) -> UnmixResult<()> {
        if self.sample_rate == 0 {
            return Err(UnmixError::Config("sample_rate must be positive".into()));
        }
        if self.frame_size < 2 {
            return Err(UnmixError::Config(format!(
                "frame_size must be at least 2, got {}",
                self.frame_size
            )));
        }
        if self.hop_size == 0 || self.hop_size > self.frame_size {
            return Err(UnmixError::Config(format!(
                "hop_size must be in 1..={}, got {}",
                self.frame_size, self.hop_size
            )));
        }
        if self.components == 0 {
            return Err(UnmixError::Config("components must be positive".into()));
        }
        if self.components > self.frame_size / 2 + 1 {
            return Err(UnmixError::Config(format!(
                "components ({}) exceed frequency bins ({})",
                self.components,
                self.frame_size / 2 + 1
            )));
        }
        if self.clusters == 0 || self.clusters > self.components {
            return Err(UnmixError::Config(format!(
                "clusters must be in 1..={}, got {}",
                self.components, self.clusters
            )));
        }
        if self.targets.is_empty() {
            return Err(UnmixError::Config("at least one target is required".into()));
        }
        let unique: HashSet<Target> = self.targets.iter().copied().collect();
        if unique.len() != self.targets.len() {
            return Err(UnmixError::Config("targets must be distinct".into()));
        }
        if self.nmf.max_iter == 0 {
            return Err(UnmixError::Config("nmf.max_iter must be positive".into()));
        }
        if self.kmeans.max_iter == 0 || self.kmeans.n_init == 0 {
            return Err(UnmixError::Config(
                "kmeans.max_iter and kmeans.n_init must be positive".into(),
            ));
        }
        if self.kmeans.tol.is_nan() || self.kmeans.tol <= 0.0 {
            return Err(UnmixError::Config("kmeans.tol must be positive".into()));
        }
        Ok(())
    }

    /// Builder pattern: set component count
    pub fn with_components(mut self, components: usize) -> Self {
        self.components = components;
        self
    }

    /// Builder pattern: set cluster count
    pub fn with_clusters(mut self, clusters: usize) -> Self {
        self.clusters = clusters;
        self
    }

    /// Builder pattern: set STFT frame and hop size
    pub fn with_frame(mut self, frame_size: usize, hop_size: usize) -> Self {
        self.frame_size = frame_size;
        self.hop_size = hop_size;
        self
    }

    /// Builder pattern: set sample rate
    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    /// Builder pattern: seed both solvers
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.nmf.seed = seed;
        self.kmeans.seed = seed;
        self
    }

    /// Builder pattern: set target priority order
    pub fn with_targets(mut self, targets: Vec<Target>) -> Self {
        self.targets = targets;
        self
    }

    /// Builder pattern: set NMF iteration budget
    pub fn with_nmf_iterations(mut self, max_iter: usize) -> Self {
        self.nmf.max_iter = max_iter;
        self
    }

    /// Builder pattern: set NMF objective
    pub fn with_divergence(mut self, divergence: Divergence) -> Self {
        self.nmf.divergence = divergence;
        self
    }

    /// Builder pattern: evaluate tracks in parallel
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EvalConfig::default();
        assert_eq!(config.sample_rate, 44100);
        assert_eq!(config.frame_size, 2048);
        assert_eq!(config.hop_size, 512);
        assert_eq!(config.components, 8);
        assert_eq!(config.clusters, 4);
        assert_eq!(config.targets, Target::PRIORITY.to_vec());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_fast_config_valid() {
        assert!(EvalConfig::fast().validate().is_ok());
    }

    #[test]
    fn test_builder_pattern() {
        let config = EvalConfig::default()
            .with_components(12)
            .with_seed(7)
            .with_frame(1024, 256)
            .with_parallel(true);

        assert_eq!(config.components, 12);
        assert_eq!(config.nmf.seed, 7);
        assert_eq!(config.kmeans.seed, 7);
        assert_eq!(config.frame_size, 1024);
        assert!(config.parallel);
    }

    #[test]
    fn test_rejects_misconfiguration() {
        assert!(EvalConfig::default().with_components(0).validate().is_err());
        assert!(EvalConfig::default().with_clusters(9).validate().is_err());
        assert!(EvalConfig::default().with_frame(16, 32).validate().is_err());
        // 8-point frames give 5 bins, fewer than 8 components
        assert!(EvalConfig::default().with_frame(8, 2).validate().is_err());
        assert!(EvalConfig::default()
            .with_targets(vec![Target::Bass, Target::Bass])
            .validate()
            .is_err());

        let mut config = EvalConfig::default();
        config.kmeans.tol = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_fewer_clusters_than_targets_is_accepted() {
        let config = EvalConfig::default().with_clusters(3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_json_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let config = EvalConfig::fast().with_divergence(Divergence::Frobenius);
        std::fs::write(&path, config.to_json().unwrap()).unwrap();

        let loaded = EvalConfig::from_json_file(&path).unwrap();
        assert_eq!(loaded.sample_rate, 22050);
        assert_eq!(loaded.nmf.divergence, Divergence::Frobenius);
        assert_eq!(loaded.spectrogram_target, None);
    }
}
