//! Grouping of factorization components into clusters
//!
//! Each component's basis vector (a column of the basis matrix) is one point.
//! [`KMeansClusterer`] runs `linfa` k-means with a seeded `Xoshiro256Plus`,
//! keeping the restart with the lowest inertia.

use linfa::traits::{Fit, Predict};
use linfa::DatasetBase;
use linfa_clustering::KMeans;
use log::debug;
use ndarray::Array2;
use rand_xoshiro::rand_core::SeedableRng;
use rand_xoshiro::Xoshiro256Plus;

use crate::config::KMeansConfig;
use crate::error::{UnmixError, UnmixResult};

/// Cluster id per component
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterLabels {
    labels: Vec<usize>,
    num_clusters: usize,
}

impl ClusterLabels {
    /// Wrap labels, rejecting ids outside `0..num_clusters`
    pub fn new(labels: Vec<usize>, num_clusters: usize) -> UnmixResult<Self> {
        if let Some(&bad) = labels.iter().find(|&&l| l >= num_clusters) {
            return Err(UnmixError::InvalidInput(format!(
                "cluster label {} out of range for {} clusters",
                bad, num_clusters
            )));
        }
        Ok(Self {
            labels,
            num_clusters,
        })
    }

    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    pub fn num_clusters(&self) -> usize {
        self.num_clusters
    }

    pub fn num_components(&self) -> usize {
        self.labels.len()
    }

    /// Component indices assigned to `cluster_id`, ascending
    pub fn members(&self, cluster_id: usize) -> Vec<usize> {
        self.labels
            .iter()
            .enumerate()
            .filter(|&(_, &label)| label == cluster_id)
            .map(|(idx, _)| idx)
            .collect()
    }

    /// Component count per cluster
    pub fn cluster_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.num_clusters];
        for &label in &self.labels {
            sizes[label] += 1;
        }
        sizes
    }

    /// `cluster_id` received no component
    pub fn is_empty_cluster(&self, cluster_id: usize) -> bool {
        !self.labels.contains(&cluster_id)
    }

    /// Clusters that received no component
    pub fn empty_clusters(&self) -> Vec<usize> {
        (0..self.num_clusters)
            .filter(|&id| self.is_empty_cluster(id))
            .collect()
    }
}

/// Strategy that partitions basis vectors into clusters
///
/// Implementations must be deterministic for a fixed configuration.
pub trait Clusterer: Send + Sync {
    /// Label each column of `basis` with a cluster id in `0..clusters`
    fn cluster(&self, basis: &Array2<f64>, clusters: usize) -> UnmixResult<ClusterLabels>;

    /// Solver name for logs and reports
    fn name(&self) -> &str;
}

/// Checks shared by all clusterers
pub fn validate_cluster_input(basis: &Array2<f64>, clusters: usize) -> UnmixResult<()> {
    let components = basis.ncols();
    if clusters == 0 {
        return Err(UnmixError::InvalidInput("cluster count must be positive".into()));
    }
    if components < clusters {
        return Err(UnmixError::InvalidInput(format!(
            "{} components cannot form {} clusters",
            components, clusters
        )));
    }
    if basis.nrows() == 0 {
        return Err(UnmixError::InvalidInput("basis has no frequency bins".into()));
    }
    if basis.iter().any(|v| !v.is_finite()) {
        return Err(UnmixError::InvalidInput("basis contains non-finite values".into()));
    }
    Ok(())
}

/// Lloyd k-means with k-means++ seeding, backed by `linfa-clustering`
#[derive(Debug, Clone, Default)]
pub struct KMeansClusterer {
    config: KMeansConfig,
}

impl KMeansClusterer {
    pub fn new(config: KMeansConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &KMeansConfig {
        &self.config
    }
}

impl Clusterer for KMeansClusterer {
    fn cluster(&self, basis: &Array2<f64>, clusters: usize) -> UnmixResult<ClusterLabels> {
        validate_cluster_input(basis, clusters)?;

        let points = basis.t().to_owned();

        // k-means++ cannot seed more centroids than there are distinct points
        let groups = distinct_groups(&points);
        let distinct = groups.iter().max().map_or(0, |&g| g + 1);
        if distinct < clusters {
            debug!(
                "k-means: {} distinct points for {} clusters, grouping identical points",
                distinct, clusters
            );
            return ClusterLabels::new(groups, clusters);
        }

        let rng = Xoshiro256Plus::seed_from_u64(self.config.seed);
        let model = KMeans::params_with_rng(clusters, rng)
            .n_runs(self.config.n_init.max(1))
            .max_n_iterations(self.config.max_iter.max(1) as u64)
            .tolerance(self.config.tol)
            .fit(&DatasetBase::from(points.clone()))
            .map_err(|e| UnmixError::InvalidInput(format!("k-means failed: {}", e)))?;

        let labels = model.predict(&points).into_raw_vec_and_offset().0;
        debug!("k-means: {} points into {} clusters", points.nrows(), clusters);
        ClusterLabels::new(labels, clusters)
    }

    fn name(&self) -> &str {
        "kmeans"
    }
}

/// Group id per point; identical points share an id, numbered by first appearance
fn distinct_groups(points: &Array2<f64>) -> Vec<usize> {
    let mut representatives: Vec<usize> = Vec::new();
    points
        .outer_iter()
        .enumerate()
        .map(|(i, point)| {
            match representatives
                .iter()
                .position(|&r| points.row(r) == point)
            {
                Some(group) => group,
                None => {
                    representatives.push(i);
                    representatives.len() - 1
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Columns are points: three tight groups in 3-D
    fn grouped_basis() -> Array2<f64> {
        let points = [
            [10.0, 0.0, 0.0],
            [10.2, 0.1, 0.0],
            [0.0, 10.0, 0.0],
            [0.1, 9.9, 0.2],
            [0.0, 0.0, 10.0],
            [0.0, 0.2, 10.1],
        ];
        Array2::from_shape_fn((3, points.len()), |(f, k)| points[k][f])
    }

    #[test]
    fn test_groups_separated_points() {
        let labels = KMeansClusterer::default().cluster(&grouped_basis(), 3).unwrap();
        let l = labels.labels();

        assert_eq!(l.len(), 6);
        assert_eq!(l[0], l[1]);
        assert_eq!(l[2], l[3]);
        assert_eq!(l[4], l[5]);
        assert_ne!(l[0], l[2]);
        assert_ne!(l[0], l[4]);
        assert_ne!(l[2], l[4]);
    }

    #[test]
    fn test_deterministic_for_fixed_seed() {
        let clusterer = KMeansClusterer::new(KMeansConfig {
            seed: 3,
            ..Default::default()
        });
        let a = clusterer.cluster(&grouped_basis(), 2).unwrap();
        let b = clusterer.cluster(&grouped_basis(), 2).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_labels_in_range() {
        let labels = KMeansClusterer::default().cluster(&grouped_basis(), 4).unwrap();
        assert_eq!(labels.num_clusters(), 4);
        assert!(labels.labels().iter().all(|&l| l < 4));
        assert_eq!(labels.cluster_sizes().iter().sum::<usize>(), 6);
    }

    #[test]
    fn test_identical_points() {
        let basis = Array2::<f64>::ones((4, 5));
        let labels = KMeansClusterer::default().cluster(&basis, 3).unwrap();
        assert_eq!(labels.num_components(), 5);
        assert_eq!(labels.labels(), &[0, 0, 0, 0, 0]);
        assert_eq!(labels.empty_clusters(), vec![1, 2]);
    }

    #[test]
    fn test_fewer_distinct_points_than_clusters() {
        // Columns 0 and 2 coincide, as do 1 and 3
        let basis = Array2::from_shape_fn((2, 4), |(f, k)| if k % 2 == f { 1.0 } else { 0.0 });
        let labels = KMeansClusterer::default().cluster(&basis, 3).unwrap();
        assert_eq!(labels.labels(), &[0, 1, 0, 1]);
    }

    #[test]
    fn test_rejects_fewer_components_than_clusters() {
        let basis = Array2::<f64>::ones((4, 3));
        let result = KMeansClusterer::default().cluster(&basis, 4);
        assert!(matches!(result, Err(UnmixError::InvalidInput(_))));
        assert!(KMeansClusterer::default().cluster(&basis, 0).is_err());
    }

    #[test]
    fn test_members_and_empty_clusters() {
        let labels = ClusterLabels::new(vec![0, 2, 0, 2], 3).unwrap();
        assert_eq!(labels.members(0), vec![0, 2]);
        assert_eq!(labels.members(1), Vec::<usize>::new());
        assert_eq!(labels.cluster_sizes(), vec![2, 0, 2]);
        assert_eq!(labels.empty_clusters(), vec![1]);
        assert!(labels.is_empty_cluster(1));
        assert!(!labels.is_empty_cluster(2));
    }

    #[test]
    fn test_rejects_out_of_range_label() {
        assert!(ClusterLabels::new(vec![0, 4], 4).is_err());
    }
}
