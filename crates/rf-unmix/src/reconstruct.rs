//! Time-domain synthesis of one cluster of components

use log::debug;
use ndarray::Array2;

use crate::cluster::ClusterLabels;
use crate::error::{UnmixError, UnmixResult};
use crate::factorize::Factorization;
use crate::stft::SpectralTransform;

/// Synthesize the signal attributable to `cluster_id`
///
/// The selected components' magnitude `B[:, idx] · A[idx, :]` is combined
/// with the untouched mixture phase and inverted. A cluster without
/// components yields silence on the frame grid instead of an error.
pub fn reconstruct(
    transform: &SpectralTransform,
    factorization: &Factorization,
    phase: &Array2<f64>,
    labels: &ClusterLabels,
    cluster_id: usize,
) -> UnmixResult<Vec<f64>> {
    check_shapes(factorization, phase, labels)?;

    let members = labels.members(cluster_id);
    if members.is_empty() {
        debug!("cluster {} has no components, emitting silence", cluster_id);
        return Ok(vec![0.0; transform.output_len(phase.ncols())]);
    }

    let magnitude = factorization.reconstruct_components(&members);
    transform.inverse(&magnitude, phase)
}

/// One signal per cluster id `0..labels.num_clusters()`
pub fn reconstruct_all(
    transform: &SpectralTransform,
    factorization: &Factorization,
    phase: &Array2<f64>,
    labels: &ClusterLabels,
) -> UnmixResult<Vec<Vec<f64>>> {
    (0..labels.num_clusters())
        .map(|cluster_id| reconstruct(transform, factorization, phase, labels, cluster_id))
        .collect()
}

fn check_shapes(
    factorization: &Factorization,
    phase: &Array2<f64>,
    labels: &ClusterLabels,
) -> UnmixResult<()> {
    let (bins, frames) = phase.dim();
    if factorization.num_bins() != bins {
        return Err(UnmixError::InvalidInput(format!(
            "basis has {} bins but phase has {}",
            factorization.num_bins(),
            bins
        )));
    }
    if factorization.num_frames() != frames {
        return Err(UnmixError::InvalidInput(format!(
            "activations have {} frames but phase has {}",
            factorization.num_frames(),
            frames
        )));
    }
    if factorization.activations.nrows() != factorization.num_components() {
        return Err(UnmixError::InvalidInput(format!(
            "basis has {} components but activations have {}",
            factorization.num_components(),
            factorization.activations.nrows()
        )));
    }
    if labels.num_components() != factorization.num_components() {
        return Err(UnmixError::InvalidInput(format!(
            "{} labels for {} components",
            labels.num_components(),
            factorization.num_components()
        )));
    }
    Ok(())
}
