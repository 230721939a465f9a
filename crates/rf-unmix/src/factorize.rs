//! Non-negative factorization of magnitude spectrograms
//!
//! The pipeline only sees the [`Factorizer`] trait. [`NmfFactorizer`] is the
//! bundled solver: Lee-Seung multiplicative updates for the generalized
//! Kullback-Leibler divergence or the squared Frobenius norm, with a seeded
//! random initialization so repeated runs on the same input agree exactly.

use log::debug;
use ndarray::{Array2, Axis, Zip};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::config::{Divergence, NmfConfig};
use crate::error::{UnmixError, UnmixResult};

/// Guards divisions in the update rules
const EPS: f64 = 1e-10;

/// Objective is evaluated every this many iterations for early stopping
const CHECK_INTERVAL: usize = 10;

/// Basis (bins × K) and activations (K × frames), both non-negative
#[derive(Debug, Clone)]
pub struct Factorization {
    pub basis: Array2<f64>,
    pub activations: Array2<f64>,
}

impl Factorization {
    /// Number of components (K)
    pub fn num_components(&self) -> usize {
        self.basis.ncols()
    }

    /// Number of frequency bins
    pub fn num_bins(&self) -> usize {
        self.basis.nrows()
    }

    /// Number of time frames
    pub fn num_frames(&self) -> usize {
        self.activations.ncols()
    }

    /// Magnitude contributed by the selected components, `B[:, idx] · A[idx, :]`
    pub fn reconstruct_components(&self, indices: &[usize]) -> Array2<f64> {
        let basis = self.basis.select(Axis(1), indices);
        let activations = self.activations.select(Axis(0), indices);
        basis.dot(&activations)
    }

    /// Full approximation `B · A`
    pub fn approximation(&self) -> Array2<f64> {
        self.basis.dot(&self.activations)
    }

    /// Objective value of this factorization against `target`
    pub fn divergence(&self, target: &Array2<f64>, divergence: Divergence) -> f64 {
        objective(target, &self.approximation(), divergence)
    }

    /// True when every entry of both factors is finite and non-negative
    pub fn is_valid(&self) -> bool {
        self.basis
            .iter()
            .chain(self.activations.iter())
            .all(|&x| x.is_finite() && x >= 0.0)
    }
}

/// Strategy that splits a magnitude spectrogram into K additive components
///
/// Implementations must be deterministic: the same input and the same
/// configuration produce the same factorization.
pub trait Factorizer: Send + Sync {
    /// Decompose `magnitude` (bins × frames) into `components` parts
    fn decompose(&self, magnitude: &Array2<f64>, components: usize) -> UnmixResult<Factorization>;

    /// Solver name for logs and reports
    fn name(&self) -> &str;
}

/// Shape and value checks shared by all factorizers
pub fn validate_decomposition_input(magnitude: &Array2<f64>, components: usize) -> UnmixResult<()> {
    let (bins, frames) = magnitude.dim();
    if bins == 0 || frames == 0 {
        return Err(UnmixError::InvalidInput(format!(
            "magnitude spectrogram is empty ({}x{})",
            bins, frames
        )));
    }
    if components == 0 {
        return Err(UnmixError::InvalidInput("component count must be positive".into()));
    }
    if components > bins {
        return Err(UnmixError::InvalidInput(format!(
            "component count {} exceeds {} frequency bins",
            components, bins
        )));
    }
    if let Some(bad) = magnitude.iter().find(|&&v| !v.is_finite() || v < 0.0) {
        return Err(UnmixError::InvalidInput(format!(
            "magnitude must be finite and non-negative, found {}",
            bad
        )));
    }
    Ok(())
}

/// Multiplicative-update NMF
#[derive(Debug, Clone, Default)]
pub struct NmfFactorizer {
    config: NmfConfig,
}

impl NmfFactorizer {
    pub fn new(config: NmfConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &NmfConfig {
        &self.config
    }

    fn initialize(&self, magnitude: &Array2<f64>, components: usize) -> (Array2<f64>, Array2<f64>) {
        let (bins, frames) = magnitude.dim();
        let mean = magnitude.mean().unwrap_or(0.0);
        let scale = (mean / components as f64).sqrt();

        let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed);
        let basis = Array2::from_shape_fn((bins, components), |_| scale * rng.random::<f64>());
        let activations = Array2::from_shape_fn((components, frames), |_| scale * rng.random::<f64>());
        (basis, activations)
    }
}

impl Factorizer for NmfFactorizer {
    fn decompose(&self, magnitude: &Array2<f64>, components: usize) -> UnmixResult<Factorization> {
        validate_decomposition_input(magnitude, components)?;

        let (mut basis, mut activations) = self.initialize(magnitude, components);
        let divergence = self.config.divergence;

        let initial = objective(magnitude, &basis.dot(&activations), divergence);
        let mut previous = initial;
        let mut iterations = 0;

        for iter in 1..=self.config.max_iter {
            match divergence {
                Divergence::KullbackLeibler => kl_step(magnitude, &mut basis, &mut activations),
                Divergence::Frobenius => frobenius_step(magnitude, &mut basis, &mut activations),
            }
            iterations = iter;

            if self.config.tol > 0.0 && iter % CHECK_INTERVAL == 0 {
                let current = objective(magnitude, &basis.dot(&activations), divergence);
                if initial > 0.0 && (previous - current) / initial < self.config.tol {
                    break;
                }
                previous = current;
            }
        }

        sanitize(&mut basis);
        sanitize(&mut activations);

        let factorization = Factorization { basis, activations };
        debug!(
            "NMF ({:?}) K={} stopped after {} iterations, objective {:.4e}",
            divergence,
            components,
            iterations,
            factorization.divergence(magnitude, divergence)
        );

        Ok(factorization)
    }

    fn name(&self) -> &str {
        match self.config.divergence {
            Divergence::KullbackLeibler => "nmf-kl",
            Divergence::Frobenius => "nmf-frobenius",
        }
    }
}

/// One KL update of activations, then basis
fn kl_step(v: &Array2<f64>, basis: &mut Array2<f64>, activations: &mut Array2<f64>) {
    let ratio = kl_ratio(v, &basis.dot(&*activations));
    let numer = basis.t().dot(&ratio);
    let basis_sums = basis.sum_axis(Axis(0));
    for ((k, t), h) in activations.indexed_iter_mut() {
        *h *= numer[[k, t]] / (basis_sums[k] + EPS);
    }

    let ratio = kl_ratio(v, &basis.dot(&*activations));
    let numer = ratio.dot(&activations.t());
    let activation_sums = activations.sum_axis(Axis(1));
    for ((f, k), w) in basis.indexed_iter_mut() {
        *w *= numer[[f, k]] / (activation_sums[k] + EPS);
    }
}

/// One Frobenius update of activations, then basis
fn frobenius_step(v: &Array2<f64>, basis: &mut Array2<f64>, activations: &mut Array2<f64>) {
    let numer = basis.t().dot(v);
    let denom = basis.t().dot(&*basis).dot(&*activations);
    Zip::from(&mut *activations)
        .and(&numer)
        .and(&denom)
        .for_each(|h, &n, &d| *h *= n / (d + EPS));

    let numer = v.dot(&activations.t());
    let denom = basis.dot(&activations.dot(&activations.t()));
    Zip::from(&mut *basis)
        .and(&numer)
        .and(&denom)
        .for_each(|w, &n, &d| *w *= n / (d + EPS));
}

fn kl_ratio(v: &Array2<f64>, approx: &Array2<f64>) -> Array2<f64> {
    Zip::from(v).and(approx).map_collect(|&x, &y| x / (y + EPS))
}

fn objective(v: &Array2<f64>, approx: &Array2<f64>, divergence: Divergence) -> f64 {
    match divergence {
        Divergence::KullbackLeibler => Zip::from(v).and(approx).fold(0.0, |acc, &x, &y| {
            let y = y + EPS;
            if x > 0.0 {
                acc + x * (x / y).ln() - x + y
            } else {
                acc + y
            }
        }),
        Divergence::Frobenius => {
            0.5 * Zip::from(v)
                .and(approx)
                .fold(0.0, |acc, &x, &y| acc + (x - y) * (x - y))
        }
    }
}

fn sanitize(matrix: &mut Array2<f64>) {
    matrix.mapv_inplace(|x| if x.is_finite() && x > 0.0 { x } else { 0.0 });
}
