//! Short-time Fourier transform with magnitude/phase split
//!
//! Frames are centered: the signal is zero-padded by `frame_size / 2` on both
//! sides, so frame `t` is centered on sample `t * hop_size`. The inverse uses
//! windowed overlap-add normalized by the summed squared window and trims the
//! padding again.

use std::f64::consts::PI;
use std::sync::Arc;

use ndarray::Array2;
use num_complex::Complex64;
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};

use crate::error::{UnmixError, UnmixResult};

/// Window sums below this are treated as uncovered samples
const WINDOW_SUM_FLOOR: f64 = 1e-10;

/// Polar spectrogram, shape (bins, frames)
#[derive(Debug, Clone)]
pub struct Spectrogram {
    /// Non-negative magnitudes
    pub magnitude: Array2<f64>,

    /// Phase in radians, (-π, π]
    pub phase: Array2<f64>,
}

impl Spectrogram {
    /// Number of frequency bins
    pub fn num_bins(&self) -> usize {
        self.magnitude.nrows()
    }

    /// Number of time frames
    pub fn num_frames(&self) -> usize {
        self.magnitude.ncols()
    }
}

/// Forward/inverse STFT for a fixed frame and hop size
pub struct SpectralTransform {
    frame_size: usize,
    hop_size: usize,
    fft_forward: Arc<dyn RealToComplex<f64>>,
    fft_inverse: Arc<dyn ComplexToReal<f64>>,
    window: Vec<f64>,
}

impl SpectralTransform {
    /// Plan transforms for the given frame and hop size
    pub fn new(frame_size: usize, hop_size: usize) -> UnmixResult<Self> {
        if frame_size < 2 {
            return Err(UnmixError::InvalidInput(format!(
                "frame size must be at least 2, got {}",
                frame_size
            )));
        }
        if hop_size == 0 || hop_size > frame_size {
            return Err(UnmixError::InvalidInput(format!(
                "hop size must be in 1..={}, got {}",
                frame_size, hop_size
            )));
        }

        let mut planner = RealFftPlanner::<f64>::new();
        let fft_forward = planner.plan_fft_forward(frame_size);
        let fft_inverse = planner.plan_fft_inverse(frame_size);

        Ok(Self {
            frame_size,
            hop_size,
            fft_forward,
            fft_inverse,
            window: hann_window(frame_size),
        })
    }

    /// Frame size in samples
    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Hop size in samples
    pub fn hop_size(&self) -> usize {
        self.hop_size
    }

    /// Bins per frame
    pub fn num_bins(&self) -> usize {
        self.frame_size / 2 + 1
    }

    /// Frames produced for a signal of `len` samples
    pub fn num_frames(&self, len: usize) -> usize {
        1 + len / self.hop_size
    }

    /// Samples produced by [`Self::inverse`] for `frames` frames
    pub fn output_len(&self, frames: usize) -> usize {
        self.hop_size * frames.saturating_sub(1)
    }

    /// Analyze a signal into magnitude and phase
    pub fn forward(&self, signal: &[f64]) -> UnmixResult<Spectrogram> {
        if signal.is_empty() {
            return Err(UnmixError::InvalidInput("cannot transform an empty signal".into()));
        }

        let pad = self.frame_size / 2;
        let num_frames = self.num_frames(signal.len());
        let num_bins = self.num_bins();

        let mut magnitude = Array2::<f64>::zeros((num_bins, num_frames));
        let mut phase = Array2::<f64>::zeros((num_bins, num_frames));

        let mut input = self.fft_forward.make_input_vec();
        let mut spectrum = self.fft_forward.make_output_vec();
        let mut scratch = self.fft_forward.make_scratch_vec();

        for frame in 0..num_frames {
            let start = frame * self.hop_size;
            for (i, slot) in input.iter_mut().enumerate() {
                let pos = start + i;
                let sample = if pos >= pad {
                    signal.get(pos - pad).copied().unwrap_or(0.0)
                } else {
                    0.0
                };
                *slot = sample * self.window[i];
            }

            self.fft_forward
                .process_with_scratch(&mut input, &mut spectrum, &mut scratch)
                .map_err(|e| UnmixError::Fft(format!("forward FFT failed: {}", e)))?;

            for (bin, value) in spectrum.iter().enumerate() {
                magnitude[[bin, frame]] = value.norm();
                phase[[bin, frame]] = wrap_phase(value.arg());
            }
        }

        Ok(Spectrogram { magnitude, phase })
    }

    /// Recombine magnitude and phase and synthesize a signal
    pub fn inverse(&self, magnitude: &Array2<f64>, phase: &Array2<f64>) -> UnmixResult<Vec<f64>> {
        if magnitude.dim() != phase.dim() {
            return Err(UnmixError::InvalidInput(format!(
                "magnitude shape {:?} does not match phase shape {:?}",
                magnitude.dim(),
                phase.dim()
            )));
        }
        let (num_bins, num_frames) = magnitude.dim();
        if num_frames == 0 {
            return Err(UnmixError::InvalidInput("cannot invert an empty spectrogram".into()));
        }
        if num_bins != self.num_bins() {
            return Err(UnmixError::InvalidInput(format!(
                "expected {} bins for frame size {}, got {}",
                self.num_bins(),
                self.frame_size,
                num_bins
            )));
        }

        let padded_len = self.frame_size + self.hop_size * (num_frames - 1);
        let mut output = vec![0.0f64; padded_len];
        let mut window_sum = vec![0.0f64; padded_len];

        let mut spectrum = self.fft_inverse.make_input_vec();
        let mut frame_buf = self.fft_inverse.make_output_vec();
        let mut scratch = self.fft_inverse.make_scratch_vec();
        let norm = 1.0 / self.frame_size as f64;

        for frame in 0..num_frames {
            for (bin, slot) in spectrum.iter_mut().enumerate() {
                *slot = Complex64::from_polar(magnitude[[bin, frame]], phase[[bin, frame]]);
            }
            // DC (and Nyquist for even sizes) must be real for a real output
            spectrum[0].im = 0.0;
            if self.frame_size % 2 == 0 {
                spectrum[num_bins - 1].im = 0.0;
            }

            self.fft_inverse
                .process_with_scratch(&mut spectrum, &mut frame_buf, &mut scratch)
                .map_err(|e| UnmixError::Fft(format!("inverse FFT failed: {}", e)))?;

            let start = frame * self.hop_size;
            for (i, &sample) in frame_buf.iter().enumerate() {
                let w = self.window[i];
                output[start + i] += sample * norm * w;
                window_sum[start + i] += w * w;
            }
        }

        for (sample, &sum) in output.iter_mut().zip(window_sum.iter()) {
            if sum > WINDOW_SUM_FLOOR {
                *sample /= sum;
            }
        }

        let pad = self.frame_size / 2;
        let len = self.output_len(num_frames);
        Ok(output[pad..pad + len].to_vec())
    }
}

/// Periodic Hann window
fn hann_window(size: usize) -> Vec<f64> {
    (0..size)
        .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f64 / size as f64).cos()))
        .collect()
}

/// Fold -π onto π so phases stay in (-π, π]
fn wrap_phase(phase: f64) -> f64 {
    if phase <= -PI {
        phase + 2.0 * PI
    } else {
        phase
    }
}
