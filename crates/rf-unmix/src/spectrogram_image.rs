//! Spectrogram PNG rendering and per-track artifact output

use image::{Rgb, RgbImage};
use log::{debug, info};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{UnmixError, UnmixResult};
use crate::loader::write_mono;
use crate::target::Target;

// ═══════════════════════════════════════════════════════════════════════════
// COLOR MAPS
// ═══════════════════════════════════════════════════════════════════════════

/// Color map for magnitude images
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorMap {
    /// Black through purple to light yellow
    #[default]
    Magma,
    /// Dark blue through green to yellow
    Viridis,
    Grayscale,
}

impl ColorMap {
    /// Sample at `t` in 0.0-1.0
    pub fn sample(&self, t: f64) -> [u8; 3] {
        let t = t.clamp(0.0, 1.0);
        let [r, g, b] = match self {
            ColorMap::Magma => [
                (t * 1.4).min(1.0),
                t * t,
                0.15 + 0.6 * (t * std::f64::consts::PI).sin().max(0.0) * (1.0 - 0.4 * t),
            ],
            ColorMap::Viridis => [
                0.267 + t * (0.993 - 0.267),
                if t < 0.5 {
                    0.004 + t * 2.0 * (0.507 - 0.004)
                } else {
                    0.507 + (t - 0.5) * 2.0 * (0.906 - 0.507)
                },
                0.329 + t * 0.4 * (1.0 - t),
            ],
            ColorMap::Grayscale => [t, t, t],
        };
        [to_byte(r), to_byte(g), to_byte(b)]
    }
}

fn to_byte(v: f64) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

// ═══════════════════════════════════════════════════════════════════════════
// RENDERING
// ═══════════════════════════════════════════════════════════════════════════

/// Rendering parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpectrogramOptions {
    /// Dynamic range below the peak, in dB
    pub top_db: f64,

    /// Output rows; `None` uses one row per frequency bin
    pub height: Option<u32>,

    /// Map rows to bins on a logarithmic frequency axis
    pub log_frequency: bool,

    pub color_map: ColorMap,
}

impl Default for SpectrogramOptions {
    fn default() -> Self {
        Self {
            top_db: 80.0,
            height: None,
            log_frequency: true,
            color_map: ColorMap::Magma,
        }
    }
}

/// Rendered image description
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpectrogramImage {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

/// Amplitude to dB relative to the loudest bin, floored at `-top_db`
pub fn amplitude_to_db(magnitude: &Array2<f64>, top_db: f64) -> Array2<f64> {
    const AMIN: f64 = 1e-10;
    let peak = magnitude.iter().fold(AMIN, |acc, &m| acc.max(m));
    magnitude.mapv(|m| (20.0 * (m.max(AMIN) / peak).log10()).max(-top_db))
}

/// Frequency bin shown in image row `row` (row 0 is the top)
fn row_to_bin(row: u32, height: u32, bins: usize, log_frequency: bool) -> usize {
    if height <= 1 || bins <= 1 {
        return 0;
    }
    let position = (height - 1 - row) as f64 / (height - 1) as f64;
    let bin = if log_frequency {
        (bins as f64).powf(position) - 1.0
    } else {
        position * (bins - 1) as f64
    };
    (bin.round() as usize).min(bins - 1)
}

/// Render a (bins, frames) magnitude spectrogram to a PNG at `path`
///
/// Time runs left to right, low frequencies at the bottom. `title` is
/// returned with the image description.
pub fn render_spectrogram<P: AsRef<Path>>(
    magnitude: &Array2<f64>,
    title: &str,
    path: P,
    options: &SpectrogramOptions,
) -> UnmixResult<SpectrogramImage> {
    let path = path.as_ref();
    let (bins, frames) = magnitude.dim();
    if bins == 0 || frames == 0 {
        return Err(UnmixError::InvalidInput(format!(
            "cannot render empty spectrogram '{}'",
            title
        )));
    }
    if options.top_db <= 0.0 {
        return Err(UnmixError::InvalidInput("top_db must be positive".into()));
    }

    let db = amplitude_to_db(magnitude, options.top_db);
    let width = frames as u32;
    let height = options.height.unwrap_or(bins as u32).max(1);

    let mut img = RgbImage::new(width, height);
    for row in 0..height {
        let bin = row_to_bin(row, height, bins, options.log_frequency);
        for col in 0..width {
            let t = (db[[bin, col as usize]] + options.top_db) / options.top_db;
            img.put_pixel(col, row, Rgb(options.color_map.sample(t)));
        }
    }

    img.save(path)
        .map_err(|e| UnmixError::Write(format!("{}: {}", path.display(), e)))?;
    debug!("rendered '{}' ({}x{}) to {}", title, width, height, path.display());

    Ok(SpectrogramImage {
        title: title.to_string(),
        width,
        height,
    })
}

// ═══════════════════════════════════════════════════════════════════════════
// ARTIFACT SINKS
// ═══════════════════════════════════════════════════════════════════════════

/// Which signal a spectrogram shows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpectrogramKind {
    GroundTruth,
    Predicted,
}

impl SpectrogramKind {
    /// File-name suffix
    pub fn suffix(&self) -> &'static str {
        match self {
            SpectrogramKind::GroundTruth => "GT",
            SpectrogramKind::Predicted => "PRED",
        }
    }

    pub fn caption(&self) -> &'static str {
        match self {
            SpectrogramKind::GroundTruth => "Ground Truth",
            SpectrogramKind::Predicted => "Predicted",
        }
    }
}

/// Destination for per-track audio and image artifacts
pub trait ArtifactSink: Send + Sync {
    /// Store the estimate assigned to `target`
    fn write_estimate(&self, track: &str, target: Target, signal: &[f64], sample_rate: u32) -> UnmixResult<()>;

    /// Store a magnitude spectrogram image
    fn write_spectrogram(
        &self,
        track: &str,
        target: Target,
        kind: SpectrogramKind,
        magnitude: &Array2<f64>,
    ) -> UnmixResult<()>;
}

/// Writes artifacts into one output directory
#[derive(Debug, Clone)]
pub struct FsArtifactSink {
    dir: PathBuf,
    options: SpectrogramOptions,
}

impl FsArtifactSink {
    /// Create the sink, creating `dir` if needed
    pub fn new<P: AsRef<Path>>(dir: P) -> UnmixResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)
            .map_err(|e| UnmixError::Write(format!("{}: {}", dir.display(), e)))?;
        Ok(Self {
            dir,
            options: SpectrogramOptions::default(),
        })
    }

    pub fn with_options(mut self, options: SpectrogramOptions) -> Self {
        self.options = options;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `<track>_<target>_PRED.wav`
    pub fn estimate_path(&self, track: &str, target: Target) -> PathBuf {
        self.dir.join(format!("{}_{}_PRED.wav", track, target.name()))
    }

    /// `<track>_<target>_GT.png` or `<track>_<target>_PRED.png`
    pub fn spectrogram_path(&self, track: &str, target: Target, kind: SpectrogramKind) -> PathBuf {
        self.dir
            .join(format!("{}_{}_{}.png", track, target.name(), kind.suffix()))
    }
}

impl ArtifactSink for FsArtifactSink {
    fn write_estimate(&self, track: &str, target: Target, signal: &[f64], sample_rate: u32) -> UnmixResult<()> {
        write_mono(self.estimate_path(track, target), signal, sample_rate)
    }

    fn write_spectrogram(
        &self,
        track: &str,
        target: Target,
        kind: SpectrogramKind,
        magnitude: &Array2<f64>,
    ) -> UnmixResult<()> {
        let title = format!("{} - {} Spectrogram", target.display_name(), kind.caption());
        let image = render_spectrogram(
            magnitude,
            &title,
            self.spectrogram_path(track, target, kind),
            &self.options,
        )?;
        info!("{}: {} ({}x{})", track, image.title, image.width, image.height);
        Ok(())
    }
}

/// Discards every artifact
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl ArtifactSink for NullSink {
    fn write_estimate(&self, _track: &str, _target: Target, _signal: &[f64], _sample_rate: u32) -> UnmixResult<()> {
        Ok(())
    }

    fn write_spectrogram(
        &self,
        _track: &str,
        _target: Target,
        _kind: SpectrogramKind,
        _magnitude: &Array2<f64>,
    ) -> UnmixResult<()> {
        Ok(())
    }
}
