//! Evaluate NMF + k-means separation on a MUSDB18-HQ split
//!
//! Usage:
//!   unmix-eval --dataset musdb18hq --output outputs
//!   unmix-eval --dataset musdb18hq --split train --components 12 --parallel
//!   unmix-eval --dataset musdb18hq --config eval.json --format markdown

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::info;

use rf_unmix::{
    ArtifactSink, Dataset, EvalConfig, EvaluationReport, Evaluator, FsArtifactSink, NullSink,
    ReportFormat, WavTrackLoader,
};

#[derive(Parser)]
#[command(name = "unmix-eval", about = "Unsupervised stem separation evaluation")]
struct Cli {
    /// Dataset root containing the split directories
    #[arg(long)]
    dataset: PathBuf,

    /// Split to evaluate
    #[arg(long, default_value = "test")]
    split: String,

    /// Output directory for metrics and artifacts
    #[arg(short, long, default_value = "outputs")]
    output: PathBuf,

    /// JSON configuration file (defaults to the MUSDB18 preset)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// NMF component count
    #[arg(long)]
    components: Option<usize>,

    /// Seed for NMF and k-means
    #[arg(long)]
    seed: Option<u64>,

    /// NMF iteration budget
    #[arg(long)]
    max_iter: Option<usize>,

    /// Evaluate tracks in parallel
    #[arg(long)]
    parallel: bool,

    /// Do not write estimate WAVs
    #[arg(long)]
    no_audio: bool,

    /// Do not render spectrograms
    #[arg(long)]
    no_plots: bool,

    /// Extra report written next to metrics.txt
    #[arg(long, value_enum)]
    format: Option<ReportFormat>,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => EvalConfig::from_json_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => EvalConfig::musdb(),
    };
    if let Some(components) = cli.components {
        config = config.with_components(components);
    }
    if let Some(seed) = cli.seed {
        config = config.with_seed(seed);
    }
    if let Some(max_iter) = cli.max_iter {
        config = config.with_nmf_iterations(max_iter);
    }
    if cli.parallel {
        config = config.with_parallel(true);
    }
    if cli.no_audio {
        config.write_estimates = false;
    }
    if cli.no_plots {
        config.spectrogram_target = None;
    }

    let dataset = Dataset::discover(&cli.dataset, &cli.split)
        .with_context(|| format!("Failed to read dataset {}", cli.dataset.display()))?;
    if dataset.is_empty() {
        bail!("No tracks found in {}/{}", cli.dataset.display(), cli.split);
    }
    info!("{} tracks in split '{}'", dataset.len(), cli.split);

    let evaluator = Evaluator::with_defaults(config).context("Invalid configuration")?;

    let fs_sink;
    let sink: &dyn ArtifactSink = if evaluator.config().write_estimates || evaluator.config().spectrogram_target.is_some() {
        fs_sink = FsArtifactSink::new(&cli.output).context("Failed to create output directory")?;
        &fs_sink
    } else {
        std::fs::create_dir_all(&cli.output).context("Failed to create output directory")?;
        &NullSink
    };

    let run = evaluator.run(dataset.tracks(), &WavTrackLoader, sink);
    let report = EvaluationReport::from_run(format!("rf-unmix {} split", cli.split), &run);

    let metrics_path = cli.output.join("metrics.txt");
    report
        .save(&metrics_path, ReportFormat::Text)
        .with_context(|| format!("Failed to write {}", metrics_path.display()))?;

    if let Some(format) = cli.format.filter(|f| *f != ReportFormat::Text) {
        let path = cli.output.join(format!("report.{}", format.extension()));
        report
            .save(&path, format)
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }

    print!("{}", report.to_metrics_text());
    if !run.failures.is_empty() {
        eprintln!("{} of {} tracks skipped", run.failures.len(), run.attempted());
    }

    Ok(())
}
