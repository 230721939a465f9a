//! Report generation for evaluation runs

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;

use crate::aggregate::TargetSummary;
use crate::error::{UnmixError, UnmixResult};
use crate::pipeline::{EvaluationRun, TrackFailure, TrackRecord};

/// Report format
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ReportFormat {
    /// One metrics line per target
    Text,
    /// JSON report
    Json,
    /// Markdown report
    Markdown,
}

impl ReportFormat {
    /// File extension
    pub fn extension(&self) -> &'static str {
        match self {
            ReportFormat::Text => "txt",
            ReportFormat::Json => "json",
            ReportFormat::Markdown => "md",
        }
    }
}

/// Evaluation report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationReport {
    /// Report title
    pub title: String,

    /// RFC 3339 creation time
    pub timestamp: String,

    /// Mean scores per target, in priority order
    pub summaries: Vec<TargetSummary>,

    /// Per-track assignments
    pub tracks: Vec<TrackRecord>,

    /// Skipped tracks
    pub failures: Vec<TrackFailure>,
}

impl EvaluationReport {
    pub fn from_run(title: impl Into<String>, run: &EvaluationRun) -> Self {
        Self {
            title: title.into(),
            timestamp: Utc::now().to_rfc3339(),
            summaries: run.summaries(),
            tracks: run.tracks.clone(),
            failures: run.failures.clone(),
        }
    }

    /// Generate report in specified format
    pub fn generate(&self, format: ReportFormat) -> String {
        match format {
            ReportFormat::Text => self.to_metrics_text(),
            ReportFormat::Json => self.to_json(),
            ReportFormat::Markdown => self.to_markdown(),
        }
    }

    /// Save report to file
    pub fn save<P: AsRef<Path>>(&self, path: P, format: ReportFormat) -> UnmixResult<()> {
        let path = path.as_ref();
        let write_err = |e: std::io::Error| UnmixError::Write(format!("{}: {}", path.display(), e));
        let mut file = std::fs::File::create(path).map_err(write_err)?;
        file.write_all(self.generate(format).as_bytes()).map_err(write_err)
    }

    /// `"<TARGET>: cSDR = <mean> dB, uSDR = <mean> dB"` per target, nothing else
    pub fn to_metrics_text(&self) -> String {
        self.summaries
            .iter()
            .map(|s| format!("{}\n", s.metrics_line()))
            .collect()
    }

    /// Non-finite SDRs are written as strings, see [`crate::metrics::decibels`]
    fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".into())
    }

    fn to_markdown(&self) -> String {
        let mut output = String::new();

        output.push_str(&format!("# {}\n\n", self.title));
        output.push_str(&format!("**Timestamp:** {}\n\n", self.timestamp));

        output.push_str("## Summary\n\n");
        output.push_str("| Target | Mean cSDR (dB) | Mean uSDR (dB) | Tracks |\n");
        output.push_str("|--------|----------------|----------------|--------|\n");
        for s in &self.summaries {
            output.push_str(&format!(
                "| {} | {:.2} | {:.2} | {} |\n",
                s.target.display_name(),
                s.mean_clean_sdr,
                s.mean_thresholded_sdr,
                s.tracks
            ));
        }
        output.push('\n');

        if !self.tracks.is_empty() {
            output.push_str("## Tracks\n\n");
            for track in &self.tracks {
                output.push_str(&format!("### {}\n\n", track.name));
                output.push_str("| Target | Cluster | cSDR (dB) | uSDR (dB) |\n");
                output.push_str("|--------|---------|-----------|-----------|\n");
                for entry in track.assignment.entries() {
                    output.push_str(&format!(
                        "| {} | {} | {:.2} | {:.2} |\n",
                        entry.target.display_name(),
                        entry.cluster_id,
                        entry.metrics.clean_sdr,
                        entry.metrics.thresholded_sdr
                    ));
                }
                output.push('\n');
            }
        }

        if !self.failures.is_empty() {
            output.push_str("## Skipped\n\n");
            for failure in &self.failures {
                output.push_str(&format!("- `{}`: {}\n", failure.name, failure.error));
            }
            output.push('\n');
        }

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::ResultsAggregate;
    use crate::metrics::SdrMetrics;
    use crate::target::Target;
    use tempfile::TempDir;

    fn sample_run() -> EvaluationRun {
        let mut aggregate = ResultsAggregate::new(Target::PRIORITY.to_vec());
        aggregate.record(Target::Vocals, SdrMetrics::new(4.0, 6.5));
        aggregate.record(Target::Drums, SdrMetrics::new(-1.234, 0.0));
        EvaluationRun {
            aggregate,
            tracks: Vec::new(),
            failures: vec![TrackFailure {
                name: "Broken - Track".into(),
                error: "Failed to load: missing".into(),
            }],
        }
    }

    #[test]
    fn test_metrics_text_is_exact() {
        let report = EvaluationReport::from_run("MUSDB18 test", &sample_run());
        let text = report.generate(ReportFormat::Text);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                "VOCALS: cSDR = 4.00 dB, uSDR = 6.50 dB",
                "DRUMS: cSDR = -1.23 dB, uSDR = 0.00 dB",
                "BASS: cSDR = NaN dB, uSDR = NaN dB",
                "OTHER: cSDR = NaN dB, uSDR = NaN dB",
            ]
        );
    }

    #[test]
    fn test_json_report() {
        let report = EvaluationReport::from_run("MUSDB18 test", &sample_run());
        let json = report.generate(ReportFormat::Json);
        assert!(json.contains("\"title\""));
        assert!(json.contains("\"vocals\""));
        assert!(json.contains("Broken - Track"));
    }

    #[test]
    fn test_json_keeps_non_finite_scores() {
        let mut aggregate = ResultsAggregate::new(Target::PRIORITY.to_vec());
        aggregate.record(Target::Vocals, SdrMetrics::new(4.0, 6.5));
        aggregate.record(Target::Drums, SdrMetrics::new(f64::NEG_INFINITY, f64::NEG_INFINITY));
        let run = EvaluationRun {
            aggregate,
            tracks: Vec::new(),
            failures: Vec::new(),
        };

        let json = EvaluationReport::from_run("silent stems", &run).generate(ReportFormat::Json);
        assert!(json.contains("\"-inf\""));
        assert!(json.contains("\"NaN\""));
        assert!(!json.contains("null"));

        let parsed: EvaluationReport = serde_json::from_str(&json).unwrap();
        let summaries = &parsed.summaries;
        assert_eq!(summaries[0].mean_clean_sdr, 4.0);
        assert_eq!(summaries[1].mean_clean_sdr, f64::NEG_INFINITY);
        assert!(summaries[2].mean_thresholded_sdr.is_nan());
        assert_eq!(summaries[3].tracks, 0);
    }

    #[test]
    fn test_markdown_report() {
        let report = EvaluationReport::from_run("MUSDB18 test", &sample_run());
        let md = report.generate(ReportFormat::Markdown);
        assert!(md.contains("# MUSDB18 test"));
        assert!(md.contains("| Vocals | 4.00 | 6.50 | 1 |"));
        assert!(md.contains("## Skipped"));
    }

    #[test]
    fn test_save() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("metrics.txt");
        let report = EvaluationReport::from_run("run", &sample_run());
        report.save(&path, ReportFormat::Text).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("VOCALS: cSDR = 4.00 dB"));
        assert!(report.save(dir.path().join("missing/metrics.txt"), ReportFormat::Text).is_err());
    }
}
