//! Isochrony summary reports.
//!
//! The slope time series is saved as pretty-printed JSON next to the dataset,
//! with metadata describing the run it came from. A short text rendering is
//! printed at the end of the `isochrony` command.

use crate::analysis::isochrony::{Exclusions, IsochronyResult, SlopeSample};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io::Write;
use std::path::Path;

/// Reference isochrony slope of the Kepler potential.
pub const KEPLER_SLOPE: f64 = -2.0 / 3.0;

/// Information about the run a summary was computed from.
#[derive(Debug, Clone, Serialize)]
pub struct SummaryMetadata {
    /// Path of the aggregated dataset.
    pub dataset: String,
    /// Date and time of the computation.
    pub generated_at: DateTime<Utc>,
    pub tool_version: String,
    /// Particles in the dataset.
    pub particle_count: usize,
    /// Orbits kept for the fits.
    pub orbits_retained: usize,
    /// Defined points needed at a timestep before fitting.
    pub min_point_count: usize,
    pub duration_seconds: f64,
}

/// One timestep of the slope series.
#[derive(Debug, Clone, Serialize)]
pub struct SlopeStep {
    pub t: f64,
    /// `None` when the timestep had too few points or a degenerate fit.
    pub fit: Option<SlopeSample>,
}

/// Serialized isochrony summary.
#[derive(Debug, Clone, Serialize)]
pub struct IsochronySummary {
    pub metadata: SummaryMetadata,
    pub exclusions: Exclusions,
    pub steps: Vec<SlopeStep>,
}

impl IsochronySummary {
    pub fn new(metadata: SummaryMetadata, result: &IsochronyResult) -> Self {
        Self {
            metadata,
            exclusions: result.exclusions,
            steps: result
                .t
                .iter()
                .zip(&result.slopes)
                .map(|(&t, fit)| SlopeStep { t, fit: *fit })
                .collect(),
        }
    }

    /// Last fitted timestep.
    pub fn last(&self) -> Option<&SlopeStep> {
        self.steps.iter().rev().find(|s| s.fit.is_some())
    }
}

/// File name of the summary computed with a `min_point_count` threshold.
pub fn summary_file_name(min_point_count: usize) -> String {
    format!("isochrony_nb_{}.json", min_point_count)
}

/// Generate a JSON summary.
pub fn generate_json_summary(summary: &IsochronySummary) -> Result<String> {
    serde_json::to_string_pretty(summary).map_err(Into::into)
}

/// Write a JSON summary to a file.
pub fn write_json_summary(summary: &IsochronySummary, path: &Path) -> Result<()> {
    let content = generate_json_summary(summary)?;

    let mut file = std::fs::File::create(path)?;
    file.write_all(content.as_bytes())?;

    Ok(())
}

/// Short human-readable rendering of the summary.
pub fn format_text_summary(summary: &IsochronySummary) -> String {
    let mut text = String::new();
    let fitted = summary.steps.iter().filter(|s| s.fit.is_some()).count();

    text.push_str(&format!(
        "Orbits retained: {} / {}\n",
        summary.metadata.orbits_retained, summary.metadata.particle_count
    ));
    let exclusions = &summary.exclusions;
    text.push_str(&format!(
        "Excluded: {} non-planar, {} unbound, {} constant energy, {} without oscillation, {} with too few turning points\n",
        exclusions.non_planar,
        exclusions.unbound,
        exclusions.constant_energy,
        exclusions.no_oscillation,
        exclusions.too_few_sections
    ));
    text.push_str(&format!(
        "Fitted timesteps: {} / {}\n",
        fitted,
        summary.steps.len()
    ));

    match summary.last() {
        Some(SlopeStep { t, fit: Some(fit) }) => {
            text.push_str(&format!(
                "Last slope (t = {:.3}): {:.4} ± {:.4} over {} orbits (Kepler: {:.4})\n",
                t, fit.slope, fit.slope_err, fit.points, KEPLER_SLOPE
            ));
        }
        _ => text.push_str(&format!(
            "No timestep reached {} defined points\n",
            summary.metadata.min_point_count
        )),
    }

    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn create_test_summary(fitted: bool) -> IsochronySummary {
        let fit = SlopeSample {
            slope: -0.66,
            slope_err: 0.01,
            intercept: 0.1,
            intercept_err: 0.02,
            residual: 1e-4,
            points: 120,
        };
        let result = IsochronyResult {
            t: vec![0.0, 0.5, 1.0],
            particles: vec![0, 3],
            log_tau: Array2::from_elem((3, 2), None),
            log_energy: Array2::from_elem((3, 2), None),
            log_energy_std: vec![0.1, 0.1],
            slopes: vec![None, fitted.then_some(fit), None],
            exclusions: Exclusions {
                non_planar: 2,
                ..Exclusions::default()
            },
        };
        let metadata = SummaryMetadata {
            dataset: "run/all_data.pickle".to_string(),
            generated_at: Utc::now(),
            tool_version: "1.0.0".to_string(),
            particle_count: 4,
            orbits_retained: 2,
            min_point_count: 100,
            duration_seconds: 1.5,
        };
        IsochronySummary::new(metadata, &result)
    }

    #[test]
    fn test_summary_last_step() {
        let summary = create_test_summary(true);
        let last = summary.last().unwrap();
        assert_eq!(last.t, 0.5);
        assert_eq!(last.fit.unwrap().points, 120);
    }

    #[test]
    fn test_generate_json_summary() {
        let summary = create_test_summary(true);
        let json = generate_json_summary(&summary).unwrap();

        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["metadata"]["particle_count"], 4);
        assert_eq!(value["exclusions"]["non_planar"], 2);
        assert!(value["steps"][0]["fit"].is_null());
        assert_eq!(value["steps"][1]["fit"]["points"], 120);
    }

    #[test]
    fn test_text_summary() {
        let text = format_text_summary(&create_test_summary(true));
        assert!(text.contains("Orbits retained: 2 / 4"));
        assert!(text.contains("Fitted timesteps: 1 / 3"));
        assert!(text.contains("-0.6600"));

        let text = format_text_summary(&create_test_summary(false));
        assert!(text.contains("No timestep reached 100 defined points"));
    }

    #[test]
    fn test_write_json_summary() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join(summary_file_name(100));
        write_json_summary(&create_test_summary(true), &path).unwrap();

        assert!(path.ends_with("isochrony_nb_100.json"));
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("\"tool_version\": \"1.0.0\""));
    }
}
