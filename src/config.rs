//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.nbody-diag.toml` files.

use crate::analysis::IsochronyParams;
use crate::analysis::planarity::DEFAULT_PLANAR_LIMIT;
use crate::analysis::sections::DEFAULT_PROMINENCE;
use crate::cli::{Args, Command};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Name of the configuration file looked up in the current directory.
pub const DEFAULT_CONFIG_FILE: &str = ".nbody-diag.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Isochrony slope settings.
    #[serde(default)]
    pub isochrony: IsochronyConfig,

    /// Diagnostics settings.
    #[serde(default)]
    pub verify: VerifyConfig,

    /// Trajectory figure settings.
    #[serde(default)]
    pub trajectory: TrajectoryConfig,

    /// Output file settings.
    #[serde(default)]
    pub output: OutputConfig,
}

/// General application settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsochronyConfig {
    /// Defined points needed at a timestep before fitting.
    #[serde(default = "default_min_point_count")]
    pub min_point_count: usize,

    /// Peak prominence threshold, as a fraction of the radius range.
    #[serde(default = "default_prominence")]
    pub prominence: f64,

    /// Planarity limit, as a fraction of the apocenter.
    #[serde(default = "default_planar_limit")]
    pub planar_limit: f64,
}

impl Default for IsochronyConfig {
    fn default() -> Self {
        Self {
            min_point_count: default_min_point_count(),
            prominence: default_prominence(),
            planar_limit: default_planar_limit(),
        }
    }
}

fn default_min_point_count() -> usize {
    100
}

fn default_prominence() -> f64 {
    DEFAULT_PROMINENCE
}

fn default_planar_limit() -> f64 {
    DEFAULT_PLANAR_LIMIT
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyConfig {
    /// Number of density profiles drawn.
    #[serde(default = "default_density_curves")]
    pub density_curves: usize,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            density_curves: default_density_curves(),
        }
    }
}

fn default_density_curves() -> usize {
    5
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrajectoryConfig {
    /// Number of orbits drawn.
    #[serde(default = "default_point_count")]
    pub point_count: usize,

    /// Samples between two time labels.
    #[serde(default = "default_label_stride")]
    pub label_stride: usize,
}

impl Default for TrajectoryConfig {
    fn default() -> Self {
        Self {
            point_count: default_point_count(),
            label_stride: default_label_stride(),
        }
    }
}

fn default_point_count() -> usize {
    12
}

fn default_label_stride() -> usize {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// File stem of the aggregated dataset written by `convert`.
    #[serde(default = "default_dataset_stem")]
    pub dataset_stem: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dataset_stem: default_dataset_stem(),
        }
    }
}

fn default_dataset_stem() -> String {
    "all_data".to_string()
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        Self::load_from_dir(Path::new("."))
    }

    /// Try to load `.nbody-diag.toml` from `dir`.
    pub fn load_from_dir(dir: &Path) -> Result<Option<Self>> {
        let config_path = dir.join(DEFAULT_CONFIG_FILE);

        if config_path.exists() {
            Ok(Some(Self::load(&config_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings.
    /// Only values given on the command line override the file.
    pub fn merge_with_args(&mut self, args: &Args) {
        if args.verbose {
            self.general.verbose = true;
        }

        match &args.command {
            Some(Command::Convert {
                stem: Some(stem), ..
            }) => {
                self.output.dataset_stem = stem.clone();
            }
            Some(Command::Verify {
                density_curves: Some(count),
                ..
            }) => {
                self.verify.density_curves = *count;
            }
            Some(Command::Isochrony {
                min_point_count,
                prominence,
                planar_limit,
                ..
            }) => {
                if let Some(count) = min_point_count {
                    self.isochrony.min_point_count = *count;
                }
                if let Some(prominence) = prominence {
                    self.isochrony.prominence = *prominence;
                }
                if let Some(limit) = planar_limit {
                    self.isochrony.planar_limit = *limit;
                }
            }
            Some(Command::Trajectory {
                point_count,
                label_stride,
                ..
            }) => {
                if let Some(count) = point_count {
                    self.trajectory.point_count = *count;
                }
                if let Some(stride) = label_stride {
                    self.trajectory.label_stride = *stride;
                }
            }
            _ => {}
        }
    }

    /// Log level once the file and the command line are merged.
    ///
    /// `--quiet` wins over `verbose = true` in the file.
    pub fn log_level(&self, args: &Args) -> tracing::Level {
        if self.general.verbose && !args.quiet {
            tracing::Level::DEBUG
        } else {
            args.log_level()
        }
    }

    /// Parameters of the isochrony computation.
    pub fn isochrony_params(&self) -> IsochronyParams {
        IsochronyParams {
            min_point_count: self.isochrony.min_point_count,
            prominence: self.isochrony.prominence,
            planar_limit: self.isochrony.planar_limit,
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
