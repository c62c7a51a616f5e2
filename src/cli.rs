//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use crate::initial::InitModel;
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser, Subcommand};
use std::ffi::OsString;
use std::path::PathBuf;

/// nbody-diag - post-processing for N-body simulation runs
///
/// Aggregate simulator snapshots into one dataset, check conservation laws,
/// measure the isochrony slope of the orbits and plot representative
/// trajectories.
///
/// Examples:
///   nbody-diag convert ./run
///   nbody-diag verify ./run/all_data.pickle
///   nbody-diag isochrony ./run/all_data.pickle 200
///   nbody-diag trajectory ./run/all_data.mat --point-count 8
///   nbody-diag init-cond init.csv 1000 gaussian 0.5 --seed 42
///   nbody-diag inspect ./run/data.bin ./run/config.ini
///   nbody-diag --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .nbody-diag.toml in the current directory
    #[arg(short, long, value_name = "FILE", env = "NBODY_DIAG_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Generate a default .nbody-diag.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Aggregate the snapshots of a simulation directory into one dataset
    ///
    /// Writes <stem>.pickle and <stem>.mat inside the directory.
    Convert {
        /// Simulation directory
        folder: PathBuf,

        /// File stem of the aggregated dataset
        #[arg(long, value_name = "STEM")]
        stem: Option<String>,
    },

    /// Plot conservation diagnostics of an aggregated dataset
    Verify {
        /// Aggregated dataset (.pickle or .mat)
        file: PathBuf,

        /// Number of density profiles to draw
        #[arg(long, value_name = "COUNT")]
        density_curves: Option<usize>,
    },

    /// Measure the isochrony slope over time
    Isochrony {
        /// Aggregated dataset (.pickle or .mat)
        file: PathBuf,

        /// Defined points needed at a timestep before fitting
        #[arg(value_name = "NB", value_parser = parse_min_point_count)]
        min_point_count: Option<usize>,

        /// Peak prominence threshold, as a fraction of the radius range
        #[arg(long, value_name = "FRACTION")]
        prominence: Option<f64>,

        /// Planarity limit, as a fraction of the apocenter
        #[arg(long, value_name = "FRACTION")]
        planar_limit: Option<f64>,

        /// Only write the JSON summary
        #[arg(long)]
        no_plots: bool,
    },

    /// Plot representative orbits in the (ln tau, ln(-E)) plane
    Trajectory {
        /// Aggregated dataset (.pickle or .mat)
        file: PathBuf,

        /// Number of orbits to draw
        #[arg(long, value_name = "COUNT")]
        point_count: Option<usize>,

        /// Samples between two time labels
        #[arg(long, value_name = "SAMPLES")]
        label_stride: Option<usize>,
    },

    /// Generate random initial conditions for the simulator
    InitCond {
        /// Output file
        output: PathBuf,

        /// Number of particles
        #[arg(value_name = "NB", value_parser = parse_particle_count)]
        nb: usize,

        /// Distribution (gaussian, uniform)
        #[arg(value_parser = parse_model)]
        model: InitModel,

        /// Standard deviation (gaussian) or half-width (uniform)
        param: Option<f64>,

        /// Seed of the random generator
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Decode a binary record file of the simulator
    Inspect {
        /// Record file
        record_file: PathBuf,

        /// Simulator .ini configuration
        ini_file: PathBuf,

        /// Number of records to print
        #[arg(long, default_value = "3", value_name = "COUNT")]
        limit: usize,
    },
}

fn parse_particle_count(value: &str) -> Result<usize, String> {
    value
        .parse()
        .map_err(|_| "Le 2e argument doit être le nombre de particule (int)".to_string())
}

fn parse_min_point_count(value: &str) -> Result<usize, String> {
    value
        .parse()
        .map_err(|_| "Le 2e argument doit être le nombre minimal de points (int)".to_string())
}

fn parse_model(value: &str) -> Result<InitModel, String> {
    value.parse()
}

/// Failure to build [`Args`] from the command line.
#[derive(Debug)]
pub enum ArgsError {
    /// Help, version or a usage error left to clap.
    Clap(clap::Error),
    /// Missing or malformed argument, reported in French.
    Usage(String),
}

/// Message for a subcommand called without its positional arguments.
fn missing_argument_message(subcommand: Option<&str>) -> &'static str {
    match subcommand {
        Some("convert") => "Entrer le chemin vers le dossier de la simulation",
        Some("init-cond") => "Requiert au moins 3 arguments",
        Some("inspect") => "Entrer le chemin vers le fichier binaire et le fichier .ini",
        _ => "Entrer le chemin vers le fichier de la simulation",
    }
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        match Self::try_parse_localized(std::env::args_os()) {
            Ok(args) => args,
            Err(ArgsError::Clap(e)) => e.exit(),
            Err(ArgsError::Usage(message)) => {
                eprintln!("Error: {}", message);
                std::process::exit(1);
            }
        }
    }

    /// Parse `itr`, turning missing positionals and rejected values into
    /// [`ArgsError::Usage`].
    pub fn try_parse_localized<I, T>(itr: I) -> Result<Self, ArgsError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString>,
    {
        let raw: Vec<OsString> = itr.into_iter().map(Into::into).collect();
        Self::try_parse_from(&raw).map_err(|e| localize(e, &raw))
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        let Some(ref command) = self.command else {
            return Err("Aucune commande fournie (voir --help)".to_string());
        };

        match command {
            Command::Convert { folder, stem } => {
                if !folder.is_dir() {
                    return Err("Dossier de simulation introuvable".to_string());
                }
                if stem.as_deref().is_some_and(|s| s.trim().is_empty()) {
                    return Err("Le nom du fichier de sortie est vide".to_string());
                }
            }
            Command::Verify {
                file,
                density_curves,
            } => {
                check_data_file(file)?;
                if *density_curves == Some(0) {
                    return Err("Il faut au moins une courbe de densité".to_string());
                }
            }
            Command::Isochrony {
                file,
                min_point_count,
                prominence,
                planar_limit,
                ..
            } => {
                check_data_file(file)?;
                if *min_point_count == Some(0) {
                    return Err("Le nombre minimal de points doit être au moins 1".to_string());
                }
                if prominence.is_some_and(|p| !(0.0..1.0).contains(&p)) {
                    return Err("La proéminence doit être dans [0, 1)".to_string());
                }
                if planar_limit.is_some_and(|l| !(l > 0.0)) {
                    return Err("La limite de planarité doit être positive".to_string());
                }
            }
            Command::Trajectory {
                file,
                point_count,
                label_stride,
            } => {
                check_data_file(file)?;
                if *point_count == Some(0) {
                    return Err("Il faut au moins une trajectoire".to_string());
                }
                if *label_stride == Some(0) {
                    return Err("L'intervalle entre étiquettes doit être au moins 1".to_string());
                }
            }
            Command::InitCond { model, param, .. } => match param {
                None => return Err(model.missing_parameter_message().to_string()),
                Some(p) if !(p.is_finite() && *p > 0.0) => {
                    return Err("Le 4e argument doit être un réel strictement positif".to_string());
                }
                Some(_) => {}
            },
            Command::Inspect {
                record_file,
                ini_file,
                ..
            } => {
                if !record_file.is_file() || !ini_file.is_file() {
                    return Err("Fichiers introuvables.".to_string());
                }
            }
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}

fn localize(error: clap::Error, raw: &[OsString]) -> ArgsError {
    match error.kind() {
        ErrorKind::MissingRequiredArgument => {
            let command = Args::command();
            let subcommand = raw
                .iter()
                .skip(1)
                .filter_map(|arg| arg.to_str())
                .find(|arg| command.find_subcommand(arg).is_some());
            ArgsError::Usage(missing_argument_message(subcommand).to_string())
        }
        ErrorKind::ValueValidation => {
            let message = std::error::Error::source(&error).map(|source| source.to_string());
            match message {
                Some(message) => ArgsError::Usage(message),
                None => ArgsError::Clap(error),
            }
        }
        _ => ArgsError::Clap(error),
    }
}

fn check_data_file(file: &std::path::Path) -> Result<(), String> {
    if file.is_file() {
        Ok(())
    } else {
        Err("Fichier de données introuvable".to_string())
    }
}
