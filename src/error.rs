//! Error types.
//!
//! Library code returns these typed errors; the binary wraps them in
//! `anyhow` with context about the command being run.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while reading snapshots or reading/writing a dataset.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CBOR decode error in {path}: {source}")]
    Cbor {
        path: PathBuf,
        #[source]
        source: serde_cbor::Error,
    },

    #[error("Pickle error in {path}: {source}")]
    Pickle {
        path: PathBuf,
        #[source]
        source: serde_pickle::Error,
    },

    #[error("CSV error in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("No snapshot files found in {0}")]
    NoSnapshots(PathBuf),

    #[error("Invalid value in {path}, row {row}: {message}")]
    InvalidRow {
        path: PathBuf,
        row: usize,
        message: String,
    },

    #[error("Snapshot {index}: field '{field}' has length {found}, expected {expected}")]
    InconsistentShape {
        index: usize,
        field: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("Dataset field '{field}' has length {found}, expected {expected}")]
    ShapeMismatch {
        field: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("Array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("Snapshot {index}: per-particle energy present in some snapshots only")]
    MixedEnergyLayout { index: usize },

    #[error("Legacy layout mismatch: {0}")]
    LegacyLayout(String),

    #[error("Unsupported dataset extension: {0}")]
    UnsupportedExtension(String),

    #[error("MAT file error: {0}")]
    Mat(String),

    #[error("Missing field '{0}' in dataset")]
    MissingField(&'static str),
}

impl DatasetError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Why a period could not be estimated for a signal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PeriodError {
    #[error("Signal lengths differ: {0} samples vs {1}")]
    LengthMismatch(usize, usize),

    /// No turning point at all: the signal does not oscillate.
    #[error("No oscillation detected")]
    NoOscillation,

    /// Some turning points, but not enough to frame two full oscillations
    /// on each side (run too short for this orbit).
    #[error("Only {found} sections detected, {required} required")]
    TooFewSections { found: usize, required: usize },
}

/// Errors of the weighted linear regression.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FitError {
    #[error("Empty input")]
    Empty,

    #[error("Input lengths differ: x={x}, y={y}, dy={dy}")]
    LengthMismatch { x: usize, y: usize, dy: usize },

    #[error("Uncertainty at index {index} must be positive and finite, got {value}")]
    InvalidUncertainty { index: usize, value: f64 },

    /// The weighted determinant vanishes: all abscissae coincide.
    #[error("Degenerate fit: weighted determinant {delta:e} is zero")]
    Degenerate { delta: f64 },
}

/// Errors of the dataset-level analyses.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Dataset has no per-particle energy; cannot estimate orbital energies")]
    MissingEnergy,

    #[error("Dataset needs at least {required} timesteps, got {found}")]
    TooFewTimesteps { found: usize, required: usize },

    #[error("No planar orbit with bound energy left after filtering")]
    NoOrbits,

    #[error("No timestep reached {0} defined points")]
    NotEnoughPoints(usize),
}

/// Errors of the fixed-width binary record decoder.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("INI error in {path}: {message}")]
    Ini { path: PathBuf, message: String },

    #[error("Missing key '{0}' in configuration")]
    MissingKey(&'static str),

    #[error("Invalid value for '{key}': {value}")]
    InvalidValue { key: &'static str, value: String },

    #[error("A record of {0} particles does not fit in memory")]
    RecordTooLarge(usize),
}

/// Errors of the initial-condition generator.
#[derive(Debug, Error)]
pub enum InitError {
    #[error("Invalid parameter for model '{model}': {value} (must be positive and finite)")]
    InvalidParameter { model: &'static str, value: f64 },

    #[error("CSV error in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}
