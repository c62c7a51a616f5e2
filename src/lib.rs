//! nbody-diag - post-processing for N-body simulation runs.
//!
//! Snapshots written by the simulator are aggregated into a [`dataset::Dataset`],
//! then analysed: conservation diagnostics, isochrony slope of the orbits and
//! representative trajectories. Figures are drawn with `plotters`.

pub mod analysis;
pub mod cli;
pub mod config;
pub mod dataset;
pub mod error;
pub mod initial;
pub mod models;
pub mod record;
pub mod report;
pub mod scanner;
