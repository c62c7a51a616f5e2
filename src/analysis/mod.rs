//! Numerical analysis of an aggregated dataset.
//!
//! The isochrony pipeline runs bottom-up: [`sections`] finds turning points,
//! [`period`] turns them into local periods, [`planarity`] filters orbits and
//! [`isochrony`] fits the log-log relation at every timestep with [`fit`].

pub mod diagnostics;
pub mod fit;
pub mod isochrony;
pub mod period;
pub mod planarity;
pub mod sections;
pub mod trajectory;

pub use diagnostics::{compute_diagnostics, Diagnostics};
pub use fit::{weighted_lin_fit, LinearFit};
pub use isochrony::{isochrony_slope, IsochronyParams, IsochronyResult, SlopeSample};
pub use period::{estimate_periods, LocalPeriod};
pub use planarity::is_planar;
pub use sections::{apocenter, cut_sections, Section};
pub use trajectory::{select_representatives, trajectory_paths, Selection, TrajectoryPath};
