//! Data models for simulation snapshots.
//!
//! A [`Snapshot`] is one timestep as written by the simulator. Field names
//! on disk follow the simulator (including its `espilon` spelling), so the
//! serde attributes here are part of the file format.

use serde::{Deserialize, Serialize};
use std::fmt;

/// On-disk format of the per-timestep snapshot files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SnapshotFormat {
    /// `data_<k>.cbor` files.
    Cbor,
    /// `data_<k>.pickle` files.
    Pickle,
    /// Multi-file `;`-separated layout (`infos.csv`, `positions/`, `densities/`).
    LegacyCsv,
}

impl SnapshotFormat {
    /// File extension of the per-timestep files, if the format has one.
    pub fn extension(&self) -> Option<&'static str> {
        match self {
            SnapshotFormat::Cbor => Some("cbor"),
            SnapshotFormat::Pickle => Some("pickle"),
            SnapshotFormat::LegacyCsv => None,
        }
    }
}

impl fmt::Display for SnapshotFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnapshotFormat::Cbor => write!(f, "CBOR"),
            SnapshotFormat::Pickle => write!(f, "Pickle"),
            SnapshotFormat::LegacyCsv => write!(f, "legacy CSV"),
        }
    }
}

/// Energy as recorded in a snapshot.
///
/// Recent simulator versions store `(kinetic, potential)` per particle and
/// the total in `total_energy`; older ones store only the total under
/// `energy`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SnapshotEnergy {
    PerParticle(Vec<[f64; 2]>),
    Combined(f64),
}

/// One simulation timestep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Time, in dynamical times.
    pub t: f64,
    /// Iteration counter of the simulator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub c: Option<f64>,
    /// Positions relative to the system centre.
    pub positions: Vec<[f64; 3]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speeds: Option<Vec<[f64; 3]>>,
    pub energy: SnapshotEnergy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_energy: Option<f64>,
    /// Radii of the density-profile bins.
    #[serde(default)]
    pub radii: Vec<f64>,
    #[serde(default)]
    pub density: Vec<f64>,
    /// R10, R50, R90.
    pub rayons: [f64; 3],
    /// Row-major 3x3 inertia matrix.
    pub inertia_matrix: [f64; 9],
    pub virial: f64,
    pub dynamical_time: f64,
    /// Softening length.
    #[serde(rename = "espilon", default, skip_serializing_if = "Option::is_none")]
    pub epsilon: Option<f64>,
}

impl Snapshot {
    /// Number of particles recorded in this snapshot.
    pub fn particle_count(&self) -> usize {
        self.positions.len()
    }

    /// Total energy of the system, whichever layout the snapshot uses.
    pub fn system_energy(&self) -> f64 {
        match (&self.energy, self.total_energy) {
            (_, Some(total)) => total,
            (SnapshotEnergy::Combined(total), None) => *total,
            (SnapshotEnergy::PerParticle(per_particle), None) => {
                per_particle.iter().map(|e| e[0] + e[1]).sum()
            }
        }
    }

    /// Per-particle `(kinetic, potential)` energies, if recorded.
    pub fn particle_energies(&self) -> Option<&[[f64; 2]]> {
        match &self.energy {
            SnapshotEnergy::PerParticle(values) => Some(values),
            SnapshotEnergy::Combined(_) => None,
        }
    }
}
