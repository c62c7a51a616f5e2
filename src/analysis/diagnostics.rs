//! Conservation and structure diagnostics of a run.

use crate::dataset::Dataset;
use nalgebra::Matrix3;
use ndarray::Axis;
use tracing::warn;

/// Density profile at one timestep, radius in units of R90.
#[derive(Debug, Clone, PartialEq)]
pub struct DensityProfile {
    pub t: f64,
    pub radius: Vec<f64>,
    pub density: Vec<f64>,
}

/// Time series shown on the verification figure.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostics {
    pub t: Vec<f64>,
    /// `(E - mean E) / mean E`, in percent.
    pub energy_drift: Vec<f64>,
    pub virial: Vec<f64>,
    /// Smallest over middle principal moment.
    pub a1: Vec<f64>,
    /// Largest over middle principal moment.
    pub a2: Vec<f64>,
    pub r10: Vec<f64>,
    pub r50: Vec<f64>,
    pub r90: Vec<f64>,
    pub density_profiles: Vec<DensityProfile>,
}

/// `count` indices spread evenly over `0..len`, truncated towards zero,
/// without repeats.
pub fn evenly_spaced_indices(len: usize, count: usize) -> Vec<usize> {
    if len == 0 || count == 0 {
        return Vec::new();
    }
    if count == 1 {
        return vec![0];
    }

    let last = (len - 1) as f64;
    let mut indices: Vec<usize> = (0..count)
        .map(|i| (i as f64 * last / (count - 1) as f64) as usize)
        .collect();
    indices.dedup();
    indices
}

/// Ascending eigenvalues of a row-major symmetric 3x3 matrix.
pub fn principal_moments(flat: &[f64]) -> [f64; 3] {
    let matrix = Matrix3::from_row_slice(flat);
    let mut eigenvalues: Vec<f64> = matrix.symmetric_eigenvalues().iter().copied().collect();
    eigenvalues.sort_by(|a, b| a.total_cmp(b));
    [eigenvalues[0], eigenvalues[1], eigenvalues[2]]
}

/// Relative deviation from the mean, in percent.
fn relative_drift(energy: &[f64]) -> Vec<f64> {
    if energy.is_empty() {
        return Vec::new();
    }
    let mean = energy.iter().sum::<f64>() / energy.len() as f64;
    if mean == 0.0 {
        warn!("Mean total energy is zero, energy drift is undefined");
        return vec![0.0; energy.len()];
    }
    energy.iter().map(|e| (e - mean) / mean * 100.0).collect()
}

fn density_profile(dataset: &Dataset, index: usize) -> DensityProfile {
    let nbins = dataset.bin_count();
    let kept = nbins.saturating_sub(1);
    let r90 = dataset.rayons[[index, 2]];

    DensityProfile {
        t: dataset.t[index],
        radius: (0..kept).map(|b| dataset.radii[[index, b]] / r90).collect(),
        density: (0..kept).map(|b| dataset.density[[index, b]]).collect(),
    }
}

/// Compute the diagnostics of `dataset`, with `density_curves` profiles.
pub fn compute_diagnostics(dataset: &Dataset, density_curves: usize) -> Diagnostics {
    let nt = dataset.timestep_count();

    let (a1, a2) = dataset
        .inertia_matrix
        .axis_iter(Axis(0))
        .map(|row| {
            let flat: Vec<f64> = row.iter().copied().collect();
            let [l0, l1, l2] = principal_moments(&flat);
            (l0 / l1, l2 / l1)
        })
        .unzip();

    let density_profiles = if dataset.bin_count() > 1 {
        evenly_spaced_indices(nt, density_curves)
            .into_iter()
            .map(|i| density_profile(dataset, i))
            .collect()
    } else {
        warn!("No density profile recorded");
        Vec::new()
    };

    Diagnostics {
        t: dataset.t.to_vec(),
        energy_drift: relative_drift(&dataset.total_energy.to_vec()),
        virial: dataset.virial.to_vec(),
        a1,
        a2,
        r10: dataset.rayons.column(0).to_vec(),
        r50: dataset.rayons.column(1).to_vec(),
        r90: dataset.rayons.column(2).to_vec(),
        density_profiles,
    }
}
