//! Planarity of particle orbits.
//!
//! An orbit is planar when its positions stay close to the plane orthogonal
//! to the mean angular momentum, relative to its apocenter.

use super::sections::apocenter;
use crate::dataset::Dataset;
use nalgebra::Vector3;
use ndarray::ArrayView2;

/// Default deviation limit, as a fraction of the apocenter.
pub const DEFAULT_PLANAR_LIMIT: f64 = 0.2;

/// Planarity measurements of one orbit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrbitPlanarity {
    /// Peak-to-peak distance to the mean orbital plane, `None` when the
    /// angular momentum vanishes.
    pub deviation: Option<f64>,
    pub apocenter: Option<f64>,
    pub planar: bool,
}

fn row(positions: &ArrayView2<'_, f64>, i: usize) -> Vector3<f64> {
    Vector3::new(positions[[i, 0]], positions[[i, 1]], positions[[i, 2]])
}

/// Mean of `r x v` over the orbit. Without recorded velocities, centred
/// differences are used over the interior samples.
fn mean_angular_momentum(dataset: &Dataset, particle: usize) -> Option<Vector3<f64>> {
    let positions = dataset.particle_positions(particle);
    let nt = positions.nrows();

    let (sum, count) = match &dataset.speeds {
        Some(speeds) => {
            let mut sum = Vector3::zeros();
            for i in 0..nt {
                let v = Vector3::new(
                    speeds[[i, particle, 0]],
                    speeds[[i, particle, 1]],
                    speeds[[i, particle, 2]],
                );
                sum += row(&positions, i).cross(&v);
            }
            (sum, nt)
        }
        None => {
            if nt < 3 {
                return None;
            }
            let mut sum = Vector3::zeros();
            for i in 1..nt - 1 {
                let dt = dataset.t[i + 1] - dataset.t[i - 1];
                if dt == 0.0 {
                    return None;
                }
                let v = (row(&positions, i + 1) - row(&positions, i - 1)) / dt;
                sum += row(&positions, i).cross(&v);
            }
            (sum, nt - 2)
        }
    };

    if count == 0 {
        return None;
    }
    Some(sum / count as f64)
}

/// Measure the planarity of every particle orbit.
pub fn orbit_planarity(dataset: &Dataset, lim: f64, threshold: f64) -> Vec<OrbitPlanarity> {
    (0..dataset.particle_count())
        .map(|particle| {
            let radius = dataset.particle_radius(particle);
            let apocenter = radius.as_slice().and_then(|r| apocenter(r, threshold));

            let deviation = mean_angular_momentum(dataset, particle).and_then(|l| {
                let norm = l.norm();
                if norm == 0.0 || !norm.is_finite() {
                    return None;
                }
                let normal = l / norm;
                let positions = dataset.particle_positions(particle);
                let (lo, hi) = (0..positions.nrows())
                    .map(|i| row(&positions, i).dot(&normal))
                    .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), d| {
                        (lo.min(d), hi.max(d))
                    });
                Some(hi - lo)
            });

            let planar = match (deviation, apocenter) {
                (Some(delta), Some(ra)) => delta < lim * ra,
                _ => false,
            };

            OrbitPlanarity {
                deviation,
                apocenter,
                planar,
            }
        })
        .collect()
}

/// Whether each particle orbit is planar.
pub fn is_planar(dataset: &Dataset, lim: f64, threshold: f64) -> Vec<bool> {
    orbit_planarity(dataset, lim, threshold)
        .into_iter()
        .map(|orbit| orbit.planar)
        .collect()
}
