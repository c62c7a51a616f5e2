//! Representative orbits in the `(ln tau, ln(-E))` plane.

use super::diagnostics::evenly_spaced_indices;
use super::isochrony::IsochronyResult;
use crate::error::AnalysisError;

/// Orbits picked for the trajectory figures.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    /// Timestep at which the orbits were ranked.
    pub step: usize,
    /// Columns of the isochrony result, by increasing `ln(-E)` at `step`.
    pub columns: Vec<usize>,
}

/// Path of one orbit in the `(ln tau, ln(-E))` plane.
#[derive(Debug, Clone, PartialEq)]
pub struct TrajectoryPath {
    /// Dataset index of the particle.
    pub particle: usize,
    /// Defined points, in time order.
    pub points: Vec<(f64, f64)>,
    /// First defined point.
    pub start: Option<(f64, f64)>,
    /// `(ln tau, ln(-E), t)` markers over the first third of the run.
    pub time_marks: Vec<(f64, f64, f64)>,
}

/// Pick `point_count` orbits spread over the energy range, ranked at the
/// first timestep with more than `point_count` defined orbits (or the last
/// timestep).
pub fn select_representatives(
    result: &IsochronyResult,
    point_count: usize,
) -> Result<Selection, AnalysisError> {
    let nt = result.t.len();
    if nt == 0 {
        return Err(AnalysisError::NotEnoughPoints(point_count));
    }

    let step = (0..nt)
        .find(|&i| result.defined_at(i).len() > point_count)
        .unwrap_or(nt - 1);

    let mut ranked: Vec<(usize, f64)> = result
        .defined_at(step)
        .into_iter()
        .filter_map(|j| result.log_energy[[step, j]].map(|y| (j, y)))
        .collect();
    if ranked.is_empty() {
        return Err(AnalysisError::NotEnoughPoints(point_count));
    }
    ranked.sort_by(|a, b| a.1.total_cmp(&b.1));

    let columns = evenly_spaced_indices(ranked.len(), point_count)
        .into_iter()
        .map(|k| ranked[k].0)
        .collect();

    Ok(Selection { step, columns })
}

/// Paths of the selected orbits, with a time mark every `label_stride`
/// samples.
pub fn trajectory_paths(
    result: &IsochronyResult,
    selection: &Selection,
    label_stride: usize,
) -> Vec<TrajectoryPath> {
    let nt = result.t.len();
    let point = |i: usize, j: usize| match (result.log_tau[[i, j]], result.log_energy[[i, j]]) {
        (Some(x), Some(y)) => Some((x, y)),
        _ => None,
    };

    selection
        .columns
        .iter()
        .map(|&j| {
            let first = (0..nt).find(|&i| point(i, j).is_some());
            let time_marks = match first {
                Some(first) => (first..nt / 3)
                    .step_by(label_stride.max(1))
                    .filter_map(|k| point(k, j).map(|(x, y)| (x, y, result.t[k])))
                    .collect(),
                None => Vec::new(),
            };

            TrajectoryPath {
                particle: result.particles[j],
                points: (0..nt).filter_map(|i| point(i, j)).collect(),
                start: first.and_then(|i| point(i, j)),
                time_marks,
            }
        })
        .collect()
}
