//! Isochrony slope over time.
//!
//! For every planar, bound orbit the local period `tau` and energy `E` are
//! estimated at each timestep. At each timestep the points
//! `(ln tau, ln(-E))` of all orbits are fitted with a weighted line, each
//! orbit weighted by the spread of its own `ln(-E)` series.

use super::fit::weighted_lin_fit;
use super::period::estimate_periods;
use super::planarity::{is_planar, DEFAULT_PLANAR_LIMIT};
use super::sections::DEFAULT_PROMINENCE;
use crate::dataset::Dataset;
use crate::error::{AnalysisError, FitError, PeriodError};
use ndarray::Array2;
use serde::Serialize;
use tracing::{debug, info, warn};

/// Timesteps needed before any oscillation can be resolved.
const MIN_TIMESTEPS: usize = 3;

/// Tunables of the isochrony computation.
#[derive(Debug, Clone, PartialEq)]
pub struct IsochronyParams {
    /// Defined points needed at a timestep before fitting.
    pub min_point_count: usize,
    /// Peak prominence threshold, as a fraction of the radius range.
    pub prominence: f64,
    /// Planarity limit, as a fraction of the apocenter.
    pub planar_limit: f64,
}

impl Default for IsochronyParams {
    fn default() -> Self {
        Self {
            min_point_count: 100,
            prominence: DEFAULT_PROMINENCE,
            planar_limit: DEFAULT_PLANAR_LIMIT,
        }
    }
}

/// Weighted fit of `ln(-E)` against `ln tau` at one timestep.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SlopeSample {
    pub slope: f64,
    pub slope_err: f64,
    pub intercept: f64,
    pub intercept_err: f64,
    /// Mean squared residual of the fit.
    pub residual: f64,
    /// Number of orbits in the fit.
    pub points: usize,
}

/// Why orbits were left out of the fit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Exclusions {
    pub non_planar: usize,
    pub unbound: usize,
    pub constant_energy: usize,
    pub no_oscillation: usize,
    pub too_few_sections: usize,
}

/// Per-orbit log-log series and the slope time series.
#[derive(Debug, Clone, PartialEq)]
pub struct IsochronyResult {
    pub t: Vec<f64>,
    /// Dataset indices of the retained orbits; column `j` of the arrays
    /// below belongs to particle `particles[j]`.
    pub particles: Vec<usize>,
    /// `ln tau`, `Nt x particles.len()`.
    pub log_tau: Array2<Option<f64>>,
    /// `ln(-E)`, `Nt x particles.len()`.
    pub log_energy: Array2<Option<f64>>,
    /// Population standard deviation of each orbit's `ln(-E)` series.
    pub log_energy_std: Vec<f64>,
    pub slopes: Vec<Option<SlopeSample>>,
    pub exclusions: Exclusions,
}

impl IsochronyResult {
    /// Columns with both coordinates defined at `step`.
    pub fn defined_at(&self, step: usize) -> Vec<usize> {
        (0..self.particles.len())
            .filter(|&j| {
                self.log_tau[[step, j]].is_some() && self.log_energy[[step, j]].is_some()
            })
            .collect()
    }

    /// Last timestep with a successful fit.
    pub fn last_fit(&self) -> Option<(usize, &SlopeSample)> {
        self.slopes
            .iter()
            .enumerate()
            .rev()
            .find_map(|(i, s)| s.as_ref().map(|s| (i, s)))
    }

    pub fn fit_count(&self) -> usize {
        self.slopes.iter().flatten().count()
    }
}

fn population_std(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt()
}

/// Compute the isochrony slope at every timestep of `dataset`.
pub fn isochrony_slope(
    dataset: &Dataset,
    params: &IsochronyParams,
) -> Result<IsochronyResult, AnalysisError> {
    let energy = dataset.energy.as_ref().ok_or(AnalysisError::MissingEnergy)?;
    let nt = dataset.timestep_count();
    if nt < MIN_TIMESTEPS {
        return Err(AnalysisError::TooFewTimesteps {
            found: nt,
            required: MIN_TIMESTEPS,
        });
    }
    debug!("Energy array shape {:?}", energy.shape());

    let t = dataset.t.to_vec();
    let planar = is_planar(dataset, params.planar_limit, params.prominence);

    let mut exclusions = Exclusions::default();
    let mut particles = Vec::new();
    let mut columns: Vec<(Vec<Option<f64>>, Vec<Option<f64>>)> = Vec::new();
    let mut log_energy_std = Vec::new();

    for (particle, &is_planar) in planar.iter().enumerate() {
        if !is_planar {
            exclusions.non_planar += 1;
            continue;
        }

        let particle_energy = match dataset.particle_energy(particle) {
            Some(e) => e.to_vec(),
            None => return Err(AnalysisError::MissingEnergy),
        };
        if particle_energy.iter().any(|&e| !(e < 0.0)) {
            debug!("Particle {} is not bound, skipped", particle);
            exclusions.unbound += 1;
            continue;
        }

        let log_e: Vec<f64> = particle_energy.iter().map(|e| (-e).ln()).collect();
        let spread = population_std(&log_e);
        if !(spread > 0.0) {
            debug!("Particle {} has constant energy, skipped", particle);
            exclusions.constant_energy += 1;
            continue;
        }

        let radius = dataset.particle_radius(particle).to_vec();
        let estimates = match estimate_periods(&t, &radius, &particle_energy, params.prominence) {
            Ok(estimates) => estimates,
            Err(PeriodError::NoOscillation) => {
                debug!("Particle {}: no oscillation", particle);
                exclusions.no_oscillation += 1;
                continue;
            }
            Err(PeriodError::TooFewSections { found, .. }) => {
                debug!("Particle {}: only {} turning points", particle, found);
                exclusions.too_few_sections += 1;
                continue;
            }
            Err(e @ PeriodError::LengthMismatch(..)) => {
                warn!("Particle {}: {}", particle, e);
                continue;
            }
        };

        let x = estimates
            .iter()
            .map(|e| e.and_then(|e| (e.tau > 0.0).then(|| e.tau.ln())))
            .collect();
        let y = estimates
            .iter()
            .map(|e| e.and_then(|e| (e.energy < 0.0).then(|| (-e.energy).ln())))
            .collect();

        particles.push(particle);
        columns.push((x, y));
        log_energy_std.push(spread);
    }

    info!(
        "{} orbits retained out of {} ({:?})",
        particles.len(),
        planar.len(),
        exclusions
    );
    if particles.is_empty() {
        return Err(AnalysisError::NoOrbits);
    }

    let log_tau = Array2::from_shape_fn((nt, particles.len()), |(i, j)| columns[j].0[i]);
    let log_energy = Array2::from_shape_fn((nt, particles.len()), |(i, j)| columns[j].1[i]);

    let mut result = IsochronyResult {
        t,
        particles,
        log_tau,
        log_energy,
        log_energy_std,
        slopes: Vec::with_capacity(nt),
        exclusions,
    };

    for step in 0..nt {
        let defined = result.defined_at(step);
        if defined.is_empty() || defined.len() < params.min_point_count {
            result.slopes.push(None);
            continue;
        }

        let mut x = Vec::with_capacity(defined.len());
        let mut y = Vec::with_capacity(defined.len());
        let mut dy = Vec::with_capacity(defined.len());
        for &j in &defined {
            if let (Some(xj), Some(yj)) = (result.log_tau[[step, j]], result.log_energy[[step, j]]) {
                x.push(xj);
                y.push(yj);
                dy.push(result.log_energy_std[j]);
            }
        }

        let sample = match weighted_lin_fit(&x, &y, &dy) {
            Ok(fit) => Some(SlopeSample {
                slope: fit.slope,
                slope_err: fit.slope_err,
                intercept: fit.intercept,
                intercept_err: fit.intercept_err,
                residual: fit.mean_squared_residual(&x, &y),
                points: x.len(),
            }),
            Err(FitError::Degenerate { delta }) => {
                warn!("Degenerate fit at t = {} (delta = {:e})", result.t[step], delta);
                None
            }
            Err(e) => {
                warn!("Fit failed at t = {}: {}", result.t[step], e);
                None
            }
        };
        result.slopes.push(sample);
    }

    info!("Isochrony slope computed at {} of {} timesteps", result.fit_count(), nt);
    Ok(result)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::dataset::tests::make_dataset;
    use approx::assert_relative_eq;
    use ndarray::{Array1, Array3};
    use std::f64::consts::PI;

    /// Planar orbits with `tau ~ (-E)^(-3/2)` and a small energy wobble.
    pub(crate) fn isochrone_dataset(periods: &[f64]) -> Dataset {
        let nt = 2000;
        let np = periods.len();
        let mut dataset = make_dataset(nt, np, 0);
        let t = Array1::from_shape_fn(nt, |i| i as f64 * 0.01);

        dataset.positions = Array3::from_shape_fn((nt, np, 3), |(i, p, k)| {
            let phase = 2.0 * PI * t[i] / periods[p];
            let a = 1.0 + p as f64;
            let r = a * (1.0 + 0.3 * phase.cos());
            [r * phase.cos(), r * phase.sin(), 0.0][k]
        });
        dataset.energy = Some(Array3::from_shape_fn((nt, np, 2), |(i, p, k)| {
            let period = periods[p];
            let e0 = -period.powf(-2.0 / 3.0);
            let e = e0 * (1.0 + 1e-3 * (2.0 * PI * t[i] / period).sin());
            [-e, 2.0 * e][k]
        }));
        dataset.speeds = None;
        dataset.t = t;
        dataset
    }

    #[test]
    fn test_isochrone_slope() {
        let dataset = isochrone_dataset(&[1.0, 1.5, 2.0, 2.5, 3.0]);
        let params = IsochronyParams {
            min_point_count: 3,
            ..IsochronyParams::default()
        };

        let result = isochrony_slope(&dataset, &params).unwrap();
        assert_eq!(result.particles, vec![0, 1, 2, 3, 4]);
        assert_eq!(result.slopes.len(), dataset.timestep_count());

        let (_, last) = result.last_fit().unwrap();
        assert!(last.points >= 3);
        assert!((last.slope + 2.0 / 3.0).abs() < 0.02, "slope = {}", last.slope);

        for sample in result.slopes.iter().flatten() {
            assert!((sample.slope + 2.0 / 3.0).abs() < 0.02);
        }
    }

    #[test]
    fn test_log_energy_spread() {
        let dataset = isochrone_dataset(&[1.0, 2.0]);
        let params = IsochronyParams {
            min_point_count: 2,
            ..IsochronyParams::default()
        };
        let result = isochrony_slope(&dataset, &params).unwrap();

        // ln(1 + 1e-3 sin) has a population std of about 1e-3 / sqrt(2)
        for spread in &result.log_energy_std {
            assert_relative_eq!(*spread, 1e-3 / 2f64.sqrt(), max_relative = 1e-2);
        }
    }

    #[test]
    fn test_unbound_orbits_are_excluded() {
        let mut dataset = isochrone_dataset(&[1.0, 1.5, 2.0]);
        if let Some(energy) = dataset.energy.as_mut() {
            energy[[10, 1, 0]] = 100.0;
        }

        let result = isochrony_slope(&dataset, &IsochronyParams::default()).unwrap();
        assert_eq!(result.particles, vec![0, 2]);
        assert_eq!(result.exclusions.unbound, 1);
        // Default threshold needs 100 orbits
        assert_eq!(result.fit_count(), 0);
    }

    #[test]
    fn test_missing_energy() {
        let mut dataset = isochrone_dataset(&[1.0]);
        dataset.energy = None;
        assert!(matches!(
            isochrony_slope(&dataset, &IsochronyParams::default()),
            Err(AnalysisError::MissingEnergy)
        ));
    }

    #[test]
    fn test_no_orbits_left() {
        let mut dataset = isochrone_dataset(&[1.0, 2.0]);
        dataset.positions.mapv_inplace(|_| 1.0);
        assert!(matches!(
            isochrony_slope(&dataset, &IsochronyParams::default()),
            Err(AnalysisError::NoOrbits)
        ));
    }
}
