//! Local period and energy of an orbit signal.
//!
//! Consecutive turning points split the radius curve into oscillations. A
//! sample of one oscillation is matched with the point of the next
//! oscillation at the same fraction of arc length, measured in the `(t, R)`
//! plane from the refined turning point. The time between the two is the
//! local period.

use super::sections::{cut_sections, Section};
use crate::error::PeriodError;

/// Minimum number of turning points needed to resolve a period.
pub const MIN_SECTIONS: usize = 5;

/// Period and energy estimated at one sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalPeriod {
    pub tau: f64,
    pub energy: f64,
}

/// Cumulative polyline length of `(x, y)`, starting at zero.
fn arc_length(x: &[f64], y: &[f64]) -> Vec<f64> {
    let mut cumulative = Vec::with_capacity(x.len());
    let mut total = 0.0;
    cumulative.push(total);
    for i in 1..x.len() {
        total += (x[i] - x[i - 1]).hypot(y[i] - y[i - 1]);
        cumulative.push(total);
    }
    cumulative
}

/// Value of `values` at abscissa `at`, linearly interpolated from sample
/// `index` and its successor.
fn interpolate_from(x: &[f64], values: &[f64], index: usize, at: f64) -> f64 {
    let index = index.min(x.len().saturating_sub(2));
    let dx = x[index + 1] - x[index];
    if dx == 0.0 {
        return values[index];
    }
    values[index] + (values[index + 1] - values[index]) / dx * (at - x[index])
}

/// Fill `estimates` for the samples of the oscillation `first..second`,
/// matching them against the oscillation `second..third`.
fn match_oscillations(
    x: &[f64],
    energy: &[f64],
    arc: &[f64],
    [first, second, third]: [&Section; 3],
    estimates: &mut [Option<LocalPeriod>],
) {
    let l1 = arc[second.index] - arc[first.index] + first.correction - second.correction;
    let l2 = arc[third.index] - arc[second.index] + second.correction - third.correction;
    if !(l1 > 0.0 && l2 > 0.0) {
        return;
    }

    let phase_next = |k: usize| (arc[k] - arc[second.index] + second.correction) / l2;

    let mut cursor = second.index;
    for j in first.index..second.index {
        let phase = (arc[j] - arc[first.index] + first.correction) / l1;

        while cursor <= third.index && phase_next(cursor) < phase {
            cursor += 1;
        }
        if cursor > third.index {
            break;
        }

        let (lo, hi) = (phase_next(cursor - 1), phase_next(cursor));
        let x_next = if hi > lo {
            x[cursor - 1] + (phase - lo) / (hi - lo) * (x[cursor] - x[cursor - 1])
        } else {
            x[cursor]
        };

        let midpoint = 0.5 * (x[j] + x_next);
        estimates[j] = Some(LocalPeriod {
            tau: x_next - x[j],
            energy: interpolate_from(x, energy, (j + cursor) / 2, midpoint),
        });
    }
}

/// Estimate the local period and energy at every sample of `radius(x)`.
///
/// Samples outside the oscillations that have two successors are `None`.
pub fn estimate_periods(
    x: &[f64],
    radius: &[f64],
    energy: &[f64],
    threshold: f64,
) -> Result<Vec<Option<LocalPeriod>>, PeriodError> {
    if radius.len() != x.len() {
        return Err(PeriodError::LengthMismatch(x.len(), radius.len()));
    }
    if energy.len() != x.len() {
        return Err(PeriodError::LengthMismatch(x.len(), energy.len()));
    }

    let sections = cut_sections(x, radius, threshold);
    if sections.is_empty() {
        return Err(PeriodError::NoOscillation);
    }
    if sections.len() < MIN_SECTIONS {
        return Err(PeriodError::TooFewSections {
            found: sections.len(),
            required: MIN_SECTIONS,
        });
    }

    let arc = arc_length(x, radius);
    let mut estimates = vec![None; x.len()];
    for triple in sections.windows(3) {
        match_oscillations(
            x,
            energy,
            &arc,
            [&triple[0], &triple[1], &triple[2]],
            &mut estimates,
        );
    }

    Ok(estimates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::sections::DEFAULT_PROMINENCE;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    fn orbit(period: f64, duration: f64, dt: f64) -> (Vec<f64>, Vec<f64>) {
        let n = (duration / dt).round() as usize;
        let x: Vec<f64> = (0..n).map(|i| i as f64 * dt).collect();
        let r = x.iter().map(|t| 2.0 + (2.0 * PI * t / period).cos()).collect();
        (x, r)
    }

    #[test]
    fn test_recovers_constant_period() {
        let period = 1.7;
        let (x, r) = orbit(period, 12.0, 0.01);
        let energy = vec![-1.0; x.len()];

        let estimates = estimate_periods(&x, &r, &energy, DEFAULT_PROMINENCE).unwrap();
        assert_eq!(estimates.len(), x.len());

        let defined: Vec<&LocalPeriod> = estimates.iter().flatten().collect();
        // Five resolved oscillations of 170 samples each
        assert!(defined.len() > 800, "{} defined samples", defined.len());
        for estimate in defined {
            assert!((estimate.tau - period).abs() < 1e-2, "tau = {}", estimate.tau);
            assert_relative_eq!(estimate.energy, -1.0);
        }

        // Nothing before the first turning point or in the last two oscillations
        assert!(estimates[0].is_none());
        assert!(estimates[x.len() - 1].is_none());
    }

    #[test]
    fn test_energy_at_time_midpoint() {
        let (x, r) = orbit(1.7, 12.0, 0.01);
        let energy: Vec<f64> = x.iter().map(|t| -1.0 + 0.01 * t).collect();

        let estimates = estimate_periods(&x, &r, &energy, DEFAULT_PROMINENCE).unwrap();
        for (j, estimate) in estimates.iter().enumerate() {
            if let Some(estimate) = estimate {
                let expected = -1.0 + 0.01 * (x[j] + estimate.tau / 2.0);
                assert_relative_eq!(estimate.energy, expected, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_too_few_sections() {
        let (x, r) = orbit(1.7, 6.0, 0.01);
        let energy = vec![-1.0; x.len()];

        let result = estimate_periods(&x, &r, &energy, DEFAULT_PROMINENCE);
        assert_eq!(
            result,
            Err(PeriodError::TooFewSections {
                found: 3,
                required: MIN_SECTIONS
            })
        );
    }

    #[test]
    fn test_no_oscillation() {
        let x: Vec<f64> = (0..100).map(|i| i as f64).collect();
        let r: Vec<f64> = x.iter().map(|t| 1.0 + t).collect();

        let result = estimate_periods(&x, &r, &r, DEFAULT_PROMINENCE);
        assert_eq!(result, Err(PeriodError::NoOscillation));
    }

    #[test]
    fn test_length_mismatch() {
        let result = estimate_periods(&[0.0, 1.0, 2.0], &[1.0, 2.0], &[0.0; 3], 0.01);
        assert_eq!(result, Err(PeriodError::LengthMismatch(3, 2)));
    }

    #[test]
    fn test_arc_length() {
        let arc = arc_length(&[0.0, 3.0, 3.0], &[0.0, 4.0, 5.0]);
        assert_eq!(arc, vec![0.0, 5.0, 6.0]);
    }
}
