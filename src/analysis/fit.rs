//! Weighted linear least squares.

use crate::error::FitError;

/// Relative size below which the weighted determinant counts as zero.
const DEGENERATE_TOLERANCE: f64 = 1e-12;

/// Result of fitting `y = slope * x + intercept`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearFit {
    pub intercept: f64,
    pub slope: f64,
    /// Standard error of the intercept.
    pub intercept_err: f64,
    /// Standard error of the slope.
    pub slope_err: f64,
}

impl LinearFit {
    pub fn eval(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }

    /// Mean squared residual of the fit over `(x, y)`.
    pub fn mean_squared_residual(&self, x: &[f64], y: &[f64]) -> f64 {
        if x.is_empty() {
            return 0.0;
        }
        let sum: f64 = x
            .iter()
            .zip(y)
            .map(|(&xi, &yi)| (yi - self.eval(xi)).powi(2))
            .sum();
        sum / x.len() as f64
    }
}

/// Fit `y = s x + c` with weights `1 / dy^2`.
pub fn weighted_lin_fit(x: &[f64], y: &[f64], dy: &[f64]) -> Result<LinearFit, FitError> {
    if x.is_empty() {
        return Err(FitError::Empty);
    }
    if x.len() != y.len() || x.len() != dy.len() {
        return Err(FitError::LengthMismatch {
            x: x.len(),
            y: y.len(),
            dy: dy.len(),
        });
    }
    if let Some((index, &value)) = dy
        .iter()
        .enumerate()
        .find(|(_, v)| !(v.is_finite() && **v > 0.0))
    {
        return Err(FitError::InvalidUncertainty { index, value });
    }

    let (mut sw, mut swx, mut swy, mut swxx, mut swxy) = (0.0, 0.0, 0.0, 0.0, 0.0);
    for ((&xi, &yi), &di) in x.iter().zip(y).zip(dy) {
        let w = 1.0 / (di * di);
        sw += w;
        swx += w * xi;
        swy += w * yi;
        swxx += w * xi * xi;
        swxy += w * xi * yi;
    }

    let delta = sw * swxx - swx * swx;
    if delta.abs() <= DEGENERATE_TOLERANCE * sw * swxx {
        return Err(FitError::Degenerate { delta });
    }

    Ok(LinearFit {
        intercept: (swxx * swy - swx * swxy) / delta,
        slope: (sw * swxy - swx * swy) / delta,
        intercept_err: (swxx / delta).sqrt(),
        slope_err: (sw / delta).sqrt(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_exact_line() {
        let x: Vec<f64> = (0..10).map(|i| i as f64 * 0.5).collect();
        let y: Vec<f64> = x.iter().map(|x| 3.0 * x + 2.0).collect();
        let dy = vec![0.1; x.len()];

        let fit = weighted_lin_fit(&x, &y, &dy).unwrap();
        assert_relative_eq!(fit.slope, 3.0, epsilon = 1e-10);
        assert_relative_eq!(fit.intercept, 2.0, epsilon = 1e-10);
        assert!(fit.mean_squared_residual(&x, &y) < 1e-20);
    }

    #[test]
    fn test_errors_scale_with_uncertainty() {
        let x: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let y: Vec<f64> = x.iter().map(|x| 3.0 * x + 2.0).collect();

        let loose = weighted_lin_fit(&x, &y, &vec![1.0; 10]).unwrap();
        let tight = weighted_lin_fit(&x, &y, &vec![1e-3; 10]).unwrap();

        assert_relative_eq!(tight.slope_err, loose.slope_err * 1e-3, max_relative = 1e-9);
        assert_relative_eq!(tight.intercept_err, loose.intercept_err * 1e-3, max_relative = 1e-9);
        assert!(tight.slope_err < 1e-3);
    }

    #[test]
    fn test_weights_pull_the_fit() {
        let x = [0.0, 1.0, 2.0];
        let y = [0.0, 1.0, 5.0];

        let even = weighted_lin_fit(&x, &y, &[1.0, 1.0, 1.0]).unwrap();
        let trusted_end = weighted_lin_fit(&x, &y, &[1.0, 1.0, 1e-3]).unwrap();
        assert!((trusted_end.eval(2.0) - 5.0).abs() < (even.eval(2.0) - 5.0).abs());
    }

    #[test]
    fn test_degenerate_inputs() {
        let result = weighted_lin_fit(&[2.0, 2.0, 2.0], &[1.0, 2.0, 3.0], &[0.1; 3]);
        assert!(matches!(result, Err(FitError::Degenerate { .. })));

        let result = weighted_lin_fit(&[1.0], &[1.0], &[1.0]);
        assert!(matches!(result, Err(FitError::Degenerate { .. })));
    }

    #[test]
    fn test_invalid_inputs() {
        assert_eq!(weighted_lin_fit(&[], &[], &[]), Err(FitError::Empty));
        assert_eq!(
            weighted_lin_fit(&[1.0, 2.0], &[1.0], &[1.0, 1.0]),
            Err(FitError::LengthMismatch { x: 2, y: 1, dy: 2 })
        );
        assert_eq!(
            weighted_lin_fit(&[1.0, 2.0], &[1.0, 2.0], &[1.0, 0.0]),
            Err(FitError::InvalidUncertainty {
                index: 1,
                value: 0.0
            })
        );
    }
}
