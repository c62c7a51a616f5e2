//! Random initial conditions for the simulator.
//!
//! Each particle gets six independent draws (x, y, z, vx, vy, vz) from the
//! chosen distribution. The output is a headerless `;`-separated text file
//! with one particle per row.

use crate::error::InitError;
use rand::Rng;
use rand_distr::{Distribution, Normal, Uniform};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

/// Phase-space coordinates of one particle.
pub type PhasePoint = [f64; 6];

/// Distribution family of the initial conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitModel {
    /// Centred normal distribution; the parameter is the standard deviation.
    Gaussian,
    /// Uniform in `[-param, param]`.
    Uniform,
}

impl InitModel {
    pub const ALL: [InitModel; 2] = [InitModel::Gaussian, InitModel::Uniform];

    pub fn name(&self) -> &'static str {
        match self {
            InitModel::Gaussian => "gaussian",
            InitModel::Uniform => "uniform",
        }
    }

    /// Message shown when the model parameter is missing.
    pub fn missing_parameter_message(&self) -> &'static str {
        match self {
            InitModel::Gaussian => "Requiert une taille sigma pour la gaussienne en 4e argument",
            InitModel::Uniform => {
                "Requiert une demi-largeur pour la distribution uniforme en 4e argument"
            }
        }
    }
}

impl fmt::Display for InitModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for InitModel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        InitModel::ALL
            .into_iter()
            .find(|model| model.name() == s)
            .ok_or_else(|| {
                let names: Vec<&str> = InitModel::ALL.iter().map(|m| m.name()).collect();
                format!("Le 3e argument doit être dans {:?}", names)
            })
    }
}

enum Sampler {
    Normal(Normal<f64>),
    Uniform(Uniform<f64>),
}

impl Sampler {
    fn new(model: InitModel, param: f64) -> Result<Self, InitError> {
        let invalid = || InitError::InvalidParameter {
            model: model.name(),
            value: param,
        };
        if !(param.is_finite() && param > 0.0) {
            return Err(invalid());
        }

        match model {
            InitModel::Gaussian => Normal::new(0.0, param)
                .map(Sampler::Normal)
                .map_err(|_| invalid()),
            InitModel::Uniform => Ok(Sampler::Uniform(Uniform::new_inclusive(-param, param))),
        }
    }

    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        match self {
            Sampler::Normal(normal) => normal.sample(rng),
            Sampler::Uniform(uniform) => uniform.sample(rng),
        }
    }
}

/// Draw `count` phase-space points from `model`.
pub fn generate<R: Rng + ?Sized>(
    model: InitModel,
    count: usize,
    param: f64,
    rng: &mut R,
) -> Result<Vec<PhasePoint>, InitError> {
    let sampler = Sampler::new(model, param)?;
    debug!("Drawing {} particles from {} ({})", count, model, param);

    Ok((0..count)
        .map(|_| {
            let mut point = [0.0; 6];
            for value in point.iter_mut() {
                *value = sampler.sample(rng);
            }
            point
        })
        .collect())
}

/// Scientific notation with 18 fractional digits and a signed two-digit
/// exponent, e.g. `1.500000000000000000e-01`.
pub fn format_scientific(value: f64) -> String {
    let formatted = format!("{:.18e}", value);
    match formatted.split_once('e') {
        Some((mantissa, exponent)) => match exponent.parse::<i32>() {
            Ok(exponent) => format!(
                "{}e{}{:02}",
                mantissa,
                if exponent < 0 { '-' } else { '+' },
                exponent.abs()
            ),
            Err(_) => formatted,
        },
        None => formatted,
    }
}

/// Write phase-space points as `;`-separated rows.
pub fn write_initial_conditions(path: &Path, points: &[PhasePoint]) -> Result<(), InitError> {
    let csv_error = |source| InitError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut writer = csv::WriterBuilder::new()
        .delimiter(b';')
        .has_headers(false)
        .from_path(path)
        .map_err(csv_error)?;

    for point in points {
        writer
            .write_record(point.iter().map(|v| format_scientific(*v)))
            .map_err(csv_error)?;
    }
    writer.flush().map_err(|e| csv_error(e.into()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use tempfile::TempDir;

    #[test]
    fn test_model_from_str() {
        assert_eq!("gaussian".parse::<InitModel>(), Ok(InitModel::Gaussian));
        assert_eq!("uniform".parse::<InitModel>(), Ok(InitModel::Uniform));

        let err = "plummer".parse::<InitModel>().unwrap_err();
        assert!(err.contains("gaussian"));
        assert!(err.starts_with("Le 3e argument"));
    }

    #[test]
    fn test_uniform_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        let points = generate(InitModel::Uniform, 500, 2.5, &mut rng).unwrap();
        assert_eq!(points.len(), 500);
        assert!(points.iter().flatten().all(|v| (-2.5..=2.5).contains(v)));
    }

    #[test]
    fn test_gaussian_spread() {
        let mut rng = StdRng::seed_from_u64(42);
        let points = generate(InitModel::Gaussian, 5000, 3.0, &mut rng).unwrap();

        let values: Vec<f64> = points.iter().flatten().copied().collect();
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let std = (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt();
        assert!(mean.abs() < 0.1, "mean = {}", mean);
        assert!((std - 3.0).abs() < 0.1, "std = {}", std);
    }

    #[test]
    fn test_seed_is_reproducible() {
        let a = generate(InitModel::Gaussian, 10, 1.0, &mut StdRng::seed_from_u64(1)).unwrap();
        let b = generate(InitModel::Gaussian, 10, 1.0, &mut StdRng::seed_from_u64(1)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_invalid_parameter() {
        let mut rng = StdRng::seed_from_u64(0);
        for param in [0.0, -1.0, f64::NAN] {
            assert!(matches!(
                generate(InitModel::Uniform, 1, param, &mut rng),
                Err(InitError::InvalidParameter { model: "uniform", .. })
            ));
        }
    }

    #[test]
    fn test_format_scientific() {
        assert_eq!(format_scientific(0.125), "1.250000000000000000e-01");
        assert_eq!(format_scientific(-1234.5), "-1.234500000000000000e+03");
        assert_eq!(format_scientific(0.0), "0.000000000000000000e+00");
    }

    #[test]
    fn test_write_initial_conditions() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("init.csv");
        let points = vec![[1.0, 2.0, 3.0, -1.0, -2.0, -3.0], [0.5; 6]];

        write_initial_conditions(&path, &points).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].split(';').count(), 6);
        assert!(lines[0].starts_with("1.000000000000000000e+00;2.0"));
        assert!(lines[1].ends_with("5.000000000000000000e-01"));
    }
}
