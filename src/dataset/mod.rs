//! Aggregated simulation dataset.
//!
//! The [`Dataset`] is the union of all snapshots of a run: one row per
//! timestep, in time order. [`DatasetBuilder`] enforces that particle and
//! bin counts never change across the run.

mod container;
pub mod mat;

pub use container::{read_dataset, write_dataset, DatasetRecord};

use crate::error::DatasetError;
use crate::models::Snapshot;
use crate::scanner::SnapshotReader;
use indicatif::{ProgressBar, ProgressStyle};
use ndarray::{Array1, Array2, Array3, ArrayView2, Axis};
use tracing::{debug, info};

/// All snapshots of a run, stacked along the time axis.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    /// Time, `Nt`.
    pub t: Array1<f64>,
    /// Iteration counter, `Nt`.
    pub c: Option<Array1<f64>>,
    /// `Nt x Np x 3`.
    pub positions: Array3<f64>,
    /// `Nt x Np x 3`.
    pub speeds: Option<Array3<f64>>,
    /// Kinetic and potential energy per particle, `Nt x Np x 2`.
    pub energy: Option<Array3<f64>>,
    /// `Nt x Nbins`.
    pub radii: Array2<f64>,
    /// `Nt x Nbins`.
    pub density: Array2<f64>,
    /// R10, R50, R90, `Nt x 3`.
    pub rayons: Array2<f64>,
    /// Row-major inertia matrices, `Nt x 9`.
    pub inertia_matrix: Array2<f64>,
    pub total_energy: Array1<f64>,
    pub virial: Array1<f64>,
    pub dynamical_time: Array1<f64>,
    /// Softening length, `Nt`.
    pub epsilon: Option<Array1<f64>>,
}

impl Dataset {
    /// Number of timesteps.
    pub fn timestep_count(&self) -> usize {
        self.t.len()
    }

    /// Number of particles.
    pub fn particle_count(&self) -> usize {
        self.positions.len_of(Axis(1))
    }

    /// Number of density-profile bins.
    pub fn bin_count(&self) -> usize {
        self.radii.len_of(Axis(1))
    }

    /// Positions of one particle over time, `Nt x 3`.
    pub fn particle_positions(&self, particle: usize) -> ArrayView2<'_, f64> {
        self.positions.index_axis(Axis(1), particle)
    }

    /// Distance to the centre of one particle over time.
    pub fn particle_radius(&self, particle: usize) -> Array1<f64> {
        self.particle_positions(particle)
            .outer_iter()
            .map(|r| r.dot(&r).sqrt())
            .collect()
    }

    /// Total (kinetic + potential) energy of one particle over time.
    pub fn particle_energy(&self, particle: usize) -> Option<Array1<f64>> {
        self.energy
            .as_ref()
            .map(|energy| energy.index_axis(Axis(1), particle).sum_axis(Axis(1)))
    }

    /// Check that every array agrees with `Nt`, `Np` and `Nbins`.
    pub fn validate(&self) -> Result<(), DatasetError> {
        let nt = self.timestep_count();
        let np = self.particle_count();
        let nbins = self.bin_count();

        let check = |field: &'static str, expected: usize, found: usize| {
            if expected == found {
                Ok(())
            } else {
                Err(DatasetError::ShapeMismatch {
                    field,
                    expected,
                    found,
                })
            }
        };

        check("positions", nt, self.positions.len_of(Axis(0)))?;
        check("positions", 3, self.positions.len_of(Axis(2)))?;
        if let Some(speeds) = &self.speeds {
            check("speeds", nt, speeds.len_of(Axis(0)))?;
            check("speeds", np, speeds.len_of(Axis(1)))?;
            check("speeds", 3, speeds.len_of(Axis(2)))?;
        }
        if let Some(energy) = &self.energy {
            check("energy", nt, energy.len_of(Axis(0)))?;
            check("energy", np, energy.len_of(Axis(1)))?;
            check("energy", 2, energy.len_of(Axis(2)))?;
        }
        check("radii", nt, self.radii.nrows())?;
        check("density", nt, self.density.nrows())?;
        check("density", nbins, self.density.ncols())?;
        check("rayons", nt, self.rayons.nrows())?;
        check("rayons", 3, self.rayons.ncols())?;
        check("inertia_matrix", nt, self.inertia_matrix.nrows())?;
        check("inertia_matrix", 9, self.inertia_matrix.ncols())?;
        check("total_energy", nt, self.total_energy.len())?;
        check("virial", nt, self.virial.len())?;
        check("dynamical_time", nt, self.dynamical_time.len())?;
        for (field, series) in [("c", &self.c), ("espilon", &self.epsilon)] {
            if let Some(series) = series {
                check(field, nt, series.len())?;
            }
        }

        Ok(())
    }
}

/// Accumulates snapshots into a [`Dataset`].
#[derive(Debug, Default)]
pub struct DatasetBuilder {
    t: Vec<f64>,
    c: Vec<Option<f64>>,
    positions: Vec<f64>,
    speeds: Vec<Option<Vec<[f64; 3]>>>,
    energy: Vec<f64>,
    has_particle_energy: Option<bool>,
    radii: Vec<f64>,
    density: Vec<f64>,
    rayons: Vec<f64>,
    inertia_matrix: Vec<f64>,
    total_energy: Vec<f64>,
    virial: Vec<f64>,
    dynamical_time: Vec<f64>,
    epsilon: Vec<Option<f64>>,
    particles: usize,
    bins: usize,
}

impl DatasetBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of snapshots pushed so far.
    pub fn len(&self) -> usize {
        self.t.len()
    }

    pub fn is_empty(&self) -> bool {
        self.t.is_empty()
    }

    /// Append the next snapshot, rejecting shape changes.
    pub fn push(&mut self, snapshot: Snapshot) -> Result<(), DatasetError> {
        let index = self.len();

        if index == 0 {
            self.particles = snapshot.particle_count();
            self.bins = snapshot.radii.len();
            self.has_particle_energy = Some(snapshot.particle_energies().is_some());
        }

        let shape_error = |field: &'static str, expected: usize, found: usize| {
            DatasetError::InconsistentShape {
                index,
                field,
                expected,
                found,
            }
        };

        if snapshot.positions.len() != self.particles {
            return Err(shape_error("positions", self.particles, snapshot.positions.len()));
        }
        if let Some(speeds) = &snapshot.speeds {
            if speeds.len() != self.particles {
                return Err(shape_error("speeds", self.particles, speeds.len()));
            }
        }
        if snapshot.radii.len() != self.bins {
            return Err(shape_error("radii", self.bins, snapshot.radii.len()));
        }
        if snapshot.density.len() != self.bins {
            return Err(shape_error("density", self.bins, snapshot.density.len()));
        }

        let system_energy = snapshot.system_energy();
        match (snapshot.particle_energies(), self.has_particle_energy) {
            (Some(values), Some(true)) => {
                if values.len() != self.particles {
                    return Err(shape_error("energy", self.particles, values.len()));
                }
                self.energy.extend(values.iter().flatten());
            }
            (None, Some(false)) => {}
            _ => return Err(DatasetError::MixedEnergyLayout { index }),
        }

        self.t.push(snapshot.t);
        self.c.push(snapshot.c);
        self.positions.extend(snapshot.positions.iter().flatten());
        self.speeds.push(snapshot.speeds);
        self.radii.extend(&snapshot.radii);
        self.density.extend(&snapshot.density);
        self.rayons.extend(snapshot.rayons);
        self.inertia_matrix.extend(snapshot.inertia_matrix);
        self.total_energy.push(system_energy);
        self.virial.push(snapshot.virial);
        self.dynamical_time.push(snapshot.dynamical_time);
        self.epsilon.push(snapshot.epsilon);

        Ok(())
    }

    /// Stack the accumulated snapshots.
    ///
    /// Optional series (`c`, `speeds`, `espilon`) are kept only when every
    /// snapshot carries them.
    pub fn build(self) -> Result<Dataset, DatasetError> {
        let nt = self.len();
        let np = self.particles;
        let nbins = self.bins;

        let shape = DatasetError::Shape;

        let speeds = if nt > 0 && self.speeds.iter().all(Option::is_some) {
            let flat: Vec<f64> = self
                .speeds
                .into_iter()
                .flatten()
                .flat_map(|v| v.into_iter().flatten())
                .collect();
            Some(Array3::from_shape_vec((nt, np, 3), flat).map_err(shape)?)
        } else {
            None
        };

        let energy = if self.has_particle_energy == Some(true) {
            Some(Array3::from_shape_vec((nt, np, 2), self.energy).map_err(shape)?)
        } else {
            None
        };

        let dataset = Dataset {
            t: Array1::from(self.t),
            c: collect_complete(self.c),
            positions: Array3::from_shape_vec((nt, np, 3), self.positions).map_err(shape)?,
            speeds,
            energy,
            radii: Array2::from_shape_vec((nt, nbins), self.radii).map_err(shape)?,
            density: Array2::from_shape_vec((nt, nbins), self.density).map_err(shape)?,
            rayons: Array2::from_shape_vec((nt, 3), self.rayons).map_err(shape)?,
            inertia_matrix: Array2::from_shape_vec((nt, 9), self.inertia_matrix)
                .map_err(shape)?,
            total_energy: Array1::from(self.total_energy),
            virial: Array1::from(self.virial),
            dynamical_time: Array1::from(self.dynamical_time),
            epsilon: collect_complete(self.epsilon),
        };

        Ok(dataset)
    }
}

fn collect_complete(values: Vec<Option<f64>>) -> Option<Array1<f64>> {
    if values.is_empty() {
        return None;
    }
    values
        .into_iter()
        .collect::<Option<Vec<f64>>>()
        .map(Array1::from)
}

/// Read every snapshot of `reader` into one dataset.
pub fn aggregate(reader: &dyn SnapshotReader, show_progress: bool) -> Result<Dataset, DatasetError> {
    let count = reader.snapshot_count();
    info!("Reading {} {} snapshots", count, reader.format());

    let progress_bar = if show_progress {
        let pb = ProgressBar::new(count as u64);
        if let Ok(style) =
            ProgressStyle::default_bar().template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
        {
            pb.set_style(style.progress_chars("#>-"));
        }
        Some(pb)
    } else {
        None
    };

    let mut builder = DatasetBuilder::new();
    for index in 0..count {
        let snapshot = reader.read_snapshot(index)?;
        builder.push(snapshot)?;
        if let Some(ref pb) = progress_bar {
            pb.inc(1);
        }
    }

    if let Some(pb) = progress_bar {
        pb.finish_and_clear();
    }

    let dataset = builder.build()?;
    debug!(
        "Aggregated {} timesteps, {} particles, {} bins",
        dataset.timestep_count(),
        dataset.particle_count(),
        dataset.bin_count()
    );
    Ok(dataset)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::tests::make_snapshot;
    use crate::models::{SnapshotEnergy, SnapshotFormat};

    pub(crate) fn make_dataset(nt: usize, np: usize, bins: usize) -> Dataset {
        let mut builder = DatasetBuilder::new();
        for i in 0..nt {
            builder.push(make_snapshot(i as f64 * 0.1, np, bins)).unwrap();
        }
        builder.build().unwrap()
    }

    struct MemoryReader(Vec<Snapshot>);

    impl SnapshotReader for MemoryReader {
        fn format(&self) -> SnapshotFormat {
            SnapshotFormat::Cbor
        }

        fn snapshot_count(&self) -> usize {
            self.0.len()
        }

        fn read_snapshot(&self, index: usize) -> Result<Snapshot, DatasetError> {
            Ok(self.0[index].clone())
        }
    }

    #[test]
    fn test_builder_shapes() {
        let dataset = make_dataset(4, 3, 5);
        assert_eq!(dataset.timestep_count(), 4);
        assert_eq!(dataset.particle_count(), 3);
        assert_eq!(dataset.bin_count(), 5);
        approx::assert_relative_eq!(dataset.positions[[2, 1, 0]], 1.2, epsilon = 1e-12);
        assert_eq!(dataset.energy.as_ref().unwrap()[[3, 2, 1]], -1.5);
        assert!(dataset.speeds.is_some());
        assert!(dataset.validate().is_ok());
    }

    #[test]
    fn test_validate_reports_whole_dataset_mismatch() {
        let mut dataset = make_dataset(4, 3, 5);
        dataset.virial = Array1::zeros(3);

        let err = dataset.validate().unwrap_err();
        assert!(matches!(
            err,
            DatasetError::ShapeMismatch {
                field: "virial",
                expected: 4,
                found: 3
            }
        ));
        assert!(!err.to_string().contains("Snapshot"));
    }

    #[test]
    fn test_reshape_failure_is_a_shape_error() {
        let err = Array2::<f64>::from_shape_vec((2, 2), vec![0.0; 3]).unwrap_err();
        let err = DatasetError::from(err);
        assert!(matches!(err, DatasetError::Shape(_)));
        assert!(err.to_string().starts_with("Array shape error"));
    }

    #[test]
    fn test_particle_count_change_rejected() {
        let mut builder = DatasetBuilder::new();
        builder.push(make_snapshot(0.0, 3, 2)).unwrap();
        let err = builder.push(make_snapshot(0.1, 4, 2)).unwrap_err();

        assert!(matches!(
            err,
            DatasetError::InconsistentShape {
                index: 1,
                field: "positions",
                expected: 3,
                found: 4
            }
        ));
    }

    #[test]
    fn test_bin_count_change_rejected() {
        let mut builder = DatasetBuilder::new();
        builder.push(make_snapshot(0.0, 2, 2)).unwrap();
        let err = builder.push(make_snapshot(0.1, 2, 3)).unwrap_err();
        assert!(matches!(err, DatasetError::InconsistentShape { field: "radii", .. }));
    }

    #[test]
    fn test_mixed_energy_layout_rejected() {
        let mut builder = DatasetBuilder::new();
        builder.push(make_snapshot(0.0, 2, 2)).unwrap();

        let legacy = Snapshot {
            energy: SnapshotEnergy::Combined(-1.0),
            total_energy: None,
            ..make_snapshot(0.1, 2, 2)
        };
        let err = builder.push(legacy).unwrap_err();
        assert!(matches!(err, DatasetError::MixedEnergyLayout { index: 1 }));
    }

    #[test]
    fn test_combined_energy_fills_total() {
        let mut builder = DatasetBuilder::new();
        for i in 0..2 {
            builder
                .push(Snapshot {
                    energy: SnapshotEnergy::Combined(-2.0 - i as f64),
                    total_energy: None,
                    speeds: None,
                    ..make_snapshot(i as f64, 2, 1)
                })
                .unwrap();
        }
        let dataset = builder.build().unwrap();
        assert!(dataset.energy.is_none());
        assert!(dataset.speeds.is_none());
        assert_eq!(dataset.total_energy.to_vec(), vec![-2.0, -3.0]);
    }

    #[test]
    fn test_particle_series() {
        let dataset = make_dataset(3, 2, 1);
        let radius = dataset.particle_radius(1);
        for (got, expected) in radius.iter().zip([1.0, 1.1, 1.2]) {
            approx::assert_relative_eq!(*got, expected, epsilon = 1e-12);
        }
        let energy = dataset.particle_energy(0).unwrap();
        assert_eq!(energy.to_vec(), vec![-1.0; 3]);
    }

    #[test]
    fn test_aggregate_reads_in_order() {
        let reader = MemoryReader((0..5).map(|i| make_snapshot(i as f64, 2, 3)).collect());
        let dataset = aggregate(&reader, false).unwrap();
        assert_eq!(dataset.t.to_vec(), vec![0.0, 1.0, 2.0, 3.0, 4.0]);
    }
}
