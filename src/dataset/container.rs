//! Dataset containers: pickle and MAT files.
//!
//! Both formats hold the same mapping from array names to arrays. Names
//! follow the simulator, so the files stay readable by the existing
//! MATLAB/Python tooling.

use super::mat::{read_mat, write_mat, MatArray};
use super::Dataset;
use crate::error::DatasetError;
use ndarray::{Array1, Array2, Array3};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use tracing::debug;

/// Serializable form of a [`Dataset`], as nested lists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetRecord {
    pub t: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub c: Option<Vec<f64>>,
    pub positions: Vec<Vec<[f64; 3]>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speeds: Option<Vec<Vec<[f64; 3]>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub energy: Option<Vec<Vec<[f64; 2]>>>,
    pub radii: Vec<Vec<f64>>,
    pub density: Vec<Vec<f64>>,
    pub rayons: Vec<[f64; 3]>,
    pub inertia_matrix: Vec<[f64; 9]>,
    pub total_energy: Vec<f64>,
    pub virial: Vec<f64>,
    pub dynamical_time: Vec<f64>,
    #[serde(rename = "espilon", default, skip_serializing_if = "Option::is_none")]
    pub epsilon: Option<Vec<f64>>,
}

fn lanes<const N: usize>(array: &Array3<f64>) -> Vec<Vec<[f64; N]>> {
    array
        .outer_iter()
        .map(|step| {
            step.outer_iter()
                .map(|lane| {
                    let mut values = [0.0; N];
                    for (dst, src) in values.iter_mut().zip(lane.iter()) {
                        *dst = *src;
                    }
                    values
                })
                .collect()
        })
        .collect()
}

fn fixed_rows<const N: usize>(array: &Array2<f64>) -> Vec<[f64; N]> {
    array
        .outer_iter()
        .map(|row| {
            let mut values = [0.0; N];
            for (dst, src) in values.iter_mut().zip(row.iter()) {
                *dst = *src;
            }
            values
        })
        .collect()
}

fn stack_lanes<const N: usize>(
    rows: Vec<Vec<[f64; N]>>,
    field: &'static str,
) -> Result<Array3<f64>, DatasetError> {
    let nt = rows.len();
    let np = rows.first().map_or(0, Vec::len);

    let mut flat = Vec::with_capacity(nt * np * N);
    for (index, row) in rows.into_iter().enumerate() {
        if row.len() != np {
            return Err(DatasetError::InconsistentShape {
                index,
                field,
                expected: np,
                found: row.len(),
            });
        }
        flat.extend(row.into_iter().flatten());
    }

    Array3::from_shape_vec((nt, np, N), flat).map_err(DatasetError::Shape)
}

fn stack_rows(rows: Vec<Vec<f64>>, field: &'static str) -> Result<Array2<f64>, DatasetError> {
    let nt = rows.len();
    let width = rows.first().map_or(0, Vec::len);

    let mut flat = Vec::with_capacity(nt * width);
    for (index, row) in rows.into_iter().enumerate() {
        if row.len() != width {
            return Err(DatasetError::InconsistentShape {
                index,
                field,
                expected: width,
                found: row.len(),
            });
        }
        flat.extend(row);
    }

    Array2::from_shape_vec((nt, width), flat).map_err(DatasetError::Shape)
}

fn stack_fixed<const N: usize>(rows: Vec<[f64; N]>) -> Result<Array2<f64>, DatasetError> {
    let nt = rows.len();
    let flat: Vec<f64> = rows.into_iter().flatten().collect();
    Array2::from_shape_vec((nt, N), flat).map_err(DatasetError::Shape)
}

impl From<&Dataset> for DatasetRecord {
    fn from(dataset: &Dataset) -> Self {
        Self {
            t: dataset.t.to_vec(),
            c: dataset.c.as_ref().map(Array1::to_vec),
            positions: lanes(&dataset.positions),
            speeds: dataset.speeds.as_ref().map(lanes),
            energy: dataset.energy.as_ref().map(lanes),
            radii: dataset.radii.outer_iter().map(|r| r.to_vec()).collect(),
            density: dataset.density.outer_iter().map(|r| r.to_vec()).collect(),
            rayons: fixed_rows(&dataset.rayons),
            inertia_matrix: fixed_rows(&dataset.inertia_matrix),
            total_energy: dataset.total_energy.to_vec(),
            virial: dataset.virial.to_vec(),
            dynamical_time: dataset.dynamical_time.to_vec(),
            epsilon: dataset.epsilon.as_ref().map(Array1::to_vec),
        }
    }
}

impl TryFrom<DatasetRecord> for Dataset {
    type Error = DatasetError;

    fn try_from(record: DatasetRecord) -> Result<Self, Self::Error> {
        let mut radii = stack_rows(record.radii, "radii")?;
        let mut density = stack_rows(record.density, "density")?;
        let nt = record.t.len();

        // Empty profiles carry no row to infer the timestep count from.
        if radii.nrows() == 0 && nt > 0 {
            radii = Array2::zeros((nt, 0));
        }
        if density.nrows() == 0 && nt > 0 {
            density = Array2::zeros((nt, 0));
        }

        let dataset = Dataset {
            t: Array1::from(record.t),
            c: record.c.map(Array1::from),
            positions: stack_lanes(record.positions, "positions")?,
            speeds: record
                .speeds
                .map(|s| stack_lanes(s, "speeds"))
                .transpose()?,
            energy: record
                .energy
                .map(|e| stack_lanes(e, "energy"))
                .transpose()?,
            radii,
            density,
            rayons: stack_fixed(record.rayons)?,
            inertia_matrix: stack_fixed(record.inertia_matrix)?,
            total_energy: Array1::from(record.total_energy),
            virial: Array1::from(record.virial),
            dynamical_time: Array1::from(record.dynamical_time),
            epsilon: record.epsilon.map(Array1::from),
        };
        dataset.validate()?;
        Ok(dataset)
    }
}

fn mat_variables(dataset: &Dataset) -> Vec<(&'static str, MatArray)> {
    let mut variables = vec![("t", MatArray::from_array(&dataset.t))];
    if let Some(c) = &dataset.c {
        variables.push(("c", MatArray::from_array(c)));
    }
    variables.push(("positions", MatArray::from_array(&dataset.positions)));
    if let Some(speeds) = &dataset.speeds {
        variables.push(("speeds", MatArray::from_array(speeds)));
    }
    if let Some(energy) = &dataset.energy {
        variables.push(("energy", MatArray::from_array(energy)));
    }
    variables.extend([
        ("radii", MatArray::from_array(&dataset.radii)),
        ("density", MatArray::from_array(&dataset.density)),
        ("rayons", MatArray::from_array(&dataset.rayons)),
        ("inertia_matrix", MatArray::from_array(&dataset.inertia_matrix)),
        ("total_energy", MatArray::from_array(&dataset.total_energy)),
        ("virial", MatArray::from_array(&dataset.virial)),
        ("dynamical_time", MatArray::from_array(&dataset.dynamical_time)),
    ]);
    if let Some(epsilon) = &dataset.epsilon {
        variables.push(("espilon", MatArray::from_array(epsilon)));
    }
    variables
}

fn dataset_from_mat(variables: Vec<(String, MatArray)>) -> Result<Dataset, DatasetError> {
    let mut by_name: HashMap<String, MatArray> = variables.into_iter().collect();
    let mut take = |name: &'static str| by_name.remove(name);

    let required = |array: Option<MatArray>, name: &'static str| {
        array.ok_or(DatasetError::MissingField(name))
    };

    let t = required(take("t"), "t")?.into_array1()?;
    let c = take("c").map(MatArray::into_array1).transpose()?;
    let positions = required(take("positions"), "positions")?.into_array3()?;
    let speeds = take("speeds").map(MatArray::into_array3).transpose()?;
    let energy = take("energy").map(MatArray::into_array3).transpose()?;
    let radii = required(take("radii"), "radii")?.into_array2()?;
    let density = required(take("density"), "density")?.into_array2()?;
    let rayons = required(take("rayons"), "rayons")?.into_array2()?;
    let inertia_matrix = required(take("inertia_matrix"), "inertia_matrix")?.into_array2()?;
    let total_energy = required(take("total_energy"), "total_energy")?.into_array1()?;
    let virial = required(take("virial"), "virial")?.into_array1()?;
    let dynamical_time = required(take("dynamical_time"), "dynamical_time")?.into_array1()?;
    let epsilon = take("espilon").map(MatArray::into_array1).transpose()?;

    let dataset = Dataset {
        t,
        c,
        positions,
        speeds,
        energy,
        radii,
        density,
        rayons,
        inertia_matrix,
        total_energy,
        virial,
        dynamical_time,
        epsilon,
    };
    dataset.validate()?;
    Ok(dataset)
}

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase()
}

/// Write `dataset` to `path`, choosing the container from the extension
/// (`.pickle` or `.mat`).
pub fn write_dataset(path: &Path, dataset: &Dataset) -> Result<(), DatasetError> {
    let ext = extension(path);
    if ext != "pickle" && ext != "mat" {
        return Err(DatasetError::UnsupportedExtension(ext));
    }

    let file = File::create(path).map_err(|e| DatasetError::io(path, e))?;
    let mut writer = BufWriter::new(file);

    if ext == "pickle" {
        let record = DatasetRecord::from(dataset);
        serde_pickle::to_writer(&mut writer, &record, serde_pickle::SerOptions::new()).map_err(
            |source| DatasetError::Pickle {
                path: path.to_path_buf(),
                source,
            },
        )?;
    } else {
        write_mat(&mut writer, path, &mat_variables(dataset))?;
    }

    writer.flush().map_err(|e| DatasetError::io(path, e))?;
    debug!("Wrote dataset to {}", path.display());
    Ok(())
}

/// Read a dataset written by [`write_dataset`].
pub fn read_dataset(path: &Path) -> Result<Dataset, DatasetError> {
    let ext = extension(path);
    let file = File::open(path).map_err(|e| DatasetError::io(path, e))?;
    let mut reader = BufReader::new(file);

    let dataset = match ext.as_str() {
        "pickle" => {
            let record: DatasetRecord =
                serde_pickle::from_reader(reader, serde_pickle::DeOptions::new()).map_err(
                    |source| DatasetError::Pickle {
                        path: path.to_path_buf(),
                        source,
                    },
                )?;
            Dataset::try_from(record)?
        }
        "mat" => dataset_from_mat(read_mat(&mut reader)?)?,
        _ => return Err(DatasetError::UnsupportedExtension(ext)),
    };

    debug!(
        "Loaded {} timesteps x {} particles from {}",
        dataset.timestep_count(),
        dataset.particle_count(),
        path.display()
    );
    Ok(dataset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::tests::make_dataset;
    use tempfile::TempDir;

    #[test]
    fn test_pickle_roundtrip_is_exact() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("all_data.pickle");
        let dataset = make_dataset(5, 3, 4);

        write_dataset(&path, &dataset).unwrap();
        let loaded = read_dataset(&path).unwrap();
        assert_eq!(loaded, dataset);
    }

    #[test]
    fn test_mat_roundtrip_is_exact() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("all_data.mat");
        let mut dataset = make_dataset(4, 2, 3);
        dataset.positions[[1, 1, 2]] = std::f64::consts::PI;
        dataset.speeds = None;

        write_dataset(&path, &dataset).unwrap();
        let loaded = read_dataset(&path).unwrap();
        assert_eq!(loaded, dataset);
    }

    #[test]
    fn test_both_containers_agree() {
        let temp_dir = TempDir::new().unwrap();
        let dataset = make_dataset(3, 2, 0);
        let pickle = temp_dir.path().join("all_data.pickle");
        let mat = temp_dir.path().join("all_data.mat");

        write_dataset(&pickle, &dataset).unwrap();
        write_dataset(&mat, &dataset).unwrap();

        assert_eq!(read_dataset(&pickle).unwrap(), read_dataset(&mat).unwrap());
    }

    #[test]
    fn test_unknown_extension() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("all_data.h5");
        let result = write_dataset(&path, &make_dataset(1, 1, 1));
        assert!(matches!(result, Err(DatasetError::UnsupportedExtension(ext)) if ext == "h5"));
        assert!(!path.exists());
    }

    #[test]
    fn test_record_rejects_ragged_rows() {
        let mut record = DatasetRecord::from(&make_dataset(2, 2, 2));
        record.positions[1].pop();
        let result = Dataset::try_from(record);
        assert!(matches!(
            result,
            Err(DatasetError::InconsistentShape { index: 1, field: "positions", .. })
        ));
    }
}
