//! Reader for the legacy multi-file CSV layout.
//!
//! ```text
//! infos.csv            t; dynamical_time; total_energy; virial; R10; R50; R90
//! inertia_matrix.csv   9 values per row
//! positions/<k>.csv    x; y; z; Ek; Ep   (one row per particle)
//! densities/<t>.csv    radius; density   (one file per timestep, named by time)
//! ```

use super::{SnapshotReader, LEGACY_MARKER};
use crate::error::DatasetError;
use crate::models::{Snapshot, SnapshotEnergy, SnapshotFormat};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

const INFOS_COLUMNS: usize = 7;
const INERTIA_COLUMNS: usize = 9;

/// Reader for the legacy CSV layout. The small per-run tables are loaded at
/// open time; particle files are read on demand.
pub struct LegacyCsvReader {
    folder: PathBuf,
    infos: Vec<Vec<f64>>,
    inertia: Vec<Vec<f64>>,
    density_files: Vec<PathBuf>,
}

impl LegacyCsvReader {
    pub fn open(folder: &Path) -> Result<Self, DatasetError> {
        let infos = read_rows(&folder.join(LEGACY_MARKER), INFOS_COLUMNS)?;
        let inertia = read_rows(&folder.join("inertia_matrix.csv"), INERTIA_COLUMNS)?;

        if infos.is_empty() {
            return Err(DatasetError::NoSnapshots(folder.to_path_buf()));
        }
        if inertia.len() != infos.len() {
            return Err(DatasetError::LegacyLayout(format!(
                "{} rows in infos.csv but {} in inertia_matrix.csv",
                infos.len(),
                inertia.len()
            )));
        }

        let density_files = list_density_files(&folder.join("densities"))?;
        if !density_files.is_empty() && density_files.len() != infos.len() {
            return Err(DatasetError::LegacyLayout(format!(
                "{} rows in infos.csv but {} density files",
                infos.len(),
                density_files.len()
            )));
        }
        if density_files.is_empty() {
            warn!("No density profiles in {}", folder.display());
        }

        Ok(Self {
            folder: folder.to_path_buf(),
            infos,
            inertia,
            density_files,
        })
    }
}

impl SnapshotReader for LegacyCsvReader {
    fn format(&self) -> SnapshotFormat {
        SnapshotFormat::LegacyCsv
    }

    fn snapshot_count(&self) -> usize {
        self.infos.len()
    }

    fn read_snapshot(&self, index: usize) -> Result<Snapshot, DatasetError> {
        let info = self.infos.get(index).ok_or_else(|| {
            DatasetError::LegacyLayout(format!("no row {} in infos.csv", index))
        })?;

        let particle_path = self.folder.join("positions").join(format!("{}.csv", index));
        let rows = read_rows(&particle_path, 3)?;

        let positions: Vec<[f64; 3]> = rows.iter().map(|r| [r[0], r[1], r[2]]).collect();
        let energy = if rows.iter().all(|r| r.len() >= 5) && !rows.is_empty() {
            SnapshotEnergy::PerParticle(rows.iter().map(|r| [r[3], r[4]]).collect())
        } else {
            SnapshotEnergy::Combined(info[2])
        };

        let (radii, density) = match self.density_files.get(index) {
            Some(path) => {
                let profile = read_rows(path, 2)?;
                (
                    profile.iter().map(|r| r[0]).collect(),
                    profile.iter().map(|r| r[1]).collect(),
                )
            }
            None => (Vec::new(), Vec::new()),
        };

        let mut inertia_matrix = [0.0; 9];
        inertia_matrix.copy_from_slice(&self.inertia[index][..INERTIA_COLUMNS]);

        Ok(Snapshot {
            t: info[0],
            c: None,
            positions,
            speeds: None,
            energy,
            total_energy: Some(info[2]),
            radii,
            density,
            rayons: [info[4], info[5], info[6]],
            inertia_matrix,
            virial: info[3],
            dynamical_time: info[1],
            epsilon: None,
        })
    }
}

/// Read a headerless `;`-separated file of floats, requiring at least
/// `min_columns` values per row.
fn read_rows(path: &Path, min_columns: usize) -> Result<Vec<Vec<f64>>, DatasetError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .delimiter(b';')
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|source| DatasetError::Csv {
            path: path.to_path_buf(),
            source,
        })?;

    let mut rows = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record.map_err(|source| DatasetError::Csv {
            path: path.to_path_buf(),
            source,
        })?;

        let values = record
            .iter()
            .filter(|field| !field.is_empty())
            .map(|field| field.parse::<f64>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| DatasetError::InvalidRow {
                path: path.to_path_buf(),
                row,
                message: e.to_string(),
            })?;

        if values.len() < min_columns {
            return Err(DatasetError::InvalidRow {
                path: path.to_path_buf(),
                row,
                message: format!("{} columns, expected at least {}", values.len(), min_columns),
            });
        }
        rows.push(values);
    }

    Ok(rows)
}

/// Density files ordered by the time encoded in their name.
fn list_density_files(dir: &Path) -> Result<Vec<PathBuf>, DatasetError> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|e| {
            DatasetError::io(
                dir,
                e.into_io_error()
                    .unwrap_or_else(|| std::io::Error::other("directory walk failed")),
            )
        })?;
        let path = entry.path();
        if !entry.file_type().is_file() || path.extension().and_then(|e| e.to_str()) != Some("csv")
        {
            continue;
        }

        let time = path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| s.parse::<f64>().ok());
        match time {
            Some(time) => files.push((time, path.to_path_buf())),
            None => debug!("Skipping density file with non-numeric name: {}", path.display()),
        }
    }

    files.sort_by(|a, b| a.0.total_cmp(&b.0));
    Ok(files.into_iter().map(|(_, path)| path).collect())
}
