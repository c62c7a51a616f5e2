//! Readers for the self-describing per-timestep files (`data_<k>.cbor`,
//! `data_<k>.pickle`).

use super::{snapshot_path, SnapshotReader};
use crate::error::DatasetError;
use crate::models::{Snapshot, SnapshotFormat};
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use tracing::debug;

/// Reader over `data_0.<ext>`, `data_1.<ext>`, ... up to the first gap.
pub struct NativeReader {
    folder: PathBuf,
    format: SnapshotFormat,
    extension: &'static str,
    count: usize,
}

impl NativeReader {
    /// Count the snapshot files of `format` in `folder`.
    pub fn open(folder: PathBuf, format: SnapshotFormat) -> Result<Self, DatasetError> {
        let extension = format
            .extension()
            .ok_or_else(|| DatasetError::NoSnapshots(folder.clone()))?;

        let mut count = 0;
        while snapshot_path(&folder, count, extension).is_file() {
            count += 1;
        }

        if count == 0 {
            return Err(DatasetError::NoSnapshots(folder));
        }

        debug!("{} data_*.{} files in {}", count, extension, folder.display());

        Ok(Self {
            folder,
            format,
            extension,
            count,
        })
    }
}

impl SnapshotReader for NativeReader {
    fn format(&self) -> SnapshotFormat {
        self.format
    }

    fn snapshot_count(&self) -> usize {
        self.count
    }

    fn read_snapshot(&self, index: usize) -> Result<Snapshot, DatasetError> {
        let path = snapshot_path(&self.folder, index, self.extension);
        let file = File::open(&path).map_err(|e| DatasetError::io(&path, e))?;
        let reader = BufReader::new(file);

        match self.format {
            SnapshotFormat::Cbor => serde_cbor::from_reader(reader)
                .map_err(|source| DatasetError::Cbor { path, source }),
            SnapshotFormat::Pickle => {
                serde_pickle::from_reader(reader, serde_pickle::DeOptions::new())
                    .map_err(|source| DatasetError::Pickle { path, source })
            }
            SnapshotFormat::LegacyCsv => Err(DatasetError::NoSnapshots(self.folder.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tests::make_snapshot;
    use crate::models::SnapshotEnergy;
    use tempfile::TempDir;

    fn write_cbor(dir: &std::path::Path, index: usize, snapshot: &Snapshot) {
        let file = File::create(snapshot_path(dir, index, "cbor")).unwrap();
        serde_cbor::to_writer(file, snapshot).unwrap();
    }

    #[test]
    fn test_cbor_reader_counts_until_gap() {
        let temp_dir = TempDir::new().unwrap();
        for i in 0..3 {
            write_cbor(temp_dir.path(), i, &make_snapshot(i as f64, 2, 4));
        }
        // data_4 is unreachable because data_3 is missing
        write_cbor(temp_dir.path(), 4, &make_snapshot(4.0, 2, 4));

        let reader = NativeReader::open(temp_dir.path().to_path_buf(), SnapshotFormat::Cbor).unwrap();
        assert_eq!(reader.snapshot_count(), 3);
        assert_eq!(reader.read_snapshot(1).unwrap(), make_snapshot(1.0, 2, 4));
    }

    #[test]
    fn test_pickle_reader_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let snapshot = make_snapshot(0.25, 3, 2);
        let bytes = serde_pickle::to_vec(&snapshot, serde_pickle::SerOptions::new()).unwrap();
        std::fs::write(snapshot_path(temp_dir.path(), 0, "pickle"), bytes).unwrap();

        let reader =
            NativeReader::open(temp_dir.path().to_path_buf(), SnapshotFormat::Pickle).unwrap();
        assert_eq!(reader.read_snapshot(0).unwrap(), snapshot);
    }

    #[test]
    fn test_simulator_layout_with_integer_counter() {
        // Older simulator output: integer iteration counter, combined energy,
        // no density profile.
        #[derive(serde::Serialize)]
        struct SimulatorData {
            t: f64,
            c: usize,
            positions: Vec<[f64; 3]>,
            speeds: Vec<[f64; 3]>,
            rayons: [f64; 3],
            inertia_matrix: [f64; 9],
            energy: f64,
            virial: f64,
            dynamical_time: f64,
            espilon: f64,
        }

        let temp_dir = TempDir::new().unwrap();
        let data = SimulatorData {
            t: 0.5,
            c: 7,
            positions: vec![[1.0, 2.0, 3.0]],
            speeds: vec![[0.1, 0.2, 0.3]],
            rayons: [0.1, 0.5, 0.9],
            inertia_matrix: [0.0; 9],
            energy: -0.25,
            virial: 0.5,
            dynamical_time: 2.0,
            espilon: 0.01,
        };
        let file = File::create(snapshot_path(temp_dir.path(), 0, "cbor")).unwrap();
        serde_cbor::to_writer(file, &data).unwrap();

        let reader = NativeReader::open(temp_dir.path().to_path_buf(), SnapshotFormat::Cbor).unwrap();
        let snapshot = reader.read_snapshot(0).unwrap();
        assert_eq!(snapshot.c, Some(7.0));
        assert_eq!(snapshot.energy, SnapshotEnergy::Combined(-0.25));
        assert_eq!(snapshot.epsilon, Some(0.01));
        assert!(snapshot.radii.is_empty());
    }
}
