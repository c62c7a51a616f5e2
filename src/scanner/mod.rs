//! Snapshot discovery and reading.
//!
//! A simulation directory holds one file per timestep in one of three
//! layouts. [`open_reader`] inspects the directory once and returns a
//! [`SnapshotReader`] for the layout it found; callers then read snapshots
//! by index without caring about the format.

mod legacy;
mod native;

pub use legacy::LegacyCsvReader;
pub use native::NativeReader;

use crate::error::DatasetError;
use crate::models::{Snapshot, SnapshotFormat};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Marker file of the legacy CSV layout.
pub const LEGACY_MARKER: &str = "infos.csv";

/// Reads the snapshots of one simulation directory.
pub trait SnapshotReader {
    /// Layout of the directory.
    fn format(&self) -> SnapshotFormat;

    /// Number of snapshots available.
    fn snapshot_count(&self) -> usize;

    /// Read snapshot `index` (0-based, in time order).
    fn read_snapshot(&self, index: usize) -> Result<Snapshot, DatasetError>;
}

/// Path of the `index`-th native snapshot file.
pub fn snapshot_path(folder: &Path, index: usize, extension: &str) -> PathBuf {
    folder.join(format!("data_{}.{}", index, extension))
}

/// Detect the snapshot layout of `folder`.
///
/// Probes `data_0.cbor`, then `data_0.pickle`, then the legacy marker.
pub fn detect_format(folder: &Path) -> Option<SnapshotFormat> {
    for format in [SnapshotFormat::Cbor, SnapshotFormat::Pickle] {
        if let Some(ext) = format.extension() {
            if snapshot_path(folder, 0, ext).is_file() {
                return Some(format);
            }
        }
    }

    if folder.join(LEGACY_MARKER).is_file() {
        return Some(SnapshotFormat::LegacyCsv);
    }

    None
}

/// Open a reader for the snapshots stored in `folder`.
pub fn open_reader(folder: &Path) -> Result<Box<dyn SnapshotReader>, DatasetError> {
    let format =
        detect_format(folder).ok_or_else(|| DatasetError::NoSnapshots(folder.to_path_buf()))?;
    debug!("Detected {} snapshots in {}", format, folder.display());

    let reader: Box<dyn SnapshotReader> = match format {
        SnapshotFormat::Cbor | SnapshotFormat::Pickle => {
            Box::new(NativeReader::open(folder.to_path_buf(), format)?)
        }
        SnapshotFormat::LegacyCsv => Box::new(LegacyCsvReader::open(folder)?),
    };

    info!(
        "Found {} {} snapshots in {}",
        reader.snapshot_count(),
        format,
        folder.display()
    );
    Ok(reader)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_detect_format_priority() {
        let temp_dir = TempDir::new().unwrap();
        assert_eq!(detect_format(temp_dir.path()), None);

        std::fs::write(temp_dir.path().join(LEGACY_MARKER), "").unwrap();
        assert_eq!(
            detect_format(temp_dir.path()),
            Some(SnapshotFormat::LegacyCsv)
        );

        std::fs::write(temp_dir.path().join("data_0.pickle"), "").unwrap();
        assert_eq!(detect_format(temp_dir.path()), Some(SnapshotFormat::Pickle));

        std::fs::write(temp_dir.path().join("data_0.cbor"), "").unwrap();
        assert_eq!(detect_format(temp_dir.path()), Some(SnapshotFormat::Cbor));
    }

    #[test]
    fn test_open_reader_empty_directory() {
        let temp_dir = TempDir::new().unwrap();
        let result = open_reader(temp_dir.path());
        assert!(matches!(result, Err(DatasetError::NoSnapshots(_))));
    }
}
