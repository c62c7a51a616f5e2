//! Decoder for the simulator's fixed-width binary record files.
//!
//! Each record is laid out with native endianness and alignment:
//!
//! ```text
//! f64 t | u32 c | 4 bytes padding
//! nb x [f64; 3] positions
//! nb x [f64; 3] speeds
//! f64 x 16: rayons[3], inertia_matrix[9], energy, virial, dynamical_time, epsilon
//! ```
//!
//! `nb` is the `nb_particules_save` entry of the simulator's `.ini` file.

use crate::error::RecordError;
use ini::Ini;
use std::path::Path;
use tracing::{debug, warn};

const HEADER_LEN: usize = 16;
const VECTOR_LEN: usize = 3 * 8;
const TRAILER_LEN: usize = 16 * 8;

/// Section of the simulator configuration holding the run parameters.
pub const PARAMETERS_SECTION: &str = "Parameters";
const SAVED_PARTICLES_KEY: &str = "nb_particules_save";

/// One decoded record.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub t: f64,
    pub c: u32,
    pub positions: Vec<[f64; 3]>,
    pub speeds: Vec<[f64; 3]>,
    pub rayons: [f64; 3],
    pub inertia_matrix: [f64; 9],
    pub energy: f64,
    pub virial: f64,
    pub dynamical_time: f64,
    pub epsilon: f64,
}

/// Records of a file, plus the size of an incomplete record at its end.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordFile {
    pub particle_count: usize,
    pub records: Vec<Record>,
    pub trailing_bytes: usize,
}

/// Size in bytes of one record holding `particle_count` particles.
pub fn record_size(particle_count: usize) -> Result<usize, RecordError> {
    particle_count
        .checked_mul(2 * VECTOR_LEN)
        .and_then(|vectors| vectors.checked_add(HEADER_LEN + TRAILER_LEN))
        .ok_or(RecordError::RecordTooLarge(particle_count))
}

/// Read `nb_particules_save` from a simulator `.ini` file, looking in the
/// `[Parameters]` section first and then in the section-less part.
pub fn read_particle_count(ini_path: &Path) -> Result<usize, RecordError> {
    let conf = Ini::load_from_file(ini_path).map_err(|e| RecordError::Ini {
        path: ini_path.to_path_buf(),
        message: e.to_string(),
    })?;

    let value = conf
        .section(Some(PARAMETERS_SECTION))
        .and_then(|section| section.get(SAVED_PARTICLES_KEY))
        .or_else(|| conf.general_section().get(SAVED_PARTICLES_KEY))
        .ok_or(RecordError::MissingKey(SAVED_PARTICLES_KEY))?;

    value
        .trim()
        .parse()
        .map_err(|_| RecordError::InvalidValue {
            key: SAVED_PARTICLES_KEY,
            value: value.to_string(),
        })
}

/// Sequential reader over the bytes of one record.
struct Fields<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Fields<'a> {
    fn f64(&mut self) -> f64 {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&self.bytes[self.pos..self.pos + 8]);
        self.pos += 8;
        f64::from_ne_bytes(buf)
    }

    fn u32(&mut self) -> u32 {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(&self.bytes[self.pos..self.pos + 4]);
        self.pos += 4;
        u32::from_ne_bytes(buf)
    }

    fn skip(&mut self, len: usize) {
        self.pos += len;
    }

    fn array<const N: usize>(&mut self) -> [f64; N] {
        let mut values = [0.0; N];
        for value in values.iter_mut() {
            *value = self.f64();
        }
        values
    }
}

/// Decode one record. `bytes` must be exactly `record_size(particle_count)`
/// long.
fn decode_record(bytes: &[u8], particle_count: usize) -> Record {
    let mut fields = Fields { bytes, pos: 0 };

    let t = fields.f64();
    let c = fields.u32();
    fields.skip(4);
    let positions = (0..particle_count).map(|_| fields.array()).collect();
    let speeds = (0..particle_count).map(|_| fields.array()).collect();

    Record {
        t,
        c,
        positions,
        speeds,
        rayons: fields.array(),
        inertia_matrix: fields.array(),
        energy: fields.f64(),
        virial: fields.f64(),
        dynamical_time: fields.f64(),
        epsilon: fields.f64(),
    }
}

/// Decode every complete record of `bytes`.
pub fn decode_records(bytes: &[u8], particle_count: usize) -> Result<RecordFile, RecordError> {
    let size = record_size(particle_count)?;
    let chunks = bytes.chunks_exact(size);
    let trailing_bytes = chunks.remainder().len();

    let records: Vec<Record> = chunks
        .map(|chunk| decode_record(chunk, particle_count))
        .collect();

    if trailing_bytes > 0 {
        warn!(
            "{} trailing bytes after {} records of {} bytes ignored",
            trailing_bytes,
            records.len(),
            size
        );
    }

    Ok(RecordFile {
        particle_count,
        records,
        trailing_bytes,
    })
}

/// Read and decode a record file.
pub fn read_records(path: &Path, particle_count: usize) -> Result<RecordFile, RecordError> {
    let size = record_size(particle_count)?;
    let bytes = std::fs::read(path).map_err(|source| RecordError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(
        "{} bytes in {}, record size {}",
        bytes.len(),
        path.display(),
        size
    );
    decode_records(&bytes, particle_count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn encode(record: &Record) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&record.t.to_ne_bytes());
        bytes.extend_from_slice(&record.c.to_ne_bytes());
        bytes.extend_from_slice(&[0u8; 4]);
        for v in record.positions.iter().chain(&record.speeds) {
            for x in v {
                bytes.extend_from_slice(&x.to_ne_bytes());
            }
        }
        let tail = [record.energy, record.virial, record.dynamical_time, record.epsilon];
        let trailer = record.rayons.iter().chain(&record.inertia_matrix).chain(&tail);
        for x in trailer {
            bytes.extend_from_slice(&x.to_ne_bytes());
        }
        bytes
    }

    fn make_record(t: f64, n: usize) -> Record {
        Record {
            t,
            c: (t * 100.0) as u32,
            positions: (0..n).map(|i| [i as f64, t, -t]).collect(),
            speeds: (0..n).map(|i| [0.0, i as f64, 1.0]).collect(),
            rayons: [0.1, 0.5, 0.9],
            inertia_matrix: [1.0, 0.0, 0.0, 0.0, 2.0, 0.0, 0.0, 0.0, 3.0],
            energy: -0.25,
            virial: 0.5,
            dynamical_time: 1.0,
            epsilon: 0.01,
        }
    }

    #[test]
    fn test_record_size() {
        assert_eq!(record_size(0).unwrap(), 144);
        assert_eq!(record_size(2).unwrap(), 144 + 96);
        assert_eq!(encode(&make_record(0.0, 2)).len(), record_size(2).unwrap());
    }

    #[test]
    fn test_oversized_particle_count_is_rejected() {
        assert!(matches!(
            record_size(usize::MAX / 2),
            Err(RecordError::RecordTooLarge(_))
        ));

        let temp_dir = TempDir::new().unwrap();
        let ini = temp_dir.path().join("config.ini");
        std::fs::write(&ini, "[Parameters]\nnb_particules_save = 400000000000000000\n").unwrap();
        let data = temp_dir.path().join("data.bin");
        std::fs::write(&data, encode(&make_record(0.0, 1))).unwrap();

        let count = read_particle_count(&ini).unwrap();
        assert!(matches!(
            read_records(&data, count),
            Err(RecordError::RecordTooLarge(400000000000000000))
        ));
    }

    #[test]
    fn test_decode_records_with_trailing_bytes() {
        let records = vec![make_record(0.0, 3), make_record(0.5, 3)];
        let mut bytes: Vec<u8> = records.iter().flat_map(encode).collect();
        bytes.extend_from_slice(&[0u8; 10]);

        let file = decode_records(&bytes, 3).unwrap();
        assert_eq!(file.records, records);
        assert_eq!(file.trailing_bytes, 10);
        assert_eq!(file.records[1].c, 50);
    }

    #[test]
    fn test_read_records_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("data.bin");
        std::fs::write(&path, encode(&make_record(1.0, 1))).unwrap();

        let file = read_records(&path, 1).unwrap();
        assert_eq!(file.records.len(), 1);
        assert_eq!(file.trailing_bytes, 0);
        assert_eq!(file.records[0].positions, vec![[0.0, 1.0, -1.0]]);

        let missing = read_records(&temp_dir.path().join("missing.bin"), 1);
        assert!(matches!(missing, Err(RecordError::Io { .. })));
    }

    #[test]
    fn test_particle_count_from_parameters_section() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.ini");
        std::fs::write(
            &path,
            "nb_particules_save = 3\n[Parameters]\nnb_particules = 1000\nnb_particules_save = 100\n",
        )
        .unwrap();
        assert_eq!(read_particle_count(&path).unwrap(), 100);
    }

    #[test]
    fn test_particle_count_from_general_section() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.ini");
        std::fs::write(&path, "nb_particules = 1000\nnb_particules_save = 250\n").unwrap();
        assert_eq!(read_particle_count(&path).unwrap(), 250);
    }

    #[test]
    fn test_particle_count_errors() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.ini");

        std::fs::write(&path, "nb_particules = 1000\n").unwrap();
        assert!(matches!(
            read_particle_count(&path),
            Err(RecordError::MissingKey("nb_particules_save"))
        ));

        std::fs::write(&path, "nb_particules_save = many\n").unwrap();
        assert!(matches!(
            read_particle_count(&path),
            Err(RecordError::InvalidValue { .. })
        ));
    }
}
