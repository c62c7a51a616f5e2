//! MATLAB level-5 MAT-file codec for real double arrays.
//!
//! Only what the dataset needs: uncompressed little-endian files holding
//! named `double` matrices of any rank. One-dimensional arrays are stored as
//! `1 x N` row vectors, data is column-major.

use crate::error::DatasetError;
use ndarray::{Array1, Array2, Array3, ArrayBase, Data, Dimension, ShapeBuilder};
use std::io::{Read, Write};
use std::path::Path;

const HEADER_LEN: usize = 128;
const HEADER_TEXT_LEN: usize = 116;

const MI_INT8: u32 = 1;
const MI_INT32: u32 = 5;
const MI_UINT32: u32 = 6;
const MI_DOUBLE: u32 = 9;
const MI_MATRIX: u32 = 14;
const MI_COMPRESSED: u32 = 15;

const MX_DOUBLE_CLASS: u32 = 6;
const FLAG_COMPLEX: u32 = 0x0800;

/// An unnamed real double array in MAT layout.
#[derive(Debug, Clone, PartialEq)]
pub struct MatArray {
    /// Dimensions, at least two.
    pub dims: Vec<usize>,
    /// Values in column-major order.
    pub data: Vec<f64>,
}

impl MatArray {
    /// Convert an ndarray of any rank; 1-D arrays become `1 x N`.
    pub fn from_array<S, D>(array: &ArrayBase<S, D>) -> Self
    where
        S: Data<Elem = f64>,
        D: Dimension,
    {
        let dims = match array.shape() {
            [n] => vec![1, *n],
            shape => shape.to_vec(),
        };
        // Iterating the transposed view walks the original in column-major order.
        let data = array.t().iter().copied().collect();
        Self { dims, data }
    }

    pub fn into_array1(self) -> Result<Array1<f64>, DatasetError> {
        match self.dims.as_slice() {
            [1, _] | [_, 1] | [_] => Ok(Array1::from(self.data)),
            dims => Err(DatasetError::Mat(format!("expected a vector, got {:?}", dims))),
        }
    }

    pub fn into_array2(self) -> Result<Array2<f64>, DatasetError> {
        match self.dims.as_slice() {
            &[rows, cols] => Array2::from_shape_vec((rows, cols).f(), self.data)
                .map_err(|e| DatasetError::Mat(e.to_string())),
            dims => Err(DatasetError::Mat(format!("expected a matrix, got {:?}", dims))),
        }
    }

    pub fn into_array3(self) -> Result<Array3<f64>, DatasetError> {
        match self.dims.as_slice() {
            &[a, b, c] => Array3::from_shape_vec((a, b, c).f(), self.data)
                .map_err(|e| DatasetError::Mat(e.to_string())),
            dims => Err(DatasetError::Mat(format!("expected 3 dimensions, got {:?}", dims))),
        }
    }
}

fn padding(len: usize) -> usize {
    (8 - len % 8) % 8
}

fn write_tag<W: Write>(writer: &mut W, data_type: u32, len: u32) -> std::io::Result<()> {
    writer.write_all(&data_type.to_le_bytes())?;
    writer.write_all(&len.to_le_bytes())
}

fn write_padding<W: Write>(writer: &mut W, len: u32) -> std::io::Result<()> {
    writer.write_all(&[0u8; 8][..padding(len as usize)])
}

/// Byte lengths of one matrix element, as stored in its 32-bit tags.
struct MatrixLayout {
    dims: Vec<i32>,
    dims_len: u32,
    name_len: u32,
    data_len: u32,
    content_len: u32,
}

impl MatrixLayout {
    fn new(name: &str, array: &MatArray) -> Result<Self, DatasetError> {
        let too_large = || {
            DatasetError::Mat(format!(
                "variable '{}' with dimensions {:?} does not fit in a level-5 MAT file",
                name, array.dims
            ))
        };

        let dims = array
            .dims
            .iter()
            .map(|&dim| i32::try_from(dim).map_err(|_| too_large()))
            .collect::<Result<Vec<_>, _>>()?;
        let count = array
            .dims
            .iter()
            .try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
            .ok_or_else(too_large)?;
        let data_len = count.checked_mul(8).ok_or_else(too_large)?;
        let dims_len = 4 * dims.len();
        let name_len = name.len();
        let content_len = [
            16,
            8 + dims_len + padding(dims_len),
            8 + name_len + padding(name_len),
            8,
        ]
        .iter()
        .try_fold(data_len, |acc, &len| acc.checked_add(len))
        .ok_or_else(too_large)?;

        if count != array.data.len() {
            return Err(DatasetError::Mat(format!(
                "variable '{}' holds {} values for dimensions {:?}",
                name,
                array.data.len(),
                array.dims
            )));
        }

        let to_u32 = |len: usize| u32::try_from(len).map_err(|_| too_large());
        Ok(Self {
            dims,
            dims_len: to_u32(dims_len)?,
            name_len: to_u32(name_len)?,
            data_len: to_u32(data_len)?,
            content_len: to_u32(content_len)?,
        })
    }
}

/// Write a MAT file holding `variables`, in order.
///
/// Every variable is checked against the 32-bit element sizes before the
/// first byte is written. `path` only names the destination in IO errors.
pub fn write_mat<W: Write>(
    writer: &mut W,
    path: &Path,
    variables: &[(&str, MatArray)],
) -> Result<(), DatasetError> {
    let layouts = variables
        .iter()
        .map(|(name, array)| MatrixLayout::new(name, array))
        .collect::<Result<Vec<_>, _>>()?;

    write_elements(writer, variables, &layouts).map_err(|e| DatasetError::io(path, e))
}

fn write_elements<W: Write>(
    writer: &mut W,
    variables: &[(&str, MatArray)],
    layouts: &[MatrixLayout],
) -> std::io::Result<()> {
    let mut text = format!(
        "MATLAB 5.0 MAT-file, Platform: {}, Created by: nbody-diag {}",
        std::env::consts::OS,
        env!("CARGO_PKG_VERSION")
    )
    .into_bytes();
    text.resize(HEADER_TEXT_LEN, b' ');
    writer.write_all(&text)?;
    writer.write_all(&[0u8; 8])?;
    writer.write_all(&0x0100u16.to_le_bytes())?;
    writer.write_all(b"IM")?;

    for ((name, array), layout) in variables.iter().zip(layouts) {
        write_tag(writer, MI_MATRIX, layout.content_len)?;

        write_tag(writer, MI_UINT32, 8)?;
        writer.write_all(&MX_DOUBLE_CLASS.to_le_bytes())?;
        writer.write_all(&0u32.to_le_bytes())?;

        write_tag(writer, MI_INT32, layout.dims_len)?;
        for dim in &layout.dims {
            writer.write_all(&dim.to_le_bytes())?;
        }
        write_padding(writer, layout.dims_len)?;

        write_tag(writer, MI_INT8, layout.name_len)?;
        writer.write_all(name.as_bytes())?;
        write_padding(writer, layout.name_len)?;

        write_tag(writer, MI_DOUBLE, layout.data_len)?;
        for value in &array.data {
            writer.write_all(&value.to_le_bytes())?;
        }
    }

    Ok(())
}

/// Byte cursor over an in-memory MAT file.
struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], DatasetError> {
        if self.remaining() < len {
            return Err(DatasetError::Mat(format!(
                "truncated element: need {} bytes, {} left",
                len,
                self.remaining()
            )));
        }
        let slice = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn u32(&mut self) -> Result<u32, DatasetError> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Read one data element, returning its type and payload.
    fn element(&mut self) -> Result<(u32, &'a [u8]), DatasetError> {
        let first = self.u32()?;
        if first >> 16 != 0 {
            // Small data element: type and size share the first word.
            let data_type = first & 0xFFFF;
            let len = (first >> 16) as usize;
            let payload = self.take(4)?;
            return Ok((data_type, &payload[..len.min(4)]));
        }

        let len = self.u32()? as usize;
        let payload = self.take(len)?;
        if first != MI_MATRIX && first != MI_COMPRESSED {
            self.take(padding(len).min(self.remaining()))?;
        }
        Ok((first, payload))
    }
}

fn parse_matrix(content: &[u8]) -> Result<(String, MatArray), DatasetError> {
    let mut cursor = Cursor::new(content);

    let (_, flags) = cursor.element()?;
    if flags.len() < 8 {
        return Err(DatasetError::Mat("array flags too short".to_string()));
    }
    let flag_word = u32::from_le_bytes([flags[0], flags[1], flags[2], flags[3]]);
    if flag_word & 0xFF != MX_DOUBLE_CLASS {
        return Err(DatasetError::Mat(format!(
            "unsupported array class {}",
            flag_word & 0xFF
        )));
    }
    if flag_word & FLAG_COMPLEX != 0 {
        return Err(DatasetError::Mat("complex arrays are not supported".to_string()));
    }

    let (dims_type, dims_bytes) = cursor.element()?;
    if dims_type != MI_INT32 {
        return Err(DatasetError::Mat(format!("unexpected dimension type {}", dims_type)));
    }
    let dims: Vec<usize> = dims_bytes
        .chunks_exact(4)
        .map(|b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]).max(0) as usize)
        .collect();

    let (_, name_bytes) = cursor.element()?;
    let name = String::from_utf8_lossy(name_bytes).into_owned();

    let (data_type, real) = cursor.element()?;
    if data_type != MI_DOUBLE {
        return Err(DatasetError::Mat(format!(
            "variable '{}': unsupported storage type {}",
            name, data_type
        )));
    }
    let data: Vec<f64> = real
        .chunks_exact(8)
        .map(|b| f64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
        .collect();

    let expected: usize = dims.iter().product();
    if data.len() != expected {
        return Err(DatasetError::Mat(format!(
            "variable '{}': {} values for dimensions {:?}",
            name,
            data.len(),
            dims
        )));
    }

    Ok((name, MatArray { dims, data }))
}

/// Read every variable of a MAT file.
pub fn read_mat<R: Read>(reader: &mut R) -> Result<Vec<(String, MatArray)>, DatasetError> {
    let mut bytes = Vec::new();
    reader
        .read_to_end(&mut bytes)
        .map_err(|e| DatasetError::Mat(e.to_string()))?;

    if bytes.len() < HEADER_LEN {
        return Err(DatasetError::Mat("file shorter than the MAT header".to_string()));
    }
    if &bytes[126..128] != b"IM" {
        return Err(DatasetError::Mat(
            "not a little-endian level-5 MAT file".to_string(),
        ));
    }

    let mut cursor = Cursor::new(&bytes[HEADER_LEN..]);
    let mut variables = Vec::new();

    while cursor.remaining() >= 8 {
        let (data_type, content) = cursor.element()?;
        match data_type {
            MI_MATRIX => variables.push(parse_matrix(content)?),
            MI_COMPRESSED => {
                return Err(DatasetError::Mat(
                    "compressed MAT files are not supported".to_string(),
                ))
            }
            other => {
                return Err(DatasetError::Mat(format!("unexpected top-level element {}", other)))
            }
        }
        // Top-level elements are 8-byte aligned.
        cursor.take(padding(content.len()).min(cursor.remaining()))?;
    }

    Ok(variables)
}
