//! The record buffer allocator: a contiguous, row-major byte buffer
//! described by a [`Dtype`], with zero-copy reinterpretation between
//! layout-compatible dtypes and per-column typed accessors used by the
//! ascii/binary codecs.

use crate::dtype::{Dtype, DtypeField, Primitive};
use crate::error::{Error, Result};
use crate::timestamp;

/// A contiguous record batch: `len` rows of `dtype.itemsize` bytes each.
#[derive(Debug, Clone)]
pub struct RecordBuffer {
    /// Layout of one row.
    pub dtype: Dtype,
    /// Row-major backing storage, `len * dtype.itemsize` bytes.
    pub bytes: Vec<u8>,
    /// Number of rows.
    pub len: usize,
}

impl RecordBuffer {
    /// Allocates a zero-initialized buffer of `len` rows under `dtype`.
    pub fn zeroed(dtype: Dtype, len: usize) -> RecordBuffer {
        let bytes = vec![0u8; dtype.itemsize * len];
        RecordBuffer { dtype, bytes, len }
    }

    /// Wraps raw bytes already in `dtype`'s row layout; `bytes.len()`
    /// must be an exact multiple of `dtype.itemsize`.
    pub fn from_bytes(dtype: Dtype, bytes: Vec<u8>) -> Result<RecordBuffer> {
        if dtype.itemsize == 0 {
            return Ok(RecordBuffer {
                dtype,
                bytes,
                len: 0,
            });
        }
        if bytes.len() % dtype.itemsize != 0 {
            return Err(Error::ShapeError {
                message: format!(
                    "byte buffer of length {} is not a multiple of item size {}",
                    bytes.len(),
                    dtype.itemsize
                ),
            });
        }
        let len = bytes.len() / dtype.itemsize;
        Ok(RecordBuffer { dtype, bytes, len })
    }

    /// Reinterprets this buffer under `other`, a layout-compatible dtype
    /// (same `itemsize`). The underlying byte storage is moved, not
    /// copied.
    pub fn reinterpret(mut self, other: Dtype) -> Result<RecordBuffer> {
        if other.itemsize != self.dtype.itemsize {
            return Err(Error::ShapeError {
                message: format!(
                    "cannot reinterpret a buffer of item size {} as one of item size {}",
                    self.dtype.itemsize, other.itemsize
                ),
            });
        }
        self.dtype = other;
        Ok(self)
    }

    fn cell_offset(&self, row: usize, col: &DtypeField) -> usize {
        row * self.dtype.itemsize + col.offset
    }

    /// Raw bytes of a single `count == 1` column cell.
    pub fn cell_bytes(&self, row: usize, col: &DtypeField) -> &[u8] {
        let start = self.cell_offset(row, col);
        &self.bytes[start..start + col.byte_width()]
    }

    fn cell_bytes_mut(&mut self, row: usize, col: &DtypeField) -> &mut [u8] {
        let start = self.cell_offset(row, col);
        let width = col.byte_width();
        &mut self.bytes[start..start + width]
    }

    /// Reads a scalar integer column (`I1..I8`/`U1..U8`) as `i64`.
    pub fn read_i64(&self, row: usize, col: &DtypeField) -> i64 {
        let b = &self.cell_bytes(row, col)[..col.prim.byte_width()];
        match col.prim {
            Primitive::I1 => b[0] as i8 as i64,
            Primitive::U1 => b[0] as i64,
            Primitive::I2 => i16::from_le_bytes([b[0], b[1]]) as i64,
            Primitive::U2 => u16::from_le_bytes([b[0], b[1]]) as i64,
            Primitive::I4 => i32::from_le_bytes([b[0], b[1], b[2], b[3]]) as i64,
            Primitive::U4 => u32::from_le_bytes([b[0], b[1], b[2], b[3]]) as i64,
            Primitive::I8 | Primitive::Timestamp | Primitive::Timedelta => {
                i64::from_le_bytes(b.try_into().unwrap())
            }
            Primitive::U8 => u64::from_le_bytes(b.try_into().unwrap()) as i64,
            _ => 0,
        }
    }

    /// Writes a scalar integer column from `value`, truncating to the
    /// column's byte width.
    pub fn write_i64(&mut self, row: usize, col: &DtypeField, value: i64) {
        let prim = col.prim;
        let b = self.cell_bytes_mut(row, col);
        match prim {
            Primitive::I1 | Primitive::U1 => b[0] = value as u8,
            Primitive::I2 | Primitive::U2 => b[..2].copy_from_slice(&(value as u16).to_le_bytes()),
            Primitive::I4 | Primitive::U4 => b[..4].copy_from_slice(&(value as u32).to_le_bytes()),
            Primitive::I8 | Primitive::U8 | Primitive::Timestamp | Primitive::Timedelta => {
                b[..8].copy_from_slice(&value.to_le_bytes())
            }
            _ => {}
        }
    }

    /// Reads a scalar float column (`F4`/`F8`) as `f64`.
    pub fn read_f64(&self, row: usize, col: &DtypeField) -> f64 {
        let b = self.cell_bytes(row, col);
        match col.prim {
            Primitive::F4 => f32::from_le_bytes(b[..4].try_into().unwrap()) as f64,
            Primitive::F8 => f64::from_le_bytes(b[..8].try_into().unwrap()),
            _ => 0.0,
        }
    }

    /// Writes a scalar float column.
    pub fn write_f64(&mut self, row: usize, col: &DtypeField, value: f64) {
        let prim = col.prim;
        let b = self.cell_bytes_mut(row, col);
        match prim {
            Primitive::F4 => b[..4].copy_from_slice(&(value as f32).to_le_bytes()),
            Primitive::F8 => b[..8].copy_from_slice(&value.to_le_bytes()),
            _ => {}
        }
    }

    /// Reads a fixed-length string column, trimming trailing NUL bytes,
    /// as a lossy UTF-8 string.
    pub fn read_str(&self, row: usize, col: &DtypeField) -> String {
        let b = self.cell_bytes(row, col);
        let trimmed_len = b.iter().rposition(|&c| c != 0).map_or(0, |i| i + 1);
        String::from_utf8_lossy(&b[..trimmed_len]).into_owned()
    }

    /// Writes a fixed-length string column, truncating or NUL-padding to
    /// the declared width.
    pub fn write_str(&mut self, row: usize, col: &DtypeField, value: &str) {
        let width = col.prim.byte_width();
        let b = self.cell_bytes_mut(row, col);
        let bytes = value.as_bytes();
        let n = bytes.len().min(width);
        b[..n].copy_from_slice(&bytes[..n]);
        for slot in b.iter_mut().skip(n) {
            *slot = 0;
        }
    }

    /// Formats a single scalar cell as ascii text, following the write
    /// rules: integers as decimal, floats in general notation at
    /// `precision` significant digits, timestamps via the textual
    /// timestamp codec, fixed strings raw (NUL-trimmed). Any other
    /// primitive fails with [`Error::UnsupportedTypeForText`].
    pub fn format_cell_text(&self, row: usize, col: &DtypeField, precision: usize) -> Result<String> {
        Ok(match col.prim {
            Primitive::I1
            | Primitive::U1
            | Primitive::I2
            | Primitive::U2
            | Primitive::I4
            | Primitive::U4
            | Primitive::I8 => self.read_i64(row, col).to_string(),
            Primitive::U8 => {
                let b = self.cell_bytes(row, col);
                u64::from_le_bytes(b.try_into().unwrap()).to_string()
            }
            Primitive::F4 | Primitive::F8 => format_general(self.read_f64(row, col), precision),
            Primitive::Timestamp => timestamp::from_wire(self.read_i64(row, col)),
            Primitive::Timedelta => self.read_i64(row, col).to_string(),
            Primitive::Str(_) => self.read_str(row, col),
        })
    }

    /// Parses `text` into a cell according to the column's primitive
    /// type, used by the ascii reader.
    pub fn parse_cell_text(&mut self, row: usize, col: &DtypeField, text: &str) -> Result<()> {
        match col.prim {
            Primitive::I1
            | Primitive::U1
            | Primitive::I2
            | Primitive::U2
            | Primitive::I4
            | Primitive::U4
            | Primitive::I8
            | Primitive::U8 => {
                let v: i64 = if text.is_empty() {
                    0
                } else {
                    text.trim().parse().map_err(|_| Error::ShapeError {
                        message: format!("cannot parse {text:?} as an integer"),
                    })?
                };
                self.write_i64(row, col, v);
            }
            Primitive::F4 | Primitive::F8 => {
                let v: f64 = if text.is_empty() {
                    0.0
                } else {
                    text.trim().parse().map_err(|_| Error::ShapeError {
                        message: format!("cannot parse {text:?} as a float"),
                    })?
                };
                self.write_f64(row, col, v);
            }
            Primitive::Timestamp => {
                let v = timestamp::to_wire(text)?;
                self.write_i64(row, col, v);
            }
            Primitive::Timedelta => {
                let v: i64 = if text.is_empty() { 0 } else { text.trim().parse().unwrap_or(0) };
                self.write_i64(row, col, v);
            }
            Primitive::Str(_) => {
                self.write_str(row, col, text);
            }
        }
        Ok(())
    }

    /// Copies one row's bytes for `src_col` in `src` into `dst_col` of
    /// `self` at `row`, requiring equal byte width. Used to merge
    /// field-wise columns between buffers of different dtypes (tied
    /// writes, missing-field overlay).
    pub fn copy_cell_from(
        &mut self,
        row: usize,
        dst_col: &DtypeField,
        src: &RecordBuffer,
        src_row: usize,
        src_col: &DtypeField,
    ) {
        let src_bytes = src.cell_bytes(src_row, src_col).to_vec();
        let dst = self.cell_bytes_mut(row, dst_col);
        let n = dst.len().min(src_bytes.len());
        dst[..n].copy_from_slice(&src_bytes[..n]);
    }
}

/// Formats `value` in general notation at `precision` significant
/// digits, matching the `"{:.{precision}g}"`-style behavior of the
/// original ascii writer (trailing zeros trimmed, no forced exponent).
fn format_general(value: f64, precision: usize) -> String {
    if value == 0.0 {
        return "0".to_string();
    }
    if !value.is_finite() {
        return if value.is_nan() {
            "nan".to_string()
        } else if value > 0.0 {
            "inf".to_string()
        } else {
            "-inf".to_string()
        };
    }
    let precision = precision.max(1);
    let magnitude = value.abs().log10().floor() as i32;
    if magnitude < -4 || magnitude >= precision as i32 {
        let s = format!("{:.*e}", precision.saturating_sub(1), value);
        normalize_exponent(&s)
    } else {
        let decimals = (precision as i32 - 1 - magnitude).max(0) as usize;
        let s = format!("{value:.decimals$}");
        trim_trailing_zeros(&s)
    }
}

fn trim_trailing_zeros(s: &str) -> String {
    if !s.contains('.') {
        return s.to_string();
    }
    let trimmed = s.trim_end_matches('0');
    let trimmed = trimmed.trim_end_matches('.');
    if trimmed.is_empty() || trimmed == "-" {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

fn normalize_exponent(s: &str) -> String {
    let (mantissa, exp) = s.split_once('e').unwrap_or((s, "0"));
    let mantissa = trim_trailing_zeros(mantissa);
    let exp: i32 = exp.parse().unwrap_or(0);
    format!("{mantissa}e{}{:02}", if exp < 0 { "-" } else { "+" }, exp.abs())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtype::Primitive;

    #[test]
    fn roundtrip_integer() {
        let dt = Dtype::from_fields(vec![("x".into(), Primitive::I4)]);
        let mut buf = RecordBuffer::zeroed(dt.clone(), 1);
        buf.write_i64(0, &dt.columns[0], -42);
        assert_eq!(buf.read_i64(0, &dt.columns[0]), -42);
    }

    #[test]
    fn string_padding_and_trim() {
        let dt = Dtype::from_fields(vec![("s".into(), Primitive::Str(5))]);
        let mut buf = RecordBuffer::zeroed(dt.clone(), 1);
        buf.write_str(0, &dt.columns[0], "ab");
        assert_eq!(buf.read_str(0, &dt.columns[0]), "ab");
    }

    #[test]
    fn general_float_formatting() {
        assert_eq!(format_general(1.5, 12), "1.5");
        assert_eq!(format_general(0.0, 12), "0");
    }
}
