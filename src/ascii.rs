//! Delimited-text wire codec: one record per line, fields separated by a
//! single-character delimiter, no quoting, blank lines skipped on read.

use std::io::BufRead;

use crate::dtype::Dtype;
use crate::error::Result;
use crate::record::RecordBuffer;

/// Reads up to `max_lines` non-empty lines from `source`. Returns fewer
/// than requested (possibly zero) at end-of-stream.
pub fn read_lines(source: &mut dyn BufRead, max_lines: usize) -> Result<Vec<String>> {
    let mut lines = Vec::with_capacity(max_lines.min(1024));
    let mut raw = String::new();
    while lines.len() < max_lines {
        raw.clear();
        let n = source.read_line(&mut raw)?;
        if n == 0 {
            break;
        }
        let trimmed = raw.trim_end_matches(['\n', '\r']);
        if trimmed.is_empty() {
            continue;
        }
        lines.push(trimmed.to_string());
    }
    Ok(lines)
}

/// Parses `lines` into a record batch of `dtype`, one line per row.
/// Columns with `count > 1` (array leaves) consume that many consecutive
/// delimiter-separated tokens. A row with fewer tokens than the dtype
/// requires fills the remainder with the empty string (matching the
/// "missing fields within a row get an empty fill value" read rule).
pub fn parse_records(lines: &[String], dtype: Dtype, delimiter: char) -> Result<RecordBuffer> {
    let mut batch = RecordBuffer::zeroed(dtype.clone(), lines.len());
    for (row, line) in lines.iter().enumerate() {
        let tokens: Vec<&str> = line.split(delimiter).collect();
        let mut idx = 0usize;
        for col in &dtype.columns {
            for slot in 0..col.count {
                let text = tokens.get(idx).copied().unwrap_or("");
                let sub = sub_slot(col, slot);
                batch.parse_cell_text(row, &sub, text)?;
                idx += 1;
            }
        }
    }
    Ok(batch)
}

/// Formats `batch` (assumed laid out under the unrolled flat dtype, one
/// scalar slot per column) as ascii lines, `delimiter`-joined.
pub fn format_records(batch: &RecordBuffer, delimiter: char, precision: usize) -> Result<Vec<String>> {
    let mut out = Vec::with_capacity(batch.len);
    for row in 0..batch.len {
        let mut tokens = Vec::with_capacity(batch.dtype.columns.len());
        for col in &batch.dtype.columns {
            tokens.push(batch.format_cell_text(row, col, precision)?);
        }
        out.push(tokens.join(&delimiter.to_string()));
    }
    Ok(out)
}

/// Builds the single-slot view of `col`'s `slot`-th element (used to
/// route array-leaf columns through the scalar cell accessors).
pub fn sub_slot(col: &crate::dtype::DtypeField, slot: usize) -> crate::dtype::DtypeField {
    crate::dtype::DtypeField {
        name: col.name.clone(),
        offset: col.offset + slot * col.prim.byte_width(),
        prim: col.prim,
        count: 1,
    }
}
