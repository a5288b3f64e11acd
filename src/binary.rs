//! Binary wire codec: raw little-endian record bytes, tightly packed,
//! with no inter-record padding.

use std::io::{Read, Write};

use crate::error::Result;
use crate::record::RecordBuffer;

/// Reads up to `max_rows` records of `dtype` from `source`. Returns
/// `None` at a clean end-of-stream (zero bytes read before any record).
/// `max_rows == usize::MAX` reads the source to exhaustion.
pub fn read_records(
    source: &mut dyn Read,
    dtype: crate::dtype::Dtype,
    max_rows: usize,
) -> Result<Option<RecordBuffer>> {
    if dtype.itemsize == 0 {
        return Ok(None);
    }
    let mut bytes = Vec::new();
    if max_rows == usize::MAX {
        source.read_to_end(&mut bytes)?;
    } else {
        let want = dtype.itemsize * max_rows;
        bytes.resize(want, 0);
        let mut total = 0;
        while total < want {
            let n = source.read(&mut bytes[total..])?;
            if n == 0 {
                break;
            }
            total += n;
        }
        bytes.truncate(total - (total % dtype.itemsize));
    }
    if bytes.is_empty() {
        return Ok(None);
    }
    Ok(Some(RecordBuffer::from_bytes(dtype, bytes)?))
}

/// Writes a record batch's raw bytes verbatim and flushes the target.
pub fn write_records(target: &mut dyn Write, batch: &RecordBuffer) -> Result<()> {
    target.write_all(&batch.bytes)?;
    target.flush()?;
    Ok(())
}
