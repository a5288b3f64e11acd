//! Primitive type codes, the [`Type`] algebra (primitive / array / nested
//! schema), and the [`Dtype`] layout descriptor (named offsets and
//! sizes) that a [`crate::schema::Schema`] compiles down to.

use crate::error::{Error, Result};
use crate::format;

/// A primitive type code. Strings of length 0 are legal and used as
/// placeholders for unnamed columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    /// Signed 8-bit integer.
    I1,
    /// Unsigned 8-bit integer.
    U1,
    /// Signed 16-bit integer.
    I2,
    /// Unsigned 16-bit integer.
    U2,
    /// Signed 32-bit integer.
    I4,
    /// Unsigned 32-bit integer.
    U4,
    /// Signed 64-bit integer.
    I8,
    /// Unsigned 64-bit integer.
    U8,
    /// 32-bit IEEE float.
    F4,
    /// 64-bit IEEE float.
    F8,
    /// Fixed-length byte string of declared length `N` (N may be 0).
    Str(usize),
    /// Microsecond-resolution timestamp, stored as an `i8` epoch offset.
    Timestamp,
    /// Microsecond-resolution timedelta, stored as an `i8` signed offset.
    Timedelta,
}

impl Primitive {
    /// Fixed byte width of this primitive.
    pub fn byte_width(self) -> usize {
        match self {
            Primitive::I1 | Primitive::U1 => 1,
            Primitive::I2 | Primitive::U2 => 2,
            Primitive::I4 | Primitive::U4 | Primitive::F4 => 4,
            Primitive::I8 | Primitive::U8 | Primitive::F8 => 8,
            Primitive::Timestamp | Primitive::Timedelta => 8,
            Primitive::Str(n) => n,
        }
    }

    /// Name used in diagnostics (`UnsupportedTypeForText` etc).
    pub fn type_name(self) -> &'static str {
        match self {
            Primitive::I1 => "i1",
            Primitive::U1 => "u1",
            Primitive::I2 => "i2",
            Primitive::U2 => "u2",
            Primitive::I4 => "i4",
            Primitive::U4 => "u4",
            Primitive::I8 => "i8",
            Primitive::U8 => "u8",
            Primitive::F4 => "f4",
            Primitive::F8 => "f8",
            Primitive::Str(_) => "S",
            Primitive::Timestamp => "M8[us]",
            Primitive::Timedelta => "m8[us]",
        }
    }

    /// Parses one wire-type token (`i1`, `u4`, `f8`, `S5`, `M8[us]`, ...).
    pub fn from_wire_token(token: &str) -> Result<Primitive> {
        Ok(match token {
            "i1" => Primitive::I1,
            "u1" => Primitive::U1,
            "i2" => Primitive::I2,
            "u2" => Primitive::U2,
            "i4" => Primitive::I4,
            "u4" => Primitive::U4,
            "i8" => Primitive::I8,
            "u8" => Primitive::U8,
            "f4" => Primitive::F4,
            "f8" => Primitive::F8,
            "M8[us]" => Primitive::Timestamp,
            "m8[us]" => Primitive::Timedelta,
            other => {
                if let Some(n) = other.strip_prefix('S') {
                    let n: usize = n.parse().map_err(|_| Error::invalid_type(other))?;
                    Primitive::Str(n)
                } else {
                    return Err(Error::invalid_type(other));
                }
            }
        })
    }

    /// Compact single-letter (or `s[N]`) alphabet form.
    pub fn to_compact_token(self) -> String {
        match self {
            Primitive::Str(n) => format!("s[{n}]"),
            _ => format::token_from_wire(self.type_name())
                .ok()
                .and_then(|v| v.into_iter().next())
                .unwrap_or_default(),
        }
    }
}

/// Either a bare primitive, a fixed-shape array of a primitive (unrolls
/// into `count` scalar slots of identical type), or a nested schema.
#[derive(Debug, Clone)]
pub enum Type {
    /// A single scalar leaf.
    Scalar(Primitive),
    /// An array leaf: element type plus a nonempty shape tuple.
    Array {
        /// Element primitive.
        elem: Primitive,
        /// Shape; total element count is the product of the dimensions.
        shape: Vec<usize>,
    },
    /// A nested record, recursing into another schema.
    Nested(Box<crate::schema::Schema>),
}

impl Type {
    /// Total number of scalar leaves this type unrolls into (1 for a bare
    /// scalar, `product(shape)` for an array, and the nested schema's own
    /// leaf count for a nested record).
    pub fn leaf_count(&self) -> usize {
        match self {
            Type::Scalar(_) => 1,
            Type::Array { shape, .. } => shape.iter().product(),
            Type::Nested(schema) => schema.fields.len(),
        }
    }

    /// `true` if this is a nested schema rather than a leaf type.
    pub fn is_nested(&self) -> bool {
        matches!(self, Type::Nested(_))
    }
}

/// One named, offset-positioned column of a [`Dtype`].
///
/// `count` is normally 1; a column compiled from an array leaf carries
/// `count == product(shape)` identical `prim` slots back to back, so an
/// array leaf still occupies a single named column.
#[derive(Debug, Clone)]
pub struct DtypeField {
    /// Column name (may contain `/` for a flattened xpath name).
    pub name: String,
    /// Byte offset from the start of the record.
    pub offset: usize,
    /// Primitive stored at this offset.
    pub prim: Primitive,
    /// Number of contiguous `prim`-sized slots (> 1 for array leaves).
    pub count: usize,
}

impl DtypeField {
    /// Total byte width of this column (`prim.byte_width() * count`).
    pub fn byte_width(&self) -> usize {
        self.prim.byte_width() * self.count
    }
}

/// A flat, named-offset layout descriptor: the compiled form every
/// record batch is read and written against.
#[derive(Debug, Clone, Default)]
pub struct Dtype {
    /// Columns in declared order.
    pub columns: Vec<DtypeField>,
    /// Total record size in bytes.
    pub itemsize: usize,
}

impl Dtype {
    /// Builds a dtype by laying out single-slot `columns` back-to-back in
    /// order, computing offsets and the total item size.
    pub fn from_fields(fields: Vec<(String, Primitive)>) -> Dtype {
        Dtype::from_columns(fields.into_iter().map(|(n, p)| (n, p, 1)).collect())
    }

    /// Builds a dtype from `(name, prim, count)` triples, laying out
    /// columns back-to-back in order.
    pub fn from_columns(fields: Vec<(String, Primitive, usize)>) -> Dtype {
        let mut columns = Vec::with_capacity(fields.len());
        let mut offset = 0;
        for (name, prim, count) in fields {
            columns.push(DtypeField {
                name,
                offset,
                prim,
                count,
            });
            offset += prim.byte_width() * count;
        }
        Dtype {
            columns,
            itemsize: offset,
        }
    }

    /// Appends `other`'s columns after this dtype's own, returning the
    /// concatenated dtype (used to build `complete_dtype = input_dtype ⊕
    /// missing_dtype`).
    pub fn concat(&self, other: &Dtype) -> Dtype {
        let mut fields: Vec<(String, Primitive, usize)> = self
            .columns
            .iter()
            .map(|c| (c.name.clone(), c.prim, c.count))
            .collect();
        fields.extend(
            other
                .columns
                .iter()
                .map(|c| (c.name.clone(), c.prim, c.count)),
        );
        Dtype::from_columns(fields)
    }

    /// Index of the named column, if present.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_widths() {
        assert_eq!(Primitive::I1.byte_width(), 1);
        assert_eq!(Primitive::F8.byte_width(), 8);
        assert_eq!(Primitive::Str(5).byte_width(), 5);
    }

    #[test]
    fn dtype_offsets() {
        let dt = Dtype::from_fields(vec![
            ("a".into(), Primitive::U4),
            ("b".into(), Primitive::F8),
        ]);
        assert_eq!(dt.columns[0].offset, 0);
        assert_eq!(dt.columns[1].offset, 4);
        assert_eq!(dt.itemsize, 12);
    }
}
