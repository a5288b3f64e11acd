//! Recursive record-type builder: turns a concise, possibly nested,
//! field/type declaration into the derived projections every other
//! component consumes (flat xpath leaves, format string, layout
//! descriptors, leaf-ambiguity detection).

use std::collections::{HashMap, HashSet};

use crate::dtype::{Dtype, Primitive, Type};
use crate::error::{Error, Result};
use crate::record::RecordBuffer;

/// Prefix used for synthetic placeholder names when fewer field names
/// than types are supplied.
pub const DEFAULT_FIELD_NAME_PREFIX: &str = "comma_struct_default_field_name_";

/// A recursive record-type description, together with every derived
/// projection named in the component design.
#[derive(Debug, Clone)]
pub struct Schema {
    /// Top-level declared names (placeholders already filled in).
    pub concise_fields: Vec<String>,
    /// Top-level declared types, aligned with `concise_fields`.
    pub concise_types: Vec<Type>,

    /// Full `/`-joined xpath of every leaf, in traversal order.
    pub fields: Vec<String>,
    /// Leaf types, aligned with `fields`.
    pub types: Vec<Type>,
    /// Compact-alphabet format string for `types`.
    pub format: String,
    /// Layout descriptor over `fields` (nested names, flat byte layout).
    pub dtype: Dtype,
    /// Same leaves as `dtype`, explicitly presented as a flat record.
    pub flat_dtype: Dtype,
    /// `flat_dtype` with array leaves expanded into scalar slots named
    /// `f0..fN-1`.
    pub unrolled_flat_dtype: Dtype,
    /// Sub-record xpath -> tuple of its own leaf xpaths.
    pub shorthand: HashMap<String, Vec<String>>,
    /// Last `/`-segment of each full xpath, aligned with `fields`.
    pub leaves: Vec<String>,
    /// Leaves that occur more than once across `fields`.
    pub ambiguous_leaves: HashSet<String>,
    /// Unambiguous leaf -> its one full xpath.
    pub xpath_of_leaf: HashMap<String, String>,
    /// Full xpath -> its leaf type.
    pub type_of_field: HashMap<String, Type>,
}

fn is_synthetic_placeholder(name: &str) -> bool {
    name.is_empty()
}

impl Schema {
    /// Builds a schema from concise field names and types.
    ///
    /// `concise_fields` may be shorter than `concise_types`; the
    /// remainder is padded with synthetic placeholder names. An empty
    /// string in `concise_fields` is likewise treated as "unnamed" and
    /// replaced by a placeholder.
    pub fn new(concise_fields: Vec<String>, concise_types: Vec<Type>) -> Result<Schema> {
        if concise_fields.len() > concise_types.len() {
            return Err(Error::MissingTypes {
                count: concise_fields.len() - concise_types.len(),
            });
        }
        for f in &concise_fields {
            if !is_synthetic_placeholder(f) && f.contains('/') {
                return Err(Error::FieldNameError {
                    message: format!("concise field name {f:?} must not contain '/'"),
                });
            }
        }

        let mut names = concise_fields.clone();
        while names.len() < concise_types.len() {
            names.push(String::new());
        }
        let names: Vec<String> = names
            .into_iter()
            .enumerate()
            .map(|(i, n)| {
                if is_synthetic_placeholder(&n) {
                    format!("{DEFAULT_FIELD_NAME_PREFIX}{i}")
                } else {
                    n
                }
            })
            .collect();

        let mut fields = Vec::new();
        let mut types = Vec::new();
        let mut shorthand: HashMap<String, Vec<String>> = HashMap::new();

        for (name, ty) in names.iter().zip(concise_types.iter()) {
            match ty {
                Type::Nested(inner) => {
                    let leaf_xpaths: Vec<String> = inner
                        .fields
                        .iter()
                        .map(|leaf| format!("{name}/{leaf}"))
                        .collect();
                    shorthand.insert(name.clone(), leaf_xpaths.clone());
                    for (sub_name, sub_leaves) in &inner.shorthand {
                        let rewritten: Vec<String> = sub_leaves
                            .iter()
                            .map(|l| format!("{name}/{l}"))
                            .collect();
                        shorthand.insert(format!("{name}/{sub_name}"), rewritten);
                    }
                    fields.extend(leaf_xpaths);
                    types.extend(inner.types.iter().cloned());
                }
                other => {
                    fields.push(name.clone());
                    types.push(other.clone());
                }
            }
        }

        let format = types
            .iter()
            .map(|t| match t {
                Type::Scalar(p) => p.to_compact_token(),
                Type::Array { elem, shape } => {
                    let count: usize = shape.iter().product();
                    std::iter::repeat(elem.to_compact_token())
                        .take(count)
                        .collect::<Vec<_>>()
                        .join(",")
                }
                Type::Nested(_) => unreachable!("nested types are flattened above"),
            })
            .collect::<Vec<_>>()
            .join(",");

        let flat_columns: Vec<(String, Primitive, usize)> = fields
            .iter()
            .zip(types.iter())
            .map(|(name, ty)| match ty {
                Type::Scalar(p) => (name.clone(), *p, 1),
                Type::Array { elem, shape } => (name.clone(), *elem, shape.iter().product()),
                Type::Nested(_) => unreachable!(),
            })
            .collect();
        let flat_dtype = Dtype::from_columns(flat_columns.clone());
        let dtype = Dtype::from_columns(flat_columns);

        let mut unrolled = Vec::new();
        let mut slot = 0usize;
        for (_, ty) in fields.iter().zip(types.iter()) {
            let (elem, count) = match ty {
                Type::Scalar(p) => (*p, 1),
                Type::Array { elem, shape } => (*elem, shape.iter().product()),
                Type::Nested(_) => unreachable!(),
            };
            for _ in 0..count {
                unrolled.push((format!("f{slot}"), elem, 1));
                slot += 1;
            }
        }
        let unrolled_flat_dtype = Dtype::from_columns(unrolled);

        let leaves: Vec<String> = fields
            .iter()
            .map(|f| f.rsplit('/').next().unwrap_or(f).to_string())
            .collect();
        let mut leaf_counts: HashMap<String, usize> = HashMap::new();
        for l in &leaves {
            *leaf_counts.entry(l.clone()).or_insert(0) += 1;
        }
        let ambiguous_leaves: HashSet<String> = leaf_counts
            .into_iter()
            .filter(|(_, n)| *n > 1)
            .map(|(l, _)| l)
            .collect();
        let mut xpath_of_leaf = HashMap::new();
        for (leaf, xpath) in leaves.iter().zip(fields.iter()) {
            if !ambiguous_leaves.contains(leaf) {
                xpath_of_leaf.insert(leaf.clone(), xpath.clone());
            }
        }
        let type_of_field: HashMap<String, Type> = fields
            .iter()
            .cloned()
            .zip(types.iter().cloned())
            .collect();

        Ok(Schema {
            concise_fields: names,
            concise_types,
            fields,
            types,
            format,
            dtype,
            flat_dtype,
            unrolled_flat_dtype,
            shorthand,
            leaves,
            ambiguous_leaves,
            xpath_of_leaf,
            type_of_field,
        })
    }

    /// Allocates a zero-initialized record batch of `size` rows laid out
    /// per `self.dtype`.
    pub fn allocate(&self, size: usize) -> RecordBuffer {
        RecordBuffer::zeroed(self.dtype.clone(), size)
    }

    /// Returns the sole record of a single-row batch as a flat tuple of
    /// textual scalar representations (arrays unrolled, timestamps
    /// rendered via the textual codec). Fails with [`Error::ShapeError`]
    /// if the batch does not contain exactly one row.
    pub fn to_tuple(&self, batch: &RecordBuffer) -> Result<Vec<String>> {
        if batch.len != 1 {
            return Err(Error::ShapeError {
                message: format!(
                    "to_tuple requires a single-record batch, got {} records",
                    batch.len
                ),
            });
        }
        let unrolled = batch.reinterpret(self.unrolled_flat_dtype.clone())?;
        let mut out = Vec::with_capacity(unrolled.dtype.columns.len());
        for col in &unrolled.dtype.columns {
            out.push(unrolled.format_cell_text(0, col, 12)?);
        }
        Ok(out)
    }

    /// Splits `field_spec` on `,`; any token present in `shorthand` is
    /// replaced by its tuple of leaf xpaths, everything else passes
    /// through unchanged.
    pub fn expand_shorthand(&self, field_spec: &str) -> Vec<String> {
        let mut out = Vec::new();
        for token in field_spec.split(',').filter(|t| !t.is_empty()) {
            if let Some(expansion) = self.shorthand.get(token) {
                out.extend(expansion.iter().cloned());
            } else {
                out.push(token.to_string());
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtype::{Primitive, Type};

    fn scalar(p: Primitive) -> Type {
        Type::Scalar(p)
    }

    #[test]
    fn flat_schema() {
        let schema = Schema::new(
            vec!["x".into(), "y".into(), "z".into()],
            vec![scalar(Primitive::F8), scalar(Primitive::F8), scalar(Primitive::F8)],
        )
        .unwrap();
        assert_eq!(schema.fields, vec!["x", "y", "z"]);
        assert_eq!(schema.format, "d,d,d");
        assert_eq!(schema.dtype.itemsize, 24);
    }

    #[test]
    fn nested_schema_and_ambiguity() {
        let point = Schema::new(
            vec!["x".into(), "y".into(), "z".into()],
            vec![scalar(Primitive::F8), scalar(Primitive::F8), scalar(Primitive::F8)],
        )
        .unwrap();
        // `event`'s own timestamp leaf is named `id`, colliding with the
        // top-level `id` field.
        let event = Schema::new(
            vec!["id".into(), "point".into()],
            vec![scalar(Primitive::Timestamp), Type::Nested(Box::new(point))],
        )
        .unwrap();
        let top = Schema::new(
            vec!["id".into(), "x".into(), "event".into()],
            vec![
                scalar(Primitive::U4),
                scalar(Primitive::F8),
                Type::Nested(Box::new(event)),
            ],
        )
        .unwrap();

        assert_eq!(
            top.ambiguous_leaves,
            ["id", "x"].into_iter().map(String::from).collect::<HashSet<String>>()
        );
        assert!(!top.xpath_of_leaf.contains_key("x"));
        assert!(!top.xpath_of_leaf.contains_key("id"));
        assert_eq!(top.xpath_of_leaf.get("y"), Some(&"event/point/y".to_string()));
        assert_eq!(top.xpath_of_leaf.get("z"), Some(&"event/point/z".to_string()));

        let expanded = top.expand_shorthand("event/point");
        assert_eq!(
            expanded,
            vec!["event/point/x", "event/point/y", "event/point/z"]
        );
    }

    #[test]
    fn missing_types_is_rejected() {
        let err = Schema::new(vec!["x".into(), "y".into()], vec![scalar(Primitive::F8)]);
        assert!(err.is_err());
    }

    #[test]
    fn slash_in_concise_field_is_rejected() {
        let err = Schema::new(vec!["a/b".into()], vec![scalar(Primitive::F8)]);
        assert!(matches!(err, Err(Error::FieldNameError { .. })));
    }
}
