//! Assignment-target field inference: given an expression string, finds
//! every name assigned at the top level, preserving first-appearance
//! order and removing duplicates — the Rust equivalent of walking the
//! parsed statement list and collecting `Assign`/`AugAssign` targets.
//!
//! This is a statement-level scanner, not a full expression-language
//! parser: the evaluator's expressions are a fixed arithmetic grammar
//! with `;`-separated assignment statements, so a left-hand-side scan is
//! sufficient and avoids pulling in a separate parser crate just to
//! throw its parse tree away.

use crate::error::{EvalError, Result};

const AUGMENTED_OPS: &[&str] = &["+=", "-=", "*=", "/=", "//=", "**=", "%=", "&=", "|=", "^="];

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Splits `expr` into top-level statements on `;` and newlines.
fn split_statements(expr: &str) -> Vec<&str> {
    expr.split(['\n', ';'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Finds the byte index of the statement's top-level assignment
/// operator, distinguishing it from comparison operators (`==`, `!=`,
/// `<=`, `>=`). Returns `None` if the statement has no assignment (e.g.
/// a trailing boolean condition has no target).
fn find_assignment_op(stmt: &str) -> Option<(usize, usize)> {
    for op in AUGMENTED_OPS {
        if let Some(pos) = stmt.find(op) {
            return Some((pos, op.len()));
        }
    }
    let bytes = stmt.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'=' {
            let prev_eq = i > 0 && bytes[i - 1] == b'=';
            let next_eq = i + 1 < bytes.len() && bytes[i + 1] == b'=';
            let prev_cmp = i > 0 && matches!(bytes[i - 1], b'<' | b'>' | b'!');
            if !prev_eq && !next_eq && !prev_cmp {
                return Some((i, 1));
            }
        }
        i += 1;
    }
    None
}

/// Extracts every top-level assignment target from `expr`, in
/// first-appearance order, deduplicated.
pub fn output_fields_from_expressions(expr: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for stmt in split_statements(expr) {
        let Some((op_pos, op_len)) = find_assignment_op(stmt) else {
            continue;
        };
        let is_augmented = op_len > 1;
        let lhs = stmt[..op_pos].trim();
        if is_augmented {
            if is_identifier(lhs) && seen.insert(lhs.to_string()) {
                out.push(lhs.to_string());
            }
        } else {
            for name in lhs.split(',').map(str::trim) {
                if is_identifier(name) && seen.insert(name.to_string()) {
                    out.push(name.to_string());
                }
            }
        }
        let _ = op_len + op_pos;
    }
    out
}

/// Names reserved by the evaluation engine's own numeric namespace;
/// shadowing them as a field name is forbidden so expressions can always
/// reach `pi`, `sin`, `clip`, etc.
pub const RESERVED_NAMESPACE: &[&str] = &[
    "pi", "e", "sin", "cos", "min", "max", "clip", "where_", "abs", "sqrt", "pow", "count",
    "replace",
];

/// Validates a candidate field/output name: matches `^[A-Za-z_]\w*$`, is
/// not one of `_input`/`_update`/`_output`, and does not collide with the
/// engine's reserved numeric namespace.
pub fn validate_field_name(name: &str) -> Result<()> {
    if !is_identifier(name) {
        return Err(EvalError::FieldNameError(format!(
            "{name:?} is not a valid identifier"
        )));
    }
    if matches!(name, "_input" | "_update" | "_output") {
        return Err(EvalError::FieldNameError(format!(
            "{name:?} is reserved for the evaluator's own batch bindings"
        )));
    }
    if RESERVED_NAMESPACE.contains(&name) {
        return Err(EvalError::FieldNameError(format!(
            "{name:?} collides with the evaluator's numeric namespace"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_assignments_in_order() {
        let fields = output_fields_from_expressions("a=2/(x+y);b=x-sin(y)*a**2");
        assert_eq!(fields, vec!["a", "b"]);
    }

    #[test]
    fn augmented_assignment() {
        let fields = output_fields_from_expressions("x=x+y; y=y-1");
        assert_eq!(fields, vec!["x", "y"]);
    }

    #[test]
    fn comparison_is_not_an_assignment() {
        let fields = output_fields_from_expressions("(a < b - 1) & (b < 4)");
        assert!(fields.is_empty());
    }

    #[test]
    fn reserved_names_rejected() {
        assert!(validate_field_name("_input").is_err());
        assert!(validate_field_name("pi").is_err());
        assert!(validate_field_name("valid_name").is_ok());
        assert!(validate_field_name("1bad").is_err());
    }
}
