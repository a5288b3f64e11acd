//! The compact domain format alphabet and its mapping onto wire-type
//! strings.
//!
//! Alphabet: `b, ub, w, uw, i, ui, l, ul, f, d, t, s[N]`, each optionally
//! prefixed by a decimal run-length count (`3d` == `d,d,d`). The wire-type
//! vocabulary is `i1,u1,i2,u2,i4,u4,i8,u8,f4,f8,SN,M8[us]`.
//!
//! `expand`, `compress`, `to_wire`, `from_wire` operate on format
//! strings; `types_of_dtype` is the same descent applied to an already
//! compiled [`Dtype`] rather than a raw string.

use crate::dtype::Dtype;
use crate::error::{Error, Result};

const TABLE: &[(&str, &str)] = &[
    ("b", "i1"),
    ("ub", "u1"),
    ("w", "i2"),
    ("uw", "u2"),
    ("i", "i4"),
    ("ui", "u4"),
    ("l", "i8"),
    ("ul", "u8"),
    ("f", "f4"),
    ("d", "f8"),
    ("t", "M8[us]"),
];

fn strip_byte_order_prefix(token: &str) -> &str {
    token
        .strip_prefix(['<', '>', '|', '='])
        .unwrap_or(token)
}

/// Splits a leading decimal run-length count off a token, e.g. `"3d"` ->
/// `(3, "d")`; a token with no leading digits returns count `1`.
fn split_count(token: &str) -> (usize, &str) {
    let digits: String = token.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        (1, token)
    } else {
        let rest = &token[digits.len()..];
        (digits.parse().unwrap_or(1), rest)
    }
}

/// Splits `s` on commas, expanding any run-length prefix (`3d` -> three
/// `d` tokens). Tokens are returned verbatim otherwise; no validation is
/// performed at this step.
pub fn expand(s: &str) -> Vec<String> {
    if s.is_empty() {
        return Vec::new();
    }
    let mut out = Vec::new();
    for raw in s.split(',') {
        let (count, rest) = split_count(raw);
        for _ in 0..count {
            out.push(rest.to_string());
        }
    }
    out
}

/// Expands `s`, then run-length-encodes consecutive identical tokens as
/// `nT` (a run of one collapses to the bare token).
pub fn compress(s: &str) -> String {
    let tokens = expand(s);
    let mut out: Vec<String> = Vec::new();
    let mut i = 0;
    while i < tokens.len() {
        let mut run = 1;
        while i + run < tokens.len() && tokens[i + run] == tokens[i] {
            run += 1;
        }
        if run > 1 {
            out.push(format!("{run}{}", tokens[i]));
        } else {
            out.push(tokens[i].clone());
        }
        i += run;
    }
    out.join(",")
}

/// Maps a single compact-alphabet token to its wire-type string.
pub fn token_to_wire(token: &str) -> Result<String> {
    let token = strip_byte_order_prefix(token);
    if let Some(stripped) = token.strip_prefix("s[").and_then(|r| r.strip_suffix(']')) {
        let n: usize = stripped
            .parse()
            .map_err(|_| Error::invalid_type(token))?;
        return Ok(format!("S{n}"));
    }
    // `m8[us]` (timedelta) has no single-letter compact spelling in the
    // alphabet spec.md names; it passes through verbatim, the same way
    // `s[N]` passes through rather than mapping via `TABLE`.
    if token == "m8[us]" {
        return Ok("m8[us]".to_string());
    }
    for (compact, wire) in TABLE {
        if *compact == token {
            return Ok((*wire).to_string());
        }
    }
    Err(Error::invalid_type(token))
}

/// Maps a single wire-type token back to the compact alphabet, unrolling
/// an `(a,b,...)T` shape prefix into `a*b*...` copies of `T` first.
pub fn token_from_wire(token: &str) -> Result<Vec<String>> {
    let token = strip_byte_order_prefix(token);
    if let Some(rest) = token.strip_prefix('(') {
        let (shape, ty) = rest
            .split_once(')')
            .ok_or_else(|| Error::invalid_type(token))?;
        let count: usize = shape
            .split(',')
            .map(|d| d.trim().parse::<usize>())
            .try_fold(1usize, |acc, d| d.map(|d| acc * d))
            .map_err(|_| Error::invalid_type(token))?;
        let single = wire_token_from_wire(ty)?;
        return Ok(std::iter::repeat(single).take(count).collect());
    }
    Ok(vec![wire_token_from_wire(token)?])
}

fn wire_token_from_wire(token: &str) -> Result<String> {
    if let Some(stripped) = token.strip_prefix('S') {
        if let Ok(n) = stripped.parse::<usize>() {
            return Ok(format!("s[{n}]"));
        }
    }
    if token == "m8[us]" {
        return Ok("m8[us]".to_string());
    }
    for (compact, wire) in TABLE {
        if *wire == token {
            return Ok((*compact).to_string());
        }
    }
    Err(Error::invalid_type(token))
}

/// Expands `s`, then maps every token to its wire-type string.
pub fn to_wire(s: &str) -> Result<Vec<String>> {
    expand(s).iter().map(|t| token_to_wire(t)).collect()
}

/// Inverse of [`to_wire`]: expands any array-shape prefixes found in `s`
/// and maps each resulting wire token back to the compact alphabet.
pub fn from_wire(s: &str) -> Result<Vec<String>> {
    let mut out = Vec::new();
    for raw in s.split(',').filter(|t| !t.is_empty()) {
        out.extend(token_from_wire(raw)?);
    }
    Ok(out)
}

/// Recursively descends `dtype`'s columns, yielding one compact-alphabet
/// token per leaf: `unroll=false` yields a shape-prefixed single token
/// per column (an array column's `count` run-length-prefixes its scalar
/// token, e.g. `"3d"`); `unroll=true` yields `count` copies of the
/// unshaped scalar token instead, one per slot.
pub fn types_of_dtype(dtype: &Dtype, unroll: bool) -> Vec<String> {
    let mut out = Vec::with_capacity(dtype.columns.len());
    for col in &dtype.columns {
        let token = col.prim.to_compact_token();
        if unroll {
            out.extend(std::iter::repeat(token).take(col.count));
        } else if col.count > 1 {
            out.push(format!("{}{token}", col.count));
        } else {
            out.push(token);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_runs() {
        assert_eq!(
            expand("3d,2ub,s[5]"),
            vec!["d", "d", "d", "ub", "ub", "s[5]"]
        );
    }

    #[test]
    fn compress_runs() {
        assert_eq!(compress("d,d,d,ub,ub,s[5]"), "3d,2ub,s[5]");
    }

    #[test]
    fn to_wire_table() {
        assert_eq!(
            to_wire("3d,2ub,s[5]").unwrap(),
            vec!["f8", "f8", "f8", "u1", "u1", "S5"]
        );
    }

    #[test]
    fn from_wire_array_shape() {
        assert_eq!(from_wire("(2,3)f8").unwrap(), vec!["d", "d", "d", "d", "d", "d"]);
    }

    #[test]
    fn unknown_token_errors() {
        assert!(token_to_wire("zz").is_err());
    }

    #[test]
    fn timedelta_passthrough_round_trips() {
        assert_eq!(token_to_wire("m8[us]").unwrap(), "m8[us]");
        assert_eq!(wire_token_from_wire("m8[us]").unwrap(), "m8[us]");
    }

    #[test]
    fn types_of_dtype_shaped_vs_unrolled() {
        use crate::dtype::Primitive;
        let dtype = Dtype::from_columns(vec![
            ("a".to_string(), Primitive::F8, 3),
            ("b".to_string(), Primitive::U1, 1),
        ]);
        assert_eq!(types_of_dtype(&dtype, false), vec!["3d", "ub"]);
        assert_eq!(
            types_of_dtype(&dtype, true),
            vec!["d", "d", "d", "ub"]
        );
    }

    #[test]
    fn byte_order_prefix_stripped() {
        assert_eq!(token_to_wire("<d").unwrap(), "f8");
        assert_eq!(wire_token_from_wire(">f8").unwrap(), "d");
    }
}
