//! Error kinds surfaced by schema construction, stream construction, and the
//! read/write loop.

use thiserror::Error;

/// Unified error type for the `rowstream` crate.
///
/// Each variant corresponds to one of the error kinds named in the
/// component design: validation failures are raised eagerly by
/// constructors (no partial construction), while I/O failures propagate
/// from the read/write loop unchanged via [`Error::Io`].
#[derive(Debug, Error)]
pub enum Error {
    /// An unknown format token, or an unknown wire-type string.
    #[error("invalid type token: {token:?}")]
    InvalidType {
        /// The offending token.
        token: String,
    },

    /// A run-length or array-shape prefix could not be parsed.
    #[error("malformed shape prefix: {text:?}")]
    MalformedShape {
        /// The text that failed to parse as a shape/count prefix.
        text: String,
    },

    /// `|fields| > |types|` while constructing a schema.
    #[error("{count} field name(s) have no corresponding type")]
    MissingTypes {
        /// Number of fields exceeding the supplied type list.
        count: usize,
    },

    /// An invalid identifier, a reserved name, a forbidden character, or a
    /// duplicate schema field in a stream's effective field list.
    #[error("field name error: {message}")]
    FieldNameError {
        /// Human-readable detail.
        message: String,
    },

    /// Leaf-mode field resolution hit a repeated (ambiguous) leaf.
    #[error("ambiguous leaf name: {leaf:?}")]
    AmbiguousLeaf {
        /// The ambiguous leaf name.
        leaf: String,
    },

    /// Two tied streams disagree on wire mode or delimiter.
    #[error("tied stream mismatch: {message}")]
    TiedMismatch {
        /// Human-readable detail.
        message: String,
    },

    /// A batch/mask shape other than `(n,)`, or a scalar-to-tuple
    /// conversion on a non-singleton batch.
    #[error("shape error: {message}")]
    ShapeError {
        /// Human-readable detail.
        message: String,
    },

    /// Mask length disagrees with the length of the buffered input batch.
    #[error("mask length {mask_len} does not match buffered input length {input_len}")]
    MaskSizeMismatch {
        /// Length of the supplied mask.
        mask_len: usize,
        /// Length of the retained input batch.
        input_len: usize,
    },

    /// `|fields|` disagrees with the format's column count, or a row count
    /// mismatch between tied streams.
    #[error("arity mismatch: expected {expected}, got {got}")]
    ArityMismatch {
        /// Expected column/row count.
        expected: usize,
        /// Observed column/row count.
        got: usize,
    },

    /// Attempted to write a primitive type the ascii writer cannot format.
    #[error("cannot write type {type_name} as text in column {column:?}")]
    UnsupportedTypeForText {
        /// Name of the offending type.
        type_name: &'static str,
        /// Column (full xpath) being written.
        column: String,
    },

    /// A negative read size was requested against a non-seekable source
    /// (stdin).
    #[error("negative read size is not supported when reading from stdin")]
    InvalidSize,

    /// An I/O failure from the underlying reader/writer.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Wraps a [`Error::FieldNameError`] with the context of a column.
    pub fn at_column(self, xpath: &str) -> Error {
        match self {
            Error::FieldNameError { message } => Error::FieldNameError {
                message: format!("{xpath}: {message}"),
            },
            other => other,
        }
    }

    /// Builds an [`Error::InvalidType`] for the given token.
    pub fn invalid_type(token: impl Into<String>) -> Error {
        Error::InvalidType {
            token: token.into(),
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
