//! Errors specific to the expression evaluator: field inference,
//! validation, and sandboxed-expression failures. Wraps [`rowstream::Error`]
//! for everything that originates in the core crate.

use thiserror::Error;

/// Unified error type for the evaluator crate.
#[derive(Debug, Error)]
pub enum EvalError {
    /// Propagated from the core stream engine.
    #[error(transparent)]
    Core(#[from] rowstream::Error),

    /// An exception raised inside the sandboxed expression evaluator,
    /// wrapped with the expression text and, when meaningful, the record
    /// offset.
    #[error("expression error at record {row:?}: {message} (in `{expression}`)")]
    UserExpressionError {
        /// The offending expression text.
        expression: String,
        /// Row offset within the current batch, if known.
        row: Option<usize>,
        /// Underlying message from the evaluation engine.
        message: String,
    },

    /// A validation failure in field-name inference/classification.
    #[error("field name error: {0}")]
    FieldNameError(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, EvalError>;
