//! Sandboxed per-batch expression evaluation over [`rowstream`] streams:
//! assignment-target field inference, a restricted-by-default `rhai`
//! engine, and the update/output/select/exit-if evaluation loops backing
//! the `csv-eval` binary.

pub mod engine;
pub mod error;
pub mod infer;
pub mod pipeline;
pub mod shutdown;

pub use error::{EvalError, Result};
pub use pipeline::{EvalOptions, EvalPipeline};
