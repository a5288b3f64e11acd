//! A typed record-streaming engine for delimited text ("ascii") and
//! fixed-layout binary streams whose records conform to a user-declared,
//! possibly nested, schema.
//!
//! The crate is organized leaves-first, mirroring the component design:
//!
//! - [`format`] — the compact domain format alphabet and its mapping
//!   onto the wire-type vocabulary.
//! - [`timestamp`] — textual timestamp conversion.
//! - [`dtype`] — primitive type codes, the [`dtype::Type`] algebra, and
//!   the [`dtype::Dtype`] layout descriptor.
//! - [`record`] — the record buffer allocator: zero-copy reinterpretation
//!   and per-column typed accessors.
//! - [`schema`] — the recursive record-type builder.
//! - [`ascii`] / [`binary`] — the two wire codecs.
//! - [`stream`] — binds a schema to a source/target, including tied
//!   stream composition.
//!
//! # Quick start
//!
//! ```
//! use rowstream::dtype::{Primitive, Type};
//! use rowstream::schema::Schema;
//! use rowstream::stream::{Stream, StreamOptions};
//! use std::io::Cursor;
//!
//! let schema = Schema::new(
//!     vec!["x".into(), "y".into(), "z".into()],
//!     vec![
//!         Type::Scalar(Primitive::F8),
//!         Type::Scalar(Primitive::F8),
//!         Type::Scalar(Primitive::F8),
//!     ],
//! )
//! .unwrap();
//!
//! let source: Box<dyn std::io::BufRead> = Box::new(Cursor::new(b"1,2,3\n".to_vec()));
//! let mut stream = Stream::new(schema, Some(source), None, StreamOptions::default(), None).unwrap();
//! let batch = stream.read(None).unwrap().unwrap();
//! assert_eq!(batch.len, 1);
//! ```

pub mod ascii;
pub mod binary;
pub mod dtype;
pub mod error;
pub mod format;
pub mod record;
pub mod schema;
pub mod stream;
pub mod timestamp;

pub use error::{Error, Result};
