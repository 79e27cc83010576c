//! # protocanon-core
//!
//! Schema-less canonicalization of Protocol Buffer wire-format messages.
//!
//! Two encodings of the same message can differ in field order and in the
//! order of repeated values. This crate rewrites any such encoding into a
//! single canonical byte string, so payloads can be deduplicated or
//! content-addressed without a `.proto` schema.
//!
//! ## Architecture
//!
//! - [`scanner`]: field-by-field lexing of wire format and varint primitives
//! - [`canonical`]: the recursive sort-and-rewrite canonicalizer
//! - [`encoder`]: a builder producing wire-format bytes
//! - [`error`]: scan error types
//!
//! ## Example
//!
//! ```
//! use protocanon_core::{canonical, Encoder};
//!
//! let mut a = Encoder::new();
//! a.string(2, "oak").bool(1, true);
//!
//! let mut b = Encoder::new();
//! b.bool(1, true).string(2, "oak");
//!
//! assert_ne!(a.encoding(), b.encoding());
//! assert_eq!(canonical(a.encoding()), canonical(b.encoding()));
//! ```
//!
//! Input that does not parse as wire format is returned unchanged, so
//! [`canonical`] can be applied to arbitrary bytes.

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unreachable_pub)]

pub mod canonical;
pub mod encoder;
pub mod error;
pub mod scanner;

// Re-export primary types for convenience
pub use canonical::{canonical, CanonicalConfig, Canonicalizer};
pub use encoder::{Encoder, MessageScope};
pub use error::{Error, Result};
pub use scanner::{parse_frame, Scanner, WireField, WireType};

/// Crate version for programmatic access
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
