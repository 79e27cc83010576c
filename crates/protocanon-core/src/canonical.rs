//! Canonical form for schema-less wire-format messages.
//!
//! The canonical form of a frame is obtained by:
//!
//! 1. Lexing the whole frame. If that fails, or the frame has no fields, the
//!    bytes are opaque and are left exactly as they are.
//! 2. Canonicalizing the value of every length-delimited field in place. This
//!    only happens once the enclosing frame is known to be valid, so a parse
//!    failure later in a frame can never leave a half-permuted value behind.
//! 3. Sorting the fields by tag, then by value bytes, then by complete field
//!    bytes, and writing them back in that order.
//!
//! Sorting permutes whole fields and canonicalization never changes a value's
//! length, so the output is always exactly as long as the input.
//!
//! Because the order depends only on content, the result is idempotent and
//! any two encodings of the same field multiset agree.
//!
//! ## Limitations
//!
//! - Fields holding default (zero) values are kept. Encoders that emit
//!   defaults and encoders that omit them produce different canonical bytes.
//! - A bytes or string field whose contents happen to parse as a message is
//!   permuted as if it were one.

use crate::scanner::parse_frame;
use std::ops::Range;
use tracing::{debug, trace};

/// Default bound on how many levels of nested frames are rewritten
pub const DEFAULT_MAX_DEPTH: usize = 100;

/// Configuration for the canonicalizer
#[derive(Debug, Clone)]
pub struct CanonicalConfig {
    /// Deepest nesting level that is still rewritten. The top-level frame is
    /// level 0; frames below this level are left untouched.
    pub max_depth: usize,
}

impl Default for CanonicalConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl CanonicalConfig {
    /// Creates a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the nesting depth bound
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }
}

/// One field occurrence of a frame, as offsets into that frame
#[derive(Debug, Clone)]
struct Entry {
    tag: u64,
    is_length_delimited: bool,
    field: Range<usize>,
    value: Range<usize>,
}

/// Rewrites wire-format messages into canonical form
#[derive(Debug, Clone, Default)]
pub struct Canonicalizer {
    config: CanonicalConfig,
}

impl Canonicalizer {
    /// Creates a canonicalizer with default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a canonicalizer with custom configuration
    pub fn with_config(config: CanonicalConfig) -> Self {
        Self { config }
    }

    /// Returns the active configuration
    pub fn config(&self) -> &CanonicalConfig {
        &self.config
    }

    /// Returns the canonical form of `msg`.
    ///
    /// Never fails: input that is empty or does not parse as a frame comes
    /// back unchanged. The caller's bytes are never modified.
    pub fn canonicalize(&self, msg: &[u8]) -> Vec<u8> {
        let mut out = msg.to_vec();
        let mut scratch = vec![0u8; msg.len()];

        let rewritten = self.traverse(&mut out, &mut scratch, 0);
        debug!(
            "Canonicalized {} bytes ({} frames rewritten)",
            msg.len(),
            rewritten
        );

        out
    }

    /// Rewrites `msg` in place and returns how many frames were rewritten.
    ///
    /// `scratch` must be at least as long as `msg`; its contents are garbage
    /// afterwards.
    fn traverse(&self, msg: &mut [u8], scratch: &mut [u8], depth: usize) -> usize {
        let mut entries: Vec<Entry> = match parse_frame(msg) {
            Ok(fields) if !fields.is_empty() => fields
                .into_iter()
                .map(|field| Entry {
                    tag: field.tag(),
                    is_length_delimited: field.is_length_delimited(),
                    field: field.field_range(),
                    value: field.value_range(),
                })
                .collect(),
            Ok(_) => return 0,
            Err(e) => {
                trace!("Leaving {} bytes at depth {} opaque: {}", msg.len(), depth, e);
                return 0;
            }
        };

        let mut rewritten = 1;
        if depth < self.config.max_depth {
            for entry in entries.iter().filter(|e| e.is_length_delimited) {
                rewritten += self.traverse(&mut msg[entry.value.clone()], scratch, depth + 1);
            }
        } else {
            trace!("Depth limit {} reached, not descending", self.config.max_depth);
        }

        let frame: &[u8] = msg;
        entries.sort_by(|a, b| {
            a.tag
                .cmp(&b.tag)
                .then_with(|| frame[a.value.clone()].cmp(&frame[b.value.clone()]))
                .then_with(|| frame[a.field.clone()].cmp(&frame[b.field.clone()]))
        });

        let len = frame.len();
        let mut pos = 0;
        for entry in &entries {
            let field = &frame[entry.field.clone()];
            scratch[pos..pos + field.len()].copy_from_slice(field);
            pos += field.len();
        }
        assert_eq!(pos, len, "canonical rewrite changed the frame length");

        msg.copy_from_slice(&scratch[..len]);
        rewritten
    }
}

/// Returns the canonical form of `msg` using the default configuration.
///
/// ```
/// use protocanon_core::canonical;
///
/// // Field 2 = 1 followed by field 1 = 1
/// let out = canonical(&[0x10, 0x01, 0x08, 0x01]);
/// assert_eq!(out, [0x08, 0x01, 0x10, 0x01]);
///
/// // Not a message: returned as is
/// assert_eq!(canonical(b"\xff"), b"\xff");
/// ```
pub fn canonical(msg: &[u8]) -> Vec<u8> {
    Canonicalizer::new().canonicalize(msg)
}
