//! Builder for wire-format messages.
//!
//! [`Encoder`] appends typed fields to a growable buffer. By default a field
//! whose value is the zero value of its type (including an empty nested
//! message) is not written at all; [`Encoder::with_keep_zeroes`] turns that
//! off.
//!
//! ```
//! use protocanon_core::Encoder;
//!
//! let mut enc = Encoder::new();
//! enc.uint64(1, 150).string(2, "hi");
//! enc.message(3, |m| {
//!     m.bool(1, true);
//! });
//! assert_eq!(
//!     enc.encoding(),
//!     [0x08, 0x96, 0x01, 0x12, 0x02, b'h', b'i', 0x1A, 0x02, 0x08, 0x01]
//! );
//! ```

use crate::scanner::{encode_varint, make_key, zigzag_encode, WireType};
use bytes::{BufMut, Bytes, BytesMut};
use std::io;
use std::ops::{Deref, DerefMut};

/// Accumulates wire-format fields until flushed
#[derive(Debug, Clone, Default)]
pub struct Encoder {
    buf: BytesMut,
    keep_zeroes: bool,
}

impl Encoder {
    /// Creates an empty encoder that omits zero-valued fields
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether zero-valued fields are written
    pub fn with_keep_zeroes(mut self, keep: bool) -> Self {
        self.keep_zeroes = keep;
        self
    }

    /// Changes whether zero-valued fields are written
    pub fn set_keep_zeroes(&mut self, keep: bool) {
        self.keep_zeroes = keep;
    }

    /// Returns true if zero-valued fields are written
    pub fn keeps_zeroes(&self) -> bool {
        self.keep_zeroes
    }

    /// Appends a boolean field (varint 0 or 1)
    pub fn bool(&mut self, tag: u64, value: bool) -> &mut Self {
        if value || self.keep_zeroes {
            self.put_varint_field(tag, u64::from(value));
        }
        self
    }

    /// Appends an unsigned integer field (varint)
    pub fn uint64(&mut self, tag: u64, value: u64) -> &mut Self {
        if value != 0 || self.keep_zeroes {
            self.put_varint_field(tag, value);
        }
        self
    }

    /// Appends a signed integer field (zigzag varint, as `sint64`)
    pub fn int64(&mut self, tag: u64, value: i64) -> &mut Self {
        if value != 0 || self.keep_zeroes {
            self.put_varint_field(tag, zigzag_encode(value));
        }
        self
    }

    /// Appends a 32-bit float field (fixed32)
    pub fn float32(&mut self, tag: u64, value: f32) -> &mut Self {
        if value != 0.0 || self.keep_zeroes {
            self.put_key(tag, WireType::Fixed32);
            self.buf.put_u32_le(value.to_bits());
        }
        self
    }

    /// Appends a 64-bit float field (fixed64)
    pub fn float64(&mut self, tag: u64, value: f64) -> &mut Self {
        if value != 0.0 || self.keep_zeroes {
            self.put_key(tag, WireType::Fixed64);
            self.buf.put_u64_le(value.to_bits());
        }
        self
    }

    /// Appends a byte string field (length-delimited)
    pub fn bytes(&mut self, tag: u64, value: &[u8]) -> &mut Self {
        if !value.is_empty() || self.keep_zeroes {
            self.put_len_field(tag, value);
        }
        self
    }

    /// Appends a UTF-8 string field (length-delimited)
    pub fn string(&mut self, tag: u64, value: &str) -> &mut Self {
        self.bytes(tag, value.as_bytes())
    }

    /// Appends a nested message field.
    ///
    /// `f` populates a fresh child encoder that inherits the keep-zeroes
    /// setting. An empty child counts as a zero value.
    pub fn message<F>(&mut self, tag: u64, f: F) -> &mut Self
    where
        F: FnOnce(&mut Encoder),
    {
        let mut child = Encoder::new().with_keep_zeroes(self.keep_zeroes);
        f(&mut child);
        self.embed(tag, &child);
        self
    }

    /// Opens a scoped nested message that is embedded under `tag` when
    /// [`MessageScope::finish`] is called.
    pub fn begin_message(&mut self, tag: u64) -> MessageScope<'_> {
        MessageScope {
            encoder: Encoder::new().with_keep_zeroes(self.keep_zeroes),
            tag,
            parent: Some(self),
        }
    }

    /// Writes the current encoding to `w` and empties the encoder.
    ///
    /// Returns the number of bytes written. On error the encoding is kept.
    pub fn write_to<W: io::Write>(&mut self, w: &mut W) -> io::Result<usize> {
        w.write_all(&self.buf)?;
        let written = self.buf.len();
        self.buf.clear();
        Ok(written)
    }

    /// Takes the current encoding, leaving the encoder empty
    pub fn take(&mut self) -> Bytes {
        self.buf.split().freeze()
    }

    /// Discards the current encoding
    pub fn reset(&mut self) {
        self.buf.clear();
    }

    /// Returns the current encoding without consuming it
    pub fn encoding(&self) -> &[u8] {
        &self.buf
    }

    /// Length of the current encoding in bytes
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Returns true if nothing has been encoded
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    fn embed(&mut self, tag: u64, child: &Encoder) {
        if !child.is_empty() || self.keep_zeroes {
            self.put_len_field(tag, child.encoding());
        }
    }

    fn put_key(&mut self, tag: u64, wire_type: WireType) {
        encode_varint(make_key(tag, wire_type), &mut self.buf);
    }

    fn put_varint_field(&mut self, tag: u64, value: u64) {
        self.put_key(tag, WireType::Varint);
        encode_varint(value, &mut self.buf);
    }

    fn put_len_field(&mut self, tag: u64, data: &[u8]) {
        self.put_key(tag, WireType::LengthDelimited);
        encode_varint(data.len() as u64, &mut self.buf);
        self.buf.put_slice(data);
    }
}

/// A nested message under construction.
///
/// Dereferences to an [`Encoder`] for adding fields. Call [`finish`] to
/// embed the message into the encoder that opened it; dropping the scope
/// without finishing discards its fields.
///
/// [`finish`]: MessageScope::finish
#[derive(Debug)]
pub struct MessageScope<'p> {
    encoder: Encoder,
    tag: u64,
    parent: Option<&'p mut Encoder>,
}

impl MessageScope<'static> {
    /// Creates a scope with no parent encoder.
    ///
    /// Such a scope can be filled and inspected, but calling
    /// [`finish`](MessageScope::finish) on it panics.
    pub fn detached(tag: u64) -> Self {
        Self {
            encoder: Encoder::new(),
            tag,
            parent: None,
        }
    }
}

impl MessageScope<'_> {
    /// Tag the message is embedded under
    pub fn tag(&self) -> u64 {
        self.tag
    }

    /// Returns true if the scope has a parent to finish into
    pub fn has_parent(&self) -> bool {
        self.parent.is_some()
    }

    /// Embeds the message into its parent.
    ///
    /// The field is always written, even when the message has no fields and
    /// the parent omits zero values.
    ///
    /// # Panics
    ///
    /// Panics if the scope has no parent.
    pub fn finish(self) {
        let Some(parent) = self.parent else {
            panic!("message scope for tag {} has no parent encoder", self.tag);
        };
        parent.put_len_field(self.tag, self.encoder.encoding());
    }
}

impl Deref for MessageScope<'_> {
    type Target = Encoder;

    fn deref(&self) -> &Encoder {
        &self.encoder
    }
}

impl DerefMut for MessageScope<'_> {
    fn deref_mut(&mut self) -> &mut Encoder {
        &mut self.encoder
    }
}
