//! Field-by-field lexing of protobuf wire format.
//!
//! A [`Scanner`] walks a byte buffer one field at a time without consulting a
//! schema. Each successful advance exposes the field's tag, wire type, and two
//! byte spans: the complete field (key, any length prefix, and value) and the
//! value alone. The spans of consecutive fields are contiguous, so
//! concatenating every field span in order reproduces the buffer.
//!
//! Reaching the exact end of the buffer is a clean termination (`Ok(None)`)
//! and is distinct from every error.
//!
//! ```
//! use protocanon_core::scanner::{Scanner, WireType};
//!
//! // Field 1 = varint 150, field 2 = "hi"
//! let data = [0x08, 0x96, 0x01, 0x12, 0x02, b'h', b'i'];
//! let mut scanner = Scanner::new(&data);
//!
//! let first = scanner.next_field()?.unwrap();
//! assert_eq!(first.tag(), 1);
//! assert_eq!(first.wire_type(), WireType::Varint);
//!
//! let second = scanner.next_field()?.unwrap();
//! assert_eq!(second.value(), b"hi");
//! assert_eq!(second.field(), &data[3..]);
//!
//! assert!(scanner.next_field()?.is_none());
//! # Ok::<(), protocanon_core::Error>(())
//! ```

mod wire;

use crate::error::{Error, Result};
use std::iter::FusedIterator;
use std::ops::Range;

pub use wire::{
    decode_varint, encode_varint, make_key, varint_len, zigzag_decode, zigzag_encode, WireType,
    MAX_VARINT_LEN,
};

/// A single lexed field, borrowed from the scanned buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WireField<'a> {
    src: &'a [u8],
    tag: u64,
    wire_type: WireType,
    start: usize,
    value_start: usize,
    end: usize,
}

impl<'a> WireField<'a> {
    /// Returns the tag number
    pub fn tag(&self) -> u64 {
        self.tag
    }

    /// Returns the wire type
    pub fn wire_type(&self) -> WireType {
        self.wire_type
    }

    /// Returns true for length-delimited fields (bytes, strings, messages)
    pub fn is_length_delimited(&self) -> bool {
        self.wire_type == WireType::LengthDelimited
    }

    /// Byte range of the complete field, including key and length prefix
    pub fn field_range(&self) -> Range<usize> {
        self.start..self.end
    }

    /// Byte range of the value only
    pub fn value_range(&self) -> Range<usize> {
        self.value_start..self.end
    }

    /// The complete field bytes
    pub fn field(&self) -> &'a [u8] {
        &self.src[self.field_range()]
    }

    /// The value bytes, without key or length prefix
    pub fn value(&self) -> &'a [u8] {
        &self.src[self.value_range()]
    }
}

/// Cursor over a buffer of protobuf wire-format fields.
///
/// The scanner never modifies the buffer it borrows. Field state is
/// overwritten on every advance; [`WireField`] values returned earlier stay
/// valid because they borrow the buffer, not the scanner.
#[derive(Debug, Clone)]
pub struct Scanner<'a> {
    src: &'a [u8],
    tag: u64,
    wire_type: Option<WireType>,
    // pos <= dpos <= end <= src.len()
    pos: usize,
    dpos: usize,
    end: usize,
    finished: bool,
}

impl<'a> Scanner<'a> {
    /// Creates a scanner positioned at the start of `src`
    pub fn new(src: &'a [u8]) -> Self {
        Self {
            src,
            tag: 0,
            wire_type: None,
            pos: 0,
            dpos: 0,
            end: 0,
            finished: false,
        }
    }

    /// Advances to the next field.
    ///
    /// Returns `Ok(None)` once the buffer is exhausted exactly. On error the
    /// cursor stays at the offending field, so repeated calls report the
    /// same error.
    pub fn next_field(&mut self) -> Result<Option<WireField<'a>>> {
        self.pos = self.end;
        self.dpos = self.end;
        self.tag = 0;
        self.wire_type = None;

        if self.pos >= self.src.len() {
            return Ok(None);
        }

        let (tag, wire_type, dpos, end) = lex_field(self.src, self.pos)?;
        self.tag = tag;
        self.wire_type = Some(wire_type);
        self.dpos = dpos;
        self.end = end;

        Ok(self.current())
    }

    /// Returns the field produced by the most recent successful advance
    pub fn current(&self) -> Option<WireField<'a>> {
        self.wire_type.map(|wire_type| WireField {
            src: self.src,
            tag: self.tag,
            wire_type,
            start: self.pos,
            value_start: self.dpos,
            end: self.end,
        })
    }

    /// Wire type of the current field
    pub fn wire_type(&self) -> Option<WireType> {
        self.wire_type
    }

    /// Tag number of the current field (0 when there is none)
    pub fn tag(&self) -> u64 {
        self.tag
    }

    /// Complete bytes of the current field (empty when there is none)
    pub fn field(&self) -> &'a [u8] {
        &self.src[self.field_range()]
    }

    /// Value bytes of the current field (empty when there is none)
    pub fn value(&self) -> &'a [u8] {
        &self.src[self.value_range()]
    }

    /// Byte range of the current field
    pub fn field_range(&self) -> Range<usize> {
        if self.wire_type.is_some() {
            self.pos..self.end
        } else {
            self.pos..self.pos
        }
    }

    /// Byte range of the current field's value
    pub fn value_range(&self) -> Range<usize> {
        if self.wire_type.is_some() {
            self.dpos..self.end
        } else {
            self.pos..self.pos
        }
    }

    /// Number of bytes consumed by fully lexed fields
    pub fn position(&self) -> usize {
        self.end
    }
}

impl<'a> Iterator for Scanner<'a> {
    type Item = Result<WireField<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        match self.next_field() {
            Ok(Some(field)) => Some(Ok(field)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

impl FusedIterator for Scanner<'_> {}

/// Lexes every field of `data`.
///
/// Succeeds only if the whole buffer is a sequence of well-formed fields. An
/// empty buffer yields an empty list.
pub fn parse_frame(data: &[u8]) -> Result<Vec<WireField<'_>>> {
    Scanner::new(data).collect()
}

/// Lexes one field starting at `pos`, returning its tag, wire type, value
/// start and end offsets.
fn lex_field(src: &[u8], pos: usize) -> Result<(u64, WireType, usize, usize)> {
    let (key, key_len) = decode_varint(&src[pos..]).map_err(|_| Error::malformed_varint(pos))?;

    let code = (key & 0x07) as u8;
    let tag = key >> 3;
    let wire_type = WireType::try_from(code).map_err(|_| Error::invalid_wire_type(pos, code))?;

    let mut dpos = pos + key_len;
    let end = match wire_type {
        WireType::Varint => {
            let (_, len) =
                decode_varint(&src[dpos..]).map_err(|_| Error::malformed_varint(dpos))?;
            dpos + len
        }
        WireType::Fixed64 => fixed_end(src, dpos, 8)?,
        WireType::Fixed32 => fixed_end(src, dpos, 4)?,
        WireType::LengthDelimited => {
            let (length, prefix_len) =
                decode_varint(&src[dpos..]).map_err(|_| Error::malformed_varint(dpos))?;
            dpos += prefix_len;

            let available = src.len() - dpos;
            if length > available as u64 {
                return Err(Error::truncated_value(dpos, length, available));
            }
            dpos + length as usize
        }
    };

    Ok((tag, wire_type, dpos, end))
}

fn fixed_end(src: &[u8], dpos: usize, width: usize) -> Result<usize> {
    let available = src.len() - dpos;
    if available < width {
        return Err(Error::truncated_value(dpos, width as u64, available));
    }
    Ok(dpos + width)
}
