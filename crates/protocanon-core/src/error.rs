//! Error types for the protocanon-core library.
//!
//! Every variant describes a wire-format scan failure and carries the byte
//! offset at which it was detected. Canonicalization itself never surfaces
//! these; they are visible through the [`Scanner`](crate::Scanner) API.

use thiserror::Error;

/// Result type alias for protocanon operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error reported while lexing protobuf wire format
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// A key, length prefix or varint value did not terminate within the
    /// buffer, or overflowed 64 bits
    #[error("malformed varint at offset {offset}")]
    MalformedVarint {
        /// Byte offset where the varint starts
        offset: usize,
    },

    /// The low three bits of a field key select an unsupported wire type
    #[error("invalid wire type {wire_type} at offset {offset}")]
    InvalidWireType {
        /// Byte offset of the field key
        offset: usize,
        /// The rejected wire type code
        wire_type: u8,
    },

    /// A field value extends past the end of the buffer
    #[error("truncated field value at offset {offset}: need {needed} bytes, have {available}")]
    TruncatedValue {
        /// Byte offset where the value starts
        offset: usize,
        /// Number of bytes the field declares or implies
        needed: u64,
        /// Number of bytes left in the buffer
        available: usize,
    },
}

impl Error {
    /// Creates a new malformed varint error
    pub fn malformed_varint(offset: usize) -> Self {
        Self::MalformedVarint { offset }
    }

    /// Creates a new invalid wire type error
    pub fn invalid_wire_type(offset: usize, wire_type: u8) -> Self {
        Self::InvalidWireType { offset, wire_type }
    }

    /// Creates a new truncated value error
    pub fn truncated_value(offset: usize, needed: u64, available: usize) -> Self {
        Self::TruncatedValue {
            offset,
            needed,
            available,
        }
    }

    /// Returns the byte offset at which the error was detected
    pub fn offset(&self) -> usize {
        match *self {
            Self::MalformedVarint { offset }
            | Self::InvalidWireType { offset, .. }
            | Self::TruncatedValue { offset, .. } => offset,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::invalid_wire_type(3, 7);
        assert_eq!(err.to_string(), "invalid wire type 7 at offset 3");

        let err = Error::truncated_value(2, 10, 4);
        assert!(err.to_string().contains("need 10 bytes, have 4"));
    }

    #[test]
    fn test_offset() {
        assert_eq!(Error::malformed_varint(0).offset(), 0);
        assert_eq!(Error::invalid_wire_type(5, 6).offset(), 5);
        assert_eq!(Error::truncated_value(9, 1, 0).offset(), 9);
    }
}
