//! Wire format encoding and decoding.
//!
//! Every frame starts with a 17-byte fixed header:
//! ```text
//! ┌───────┬────────────┬────────────┐
//! │ Trace │ Header len │ Message ID │
//! │ 1 byte│ 8 bytes    │ 8 bytes    │
//! │       │ int64 BE   │ int64 BE   │
//! └───────┴────────────┴────────────┘
//! ```
//!
//! It is followed by `header_len` bytes of JSON header values, the trace
//! carrier when the trace byte is [`trace_flag::ENABLED`], an 8-byte body
//! length (int64 BE) and the body itself.
//!
//! There is no magic number or version byte; framing is positional.

use crate::error::{FramewireError, Result};

/// Fixed header size in bytes (exactly 17).
pub const FIXED_HEADER_SIZE: usize = 1 + 8 + 8;

/// Size of the body length prefix.
pub const LENGTH_PREFIX_SIZE: usize = 8;

/// Default maximum size of a single header or body section (64 MB).
pub const DEFAULT_MAX_SECTION_SIZE: u64 = 64 * 1024 * 1024;

/// Absolute maximum section size (max i64).
pub const ABSOLUTE_MAX_SECTION_SIZE: u64 = i64::MAX as u64;

/// Values of the trace byte.
pub mod trace_flag {
    /// No trace carrier follows the header values.
    pub const DISABLED: u8 = 0;
    /// A trace carrier follows the header values.
    pub const ENABLED: u8 = 1;

    /// Only [`ENABLED`] turns tracing on; any other value reads as disabled.
    #[inline]
    pub fn is_enabled(flag: u8) -> bool {
        flag == ENABLED
    }

    /// Trace byte for a boolean.
    #[inline]
    pub fn from_bool(trace: bool) -> u8 {
        if trace {
            ENABLED
        } else {
            DISABLED
        }
    }
}

/// Decoded fixed header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedHeader {
    /// Trace byte (see [`trace_flag`]).
    pub trace_flag: u8,
    /// Length of the JSON header values.
    pub header_len: i64,
    /// Message identifier; selects the handler chain.
    pub message_id: i64,
}

impl FixedHeader {
    /// Create a new fixed header.
    pub fn new(trace_flag: u8, header_len: i64, message_id: i64) -> Self {
        Self {
            trace_flag,
            header_len,
            message_id,
        }
    }

    /// Encode to bytes (Big Endian).
    ///
    /// # Example
    ///
    /// ```
    /// use framewire::protocol::{FixedHeader, trace_flag};
    ///
    /// let header = FixedHeader::new(trace_flag::DISABLED, 2, 42);
    /// let bytes = header.encode();
    /// assert_eq!(bytes.len(), 17);
    /// assert_eq!(bytes[16], 42);
    /// ```
    pub fn encode(&self) -> [u8; FIXED_HEADER_SIZE] {
        let mut buf = [0u8; FIXED_HEADER_SIZE];
        self.encode_into(&mut buf);
        buf
    }

    /// Encode into an existing buffer.
    ///
    /// # Panics
    ///
    /// Panics if buffer is smaller than `FIXED_HEADER_SIZE` (17 bytes).
    pub fn encode_into(&self, buf: &mut [u8]) {
        buf[0] = self.trace_flag;
        buf[1..9].copy_from_slice(&self.header_len.to_be_bytes());
        buf[9..17].copy_from_slice(&self.message_id.to_be_bytes());
    }

    /// Decode from bytes (Big Endian).
    ///
    /// Returns `None` if buffer is too short.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < FIXED_HEADER_SIZE {
            return None;
        }
        let mut len = [0u8; 8];
        let mut id = [0u8; 8];
        len.copy_from_slice(&buf[1..9]);
        id.copy_from_slice(&buf[9..17]);
        Some(Self {
            trace_flag: buf[0],
            header_len: i64::from_be_bytes(len),
            message_id: i64::from_be_bytes(id),
        })
    }

    /// Whether a trace carrier follows the header values.
    #[inline]
    pub fn is_traced(&self) -> bool {
        trace_flag::is_enabled(self.trace_flag)
    }
}

/// Check a declared section length and convert it to a buffer size.
///
/// Negative lengths and lengths over `max` are rejected.
pub fn validate_length(section: &'static str, len: i64, max: u64) -> Result<usize> {
    if len < 0 {
        return Err(FramewireError::InvalidLength { section, len });
    }
    if len as u64 > max {
        return Err(FramewireError::FrameTooLarge { section, len, max });
    }
    usize::try_from(len).map_err(|_| FramewireError::FrameTooLarge { section, len, max })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_header_roundtrip() {
        let original = FixedHeader::new(trace_flag::ENABLED, 1234, -7);
        let decoded = FixedHeader::decode(&original.encode()).unwrap();
        assert_eq!(original, decoded);
        assert!(decoded.is_traced());
    }

    #[test]
    fn test_big_endian_byte_order() {
        let header = FixedHeader::new(0x01, 0x0102_0304_0506_0708, 0x1112_1314_1516_1718);
        let bytes = header.encode();

        assert_eq!(bytes[0], 0x01);
        assert_eq!(&bytes[1..9], &[0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08]);
        assert_eq!(&bytes[9..17], &[0x11, 0x12, 0x13, 0x14, 0x15, 0x16, 0x17, 0x18]);
    }

    #[test]
    fn test_decode_too_short_buffer() {
        let buf = [0u8; FIXED_HEADER_SIZE - 1];
        assert!(FixedHeader::decode(&buf).is_none());
    }

    #[test]
    fn test_only_enabled_byte_traces() {
        assert!(!FixedHeader::new(trace_flag::DISABLED, 0, 1).is_traced());
        assert!(!FixedHeader::new(2, 0, 1).is_traced());
        assert_eq!(trace_flag::from_bool(true), trace_flag::ENABLED);
        assert_eq!(trace_flag::from_bool(false), trace_flag::DISABLED);
    }

    #[test]
    fn test_validate_length() {
        assert_eq!(validate_length("body", 0, 10).unwrap(), 0);
        assert_eq!(validate_length("body", 10, 10).unwrap(), 10);
        assert!(matches!(
            validate_length("header", -1, 10),
            Err(FramewireError::InvalidLength {
                section: "header",
                len: -1
            })
        ));
        assert!(matches!(
            validate_length("body", 11, 10),
            Err(FramewireError::FrameTooLarge { max: 10, .. })
        ));
    }
}
