//! Protocol module - wire format and frame codec.
//!
//! This module implements the binary framing protocol:
//! - 17-byte fixed header encoding/decoding
//! - Length-checked section reads straight from the stream
//! - Frame struct with typed accessors

mod frame;
mod wire_format;

pub use frame::{build_frame, encode_frame, encode_frame_raw, read_frame, Body, Frame, Header};
pub use wire_format::{
    trace_flag, validate_length, FixedHeader, ABSOLUTE_MAX_SECTION_SIZE,
    DEFAULT_MAX_SECTION_SIZE, FIXED_HEADER_SIZE, LENGTH_PREFIX_SIZE,
};
