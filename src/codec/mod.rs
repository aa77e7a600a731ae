//! Codec module - JSON serialization for header values and bodies.
//!
//! Codecs are marker structs with static methods rather than trait objects,
//! so the codec is picked at compile time.

mod json;

pub use json::{HeaderValues, JsonCodec};
