//! JSON codec using `serde_json`.
//!
//! Header values and bodies travel as JSON. Header values are always a JSON
//! object; an empty map encodes as `{}` and is never omitted.
//!
//! # Example
//!
//! ```
//! use framewire::codec::JsonCodec;
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Serialize, Deserialize, PartialEq, Debug)]
//! struct Message {
//!     id: u32,
//!     content: String,
//! }
//!
//! let msg = Message { id: 42, content: "hello".to_string() };
//! let encoded = JsonCodec::encode(&msg).unwrap();
//! let decoded: Message = JsonCodec::decode(&encoded).unwrap();
//! assert_eq!(decoded, msg);
//! ```

use serde_json::{Map, Value};

use crate::error::Result;

/// Header values: string keys to arbitrary JSON values.
pub type HeaderValues = Map<String, Value>;

/// JSON codec for header values and bodies.
pub struct JsonCodec;

impl JsonCodec {
    /// Encode a value to JSON bytes.
    #[inline]
    pub fn encode<T: serde::Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(value)?)
    }

    /// Decode JSON bytes to a value.
    #[inline]
    pub fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Decode a header section.
    ///
    /// Anything other than a JSON object (including `null`) is rejected.
    pub fn decode_header_values(bytes: &[u8]) -> Result<HeaderValues> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
