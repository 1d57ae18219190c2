//! JSON Codec using `serde_json`

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::CacheResult;

/// JSON Codec using `serde_json`
///
/// Encoding accepts anything `Serialize`, including [`CacheValue`](super::CacheValue)
/// with its extended-type mapping. Decoding performs plain JSON parsing and
/// returns a [`serde_json::Value`]: timestamps and identifiers come back as
/// strings, decimals as numbers. Callers that want native types back use
/// [`decode_as`](Self::decode_as) with their own `Deserialize` type.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

impl JsonCodec {
    /// Serialize a value to wire bytes
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Serialization`](crate::CacheError::Serialization)
    /// if the value has no JSON representation.
    pub fn encode<T: Serialize + ?Sized>(&self, value: &T) -> CacheResult<Vec<u8>> {
        Ok(serde_json::to_vec(value)?)
    }

    /// Normalize a value to its JSON tree without rendering it
    ///
    /// # Errors
    ///
    /// Same conditions as [`encode`](Self::encode).
    pub fn to_value<T: Serialize + ?Sized>(&self, value: &T) -> CacheResult<Value> {
        Ok(serde_json::to_value(value)?)
    }

    /// Parse a wire payload; accepts `&str`, `String`, `&[u8]` or `Vec<u8>`
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Serialization`](crate::CacheError::Serialization)
    /// on malformed input.
    pub fn decode(&self, payload: impl AsRef<[u8]>) -> CacheResult<Value> {
        Ok(serde_json::from_slice(payload.as_ref())?)
    }

    /// Parse a wire payload straight into a caller-defined type
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Serialization`](crate::CacheError::Serialization)
    /// on malformed input or a shape mismatch.
    pub fn decode_as<T: DeserializeOwned>(&self, payload: impl AsRef<[u8]>) -> CacheResult<T> {
        Ok(serde_json::from_slice(payload.as_ref())?)
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        "serde_json"
    }
}
