//! Cache Codec Implementations
//!
//! The wire format for cache payloads is JSON. [`CacheValue`] carries the
//! extended types (timestamps, identifiers, decimals, sets, raw bytes) that
//! plain JSON lacks, and [`JsonCodec`] maps them onto JSON on the way out.

mod json;
mod value;

pub use json::JsonCodec;
pub use value::CacheValue;
