//! Serializers for journal records and snapshots
//!
//! - `json`: newline-delimited JSON (default)
//! - `json-base64`: one base64-encoded JSON document per line
//! - `msgpack`: length-prefixed, CRC-checked MessagePack frames

mod base64_json;
mod json;
mod msgpack;
mod traits;

pub use self::base64_json::Base64JsonSerializer;
pub use self::json::JsonLinesSerializer;
pub use self::msgpack::MsgPackSerializer;
pub use self::traits::{split_lines, CacheSerializer, CodecError};

use burrow_core::CacheValue;

/// Look up a built-in serializer by its codec id.
pub fn serializer_for<V: CacheValue>(
    codec_id: &str,
) -> Result<Box<dyn CacheSerializer<V>>, CodecError> {
    match codec_id {
        json::CODEC_ID => Ok(Box::new(JsonLinesSerializer)),
        base64_json::CODEC_ID => Ok(Box::new(Base64JsonSerializer)),
        msgpack::CODEC_ID => Ok(Box::new(MsgPackSerializer)),
        other => Err(CodecError::UnknownCodec(other.to_string())),
    }
}
