//! Base64-wrapped JSON serializer
//!
//! Same documents as the `json` codec, base64-encoded so that every line
//! is plain ASCII with no embedded separators.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use burrow_core::{CacheValue, LogRecord, SnapshotEntry};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::traits::{trim_ascii, CacheSerializer, CodecError};

pub(crate) const CODEC_ID: &str = "json-base64";

/// One base64(JSON) document per line.
#[derive(Debug, Clone, Copy, Default)]
pub struct Base64JsonSerializer;

impl Base64JsonSerializer {
    fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, CodecError> {
        let json =
            serde_json::to_vec(value).map_err(|e| CodecError::encode(e.to_string(), CODEC_ID))?;
        let mut line = STANDARD.encode(json).into_bytes();
        line.push(b'\n');
        Ok(line)
    }

    fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
        let json = STANDARD
            .decode(trim_ascii(bytes))
            .map_err(|e| CodecError::decode(e.to_string(), CODEC_ID, bytes.len()))?;
        serde_json::from_slice(&json)
            .map_err(|e| CodecError::decode(e.to_string(), CODEC_ID, bytes.len()))
    }
}

impl<V: CacheValue> CacheSerializer<V> for Base64JsonSerializer {
    fn serialize_record(&self, record: &LogRecord<V>) -> Result<Vec<u8>, CodecError> {
        Self::encode(record)
    }

    fn deserialize_record(&self, bytes: &[u8]) -> Result<LogRecord<V>, CodecError> {
        Self::decode(bytes)
    }

    fn serialize_snapshot(&self, entries: &[SnapshotEntry<V>]) -> Result<Vec<u8>, CodecError> {
        Self::encode(entries)
    }

    fn deserialize_snapshot(&self, bytes: &[u8]) -> Result<Vec<SnapshotEntry<V>>, CodecError> {
        Self::decode(bytes)
    }

    fn codec_id(&self) -> &str {
        CODEC_ID
    }
}
