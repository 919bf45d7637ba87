//! Newline-delimited JSON serializer
//!
//! Every record is one compact JSON object followed by `\n`. A snapshot is a
//! single JSON array followed by `\n`.

use burrow_core::{CacheValue, LogRecord, SnapshotEntry};

use super::traits::{trim_ascii, CacheSerializer, CodecError};

pub(crate) const CODEC_ID: &str = "json";

/// Default serializer: one JSON document per line.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonLinesSerializer;

impl<V: CacheValue> CacheSerializer<V> for JsonLinesSerializer {
    fn serialize_record(&self, record: &LogRecord<V>) -> Result<Vec<u8>, CodecError> {
        let mut bytes =
            serde_json::to_vec(record).map_err(|e| CodecError::encode(e.to_string(), CODEC_ID))?;
        bytes.push(b'\n');
        Ok(bytes)
    }

    fn deserialize_record(&self, bytes: &[u8]) -> Result<LogRecord<V>, CodecError> {
        serde_json::from_slice(trim_ascii(bytes))
            .map_err(|e| CodecError::decode(e.to_string(), CODEC_ID, bytes.len()))
    }

    fn serialize_snapshot(&self, entries: &[SnapshotEntry<V>]) -> Result<Vec<u8>, CodecError> {
        let mut bytes =
            serde_json::to_vec(entries).map_err(|e| CodecError::encode(e.to_string(), CODEC_ID))?;
        bytes.push(b'\n');
        Ok(bytes)
    }

    fn deserialize_snapshot(&self, bytes: &[u8]) -> Result<Vec<SnapshotEntry<V>>, CodecError> {
        serde_json::from_slice(trim_ascii(bytes))
            .map_err(|e| CodecError::decode(e.to_string(), CODEC_ID, bytes.len()))
    }

    fn codec_id(&self) -> &str {
        CODEC_ID
    }
}
