//! Framed MessagePack serializer
//!
//! # Frame Format
//!
//! ```text
//! +----------------+------------------+----------------+
//! | Length (4)     | Payload (var)    | CRC32 (4)      |
//! +----------------+------------------+----------------+
//! ```
//!
//! Length is the payload size, little-endian. The CRC covers the payload
//! only. A snapshot is a single frame holding the whole entry list.

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use burrow_core::{CacheValue, LogRecord, SnapshotEntry};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use super::traits::{CacheSerializer, CodecError};

pub(crate) const CODEC_ID: &str = "msgpack";

/// Length prefix plus trailing checksum
const FRAME_OVERHEAD: usize = 8;

/// Length-prefixed MessagePack frames with a CRC32 trailer.
#[derive(Debug, Clone, Copy, Default)]
pub struct MsgPackSerializer;

impl MsgPackSerializer {
    fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, CodecError> {
        let payload =
            rmp_serde::to_vec_named(value).map_err(|e| CodecError::encode(e.to_string(), CODEC_ID))?;
        let len = u32::try_from(payload.len())
            .map_err(|_| CodecError::encode("payload exceeds 4 GiB", CODEC_ID))?;

        let mut frame = Vec::with_capacity(payload.len() + FRAME_OVERHEAD);
        frame
            .write_u32::<LittleEndian>(len)
            .map_err(|e| CodecError::encode(e.to_string(), CODEC_ID))?;
        frame.extend_from_slice(&payload);
        frame
            .write_u32::<LittleEndian>(crc32fast::hash(&payload))
            .map_err(|e| CodecError::encode(e.to_string(), CODEC_ID))?;
        Ok(frame)
    }

    fn decode<T: DeserializeOwned>(frame: &[u8]) -> Result<T, CodecError> {
        if frame.len() < FRAME_OVERHEAD {
            return Err(CodecError::decode("frame too short", CODEC_ID, frame.len()));
        }
        let len = LittleEndian::read_u32(&frame[..4]) as usize;
        if frame.len() != len + FRAME_OVERHEAD {
            return Err(CodecError::decode(
                format!("length prefix {} does not match frame", len),
                CODEC_ID,
                frame.len(),
            ));
        }

        let payload = &frame[4..4 + len];
        let stored_crc = LittleEndian::read_u32(&frame[4 + len..]);
        let computed_crc = crc32fast::hash(payload);
        if stored_crc != computed_crc {
            return Err(CodecError::decode(
                format!(
                    "checksum mismatch: stored {:08x}, computed {:08x}",
                    stored_crc, computed_crc
                ),
                CODEC_ID,
                frame.len(),
            ));
        }

        rmp_serde::from_slice(payload)
            .map_err(|e| CodecError::decode(e.to_string(), CODEC_ID, frame.len()))
    }
}

impl<V: CacheValue> CacheSerializer<V> for MsgPackSerializer {
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

    /// Walk length prefixes; stop at the first frame that runs past the end.
    fn split_records<'a>(&self, journal: &'a [u8]) -> Vec<&'a [u8]> {
        let mut frames = Vec::new();
        let mut offset = 0;
        while journal.len() - offset >= FRAME_OVERHEAD {
            let len = LittleEndian::read_u32(&journal[offset..offset + 4]) as usize;
            let end = match offset.checked_add(len + FRAME_OVERHEAD) {
                Some(end) if end <= journal.len() => end,
                _ => break,
            };
            frames.push(&journal[offset..end]);
            offset = end;
        }
        if offset < journal.len() {
            debug!(bytes = journal.len() - offset, "Dropping truncated journal frame");
        }
        frames
    }

    fn codec_id(&self) -> &str {
        CODEC_ID
    }
}
