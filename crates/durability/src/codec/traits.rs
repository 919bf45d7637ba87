//! Serializer trait definitions.

use burrow_core::{CacheError, LogRecord, SnapshotEntry};
use tracing::debug;

/// Serializer for journal records and snapshots.
///
/// All bytes written to the journal and the backup file go through the
/// serializer. This is the seam for alternative encodings (compressed,
/// binary, encrypted).
///
/// # Self-delimiting records
///
/// The journal is a plain concatenation of independently appended records,
/// so every encoded record must carry its own terminator or length prefix,
/// and [`split_records`](CacheSerializer::split_records) must be able to cut
/// a journal buffer back into the individual records. The default
/// implementation splits on newlines.
///
/// # Thread Safety
///
/// Serializers must be `Send + Sync`: records are encoded on caller threads
/// while snapshots are encoded on the checkpoint thread.
pub trait CacheSerializer<V>: Send + Sync {
    /// Encode one journal record, terminator included.
    fn serialize_record(&self, record: &LogRecord<V>) -> Result<Vec<u8>, CodecError>;

    /// Decode one record as produced by `split_records`.
    fn deserialize_record(&self, bytes: &[u8]) -> Result<LogRecord<V>, CodecError>;

    /// Encode a full snapshot.
    fn serialize_snapshot(&self, entries: &[SnapshotEntry<V>]) -> Result<Vec<u8>, CodecError>;

    /// Decode a full snapshot.
    fn deserialize_snapshot(&self, bytes: &[u8]) -> Result<Vec<SnapshotEntry<V>>, CodecError>;

    /// Cut a journal buffer into individual encoded records, in file order.
    ///
    /// A trailing fragment that is not a complete record (a write torn by a
    /// crash) must be dropped.
    fn split_records<'a>(&self, journal: &'a [u8]) -> Vec<&'a [u8]> {
        split_lines(journal)
    }

    /// Unique codec identifier.
    fn codec_id(&self) -> &str;
}

/// Split a buffer on `\n`, dropping empty lines and any unterminated tail.
pub fn split_lines(buf: &[u8]) -> Vec<&[u8]> {
    let mut records = Vec::new();
    let mut start = 0;
    for (i, byte) in buf.iter().enumerate() {
        if *byte == b'\n' {
            let mut line = &buf[start..i];
            if line.last() == Some(&b'\r') {
                line = &line[..line.len() - 1];
            }
            if !line.is_empty() {
                records.push(line);
            }
            start = i + 1;
        }
    }
    if start < buf.len() {
        debug!(bytes = buf.len() - start, "Dropping unterminated journal tail");
    }
    records
}

/// Strip ASCII whitespace from both ends.
pub(crate) fn trim_ascii(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map(|i| i + 1)
        .unwrap_or(start);
    &bytes[start..end]
}

/// Codec errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// Encoding failed (the value cannot be represented by the codec).
    #[error("Encode error (codec={codec_id}): {detail}")]
    EncodeError {
        /// Human-readable error description
        detail: String,
        /// Codec ID that attempted the encode
        codec_id: String,
    },

    /// Decoding failed (invalid format, checksum mismatch, unknown tag).
    ///
    /// Carries the codec identity and data length so callers can
    /// distinguish a wrong-codec error from data corruption.
    #[error("Decode error (codec={codec_id}, data_len={data_len}): {detail}")]
    DecodeError {
        /// Human-readable error description
        detail: String,
        /// Codec ID that attempted the decode
        codec_id: String,
        /// Length of the data that failed to decode
        data_len: usize,
    },

    /// Unknown codec identifier.
    #[error("Unknown codec: {0}")]
    UnknownCodec(String),
}

impl CodecError {
    /// Create an encode error.
    pub fn encode(detail: impl Into<String>, codec_id: impl Into<String>) -> Self {
        CodecError::EncodeError {
            detail: detail.into(),
            codec_id: codec_id.into(),
        }
    }

    /// Create a decode error with full diagnostic context.
    pub fn decode(detail: impl Into<String>, codec_id: impl Into<String>, data_len: usize) -> Self {
        CodecError::DecodeError {
            detail: detail.into(),
            codec_id: codec_id.into(),
            data_len,
        }
    }
}

impl From<CodecError> for CacheError {
    fn from(e: CodecError) -> Self {
        CacheError::Serialization(e.to_string())
    }
}
