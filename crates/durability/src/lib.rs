//! Durability layer for Burrow
//!
//! This crate handles everything that touches disk:
//!
//! - Serializer contract and the built-in codecs (JSON lines, base64 JSON,
//!   framed MessagePack)
//! - Journal: append-only record of mutations since the last checkpoint,
//!   written by a dedicated thread
//! - Crash-safe backup file (write-fsync-rename)
//! - Recovery: backup load plus in-order journal replay

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod codec;
pub mod journal;
pub mod paths;
pub mod recovery;
pub mod snapshot;

pub use codec::{
    serializer_for, Base64JsonSerializer, CacheSerializer, CodecError, JsonLinesSerializer,
    MsgPackSerializer,
};
pub use journal::{Journal, JournalCounters, JournalSync};
pub use paths::CachePaths;
pub use recovery::{recover, RecoveryOutcome, RecoveryStats};
pub use snapshot::{LoadStats, SnapshotFile};
