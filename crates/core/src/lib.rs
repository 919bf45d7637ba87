//! Core types and traits for Burrow
//!
//! This crate defines the foundational types used throughout the system:
//! - CacheValue: Bound satisfied by every value a cache can hold
//! - LogRecord: One journaled mutation (set, mset, del, ttl)
//! - SnapshotEntry: One live key captured by a checkpoint
//! - Store: The in-memory collaborator the durability layer drives
//! - CacheError: Error type hierarchy

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod time;
pub mod traits;
pub mod types;
pub mod value;

pub use error::{CacheError, Result};
pub use time::{now_millis, remaining_secs, ttl_secs};
pub use traits::{ExpiredHandler, Store};
pub use types::{KeySelector, LogRecord, SetItem, SnapshotEntry};
pub use value::CacheValue;
