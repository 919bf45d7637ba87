//! Storage layer for Burrow
//!
//! This crate implements the default in-memory store driven by the
//! durability layer:
//! - MemoryStore: FxHashMap-based store behind a parking_lot Mutex
//! - TTL index for expiration
//! - TTL cleaner background task
//! - Expiry notifications through registered handlers
//!
//! Any other `burrow_core::Store` implementation can be used in its place.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod cleaner;
pub mod memory;
pub mod options;
pub mod stored_value;
pub mod ttl;

pub use memory::MemoryStore;
pub use options::StoreOptions;
pub use stored_value::StoredValue;
pub use ttl::TTLIndex;
