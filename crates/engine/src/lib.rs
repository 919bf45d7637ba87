//! Cache engine for Burrow
//!
//! This crate orchestrates the lower layers:
//! - DurableCache: store + journal + checkpoint behind one facade
//! - Flush coordination: mutations deferred during a checkpoint
//! - Periodic checkpoint thread
//! - Configuration (builder or TOML)
//!
//! The engine is the only component that knows about the ordering between
//! store mutations, journal appends and checkpoints.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cache;
mod checkpoint;
pub mod config;
pub mod coordinator;

pub use cache::{CacheStats, DurableCache};
pub use checkpoint::CheckpointOutcome;
pub use config::CacheConfig;
pub use coordinator::{CoordinatorMetrics, DeferredOp, FlushCoordinator};
