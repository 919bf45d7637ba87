//! Value bound for cache contents

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Anything a cache can hold.
///
/// Values must be serializable (they are journaled and snapshotted),
/// cloneable (reads hand out copies, like the store they come from) and
/// shareable across the checkpoint and journal threads.
///
/// Blanket-implemented, so `serde_json::Value`, `String`, or any
/// `#[derive(Serialize, Deserialize, Clone)]` struct qualifies.
pub trait CacheValue: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {}

impl<T> CacheValue for T where T: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {}
