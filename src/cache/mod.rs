//! Cache Module
//!
//! In-memory cache core: entries with TTL, size accounting, tag index,
//! eviction policies and statistics.

mod entry;
mod eviction;
mod events;
mod size;
mod stats;
mod store;
mod tags;


// Re-export public types
pub use entry::{current_timestamp_ms, CacheEntry, Priority, SetOptions};
pub use eviction::EvictionPolicy;
pub use events::{CacheEvent, EVENT_CHANNEL_CAPACITY};
pub use size::SizeAccountant;
pub use stats::{CacheStats, StatsCollector};
pub use store::CacheStore;
pub use tags::TagIndex;

// == Public Constants ==
/// Maximum allowed key length in bytes
pub const MAX_KEY_LENGTH: usize = 256;
