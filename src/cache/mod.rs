//! Cache Module
//!
//! Provides a load-or-compute cache with single-flight loading, TTL expiration
//! and background refresh.

mod clock;
mod engine;
mod entry;
mod executor;
mod future;
mod loader;
mod policy;
mod stats;
mod store;
mod value_ref;


// Re-export public types
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use engine::{LoadingCache, LoadingCacheBuilder};
pub use entry::CacheEntry;
pub use executor::{Executor, SameThreadExecutor, Task, TokioExecutor};
pub use future::LoadFuture;
pub use loader::{loader_fn, CacheLoader, FnLoader};
pub use policy::{CachePolicy, CachePolicyBuilder, TimeUnit};
pub use stats::CacheStats;
pub use store::{BackingStore, MemoryStore};
pub use value_ref::{LoadingValueReference, ValueReference};

// == Public Constants ==
/// Maximum allowed key length in bytes
pub const MAX_KEY_LENGTH: usize = 256;
