//! Reference-data caching with persistence and offline fallback.
//!
//! - Whole tables and per-key slots are cached for a fixed TTL
//! - Records persist across restarts through a key/value store
//! - Concurrent lookups of one slot share a single gateway fetch
//! - Gateway failures are answered with stale or compiled-in data

mod manager;
mod retry;
mod storage;
mod traits;

pub use manager::{CacheManager, CacheManagerBuilder, LookupOptions};
pub use retry::RetryPolicy;
pub use storage::{KeyValueStorage, MemoryStorage, RecordStore, SqliteStorage};
pub use traits::{CacheRecord, CacheResult, CacheSource, CacheStatus, CACHE_TTL_HOURS};
