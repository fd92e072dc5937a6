//! Read-through cache for catalog queries.
//!
//! Entries are JSON payloads keyed by [`QueryDescriptor::cache_key`]. Three
//! backends share the [`CacheStore`] contract:
//!
//! - **redis**: shared cache for multi-instance deployments
//! - **memory**: in-process LRU with per-entry expiry
//! - **disabled**: every read misses
//!
//! ```toml
//! [cache]
//! backend = "redis"
//! host = "127.0.0.1"
//! port = 6379
//! ttl_seconds = 3600
//! ```

mod config;
mod keys;
mod lock;
mod memory;
mod redis;
mod store;

use std::sync::Arc;

pub use config::{CacheBackend, CacheConfig};
pub use keys::{QueryDescriptor, by_id_key};
pub use memory::MemoryCacheStore;
pub use redis::RedisCacheStore;
pub use store::{CacheError, CacheStore, NoopCacheStore};

/// Build the backend selected by `config`. Never touches the network.
pub fn open(config: &CacheConfig) -> Result<Arc<dyn CacheStore>, CacheError> {
    let store: Arc<dyn CacheStore> = match config.backend {
        CacheBackend::Redis => Arc::new(RedisCacheStore::new(config)?),
        CacheBackend::Memory => Arc::new(MemoryCacheStore::new(config)),
        CacheBackend::Disabled => Arc::new(NoopCacheStore),
    };
    Ok(store)
}
