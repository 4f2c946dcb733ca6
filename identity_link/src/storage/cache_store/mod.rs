mod config;
mod memory;
mod redis;
mod types;

pub use config::cache_store_from_env;
pub use types::{CacheStore, InMemoryCacheStore, RedisCacheStore, SharedCacheStore};
