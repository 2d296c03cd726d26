//! Read-through cache in front of the catalog repositories.
//!
//! - [`keys`]: deterministic keys per operation
//! - [`store`]: the key-value store contract plus in-memory and no-op stores
//! - [`coalesce`]: one in-flight fetch per key
//! - [`read_through`]: the lookup, coalesce, load, write-back path
//!
//! Per-operation TTLs and the key namespace are normalized once into a
//! [`CachePolicy`]:
//!
//! ```toml
//! [cache]
//! backend = "memory"
//! namespace = "api-v1"
//!
//! [cache.ttl_seconds]
//! catalog = 120
//! recent = 0 # disables caching for recent snapshots
//! ```

mod coalesce;
mod config;
mod keys;
mod lock;
mod read_through;
mod store;

pub use coalesce::{Coalescer, Role};
pub use config::{CachePolicy, DEFAULT_NAMESPACE, MAX_TTL, TtlSettings};
pub use keys::{CacheKey, Operation};
pub use read_through::ReadThrough;
pub use store::{CacheStore, CacheStoreError, MemoryCacheStore, NoopCacheStore};
