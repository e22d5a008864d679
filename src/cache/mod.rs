//! Durable record cache used for offline browsing.
//!
//! Records are grouped into named collections and keyed by their identity:
//! - `put` is an upsert ordered by batch sequence, so repeated, reordered or
//!   overlapping writes converge on the latest batch
//! - `prune` drops whatever an older batch left behind
//! - reads never depend on insertion order
//! - every backend failure surfaces as [`CacheError::Unavailable`]

mod layer;
mod storage;
mod traits;

pub use layer::{CachedRecord, PersistentCache};
pub use storage::{CacheStorage, SqliteStorage, StoredRecord, UnavailableStorage};
pub use traits::{CacheError, Cacheable};

/// Collection holding the catalog products
pub const PRODUCTS: &str = "products";
