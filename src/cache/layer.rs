//! Async adapter over a blocking storage backend.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::warn;

use super::storage::CacheStorage;
use super::traits::{CacheError, Cacheable};

/// A single cached record.
#[derive(Debug, Clone)]
pub struct CachedRecord<T> {
  /// The cached record
  pub record: T,
  /// When the record was cached
  pub cached_at: DateTime<Utc>,
}

/// Persistent cache organized into named collections.
///
/// Cloning is cheap and every clone talks to the same backend, so writes can be
/// handed to independent tasks without coordination. Writes tagged with the same
/// sequence number form one batch; a later batch always wins over an earlier one,
/// whatever order the individual writes land in.
pub struct PersistentCache {
  storage: Arc<dyn CacheStorage>,
}

impl PersistentCache {
  /// Create a new cache over the given storage backend.
  pub fn new(storage: impl CacheStorage + 'static) -> Self {
    Self {
      storage: Arc::new(storage),
    }
  }

  /// Reserve the sequence number for a new batch of writes.
  pub fn next_sequence(&self) -> u64 {
    self.storage.next_sequence()
  }

  /// Upsert `record` under its identity as part of batch `seq`.
  ///
  /// Returns `false` if a later batch already covers the record.
  pub async fn put<T: Cacheable>(
    &self,
    collection: &str,
    record: &T,
    seq: u64,
  ) -> Result<bool, CacheError> {
    let key = record.cache_key();
    let data = serde_json::to_vec(record).map_err(|source| CacheError::Corrupt {
      collection: collection.to_string(),
      key: key.clone(),
      source,
    })?;
    let collection = collection.to_string();

    self
      .blocking(move |storage| storage.put(&collection, &key, &data, seq))
      .await
  }

  /// All records in a collection, in no particular order.
  ///
  /// Records that no longer decode are skipped rather than failing the read.
  pub async fn get_all<T: Cacheable>(
    &self,
    collection: &str,
  ) -> Result<Vec<CachedRecord<T>>, CacheError> {
    let owned = collection.to_string();
    let stored = self
      .blocking(move |storage| storage.get_all(&owned))
      .await?;

    let records = stored
      .into_iter()
      .filter_map(|row| match serde_json::from_slice(&row.data) {
        Ok(record) => Some(CachedRecord {
          record,
          cached_at: row.cached_at,
        }),
        Err(e) => {
          warn!(collection, key = %row.key, error = %e, "skipping undecodable cache record");
          None
        }
      })
      .collect();

    Ok(records)
  }

  /// A single record by identity.
  #[allow(dead_code)]
  pub async fn get<T: Cacheable>(
    &self,
    collection: &str,
    key: &str,
  ) -> Result<Option<CachedRecord<T>>, CacheError> {
    let (owned_collection, owned_key) = (collection.to_string(), key.to_string());
    let stored = self
      .blocking(move |storage| storage.get(&owned_collection, &owned_key))
      .await?;

    match stored {
      Some(row) => {
        let record = serde_json::from_slice(&row.data).map_err(|source| CacheError::Corrupt {
          collection: collection.to_string(),
          key: key.to_string(),
          source,
        })?;
        Ok(Some(CachedRecord {
          record,
          cached_at: row.cached_at,
        }))
      }
      None => Ok(None),
    }
  }

  /// Remove a record by identity. Returns whether it existed.
  #[allow(dead_code)]
  pub async fn delete(&self, collection: &str, key: &str) -> Result<bool, CacheError> {
    let (collection, key) = (collection.to_string(), key.to_string());
    self
      .blocking(move |storage| storage.delete(&collection, &key))
      .await
  }

  /// Drop every record written before batch `seq`.
  pub async fn prune(&self, collection: &str, seq: u64) -> Result<usize, CacheError> {
    let collection = collection.to_string();
    self
      .blocking(move |storage| storage.prune(&collection, seq))
      .await
  }

  async fn blocking<R, F>(&self, op: F) -> Result<R, CacheError>
  where
    R: Send + 'static,
    F: FnOnce(&dyn CacheStorage) -> Result<R, CacheError> + Send + 'static,
  {
    let storage = Arc::clone(&self.storage);
    tokio::task::spawn_blocking(move || op(&*storage))
      .await
      .map_err(|e| CacheError::unavailable(format!("Cache task failed: {}", e)))?
  }
}

impl Clone for PersistentCache {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::{SqliteStorage, UnavailableStorage, PRODUCTS};
  use crate::catalog::types::fixtures::product;
  use crate::catalog::types::Product;

  fn memory_cache() -> PersistentCache {
    PersistentCache::new(SqliteStorage::open_in_memory().unwrap())
  }

  async fn products(cache: &PersistentCache) -> Vec<Product> {
    let mut all: Vec<Product> = cache
      .get_all::<Product>(PRODUCTS)
      .await
      .unwrap()
      .into_iter()
      .map(|cached| cached.record)
      .collect();
    all.sort_by(|a, b| a.id.cmp(&b.id));
    all
  }

  #[tokio::test]
  async fn test_put_then_get() {
    let cache = memory_cache();
    let seq = cache.next_sequence();
    assert!(cache.put(PRODUCTS, &product("1", "A"), seq).await.unwrap());

    let cached = cache.get::<Product>(PRODUCTS, "1").await.unwrap().unwrap();
    assert_eq!(cached.record, product("1", "A"));
    assert!(cache.get::<Product>(PRODUCTS, "2").await.unwrap().is_none());
  }

  #[tokio::test]
  async fn test_put_same_id_overwrites() {
    let cache = memory_cache();
    cache
      .put(PRODUCTS, &product("1", "A"), cache.next_sequence())
      .await
      .unwrap();
    cache
      .put(PRODUCTS, &product("1", "B"), cache.next_sequence())
      .await
      .unwrap();

    assert_eq!(products(&cache).await, vec![product("1", "B")]);
  }

  #[tokio::test]
  async fn test_late_write_from_older_batch_is_ignored() {
    let cache = memory_cache();
    let (older, newer) = (cache.next_sequence(), cache.next_sequence());

    cache.put(PRODUCTS, &product("1", "B"), newer).await.unwrap();
    let stored = cache.put(PRODUCTS, &product("1", "A"), older).await.unwrap();

    assert!(!stored);
    assert_eq!(products(&cache).await, vec![product("1", "B")]);
  }

  #[tokio::test]
  async fn test_prune_keeps_only_current_batch() {
    let cache = memory_cache();
    let older = cache.next_sequence();
    cache.put(PRODUCTS, &product("1", "A"), older).await.unwrap();
    cache.put(PRODUCTS, &product("2", "A"), older).await.unwrap();

    let newer = cache.next_sequence();
    cache.put(PRODUCTS, &product("2", "B"), newer).await.unwrap();
    assert_eq!(cache.prune(PRODUCTS, newer).await.unwrap(), 1);

    assert_eq!(products(&cache).await, vec![product("2", "B")]);
  }

  #[tokio::test]
  async fn test_concurrent_puts_converge() {
    let cache = memory_cache();
    let seq = cache.next_sequence();
    let mut handles = Vec::new();
    for id in 0..20 {
      let cache = cache.clone();
      handles.push(tokio::spawn(async move {
        cache
          .put(PRODUCTS, &product(&id.to_string(), "A"), seq)
          .await
          .unwrap();
      }));
    }
    for handle in handles {
      handle.await.unwrap();
    }

    let mut keys: Vec<u32> = products(&cache)
      .await
      .iter()
      .map(|p| p.id.parse().unwrap())
      .collect();
    keys.sort();
    assert_eq!(keys, (0..20).collect::<Vec<u32>>());
  }

  #[tokio::test]
  async fn test_get_all_skips_undecodable_rows() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    let seq = storage.next_sequence();
    storage.put(PRODUCTS, "bad", b"not json", seq).unwrap();
    let cache = PersistentCache::new(storage);
    cache.put(PRODUCTS, &product("1", "A"), seq).await.unwrap();

    let all: Vec<CachedRecord<Product>> = cache.get_all(PRODUCTS).await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].record, product("1", "A"));
    assert!(all[0].cached_at <= Utc::now());
  }

  #[tokio::test]
  async fn test_delete() {
    let cache = memory_cache();
    cache
      .put(PRODUCTS, &product("1", "A"), cache.next_sequence())
      .await
      .unwrap();

    assert!(cache.delete(PRODUCTS, "1").await.unwrap());
    assert!(products(&cache).await.is_empty());
  }

  #[tokio::test]
  async fn test_unavailable_backend() {
    let cache = PersistentCache::new(UnavailableStorage::new("disabled by config"));

    let err = cache
      .put(PRODUCTS, &product("1", "A"), cache.next_sequence())
      .await
      .unwrap_err();
    assert!(matches!(err, CacheError::Unavailable(_)));
    let err = cache.get_all::<Product>(PRODUCTS).await.unwrap_err();
    assert!(err.to_string().contains("disabled by config"));
  }
}
