//! Core traits and types for the caching system.

use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

/// Trait for records that can be cached.
///
/// Implementors provide the identity used as the record's key inside a collection.
pub trait Cacheable: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
  /// Unique identifier for this record (e.g., product id)
  fn cache_key(&self) -> String;
}

/// Errors raised by the persistent cache.
#[derive(Debug, Error)]
pub enum CacheError {
  /// The backing store cannot be used (disabled, cannot be opened, quota, I/O)
  #[error("storage unavailable: {0}")]
  Unavailable(String),

  /// A record could not be encoded or decoded
  #[error("corrupt record in {collection}/{key}: {source}")]
  Corrupt {
    collection: String,
    key: String,
    #[source]
    source: serde_json::Error,
  },
}

impl CacheError {
  pub fn unavailable(msg: impl Into<String>) -> Self {
    Self::Unavailable(msg.into())
  }
}

impl From<rusqlite::Error> for CacheError {
  fn from(e: rusqlite::Error) -> Self {
    Self::Unavailable(e.to_string())
  }
}
