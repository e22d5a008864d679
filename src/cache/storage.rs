//! Cache storage trait and SQLite implementation.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use tracing::warn;

use super::traits::CacheError;

/// A raw record as held by a storage backend.
#[derive(Debug, Clone)]
pub struct StoredRecord {
  /// Record identity inside its collection
  pub key: String,
  /// Serialized record
  pub data: Vec<u8>,
  /// When the record was last written
  pub cached_at: DateTime<Utc>,
}

/// Trait for cache storage backends.
///
/// Calls are blocking; [`super::PersistentCache`] moves them off the async runtime.
///
/// Writes carry a sequence number from [`CacheStorage::next_sequence`]. A record is
/// only overwritten by a write with an equal or higher sequence, and [`CacheStorage::prune`]
/// fences off everything older, so writes may land in any order.
pub trait CacheStorage: Send + Sync {
  /// Reserve a sequence number higher than any previously issued or stored.
  fn next_sequence(&self) -> u64;

  /// Insert or overwrite the record stored under `key`.
  ///
  /// Returns `false` when a newer write or a prune already covers it.
  fn put(&self, collection: &str, key: &str, data: &[u8], seq: u64) -> Result<bool, CacheError>;

  /// All records in a collection. Order is unspecified.
  fn get_all(&self, collection: &str) -> Result<Vec<StoredRecord>, CacheError>;

  /// A single record by key.
  fn get(&self, collection: &str, key: &str) -> Result<Option<StoredRecord>, CacheError>;

  /// Remove a record. Returns whether it existed.
  fn delete(&self, collection: &str, key: &str) -> Result<bool, CacheError>;

  /// Remove records written before `seq` and refuse later writes older than it.
  /// Returns the number of records removed.
  fn prune(&self, collection: &str, seq: u64) -> Result<usize, CacheError>;
}

/// Storage that refuses every operation.
/// Used when caching is disabled or the database cannot be opened.
pub struct UnavailableStorage {
  reason: String,
  sequence: AtomicU64,
}

impl UnavailableStorage {
  pub fn new(reason: impl Into<String>) -> Self {
    Self {
      reason: reason.into(),
      sequence: AtomicU64::new(0),
    }
  }

  fn fail<T>(&self) -> Result<T, CacheError> {
    Err(CacheError::unavailable(self.reason.clone()))
  }
}

impl CacheStorage for UnavailableStorage {
  fn next_sequence(&self) -> u64 {
    self.sequence.fetch_add(1, Ordering::Relaxed) + 1
  }

  fn put(
    &self,
    _collection: &str,
    _key: &str,
    _data: &[u8],
    _seq: u64,
  ) -> Result<bool, CacheError> {
    self.fail()
  }

  fn get_all(&self, _collection: &str) -> Result<Vec<StoredRecord>, CacheError> {
    self.fail()
  }

  fn get(&self, _collection: &str, _key: &str) -> Result<Option<StoredRecord>, CacheError> {
    self.fail()
  }

  fn delete(&self, _collection: &str, _key: &str) -> Result<bool, CacheError> {
    self.fail()
  }

  fn prune(&self, _collection: &str, _seq: u64) -> Result<usize, CacheError> {
    self.fail()
  }
}

/// SQLite-based cache storage implementation.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
  /// Last sequence number handed out
  sequence: AtomicU64,
}

impl SqliteStorage {
  /// Open or create the cache database at `path`.
  pub fn open(path: &Path) -> Result<Self, CacheError> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).map_err(|e| {
        CacheError::unavailable(format!("Failed to create cache directory: {}", e))
      })?;
    }

    let conn = Connection::open(path).map_err(|e| {
      CacheError::unavailable(format!(
        "Failed to open cache database at {}: {}",
        path.display(),
        e
      ))
    })?;

    Self::with_connection(conn)
  }

  /// Open a private in-memory database.
  #[cfg_attr(not(test), allow(dead_code))]
  pub fn open_in_memory() -> Result<Self, CacheError> {
    let conn = Connection::open_in_memory()?;
    Self::with_connection(conn)
  }

  fn with_connection(conn: Connection) -> Result<Self, CacheError> {
    let storage = Self {
      conn: Mutex::new(conn),
      sequence: AtomicU64::new(0),
    };
    storage.run_migrations()?;

    // Continue after the highest sequence left by earlier runs
    let last: i64 = storage.lock()?.query_row(
      "SELECT COALESCE(MAX(seq), 0) FROM (
         SELECT seq FROM records UNION ALL SELECT seq FROM watermarks
       )",
      [],
      |row| row.get(0),
    )?;
    storage.sequence.store(last as u64, Ordering::SeqCst);

    Ok(storage)
  }

  /// Get the default database path.
  pub fn default_path() -> Option<PathBuf> {
    dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .map(|dir| dir.join("storeview").join("cache.db"))
  }

  /// Run database migrations for cache tables.
  fn run_migrations(&self) -> Result<(), CacheError> {
    self
      .lock()?
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| CacheError::unavailable(format!("Failed to run cache migrations: {}", e)))
  }

  fn lock(&self) -> Result<MutexGuard<'_, Connection>, CacheError> {
    self
      .conn
      .lock()
      .map_err(|e| CacheError::unavailable(format!("Lock poisoned: {}", e)))
  }
}

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
-- One row per record, upserted by (collection, record_key)
CREATE TABLE IF NOT EXISTS records (
    collection TEXT NOT NULL,
    record_key TEXT NOT NULL,
    data BLOB NOT NULL,
    seq INTEGER NOT NULL DEFAULT 0,
    cached_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (collection, record_key)
);

-- Writes below a collection's watermark are refused
CREATE TABLE IF NOT EXISTS watermarks (
    collection TEXT PRIMARY KEY,
    seq INTEGER NOT NULL
);
"#;

impl CacheStorage for SqliteStorage {
  fn next_sequence(&self) -> u64 {
    self.sequence.fetch_add(1, Ordering::SeqCst) + 1
  }

  fn put(&self, collection: &str, key: &str, data: &[u8], seq: u64) -> Result<bool, CacheError> {
    let conn = self.lock()?;

    let floor: Option<i64> = conn
      .query_row(
        "SELECT seq FROM watermarks WHERE collection = ?",
        params![collection],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| CacheError::unavailable(format!("Failed to read watermark: {}", e)))?;
    if floor.is_some_and(|floor| (seq as i64) < floor) {
      return Ok(false);
    }

    let written = conn
      .execute(
        "INSERT INTO records (collection, record_key, data, seq, cached_at)
         VALUES (?1, ?2, ?3, ?4, datetime('now'))
         ON CONFLICT (collection, record_key) DO UPDATE SET
           data = excluded.data,
           seq = excluded.seq,
           cached_at = excluded.cached_at
         WHERE excluded.seq >= records.seq",
        params![collection, key, data, seq as i64],
      )
      .map_err(|e| CacheError::unavailable(format!("Failed to store record: {}", e)))?;

    Ok(written > 0)
  }

  fn get_all(&self, collection: &str) -> Result<Vec<StoredRecord>, CacheError> {
    let conn = self.lock()?;

    let mut stmt = conn
      .prepare("SELECT record_key, data, cached_at FROM records WHERE collection = ?")
      .map_err(|e| CacheError::unavailable(format!("Failed to prepare query: {}", e)))?;

    let rows = stmt
      .query_map(params![collection], |row| {
        Ok((
          row.get::<_, String>(0)?,
          row.get::<_, Vec<u8>>(1)?,
          row.get::<_, String>(2)?,
        ))
      })
      .map_err(|e| CacheError::unavailable(format!("Failed to query records: {}", e)))?;

    let mut records = Vec::new();
    for row in rows {
      let (key, data, cached_at) = row?;
      match parse_datetime(&cached_at) {
        Ok(cached_at) => records.push(StoredRecord {
          key,
          data,
          cached_at,
        }),
        Err(e) => {
          warn!(collection, key = %key, error = %e, "skipping cache record with bad timestamp")
        }
      }
    }

    Ok(records)
  }

  fn get(&self, collection: &str, key: &str) -> Result<Option<StoredRecord>, CacheError> {
    let conn = self.lock()?;

    let row: Option<(Vec<u8>, String)> = conn
      .query_row(
        "SELECT data, cached_at FROM records WHERE collection = ? AND record_key = ?",
        params![collection, key],
        |row| Ok((row.get(0)?, row.get(1)?)),
      )
      .optional()
      .map_err(|e| CacheError::unavailable(format!("Failed to query record: {}", e)))?;

    match row {
      Some((data, cached_at)) => Ok(Some(StoredRecord {
        key: key.to_string(),
        data,
        cached_at: parse_datetime(&cached_at)?,
      })),
      None => Ok(None),
    }
  }

  fn delete(&self, collection: &str, key: &str) -> Result<bool, CacheError> {
    let removed = self
      .lock()?
      .execute(
        "DELETE FROM records WHERE collection = ? AND record_key = ?",
        params![collection, key],
      )
      .map_err(|e| CacheError::unavailable(format!("Failed to delete record: {}", e)))?;

    Ok(removed > 0)
  }

  fn prune(&self, collection: &str, seq: u64) -> Result<usize, CacheError> {
    let conn = self.lock()?;

    conn
      .execute(
        "INSERT INTO watermarks (collection, seq) VALUES (?1, ?2)
         ON CONFLICT (collection) DO UPDATE SET seq = MAX(watermarks.seq, excluded.seq)",
        params![collection, seq as i64],
      )
      .map_err(|e| CacheError::unavailable(format!("Failed to raise watermark: {}", e)))?;

    let removed = conn
      .execute(
        "DELETE FROM records WHERE collection = ?1 AND seq < ?2",
        params![collection, seq as i64],
      )
      .map_err(|e| CacheError::unavailable(format!("Failed to prune records: {}", e)))?;

    Ok(removed)
  }
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>, CacheError> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| CacheError::unavailable(format!("Failed to parse datetime '{}': {}", s, e)))
}
