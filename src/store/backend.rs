//! Storage backends: SQLite-backed persistence and the in-memory mirror.

use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::traits::{CacheEntry, EntryKind};

/// Trait for durable store backends.
///
/// The small tier holds short string values (pending queue, connectivity
/// timestamp, last-seen markers). The large tier holds cached payloads with
/// the per-key write time and eviction kind.
pub trait StoreBackend: Send + Sync {
  /// Read a small-tier value.
  fn get_small(&self, key: &str) -> Result<Option<String>>;

  /// Write a small-tier value.
  fn put_small(&self, key: &str, value: &str) -> Result<()>;

  /// Remove a small-tier value.
  fn delete_small(&self, key: &str) -> Result<()>;

  /// Read a large-tier entry.
  fn get_entry(&self, key: &str) -> Result<Option<CacheEntry>>;

  /// Write a large-tier entry with its eviction kind.
  fn put_entry(&self, key: &str, kind: EntryKind, entry: &CacheEntry) -> Result<()>;

  /// Remove a large-tier entry.
  fn delete_entry(&self, key: &str) -> Result<()>;

  /// Keys and write timestamps of all large-tier entries of one kind,
  /// consumed by the eviction pass.
  fn entry_keys(&self, kind: EntryKind) -> Result<Vec<(String, i64)>>;
}

/// SQLite-based store backend.
pub struct SqliteBackend {
  conn: Mutex<Connection>,
}

/// Schema for the two storage tiers.
const STORE_SCHEMA: &str = r#"
-- Small tier: short string values (queue, markers, timestamps)
CREATE TABLE IF NOT EXISTS small_store (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

-- Large tier: cached payloads plus per-key eviction metadata
CREATE TABLE IF NOT EXISTS large_store (
    key TEXT PRIMARY KEY,
    kind TEXT NOT NULL,
    timestamp INTEGER NOT NULL,
    payload BLOB NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_large_store_kind
    ON large_store(kind, timestamp);
"#;

impl SqliteBackend {
  /// Open the backend at the given path, or the default location.
  pub fn open(path: Option<&Path>) -> Result<Self> {
    let path = match path {
      Some(p) => p.to_path_buf(),
      None => Self::default_path()?,
    };

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create store directory: {}", e))?;
    }

    let conn = Connection::open(&path)
      .map_err(|e| eyre!("Failed to open store database at {}: {}", path.display(), e))?;

    let backend = Self {
      conn: Mutex::new(conn),
    };
    backend.run_migrations()?;

    Ok(backend)
  }

  /// Get the default database path.
  fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("recount").join("store.db"))
  }

  /// Run database migrations for the store tables.
  fn run_migrations(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute_batch(STORE_SCHEMA)
      .map_err(|e| eyre!("Failed to run store migrations: {}", e))?;

    Ok(())
  }
}

impl StoreBackend for SqliteBackend {
  fn get_small(&self, key: &str) -> Result<Option<String>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare("SELECT value FROM small_store WHERE key = ?")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let value: Option<String> = stmt.query_row(params![key], |row| row.get(0)).ok();
    Ok(value)
  }

  fn put_small(&self, key: &str, value: &str) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO small_store (key, value) VALUES (?, ?)",
        params![key, value],
      )
      .map_err(|e| eyre!("Failed to write small-tier value: {}", e))?;

    Ok(())
  }

  fn delete_small(&self, key: &str) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute("DELETE FROM small_store WHERE key = ?", params![key])
      .map_err(|e| eyre!("Failed to delete small-tier value: {}", e))?;

    Ok(())
  }

  fn get_entry(&self, key: &str) -> Result<Option<CacheEntry>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare("SELECT timestamp, payload FROM large_store WHERE key = ?")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let row: Option<(i64, Vec<u8>)> = stmt
      .query_row(params![key], |row| Ok((row.get(0)?, row.get(1)?)))
      .ok();

    match row {
      Some((timestamp, payload)) => {
        let payload = serde_json::from_slice(&payload)
          .map_err(|e| eyre!("Failed to deserialize cached payload: {}", e))?;
        Ok(Some(CacheEntry { timestamp, payload }))
      }
      None => Ok(None),
    }
  }

  fn put_entry(&self, key: &str, kind: EntryKind, entry: &CacheEntry) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let payload = serde_json::to_vec(&entry.payload)
      .map_err(|e| eyre!("Failed to serialize payload: {}", e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO large_store (key, kind, timestamp, payload)
         VALUES (?, ?, ?, ?)",
        params![key, kind.as_str(), entry.timestamp, payload],
      )
      .map_err(|e| eyre!("Failed to write large-tier entry: {}", e))?;

    Ok(())
  }

  fn delete_entry(&self, key: &str) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute("DELETE FROM large_store WHERE key = ?", params![key])
      .map_err(|e| eyre!("Failed to delete large-tier entry: {}", e))?;

    Ok(())
  }

  fn entry_keys(&self, kind: EntryKind) -> Result<Vec<(String, i64)>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare("SELECT key, timestamp FROM large_store WHERE kind = ? ORDER BY timestamp, key")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let keys: Vec<(String, i64)> = stmt
      .query_map(params![kind.as_str()], |row| {
        Ok((row.get(0)?, row.get(1)?))
      })
      .map_err(|e| eyre!("Failed to query entry keys: {}", e))?
      .filter_map(|r| r.ok())
      .collect();

    Ok(keys)
  }
}

/// In-memory store backend.
///
/// Serves two roles: the session-lifetime mirror that keeps reads correct
/// when the persistent backend is unavailable, and the fallback primary when
/// the database cannot be opened at all.
#[derive(Default)]
pub struct MemoryBackend {
  small: Mutex<HashMap<String, String>>,
  large: Mutex<HashMap<String, (EntryKind, CacheEntry)>>,
}

impl MemoryBackend {
  pub fn new() -> Self {
    Self::default()
  }
}

impl StoreBackend for MemoryBackend {
  fn get_small(&self, key: &str) -> Result<Option<String>> {
    let small = self
      .small
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(small.get(key).cloned())
  }

  fn put_small(&self, key: &str, value: &str) -> Result<()> {
    let mut small = self
      .small
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    small.insert(key.to_string(), value.to_string());
    Ok(())
  }

  fn delete_small(&self, key: &str) -> Result<()> {
    let mut small = self
      .small
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    small.remove(key);
    Ok(())
  }

  fn get_entry(&self, key: &str) -> Result<Option<CacheEntry>> {
    let large = self
      .large
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(large.get(key).map(|(_, entry)| entry.clone()))
  }

  fn put_entry(&self, key: &str, kind: EntryKind, entry: &CacheEntry) -> Result<()> {
    let mut large = self
      .large
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    large.insert(key.to_string(), (kind, entry.clone()));
    Ok(())
  }

  fn delete_entry(&self, key: &str) -> Result<()> {
    let mut large = self
      .large
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    large.remove(key);
    Ok(())
  }

  fn entry_keys(&self, kind: EntryKind) -> Result<Vec<(String, i64)>> {
    let large = self
      .large
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut keys: Vec<(String, i64)> = large
      .iter()
      .filter(|(_, (k, _))| *k == kind)
      .map(|(key, (_, entry))| (key.clone(), entry.timestamp))
      .collect();
    keys.sort_by(|a, b| (a.1, &a.0).cmp(&(b.1, &b.0)));

    Ok(keys)
  }
}
