//! Durable two-tier key-value store with in-memory fallback.
//!
//! The small tier holds the pending write queue, the disconnected-since
//! timestamp and last-seen markers; the large tier holds cached GET payloads
//! with a retention cap on per-resource file entries.
//!
//! All writes are best-effort. Every write also lands in a session-lifetime
//! in-memory mirror, so if the persistent backend fails mid-session (disk
//! full, locked database) reads keep returning what was written. The first
//! backend failure is logged; later ones are silent.

mod backend;
mod traits;

pub use backend::{MemoryBackend, SqliteBackend, StoreBackend};
pub use traits::{CacheEntry, CacheKey, EntryKind};

use chrono::Utc;
use serde_json::Value;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

/// Default retention cap for `File`-kind large-tier entries.
pub const DEFAULT_FILE_ENTRY_CAP: usize = 60;

/// Facade over the persistent backend and its in-memory mirror.
///
/// Constructed once at startup and shared for the lifetime of the process;
/// none of its operations return errors to callers.
pub struct DurableStore {
  primary: Box<dyn StoreBackend>,
  mirror: MemoryBackend,
  file_entry_cap: usize,
  degraded: AtomicBool,
}

impl DurableStore {
  /// Open the SQLite-backed store, falling back to memory-only when the
  /// database cannot be opened.
  pub fn open(path: Option<&Path>, file_entry_cap: usize) -> Self {
    let primary: Box<dyn StoreBackend> = match SqliteBackend::open(path) {
      Ok(backend) => Box::new(backend),
      Err(e) => {
        tracing::warn!("persistent store unavailable, running in-memory: {}", e);
        Box::new(MemoryBackend::new())
      }
    };
    Self::with_backend(primary, file_entry_cap)
  }

  /// Build a store over an explicit backend.
  pub fn with_backend(primary: Box<dyn StoreBackend>, file_entry_cap: usize) -> Self {
    Self {
      primary,
      mirror: MemoryBackend::new(),
      file_entry_cap,
      degraded: AtomicBool::new(false),
    }
  }

  /// Build a memory-only store.
  pub fn in_memory(file_entry_cap: usize) -> Self {
    Self::with_backend(Box::new(MemoryBackend::new()), file_entry_cap)
  }

  /// Retention cap for `File`-kind entries.
  pub fn file_entry_cap(&self) -> usize {
    self.file_entry_cap
  }

  /// Log the first backend failure, stay silent afterwards.
  fn note_failure(&self, op: &str, err: &color_eyre::Report) {
    if !self.degraded.swap(true, Ordering::Relaxed) {
      tracing::warn!("durable store degraded ({} failed): {}", op, err);
    }
  }

  /// Read a small-tier value.
  ///
  /// Once the backend has failed a write, misses are re-checked against the
  /// mirror: the value may only exist in memory.
  pub fn get_small(&self, key: &str) -> Option<String> {
    match self.primary.get_small(key) {
      Ok(Some(value)) => Some(value),
      Ok(None) if self.degraded.load(Ordering::Relaxed) => {
        self.mirror.get_small(key).ok().flatten()
      }
      Ok(None) => None,
      Err(e) => {
        self.note_failure("read", &e);
        self.mirror.get_small(key).ok().flatten()
      }
    }
  }

  /// Write a small-tier value. Best-effort, never raises.
  pub fn put_small(&self, key: &str, value: &str) {
    let _ = self.mirror.put_small(key, value);
    if let Err(e) = self.primary.put_small(key, value) {
      self.note_failure("write", &e);
    }
  }

  /// Remove a small-tier value.
  pub fn delete_small(&self, key: &str) {
    let _ = self.mirror.delete_small(key);
    if let Err(e) = self.primary.delete_small(key) {
      self.note_failure("delete", &e);
    }
  }

  /// Read a large-tier entry.
  pub fn get_entry(&self, key: &str) -> Option<CacheEntry> {
    match self.primary.get_entry(key) {
      Ok(Some(entry)) => Some(entry),
      Ok(None) if self.degraded.load(Ordering::Relaxed) => {
        self.mirror.get_entry(key).ok().flatten()
      }
      Ok(None) => None,
      Err(e) => {
        self.note_failure("read", &e);
        self.mirror.get_entry(key).ok().flatten()
      }
    }
  }

  /// Write a large-tier entry, then prune `File` entries above the cap.
  pub fn put_entry(&self, key: &str, kind: EntryKind, entry: &CacheEntry) {
    let _ = self.mirror.put_entry(key, kind, entry);
    if let Err(e) = self.primary.put_entry(key, kind, entry) {
      self.note_failure("write", &e);
    }
    if kind == EntryKind::File {
      self.evict_file_entries();
    }
  }

  /// Remove a large-tier entry.
  pub fn delete_entry(&self, key: &str) {
    let _ = self.mirror.delete_entry(key);
    if let Err(e) = self.primary.delete_entry(key) {
      self.note_failure("delete", &e);
    }
  }

  /// Patch a cached payload in place, bumping its write timestamp.
  ///
  /// Returns false when nothing is cached under the key.
  pub fn update_entry(
    &self,
    key: &str,
    kind: EntryKind,
    patch: impl FnOnce(&mut Value),
  ) -> bool {
    let Some(mut entry) = self.get_entry(key) else {
      return false;
    };
    patch(&mut entry.payload);
    entry.timestamp = Utc::now().timestamp_millis();
    self.put_entry(key, kind, &entry);
    true
  }

  /// Delete oldest `File` entries until the cap is respected.
  ///
  /// List and chat entries never participate.
  fn evict_file_entries(&self) {
    let keys = match self.primary.entry_keys(EntryKind::File) {
      Ok(keys) => keys,
      Err(e) => {
        self.note_failure("scan", &e);
        match self.mirror.entry_keys(EntryKind::File) {
          Ok(keys) => keys,
          Err(_) => return,
        }
      }
    };

    if keys.len() <= self.file_entry_cap {
      return;
    }

    let excess = keys.len() - self.file_entry_cap;
    for (key, _) in keys.iter().take(excess) {
      tracing::debug!("evicting cached file entry {}", key);
      self.delete_entry(key);
    }
  }
}
