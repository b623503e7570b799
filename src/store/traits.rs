//! Core types for the durable two-tier store.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A cached server payload together with its local write time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
  /// Milliseconds since the Unix epoch, local clock at write time
  pub timestamp: i64,
  /// Payload as last seen from the server, possibly patched optimistically
  pub payload: Value,
}

impl CacheEntry {
  /// Create an entry stamped with the current wall clock.
  pub fn now(payload: Value) -> Self {
    Self {
      timestamp: Utc::now().timestamp_millis(),
      payload,
    }
  }

  /// Create an entry with an explicit write time.
  pub fn at(timestamp: i64, payload: Value) -> Self {
    Self { timestamp, payload }
  }
}

/// Kind of a large-tier entry, used by the eviction policy.
///
/// Only `File` entries count against the retention cap; `List` and `Chat`
/// entries are kept regardless of how many accumulate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
  /// A collection endpoint (report list, record sets)
  List,
  /// The shared chat log
  Chat,
  /// A single per-resource file body
  File,
}

impl EntryKind {
  /// Storage representation of the kind.
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::List => "list",
      Self::Chat => "chat",
      Self::File => "file",
    }
  }

  /// Parse the storage representation back into a kind.
  pub fn parse(s: &str) -> Option<Self> {
    match s {
      "list" => Some(Self::List),
      "chat" => Some(Self::Chat),
      "file" => Some(Self::File),
      _ => None,
    }
  }
}

/// Trait for cache lookup keys.
///
/// Implementors produce a stable storage key derived from the request shape
/// and declare which eviction kind the cached entry belongs to.
pub trait CacheKey {
  /// Stable, fixed-length storage key (hash of method + URL + identifier)
  fn storage_key(&self) -> String;

  /// Eviction kind for the large tier
  fn kind(&self) -> EntryKind;

  /// Human-readable description for logging
  fn description(&self) -> String;
}
