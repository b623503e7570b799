//! Cache keys for the report server's read endpoints.

use sha2::{Digest, Sha256};

use crate::store::{CacheKey, EntryKind};

use super::types::RecordKind;

/// Cache key per read endpoint.
///
/// Report file bodies are the only kind subject to the retention cap; the
/// list, chat and record entries stay cached indefinitely.
#[derive(Clone, Debug)]
pub enum ReportCacheKey {
  /// The area report list
  AreaList,
  /// One report file body
  AreaFile { file: String },
  /// The shared chat log
  ChatLog,
  /// A record set for the browser
  Records { kind: RecordKind },
}

impl CacheKey for ReportCacheKey {
  fn storage_key(&self) -> String {
    let input = match self {
      Self::AreaList => "GET:/api/reports".to_string(),
      Self::AreaFile { file } => format!("GET:/api/reports:{}", file),
      Self::ChatLog => "GET:/api/chat".to_string(),
      Self::Records { kind } => format!("GET:/api/records:{}", kind.as_str()),
    };

    // SHA256 hash for stable, fixed-length keys
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
  }

  fn kind(&self) -> EntryKind {
    match self {
      Self::AreaList | Self::Records { .. } => EntryKind::List,
      Self::ChatLog => EntryKind::Chat,
      Self::AreaFile { .. } => EntryKind::File,
    }
  }

  fn description(&self) -> String {
    match self {
      Self::AreaList => "area report list".to_string(),
      Self::AreaFile { file } => format!("report {}", file),
      Self::ChatLog => "chat log".to_string(),
      Self::Records { kind } => format!("{} records", kind.as_str()),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_storage_keys_are_stable_digests() {
    let a = ReportCacheKey::AreaFile {
      file: "backroom.json".to_string(),
    };
    let b = ReportCacheKey::AreaFile {
      file: "backroom.json".to_string(),
    };
    assert_eq!(a.storage_key(), b.storage_key());
    assert_eq!(a.storage_key().len(), 64);
  }

  #[test]
  fn test_distinct_files_get_distinct_keys() {
    let a = ReportCacheKey::AreaFile {
      file: "backroom.json".to_string(),
    };
    let b = ReportCacheKey::AreaFile {
      file: "frontend.json".to_string(),
    };
    assert_ne!(a.storage_key(), b.storage_key());
  }

  #[test]
  fn test_eviction_kind_mapping() {
    assert_eq!(ReportCacheKey::AreaList.kind(), EntryKind::List);
    assert_eq!(ReportCacheKey::ChatLog.kind(), EntryKind::Chat);
    assert_eq!(
      ReportCacheKey::Records {
        kind: RecordKind::Sku
      }
      .kind(),
      EntryKind::List
    );
    assert_eq!(
      ReportCacheKey::AreaFile {
        file: "a.json".to_string()
      }
      .kind(),
      EntryKind::File
    );
  }
}
