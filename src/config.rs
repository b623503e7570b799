use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::store::DEFAULT_FILE_ENTRY_CAP;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub server: ServerConfig,
  /// Default author for chat, review and recount actions
  pub operator: Option<String>,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub sync: SyncConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
  /// Base URL of the count-report server
  pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  /// Retention cap for cached per-area report files
  #[serde(default = "default_max_file_entries")]
  pub max_file_entries: usize,
  /// Override for the store database location
  pub db_path: Option<PathBuf>,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      max_file_entries: default_max_file_entries(),
      db_path: None,
    }
  }
}

fn default_max_file_entries() -> usize {
  DEFAULT_FILE_ENTRY_CAP
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
  /// Continuous offline seconds before the warning shows
  #[serde(default = "default_offline_warn_secs")]
  pub offline_warn_secs: u64,
  /// Offline-warning poll interval in milliseconds
  #[serde(default = "default_poll_interval_ms")]
  pub poll_interval_ms: u64,
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self {
      offline_warn_secs: default_offline_warn_secs(),
      poll_interval_ms: default_poll_interval_ms(),
    }
  }
}

fn default_offline_warn_secs() -> u64 {
  5 * 60
}

fn default_poll_interval_ms() -> u64 {
  2500
}

impl SyncConfig {
  pub fn offline_warn(&self) -> Duration {
    Duration::from_secs(self.offline_warn_secs)
  }

  pub fn poll_interval(&self) -> Duration {
    Duration::from_millis(self.poll_interval_ms)
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./recount.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/recount/config.yaml
  /// 4. ~/.config/recount/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/recount/config.yaml\n\
                 See config.example.yaml for the format."
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("recount.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("recount").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config: Config = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    Ok(config)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_minimal_config_gets_defaults() {
    let config: Config = serde_yaml::from_str(
      r#"
server:
  url: http://localhost:4800
"#,
    )
    .unwrap();

    assert_eq!(config.server.url, "http://localhost:4800");
    assert_eq!(config.operator, None);
    assert_eq!(config.cache.max_file_entries, DEFAULT_FILE_ENTRY_CAP);
    assert_eq!(config.sync.offline_warn(), Duration::from_secs(300));
    assert_eq!(config.sync.poll_interval(), Duration::from_millis(2500));
  }

  #[test]
  fn test_full_config_overrides() {
    let config: Config = serde_yaml::from_str(
      r#"
server:
  url: http://counts.example.com/api-root
operator: carla
cache:
  max_file_entries: 10
  db_path: /tmp/recount-test/store.db
sync:
  offline_warn_secs: 60
  poll_interval_ms: 500
"#,
    )
    .unwrap();

    assert_eq!(config.operator.as_deref(), Some("carla"));
    assert_eq!(config.cache.max_file_entries, 10);
    assert_eq!(
      config.cache.db_path.as_deref(),
      Some(Path::new("/tmp/recount-test/store.db"))
    );
    assert_eq!(config.sync.offline_warn(), Duration::from_secs(60));
    assert_eq!(config.sync.poll_interval(), Duration::from_millis(500));
  }
}
