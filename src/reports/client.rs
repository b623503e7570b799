//! Client for the count-report server, wired through the offline layer.
//!
//! Every read goes through [`SyncClient::fetch_with_cache`] and every write
//! through [`SyncClient::queued_write`] with an optimistic patch, so the UI
//! keeps working against cached state while the server is unreachable.

use chrono::Utc;
use color_eyre::{eyre::eyre, Result};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use url::Url;

use crate::config::Config;
use crate::store::{CacheKey, DurableStore};
use crate::sync::{
  ConnectivityTracker, Fetched, FlushOutcome, ReqwestTransport, RequestError, SyncClient,
  WriteOutcome,
};

use super::cache::ReportCacheKey;
use super::types::{AreaReport, AreaSummary, ChatMessage, RecordKind};

/// Small-tier key holding the last time the chat was read.
const CHAT_SEEN_KEY: &str = "reports.chat_seen";

/// The boundary the UI consumes.
#[derive(Clone)]
pub struct ReportClient {
  sync: SyncClient,
  base: Url,
}

impl ReportClient {
  /// Build the client and its offline context from configuration.
  pub fn new(config: &Config) -> Result<Self> {
    let base = parse_base_url(&config.server.url)?;
    let store = Arc::new(DurableStore::open(
      config.cache.db_path.as_deref(),
      config.cache.max_file_entries,
    ));
    let sync = SyncClient::new(
      Arc::new(ReqwestTransport::new()),
      store,
      config.sync.offline_warn(),
    );

    Ok(Self { sync, base })
  }

  /// Build over an explicit sync context (embedders, tests).
  pub fn with_sync(sync: SyncClient, base_url: &str) -> Result<Self> {
    Ok(Self {
      sync,
      base: parse_base_url(base_url)?,
    })
  }

  fn endpoint(&self, path: &str) -> Result<String, RequestError> {
    self
      .base
      .join(path)
      .map(|url| url.to_string())
      .map_err(|e| RequestError::Other(format!("invalid endpoint {}: {}", path, e)))
  }

  /// List area reports with their totals.
  pub async fn area_summaries(&self) -> Result<Fetched<Vec<AreaSummary>>, RequestError> {
    let url = self.endpoint("api/reports")?;
    self
      .sync
      .fetch_with_cache(&url, &ReportCacheKey::AreaList)
      .await?
      .parse()
  }

  /// Fetch one per-area report.
  pub async fn area_report(&self, file: &str) -> Result<Fetched<AreaReport>, RequestError> {
    let url = self.endpoint(&format!("api/reports/{}", file))?;
    let key = ReportCacheKey::AreaFile {
      file: file.to_string(),
    };
    self.sync.fetch_with_cache(&url, &key).await?.parse()
  }

  /// Fetch the chat log.
  pub async fn chat_log(&self) -> Result<Fetched<Vec<ChatMessage>>, RequestError> {
    let url = self.endpoint("api/chat")?;
    self
      .sync
      .fetch_with_cache(&url, &ReportCacheKey::ChatLog)
      .await?
      .parse()
  }

  /// Fetch a record set for the browser. Rows are free-form: the server
  /// serves whatever the employee/location/SKU files contain.
  pub async fn records(&self, kind: RecordKind) -> Result<Fetched<Vec<Value>>, RequestError> {
    let url = self.endpoint(&format!("api/records/{}", kind.as_str()))?;
    self
      .sync
      .fetch_with_cache(&url, &ReportCacheKey::Records { kind })
      .await?
      .parse()
  }

  /// Post a chat message. Offline, the message lands in the cached log
  /// immediately and the request queues for replay.
  pub async fn post_chat(&self, author: &str, text: &str) -> Result<WriteOutcome, RequestError> {
    let url = self.endpoint("api/chat")?;
    let message = json!({
      "author": author,
      "text": text,
      "sent_at": Utc::now().to_rfc3339(),
    });

    let key = ReportCacheKey::ChatLog;
    let patched = message.clone();
    self
      .sync
      .queued_write(&url, &message, move |store| {
        store.update_entry(&key.storage_key(), key.kind(), |payload| {
          if let Some(messages) = payload.as_array_mut() {
            messages.push(patched);
          }
        });
        Ok(())
      })
      .await
  }

  /// Mark a report reviewed. Offline, the flag flips in the cached report
  /// and in the cached list row.
  pub async fn mark_reviewed(&self, file: &str, reviewed_by: &str) -> Result<WriteOutcome, RequestError> {
    let url = self.endpoint(&format!("api/reports/{}/review", file))?;
    let body = json!({
      "reviewed": true,
      "reviewed_by": reviewed_by,
    });

    let file_key = ReportCacheKey::AreaFile {
      file: file.to_string(),
    };
    let list_key = ReportCacheKey::AreaList;
    let file_name = file.to_string();
    self
      .sync
      .queued_write(&url, &body, move |store| {
        store.update_entry(&file_key.storage_key(), file_key.kind(), |payload| {
          payload["reviewed"] = json!(true);
        });
        store.update_entry(&list_key.storage_key(), list_key.kind(), |payload| {
          if let Some(rows) = payload.as_array_mut() {
            for row in rows {
              if row["file"] == file_name.as_str() {
                row["reviewed"] = json!(true);
              }
            }
          }
        });
        Ok(())
      })
      .await
  }

  /// Request a recount for one category of an area.
  pub async fn request_recount(
    &self,
    file: &str,
    category: &str,
    requested_by: &str,
  ) -> Result<WriteOutcome, RequestError> {
    let url = self.endpoint(&format!("api/reports/{}/recount", file))?;
    let recount = json!({
      "category": category,
      "requested_by": requested_by,
      "requested_at": Utc::now().to_rfc3339(),
      "completed": false,
    });

    let key = ReportCacheKey::AreaFile {
      file: file.to_string(),
    };
    let patched = recount.clone();
    self
      .sync
      .queued_write(&url, &recount, move |store| {
        store.update_entry(&key.storage_key(), key.kind(), |payload| {
          if let Some(recounts) = payload["recounts"].as_array_mut() {
            recounts.push(patched);
          }
        });
        Ok(())
      })
      .await
  }

  /// Attach a question to a report.
  pub async fn ask_question(
    &self,
    file: &str,
    text: &str,
    asked_by: &str,
  ) -> Result<WriteOutcome, RequestError> {
    let url = self.endpoint(&format!("api/reports/{}/questions", file))?;
    let question = json!({
      "text": text,
      "asked_by": asked_by,
      "asked_at": Utc::now().to_rfc3339(),
      "answer": null,
    });

    let key = ReportCacheKey::AreaFile {
      file: file.to_string(),
    };
    let patched = question.clone();
    self
      .sync
      .queued_write(&url, &question, move |store| {
        store.update_entry(&key.storage_key(), key.kind(), |payload| {
          if let Some(questions) = payload["questions"].as_array_mut() {
            questions.push(patched);
          }
        });
        Ok(())
      })
      .await
  }

  /// Last time the chat was read, backing the unread badge.
  pub fn chat_last_seen(&self) -> Option<i64> {
    self
      .sync
      .store()
      .get_small(CHAT_SEEN_KEY)
      .and_then(|raw| raw.parse::<i64>().ok())
  }

  /// Record that the chat has been read just now.
  pub fn mark_chat_seen(&self) {
    let now = Utc::now().timestamp_millis();
    self.sync.store().put_small(CHAT_SEEN_KEY, &now.to_string());
  }

  /// Warm the list, chat and record caches concurrently.
  ///
  /// Failures are logged, not fatal: right after a reconnect some
  /// endpoints may still be flapping.
  pub async fn refresh(&self) {
    let (summaries, chat, records) = futures::join!(
      self.area_summaries(),
      self.chat_log(),
      futures::future::join_all(RecordKind::ALL.iter().map(|&kind| self.records(kind))),
    );

    if let Err(e) = summaries {
      tracing::warn!("report list refresh failed: {}", e);
    }
    if let Err(e) = chat {
      tracing::warn!("chat refresh failed: {}", e);
    }
    for (kind, result) in RecordKind::ALL.iter().zip(records) {
      if let Err(e) = result {
        tracing::warn!("{} record refresh failed: {}", kind.as_str(), e);
      }
    }
  }

  /// Replay queued writes now.
  pub async fn flush(&self) -> FlushOutcome {
    self.sync.flush().await
  }

  /// Reconnect hint from the embedder.
  pub async fn notify_online(&self) -> FlushOutcome {
    self.sync.notify_online().await
  }

  /// Writes waiting for replay.
  pub fn pending_count(&self) -> usize {
    self.sync.pending_count()
  }

  pub fn connectivity(&self) -> &ConnectivityTracker {
    self.sync.connectivity()
  }

  /// Start the offline-warning monitor and hand back its flag.
  pub fn watch_offline_warning(&self, every: Duration) -> watch::Receiver<bool> {
    self.sync.connectivity().spawn_monitor(every)
  }
}

fn parse_base_url(raw: &str) -> Result<Url> {
  let mut base = Url::parse(raw).map_err(|e| eyre!("Invalid server URL {}: {}", raw, e))?;
  // Relative joins replace the last path segment unless the base ends in '/'
  if !base.path().ends_with('/') {
    let path = format!("{}/", base.path());
    base.set_path(&path);
  }
  Ok(base)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::store::DEFAULT_FILE_ENTRY_CAP;
  use crate::sync::testing::FakeTransport;
  use crate::sync::OFFLINE_WARN_THRESHOLD;

  fn client(transport: &Arc<FakeTransport>) -> ReportClient {
    let sync = SyncClient::new(
      Arc::clone(transport) as Arc<dyn crate::sync::Transport>,
      Arc::new(DurableStore::in_memory(DEFAULT_FILE_ENTRY_CAP)),
      OFFLINE_WARN_THRESHOLD,
    );
    ReportClient::with_sync(sync, "http://localhost:4800").unwrap()
  }

  #[test]
  fn test_base_url_joining() {
    let base = parse_base_url("http://localhost:4800").unwrap();
    assert_eq!(
      base.join("api/reports").unwrap().as_str(),
      "http://localhost:4800/api/reports"
    );

    let nested = parse_base_url("http://host/counts").unwrap();
    assert_eq!(
      nested.join("api/chat").unwrap().as_str(),
      "http://host/counts/api/chat"
    );
  }

  #[tokio::test]
  async fn test_area_summaries_roundtrip() {
    let transport = FakeTransport::new();
    let client = client(&transport);

    transport.push_ok(
      200,
      r#"[{"file": "backroom.json", "area": "Backroom", "counted_at": "2026-01-15T09:30:00Z",
           "money_total": 1204.5, "quantity_total": 311, "reviewed": false}]"#,
    );
    let fetched = client.area_summaries().await.unwrap();
    assert!(!fetched.from_cache);
    assert_eq!(fetched.data.len(), 1);
    assert_eq!(fetched.data[0].area, "Backroom");
    assert_eq!(
      transport.sent_urls(),
      vec!["http://localhost:4800/api/reports".to_string()]
    );
  }

  #[tokio::test]
  async fn test_offline_chat_post_is_visible_in_cached_log() {
    let transport = FakeTransport::new();
    let client = client(&transport);

    // Prime the chat cache while online
    transport.push_ok(
      200,
      r#"[{"author": "ann", "text": "starting backroom", "sent_at": "2026-01-15T09:00:00Z"}]"#,
    );
    client.chat_log().await.unwrap();

    // Post while offline: queued, optimistically cached
    transport.push_network_err();
    let outcome = client.post_chat("bob", "done with aisle 4").await.unwrap();
    assert!(outcome.queued);
    assert_eq!(client.pending_count(), 1);

    // A read while still offline serves the patched log
    transport.push_network_err();
    let log = client.chat_log().await.unwrap();
    assert!(log.from_cache);
    assert_eq!(log.data.len(), 2);
    assert_eq!(log.data[1].author, "bob");
    assert_eq!(log.data[1].text, "done with aisle 4");
  }

  #[tokio::test]
  async fn test_offline_review_patches_report_and_list() {
    let transport = FakeTransport::new();
    let client = client(&transport);

    transport.push_ok(
      200,
      r#"[{"file": "backroom.json", "area": "Backroom", "counted_at": "2026-01-15T09:30:00Z",
           "money_total": 1204.5, "quantity_total": 311, "reviewed": false}]"#,
    );
    client.area_summaries().await.unwrap();

    transport.push_ok(
      200,
      r#"{"file": "backroom.json", "area": "Backroom", "counted_at": "2026-01-15T09:30:00Z",
          "money_total": 1204.5, "quantity_total": 311, "reviewed": false}"#,
    );
    client.area_report("backroom.json").await.unwrap();

    transport.push_network_err();
    let outcome = client.mark_reviewed("backroom.json", "carla").await.unwrap();
    assert!(outcome.queued);

    transport.push_network_err();
    let report = client.area_report("backroom.json").await.unwrap();
    assert!(report.from_cache);
    assert!(report.data.reviewed);

    transport.push_network_err();
    let list = client.area_summaries().await.unwrap();
    assert!(list.from_cache);
    assert!(list.data[0].reviewed);
  }

  #[tokio::test]
  async fn test_offline_recount_request_lands_in_cached_report() {
    let transport = FakeTransport::new();
    let client = client(&transport);

    transport.push_ok(
      200,
      r#"{"file": "backroom.json", "area": "Backroom", "counted_at": "2026-01-15T09:30:00Z",
          "money_total": 1204.5, "quantity_total": 311, "recounts": []}"#,
    );
    client.area_report("backroom.json").await.unwrap();

    transport.push_network_err();
    client
      .request_recount("backroom.json", "electronics", "carla")
      .await
      .unwrap();

    transport.push_network_err();
    let report = client.area_report("backroom.json").await.unwrap();
    assert_eq!(report.data.recounts.len(), 1);
    assert_eq!(report.data.recounts[0].category, "electronics");
    assert!(!report.data.recounts[0].completed);
  }

  #[tokio::test]
  async fn test_rejected_write_surfaces_to_caller() {
    let transport = FakeTransport::new();
    let client = client(&transport);

    transport.push_ok(409, "already reviewed");
    let err = client.mark_reviewed("backroom.json", "carla").await.unwrap_err();
    assert!(matches!(err, RequestError::Rejected { status: 409, .. }));
    assert_eq!(client.pending_count(), 0);
  }

  #[tokio::test]
  async fn test_chat_seen_marker_roundtrip() {
    let transport = FakeTransport::new();
    let client = client(&transport);

    assert_eq!(client.chat_last_seen(), None);
    client.mark_chat_seen();
    let seen = client.chat_last_seen().unwrap();
    assert!(seen > 0);
  }

  #[tokio::test]
  async fn test_record_endpoint_per_kind() {
    let transport = FakeTransport::new();
    let client = client(&transport);

    transport.push_ok(200, r#"[{"id": "E-1", "name": "Ann"}]"#);
    let rows = client.records(RecordKind::Employee).await.unwrap();
    assert_eq!(rows.data.len(), 1);
    assert_eq!(
      transport.sent_urls(),
      vec!["http://localhost:4800/api/records/employee".to_string()]
    );
  }
}
