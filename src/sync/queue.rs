//! The durable FIFO queue of unsent write requests.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

use super::transport::HttpRequest;
use crate::store::DurableStore;

/// Small-tier key holding the serialized queue.
const PENDING_QUEUE_KEY: &str = "sync.pending_queue";

/// A write that failed with a transport error and awaits replay.
///
/// Replay sends the method, headers and body exactly as recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingRequest {
  pub id: String,
  pub url: String,
  pub method: String,
  #[serde(default)]
  pub headers: BTreeMap<String, String>,
  pub body: String,
  pub queued_at: DateTime<Utc>,
}

impl PendingRequest {
  /// Record a failed request for later replay, with a fresh id.
  pub fn from_request(request: &HttpRequest) -> Self {
    Self {
      id: Uuid::new_v4().to_string(),
      url: request.url.clone(),
      method: request.method.clone(),
      headers: request.headers.clone(),
      body: request.body.clone().unwrap_or_default(),
      queued_at: Utc::now(),
    }
  }

  /// Rebuild the request exactly as recorded.
  pub fn to_request(&self) -> HttpRequest {
    HttpRequest {
      method: self.method.clone(),
      url: self.url.clone(),
      headers: self.headers.clone(),
      body: if self.body.is_empty() {
        None
      } else {
        Some(self.body.clone())
      },
    }
  }
}

/// FIFO queue persisted in the small tier; insertion order is replay order.
pub struct PendingQueue {
  store: Arc<DurableStore>,
  items: Mutex<Vec<PendingRequest>>,
}

impl PendingQueue {
  /// Load whatever queue an earlier session left behind.
  pub fn load(store: Arc<DurableStore>) -> Self {
    let items: Vec<PendingRequest> = store
      .get_small(PENDING_QUEUE_KEY)
      .and_then(|raw| serde_json::from_str(&raw).ok())
      .unwrap_or_default();

    if !items.is_empty() {
      tracing::info!("loaded {} pending write(s) from a previous session", items.len());
    }

    Self {
      store,
      items: Mutex::new(items),
    }
  }

  fn lock(&self) -> MutexGuard<'_, Vec<PendingRequest>> {
    self.items.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Append a request and persist the queue.
  pub fn append(&self, request: PendingRequest) {
    let mut items = self.lock();
    items.push(request);
    self.persist(&items);
  }

  /// Copy of the queue in replay order.
  pub fn snapshot(&self) -> Vec<PendingRequest> {
    self.lock().clone()
  }

  /// Drop the given ids, keeping everything else in order, and persist.
  ///
  /// Removal is by id rather than wholesale overwrite so that writes queued
  /// while a flush pass is in flight survive it.
  pub fn remove(&self, ids: &HashSet<String>) {
    let mut items = self.lock();
    items.retain(|item| !ids.contains(&item.id));
    self.persist(&items);
  }

  pub fn len(&self) -> usize {
    self.lock().len()
  }

  pub fn is_empty(&self) -> bool {
    self.lock().is_empty()
  }

  fn persist(&self, items: &[PendingRequest]) {
    match serde_json::to_string(items) {
      Ok(raw) => self.store.put_small(PENDING_QUEUE_KEY, &raw),
      Err(e) => tracing::warn!("failed to serialize pending queue: {}", e),
    }
  }
}
