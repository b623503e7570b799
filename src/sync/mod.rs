//! Offline-resilient request layer.
//!
//! Wraps reads in cache-refresh-or-fallback ([`SyncClient::fetch_with_cache`]),
//! wraps writes in forward-or-queue ([`SyncClient::queued_write`]) and replays
//! the queue in order ([`SyncClient::flush`]). Transport failures are absorbed
//! whenever a cache or queue path exists; HTTP rejections always propagate.

mod connectivity;
mod error;
mod queue;
#[cfg(test)]
pub(crate) mod testing;
mod transport;

pub use connectivity::{ConnectivityTracker, OFFLINE_POLL_INTERVAL, OFFLINE_WARN_THRESHOLD};
pub use error::{RequestError, SendError};
pub use queue::{PendingQueue, PendingRequest};
pub use transport::{HttpRequest, HttpResponse, ReqwestTransport, Transport};

use serde_json::Value;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::store::{CacheEntry, CacheKey, DurableStore};

/// A payload and where it came from.
#[derive(Debug, Clone)]
pub struct Fetched<T> {
  pub data: T,
  pub from_cache: bool,
}

impl Fetched<Value> {
  /// Deserialize the payload, keeping the provenance flag.
  pub fn parse<T: serde::de::DeserializeOwned>(self) -> Result<Fetched<T>, RequestError> {
    Ok(Fetched {
      data: serde_json::from_value(self.data)?,
      from_cache: self.from_cache,
    })
  }
}

/// Outcome of a write: forwarded now, or queued for replay.
#[derive(Debug, Clone, Copy)]
pub struct WriteOutcome {
  pub accepted: bool,
  pub queued: bool,
}

/// Outcome of one flush pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlushOutcome {
  /// Items accepted by the server and dropped from the queue
  pub sent: usize,
  /// Items still queued after the pass
  pub remaining: usize,
}

/// Latch released on drop, so a cancelled pass cannot wedge the flusher.
struct FlushLatch<'a>(&'a AtomicBool);

impl Drop for FlushLatch<'_> {
  fn drop(&mut self) {
    self.0.store(false, Ordering::SeqCst);
  }
}

/// The offline-resilience context.
///
/// Built once at startup and handed to every UI handler; clones share the
/// same store, queue and connectivity state.
#[derive(Clone)]
pub struct SyncClient {
  transport: Arc<dyn Transport>,
  store: Arc<DurableStore>,
  connectivity: ConnectivityTracker,
  queue: Arc<PendingQueue>,
  flushing: Arc<AtomicBool>,
}

impl SyncClient {
  pub fn new(
    transport: Arc<dyn Transport>,
    store: Arc<DurableStore>,
    warn_threshold: Duration,
  ) -> Self {
    let connectivity = ConnectivityTracker::new(Arc::clone(&store), warn_threshold);
    let queue = Arc::new(PendingQueue::load(Arc::clone(&store)));

    Self {
      transport,
      store,
      connectivity,
      queue,
      flushing: Arc::new(AtomicBool::new(false)),
    }
  }

  pub fn store(&self) -> &Arc<DurableStore> {
    &self.store
  }

  pub fn connectivity(&self) -> &ConnectivityTracker {
    &self.connectivity
  }

  /// Writes waiting for replay.
  pub fn pending_count(&self) -> usize {
    self.queue.len()
  }

  /// GET with cache refresh on success and cache fallback on transport
  /// failure.
  ///
  /// An HTTP error response proves the server is reachable, so it
  /// propagates instead of falling back to stale cache. The cache is only
  /// written after the response body parsed completely.
  pub async fn fetch_with_cache(
    &self,
    url: &str,
    key: &impl CacheKey,
  ) -> Result<Fetched<Value>, RequestError> {
    let request = HttpRequest::get(url);

    match self.transport.send(&request).await {
      Ok(response) => {
        self.connectivity.mark_connected();
        if !response.is_success() {
          return Err(RequestError::Rejected {
            status: response.status,
            body: response.body,
          });
        }

        let payload: Value = serde_json::from_str(&response.body)?;
        self
          .store
          .put_entry(&key.storage_key(), key.kind(), &CacheEntry::now(payload.clone()));
        self.spawn_flush();

        Ok(Fetched {
          data: payload,
          from_cache: false,
        })
      }
      Err(SendError::Network(reason)) => {
        self.connectivity.mark_disconnected();
        match self.store.get_entry(&key.storage_key()) {
          Some(entry) => {
            tracing::debug!("serving {} from cache while offline", key.description());
            Ok(Fetched {
              data: entry.payload,
              from_cache: true,
            })
          }
          None => Err(RequestError::Offline(reason)),
        }
      }
      Err(SendError::Other(reason)) => Err(RequestError::Other(reason)),
    }
  }

  /// POST that forwards immediately when the server is reachable, and on
  /// transport failure applies the caller's optimistic cache patch and
  /// queues the request for replay.
  ///
  /// `apply_local` runs only on a confirmed transport failure; its errors
  /// are logged and swallowed, the queuing happens regardless. An HTTP
  /// rejection propagates and is never queued.
  pub async fn queued_write<F>(
    &self,
    url: &str,
    body: &Value,
    apply_local: F,
  ) -> Result<WriteOutcome, RequestError>
  where
    F: FnOnce(&DurableStore) -> color_eyre::Result<()>,
  {
    let request = HttpRequest::post_json(url, body.to_string());

    match self.transport.send(&request).await {
      Ok(response) => {
        self.connectivity.mark_connected();
        if !response.is_success() {
          return Err(RequestError::Rejected {
            status: response.status,
            body: response.body,
          });
        }
        self.spawn_flush();
        Ok(WriteOutcome {
          accepted: true,
          queued: false,
        })
      }
      Err(SendError::Network(_)) => {
        self.connectivity.mark_disconnected();
        if let Err(e) = apply_local(&self.store) {
          tracing::warn!("optimistic local update failed: {}", e);
        }
        self.queue.append(PendingRequest::from_request(&request));
        tracing::info!("queued write to {} for replay", url);
        Ok(WriteOutcome {
          accepted: true,
          queued: true,
        })
      }
      Err(SendError::Other(reason)) => Err(RequestError::Other(reason)),
    }
  }

  /// Replay the pending queue in insertion order.
  ///
  /// A pass already in progress makes this call a no-op. Per item: 2xx
  /// drops it; an HTTP rejection retains it, visible for the next pass or
  /// manual resolution; a transport failure retains it and every later
  /// item unprocessed and stops the pass. A later item is never sent
  /// before the earlier one's outcome is known.
  pub async fn flush(&self) -> FlushOutcome {
    if self.flushing.swap(true, Ordering::SeqCst) {
      return FlushOutcome {
        sent: 0,
        remaining: self.queue.len(),
      };
    }
    let _latch = FlushLatch(&self.flushing);

    let items = self.queue.snapshot();
    let mut sent: HashSet<String> = HashSet::new();

    for item in &items {
      match self.transport.send(&item.to_request()).await {
        Ok(response) => {
          self.connectivity.mark_connected();
          if response.is_success() {
            sent.insert(item.id.clone());
          } else {
            // Still failing against a reachable server: retained, not
            // silently dropped
            tracing::warn!(
              "queued {} {} rejected with HTTP {}",
              item.method,
              item.url,
              response.status
            );
          }
        }
        Err(SendError::Network(reason)) => {
          self.connectivity.mark_disconnected();
          tracing::debug!("flush stopped, server unreachable: {}", reason);
          break;
        }
        Err(SendError::Other(reason)) => {
          // Unknown failure: retain the item rather than lose the write
          tracing::warn!("queued {} {} failed: {}", item.method, item.url, reason);
        }
      }
    }

    self.queue.remove(&sent);

    FlushOutcome {
      sent: sent.len(),
      remaining: self.queue.len(),
    }
  }

  /// Reconnect hint from the embedder: replay immediately.
  pub async fn notify_online(&self) -> FlushOutcome {
    self.flush().await
  }

  /// Opportunistic replay after a successful contact, off the caller's
  /// path.
  fn spawn_flush(&self) {
    if self.queue.is_empty() {
      return;
    }
    let client = self.clone();
    tokio::spawn(async move {
      let outcome = client.flush().await;
      if outcome.sent > 0 {
        tracing::info!(
          "replayed {} queued write(s), {} remaining",
          outcome.sent,
          outcome.remaining
        );
      }
    });
  }
}
