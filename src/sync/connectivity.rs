//! Connectivity tracking and the offline-warning monitor.

use chrono::Utc;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::store::DurableStore;

/// Offline interval after which the UI should show a warning.
pub const OFFLINE_WARN_THRESHOLD: Duration = Duration::from_secs(5 * 60);

/// How often the monitor re-evaluates the warning.
pub const OFFLINE_POLL_INTERVAL: Duration = Duration::from_millis(2500);

/// Small-tier key holding the start of the current offline interval.
const DISCONNECTED_SINCE_KEY: &str = "sync.disconnected_since";

/// Tracks whether the last network attempt reached the server.
///
/// `disconnected_since` marks the start of one contiguous offline interval:
/// repeated failures never move it, and any server contact (including a
/// non-2xx response) clears it. The interval start is persisted in the
/// small tier so a restart while offline keeps the original timer.
#[derive(Clone)]
pub struct ConnectivityTracker {
  store: Arc<DurableStore>,
  disconnected_since: Arc<Mutex<Option<i64>>>,
  warn_threshold: Duration,
  warning_tx: Arc<watch::Sender<bool>>,
}

impl ConnectivityTracker {
  pub fn new(store: Arc<DurableStore>, warn_threshold: Duration) -> Self {
    let persisted = store
      .get_small(DISCONNECTED_SINCE_KEY)
      .and_then(|raw| raw.parse::<i64>().ok());
    let (warning_tx, _) = watch::channel(false);

    Self {
      store,
      disconnected_since: Arc::new(Mutex::new(persisted)),
      warn_threshold,
      warning_tx: Arc::new(warning_tx),
    }
  }

  fn lock(&self) -> MutexGuard<'_, Option<i64>> {
    self
      .disconnected_since
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
  }

  /// Record a successful server contact. Any HTTP status counts: a 4xx/5xx
  /// response still proves the server is reachable.
  pub fn mark_connected(&self) {
    let mut since = self.lock();
    if since.take().is_some() {
      self.store.delete_small(DISCONNECTED_SINCE_KEY);
      tracing::info!("server reachable again");
    }
    drop(since);

    // The warning clears immediately, not at the next poll
    self.publish_warning(false);
  }

  /// Record a transport failure now.
  pub fn mark_disconnected(&self) {
    self.mark_disconnected_at(Utc::now().timestamp_millis());
  }

  /// Record a transport failure at an explicit time. Idempotent: the first
  /// failure of an interval wins.
  pub fn mark_disconnected_at(&self, now_ms: i64) {
    let mut since = self.lock();
    if since.is_none() {
      *since = Some(now_ms);
      self.store.put_small(DISCONNECTED_SINCE_KEY, &now_ms.to_string());
      tracing::warn!("server unreachable");
    }
    drop(since);

    // A failure on an interval already past the threshold (e.g. one that
    // persisted across a restart) should not wait for the next poll
    self.publish_warning(self.is_disconnected_past_threshold());
  }

  /// Start of the current offline interval, if any.
  pub fn disconnected_since(&self) -> Option<i64> {
    *self.lock()
  }

  /// Whether the current offline interval has lasted past the threshold.
  pub fn is_disconnected_past_threshold(&self) -> bool {
    self.is_disconnected_past_threshold_at(Utc::now().timestamp_millis())
  }

  /// Threshold check against an explicit clock.
  pub fn is_disconnected_past_threshold_at(&self, now_ms: i64) -> bool {
    match *self.lock() {
      Some(since) => now_ms - since >= self.warn_threshold.as_millis() as i64,
      None => false,
    }
  }

  fn publish_warning(&self, warn: bool) {
    self.warning_tx.send_if_modified(|current| {
      if *current != warn {
        *current = warn;
        true
      } else {
        false
      }
    });
  }

  /// Subscribe to the offline-warning flag without starting a monitor.
  pub fn subscribe_warning(&self) -> watch::Receiver<bool> {
    self.warning_tx.subscribe()
  }

  /// Spawn a task re-evaluating the warning on a fixed interval, so a
  /// client with no request activity still surfaces the warning once the
  /// threshold elapses.
  pub fn spawn_monitor(&self, every: Duration) -> watch::Receiver<bool> {
    let tracker = self.clone();
    let rx = self.warning_tx.subscribe();

    tokio::spawn(async move {
      let mut ticker = tokio::time::interval(every);
      ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
      loop {
        ticker.tick().await;
        tracker.publish_warning(tracker.is_disconnected_past_threshold());
      }
    });

    rx
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::store::DEFAULT_FILE_ENTRY_CAP;

  const MINUTE_MS: i64 = 60 * 1000;

  fn tracker() -> ConnectivityTracker {
    let store = Arc::new(DurableStore::in_memory(DEFAULT_FILE_ENTRY_CAP));
    ConnectivityTracker::new(store, OFFLINE_WARN_THRESHOLD)
  }

  #[test]
  fn test_threshold_boundaries() {
    let t = tracker();
    assert!(!t.is_disconnected_past_threshold_at(0));

    t.mark_disconnected_at(0);
    assert!(!t.is_disconnected_past_threshold_at(4 * MINUTE_MS + 59 * 1000));
    assert!(t.is_disconnected_past_threshold_at(5 * MINUTE_MS));
  }

  #[test]
  fn test_reconnect_resets_interval() {
    let t = tracker();
    t.mark_disconnected_at(0);
    t.mark_connected();
    assert_eq!(t.disconnected_since(), None);

    // A later disconnect starts a fresh timer
    t.mark_disconnected_at(2 * MINUTE_MS);
    assert!(!t.is_disconnected_past_threshold_at(5 * MINUTE_MS));
    assert!(t.is_disconnected_past_threshold_at(7 * MINUTE_MS));
  }

  #[test]
  fn test_mark_disconnected_is_idempotent() {
    let t = tracker();
    t.mark_disconnected_at(1000);
    t.mark_disconnected_at(9000);
    assert_eq!(t.disconnected_since(), Some(1000));
  }

  #[test]
  fn test_interval_start_survives_restart() {
    let store = Arc::new(DurableStore::in_memory(DEFAULT_FILE_ENTRY_CAP));
    let first = ConnectivityTracker::new(Arc::clone(&store), OFFLINE_WARN_THRESHOLD);
    first.mark_disconnected_at(12345);

    let second = ConnectivityTracker::new(store, OFFLINE_WARN_THRESHOLD);
    assert_eq!(second.disconnected_since(), Some(12345));
  }

  #[tokio::test]
  async fn test_monitor_raises_and_clears_warning() {
    let t = tracker();
    let mut rx = t.spawn_monitor(Duration::from_millis(10));
    assert!(!*rx.borrow());

    // Already past the threshold; the next poll should raise the warning
    t.mark_disconnected_at(Utc::now().timestamp_millis() - 6 * MINUTE_MS);
    tokio::time::timeout(Duration::from_secs(1), rx.changed())
      .await
      .expect("warning not raised")
      .unwrap();
    assert!(*rx.borrow());

    // Clearing does not wait for the next poll
    t.mark_connected();
    assert!(!*t.subscribe_warning().borrow());
  }
}
