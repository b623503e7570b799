//! Scripted transport for exercising the resilience layer without a server.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

use super::error::SendError;
use super::transport::{HttpRequest, HttpResponse, Transport};

/// Pops one canned outcome per send, records every request it sees, and can
/// hold the next send until notified.
pub(crate) struct FakeTransport {
  script: Mutex<VecDeque<Result<HttpResponse, SendError>>>,
  seen: Mutex<Vec<HttpRequest>>,
  hold: Mutex<Option<Arc<Notify>>>,
}

impl FakeTransport {
  pub(crate) fn new() -> Arc<Self> {
    Arc::new(Self {
      script: Mutex::new(VecDeque::new()),
      seen: Mutex::new(Vec::new()),
      hold: Mutex::new(None),
    })
  }

  pub(crate) fn push_ok(&self, status: u16, body: &str) {
    self.script.lock().unwrap().push_back(Ok(HttpResponse {
      status,
      body: body.to_string(),
    }));
  }

  pub(crate) fn push_network_err(&self) {
    self
      .script
      .lock()
      .unwrap()
      .push_back(Err(SendError::Network("connection refused".to_string())));
  }

  pub(crate) fn push_other_err(&self) {
    self
      .script
      .lock()
      .unwrap()
      .push_back(Err(SendError::Other("invalid request".to_string())));
  }

  /// Block the next send until the returned handle is notified.
  pub(crate) fn hold_next(&self) -> Arc<Notify> {
    let gate = Arc::new(Notify::new());
    *self.hold.lock().unwrap() = Some(Arc::clone(&gate));
    gate
  }

  pub(crate) fn sent_count(&self) -> usize {
    self.seen.lock().unwrap().len()
  }

  pub(crate) fn sent_urls(&self) -> Vec<String> {
    self
      .seen
      .lock()
      .unwrap()
      .iter()
      .map(|r| r.url.clone())
      .collect()
  }
}

#[async_trait]
impl Transport for FakeTransport {
  async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, SendError> {
    let gate = self.hold.lock().unwrap().take();
    if let Some(gate) = gate {
      gate.notified().await;
    }
    self.seen.lock().unwrap().push(request.clone());
    self.script.lock().unwrap().pop_front().unwrap_or_else(|| {
      Ok(HttpResponse {
        status: 200,
        body: "{}".to_string(),
      })
    })
  }
}
