//! HTTP transport seam.
//!
//! Requests go through the [`Transport`] trait so the resilience layer can
//! be exercised against a scripted transport in tests. The contract mirrors
//! the connectivity classification rule: a send that produces *any* HTTP
//! status returns `Ok`, and `Err(SendError::Network)` means the exchange
//! never completed.

use async_trait::async_trait;
use std::collections::BTreeMap;

use super::error::SendError;

/// A request as recorded for immediate dispatch or queued replay.
#[derive(Debug, Clone)]
pub struct HttpRequest {
  pub method: String,
  pub url: String,
  pub headers: BTreeMap<String, String>,
  pub body: Option<String>,
}

impl HttpRequest {
  /// Build a GET request.
  pub fn get(url: &str) -> Self {
    Self {
      method: "GET".to_string(),
      url: url.to_string(),
      headers: BTreeMap::new(),
      body: None,
    }
  }

  /// Build a POST request carrying a JSON body.
  pub fn post_json(url: &str, body: String) -> Self {
    let mut headers = BTreeMap::new();
    headers.insert("content-type".to_string(), "application/json".to_string());
    Self {
      method: "POST".to_string(),
      url: url.to_string(),
      headers,
      body: Some(body),
    }
  }
}

/// A completed HTTP exchange.
#[derive(Debug, Clone)]
pub struct HttpResponse {
  pub status: u16,
  pub body: String,
}

impl HttpResponse {
  /// Whether the status is in the 2xx range.
  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }
}

/// Trait for sending requests.
#[async_trait]
pub trait Transport: Send + Sync {
  /// Perform the exchange. `Ok` carries any status, including 4xx/5xx.
  async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, SendError>;
}

/// reqwest-backed transport.
///
/// No request timeout is configured: a hung request leaves the caller
/// suspended, matching the documented resource model.
pub struct ReqwestTransport {
  client: reqwest::Client,
}

impl ReqwestTransport {
  pub fn new() -> Self {
    Self {
      client: reqwest::Client::new(),
    }
  }
}

impl Default for ReqwestTransport {
  fn default() -> Self {
    Self::new()
  }
}

#[async_trait]
impl Transport for ReqwestTransport {
  async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, SendError> {
    let method = reqwest::Method::from_bytes(request.method.as_bytes())
      .map_err(|e| SendError::Other(format!("invalid method {}: {}", request.method, e)))?;

    let mut builder = self.client.request(method, &request.url);
    for (name, value) in &request.headers {
      builder = builder.header(name, value);
    }
    if let Some(body) = &request.body {
      builder = builder.body(body.clone());
    }

    let response = builder.send().await.map_err(classify)?;
    let status = response.status().as_u16();

    // A failure while draining the body means the exchange never fully
    // returned, so it classifies as a transport failure too
    let body = response
      .text()
      .await
      .map_err(|e| SendError::Network(e.to_string()))?;

    Ok(HttpResponse { status, body })
  }
}

/// Classify a reqwest error: once past the request builder, a failed send
/// means the server was never (fully) reached.
fn classify(err: reqwest::Error) -> SendError {
  if err.is_builder() {
    SendError::Other(err.to_string())
  } else {
    SendError::Network(err.to_string())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_post_json_sets_content_type() {
    let request = HttpRequest::post_json("http://localhost/api/chat", "{}".to_string());
    assert_eq!(request.method, "POST");
    assert_eq!(
      request.headers.get("content-type").map(String::as_str),
      Some("application/json")
    );
    assert_eq!(request.body.as_deref(), Some("{}"));
  }

  #[test]
  fn test_success_range() {
    assert!(HttpResponse { status: 200, body: String::new() }.is_success());
    assert!(HttpResponse { status: 204, body: String::new() }.is_success());
    assert!(!HttpResponse { status: 199, body: String::new() }.is_success());
    assert!(!HttpResponse { status: 400, body: String::new() }.is_success());
    assert!(!HttpResponse { status: 500, body: String::new() }.is_success());
  }
}
