//! Request outcome taxonomy.
//!
//! The distinction between a transport failure (the server was never
//! reached) and an HTTP rejection (the server was reached and refused the
//! request) is load-bearing: only transport failures may fall back to the
//! cache or the pending queue. A rejection must surface to the caller so a
//! bad request is never mistaken for an offline condition.

use thiserror::Error;

/// Error produced by a transport send attempt.
#[derive(Debug, Error)]
pub enum SendError {
  /// The exchange never completed: DNS, connection refusal, timeout
  #[error("transport failure: {0}")]
  Network(String),
  /// Anything else (invalid URL or method, builder failure)
  #[error("request failed: {0}")]
  Other(String),
}

/// Error surfaced by fetch and write operations.
#[derive(Debug, Error)]
pub enum RequestError {
  /// Transport failure with no cached value to fall back on
  #[error("server unreachable: {0}")]
  Offline(String),
  /// The server answered with a non-success status
  #[error("server rejected request: HTTP {status}")]
  Rejected {
    status: u16,
    body: String,
  },
  /// The server answered 2xx with a body that does not parse
  #[error("malformed server response: {0}")]
  Malformed(#[from] serde_json::Error),
  /// Non-network failure while issuing the request
  #[error("request failed: {0}")]
  Other(String),
}
