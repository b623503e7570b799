//! Offline-first client core for reviewing inventory count reports.
//!
//! Wraps a small REST report server with a resilience layer: reads refresh a
//! durable two-tier cache and fall back to it while the server is
//! unreachable, writes apply an optimistic cache patch and queue for
//! in-order replay, and a connectivity tracker drives the UI's offline
//! warning. The [`reports::ReportClient`] is the surface a UI consumes;
//! [`sync`] and [`store`] are the generic layers underneath.

pub mod config;
pub mod reports;
pub mod store;
pub mod sync;

pub use config::Config;
pub use reports::ReportClient;
