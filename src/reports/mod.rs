//! Count-report domain layer: typed server operations over the offline
//! resilience core.

mod cache;
mod client;
mod types;

pub use cache::ReportCacheKey;
pub use client::ReportClient;
pub use types::{
  AreaReport, AreaSummary, CategoryCount, ChatMessage, Question, RecordKind, Recount,
};
