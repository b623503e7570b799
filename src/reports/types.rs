//! Data shapes for count reports, chat and the record browser.

use serde::{Deserialize, Serialize};

/// One row of the area report list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AreaSummary {
  /// Report file name, the stable identifier on the server
  pub file: String,
  pub area: String,
  pub counted_at: String,
  pub money_total: f64,
  pub quantity_total: f64,
  #[serde(default)]
  pub reviewed: bool,
}

/// A full per-area count report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AreaReport {
  pub file: String,
  pub area: String,
  #[serde(default)]
  pub counted_by: Option<String>,
  pub counted_at: String,
  pub money_total: f64,
  pub quantity_total: f64,
  #[serde(default)]
  pub reviewed: bool,
  #[serde(default)]
  pub categories: Vec<CategoryCount>,
  #[serde(default)]
  pub recounts: Vec<Recount>,
  #[serde(default)]
  pub questions: Vec<Question>,
}

/// Money and quantity subtotal for one merchandise category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryCount {
  pub category: String,
  pub money: f64,
  pub quantity: f64,
}

/// A recount requested for one category of an area.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recount {
  pub category: String,
  pub requested_by: String,
  pub requested_at: String,
  #[serde(default)]
  pub completed: bool,
}

/// A reviewer question attached to a report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
  pub text: String,
  pub asked_by: String,
  pub asked_at: String,
  #[serde(default)]
  pub answer: Option<String>,
}

/// One message of the count-floor chat.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
  pub author: String,
  pub text: String,
  pub sent_at: String,
}

/// Record sets served by the secondary browser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
  Employee,
  Location,
  Sku,
}

impl RecordKind {
  /// All browsable kinds.
  pub const ALL: [RecordKind; 3] = [Self::Employee, Self::Location, Self::Sku];

  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Employee => "employee",
      Self::Location => "location",
      Self::Sku => "sku",
    }
  }
}

impl std::str::FromStr for RecordKind {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_lowercase().as_str() {
      "employee" | "employees" => Ok(Self::Employee),
      "location" | "locations" => Ok(Self::Location),
      "sku" | "skus" => Ok(Self::Sku),
      _ => Err(format!(
        "unknown record kind '{}' (expected employee, location or sku)",
        s
      )),
    }
  }
}
