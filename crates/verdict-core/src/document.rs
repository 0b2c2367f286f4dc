//! Generic document model shared by every store backend.
//!
//! A document is a JSON object addressed by `(collection, id)`. Typed entities
//! ([`Message`](crate::message::Message), [`Alert`](crate::alert::Alert), …)
//! are encoded into and decoded from documents with serde; the store itself
//! never needs to know their shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};
use strum::{AsRefStr, EnumString, IntoStaticStr};

use crate::{Error, Result};

/// The field map of a document.
pub type Fields = Map<String, Value>;

// ─── Collections ─────────────────────────────────────────────────────────────

/// Every collection the review pipeline reads or writes.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  AsRefStr,
  EnumString,
  IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Collection {
  /// Ingested messages, one document per message id.
  Messages,
  /// Fraud alerts; a message may have zero or more.
  Alerts,
  /// The global dashboard counters (a single document).
  Dashboard,
  /// Per-user location statistics.
  LocationStats,
  /// Per-user statistics, including one copy of the security score.
  UserStats,
  /// User profiles, including the other copy of the security score.
  Users,
}

impl Collection {
  pub fn as_str(&self) -> &'static str { self.into() }
}

// ─── Document ────────────────────────────────────────────────────────────────

/// A stored document together with its bookkeeping timestamps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
  pub collection: Collection,
  pub id:         String,
  pub fields:     Fields,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl Document {
  /// Decode the fields into a typed entity.
  pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
    Ok(serde_json::from_value(Value::Object(self.fields.clone()))?)
  }

  /// Read an integer field, treating a missing or non-numeric value as absent.
  pub fn int(&self, field: &str) -> Option<i64> {
    self.fields.get(field).and_then(Value::as_i64)
  }

  pub fn str(&self, field: &str) -> Option<&str> {
    self.fields.get(field).and_then(Value::as_str)
  }
}

/// Encode a serialisable entity as a field map.
pub fn to_fields<T: Serialize>(value: &T) -> Result<Fields> {
  match serde_json::to_value(value)? {
    Value::Object(map) => Ok(map),
    other => Err(Error::ExpectedObject(other.to_string())),
  }
}

/// Field names are restricted so that backends can embed them in paths
/// (e.g. SQLite JSON paths) without escaping.
pub fn validate_field(field: &str) -> Result<()> {
  let ok = !field.is_empty()
    && field
      .chars()
      .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
  if ok { Ok(()) } else { Err(Error::InvalidField(field.to_owned())) }
}

// ─── Query ───────────────────────────────────────────────────────────────────

/// A top-level field equality test.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
  pub field: String,
  pub value: Value,
}

impl Filter {
  pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
    Self { field: field.into(), value: value.into() }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Order {
  #[default]
  Ascending,
  Descending,
}

/// Parameters for [`DocumentStore::query`](crate::store::DocumentStore::query).
///
/// All filters must match. Without `order_by`, documents come back in
/// creation order.
#[derive(Debug, Clone, Default)]
pub struct DocQuery {
  pub filters:  Vec<Filter>,
  pub order_by: Option<(String, Order)>,
  pub limit:    Option<usize>,
}

impl DocQuery {
  pub fn new() -> Self { Self::default() }

  pub fn filter(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
    self.filters.push(Filter::eq(field, value));
    self
  }

  pub fn order_by(mut self, field: impl Into<String>, order: Order) -> Self {
    self.order_by = Some((field.into(), order));
    self
  }

  pub fn limit(mut self, limit: usize) -> Self {
    self.limit = Some(limit);
    self
  }
}

// ─── Increments ──────────────────────────────────────────────────────────────

/// One atomic counter adjustment. A missing document or field counts as 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Increment {
  pub collection: Collection,
  pub id:         String,
  pub field:      String,
  pub delta:      i64,
}

impl Increment {
  pub fn new(
    collection: Collection,
    id: impl Into<String>,
    field: impl Into<String>,
    delta: i64,
  ) -> Self {
    Self { collection, id: id.into(), field: field.into(), delta }
  }
}
