//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! All timestamps are stored as RFC 3339 strings. Document bodies and step
//! lists are compact JSON. Enum columns use their snake_case names.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::types::Value as SqlValue;
use serde_json::Value;
use uuid::Uuid;
use verdict_core::{
  audit::{AuditOutcome, AuditRecord},
  document::{Collection, Document, Fields, validate_field},
  message::MessageStatus,
  transition::{Direction, Step},
};

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ────────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Enums ───────────────────────────────────────────────────────────────────

fn decode_enum<T: FromStr>(what: &str, s: &str) -> Result<T> {
  T::from_str(s).map_err(|_| Error::Decode(format!("unknown {what}: {s:?}")))
}

pub fn decode_collection(s: &str) -> Result<Collection> { decode_enum("collection", s) }

// ─── JSON paths and filter values ────────────────────────────────────────────

/// The SQLite JSON path addressing a top-level field, e.g. `$."fraud_count"`.
pub fn json_path(field: &str) -> Result<String> {
  validate_field(field)?;
  Ok(format!("$.\"{field}\""))
}

/// Translate a JSON scalar into the SQL value `json_extract` yields for it.
/// `None` stands for JSON `null`, which must be compared with `IS NULL`.
pub fn filter_value(field: &str, value: &Value) -> Result<Option<SqlValue>> {
  match value {
    Value::Null => Ok(None),
    Value::Bool(b) => Ok(Some(SqlValue::Integer(i64::from(*b)))),
    Value::Number(n) => match n.as_i64() {
      Some(i) => Ok(Some(SqlValue::Integer(i))),
      None => n
        .as_f64()
        .map(|f| Some(SqlValue::Real(f)))
        .ok_or_else(|| Error::UnsupportedFilter(field.to_owned())),
    },
    Value::String(s) => Ok(Some(SqlValue::Text(s.clone()))),
    Value::Array(_) | Value::Object(_) => Err(Error::UnsupportedFilter(field.to_owned())),
  }
}

pub fn encode_fields(fields: &Fields) -> Result<String> { Ok(serde_json::to_string(fields)?) }

pub fn encode_steps(steps: &[Step]) -> Result<String> { Ok(serde_json::to_string(steps)?) }

pub fn decode_steps(s: &str) -> Result<Vec<Step>> { Ok(serde_json::from_str(s)?) }

// ─── Row types ───────────────────────────────────────────────────────────────

pub const DOCUMENT_COLUMNS: &str = "collection, doc_id, body, created_at, updated_at";

/// Raw strings read directly from a `documents` row.
pub struct RawDocument {
  pub collection: String,
  pub doc_id:     String,
  pub body:       String,
  pub created_at: String,
  pub updated_at: String,
}

impl RawDocument {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      collection: row.get(0)?,
      doc_id:     row.get(1)?,
      body:       row.get(2)?,
      created_at: row.get(3)?,
      updated_at: row.get(4)?,
    })
  }

  pub fn into_document(self) -> Result<Document> {
    let fields = match serde_json::from_str(&self.body)? {
      Value::Object(map) => map,
      other => return Err(verdict_core::Error::ExpectedObject(other.to_string()).into()),
    };

    Ok(Document {
      collection: decode_collection(&self.collection)?,
      id: self.doc_id,
      fields,
      created_at: decode_dt(&self.created_at)?,
      updated_at: decode_dt(&self.updated_at)?,
    })
  }
}

pub const AUDIT_COLUMNS: &str = "audit_id, message_id, user_id, reviewer, direction, reason,
  previous_status, new_status, targets, failed_steps, outcome, recorded_at";

/// Raw strings read directly from an `audit_log` row.
pub struct RawAuditRecord {
  pub audit_id:        String,
  pub message_id:      String,
  pub user_id:         String,
  pub reviewer:        String,
  pub direction:       String,
  pub reason:          String,
  pub previous_status: String,
  pub new_status:      String,
  pub targets:         String,
  pub failed_steps:    String,
  pub outcome:         String,
  pub recorded_at:     String,
}

impl RawAuditRecord {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      audit_id:        row.get(0)?,
      message_id:      row.get(1)?,
      user_id:         row.get(2)?,
      reviewer:        row.get(3)?,
      direction:       row.get(4)?,
      reason:          row.get(5)?,
      previous_status: row.get(6)?,
      new_status:      row.get(7)?,
      targets:         row.get(8)?,
      failed_steps:    row.get(9)?,
      outcome:         row.get(10)?,
      recorded_at:     row.get(11)?,
    })
  }

  pub fn into_record(self) -> Result<AuditRecord> {
    Ok(AuditRecord {
      audit_id:        decode_uuid(&self.audit_id)?,
      message_id:      self.message_id,
      user_id:         self.user_id,
      reviewer:        self.reviewer,
      direction:       decode_enum::<Direction>("direction", &self.direction)?,
      reason:          self.reason,
      previous_status: decode_enum::<MessageStatus>("status", &self.previous_status)?,
      new_status:      decode_enum::<MessageStatus>("status", &self.new_status)?,
      targets:         decode_steps(&self.targets)?,
      failed_steps:    decode_steps(&self.failed_steps)?,
      outcome:         decode_enum::<AuditOutcome>("audit outcome", &self.outcome)?,
      recorded_at:     decode_dt(&self.recorded_at)?,
    })
  }
}
