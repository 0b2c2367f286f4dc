//! Error type for `verdict-store-sqlite`.

use thiserror::Error;
use verdict_core::document::Collection;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] verdict_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// A stored column held a value no domain type accepts.
  #[error("decode error: {0}")]
  Decode(String),

  /// Attempted to update a document that does not exist.
  #[error("document not found: {}/{id}", collection.as_str())]
  DocumentNotFound { collection: Collection, id: String },

  #[error("unsupported filter value for field {0:?}: only scalars can be compared")]
  UnsupportedFilter(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
