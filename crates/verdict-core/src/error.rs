//! Error types for `verdict-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("expected a JSON object, got {0}")]
  ExpectedObject(String),

  #[error("invalid field name: {0:?}")]
  InvalidField(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
