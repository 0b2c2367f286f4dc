//! Error type for `verdict-coordinator`.

use thiserror::Error;
use verdict_core::{message::MessageStatus, transition::Step};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum Error {
  #[error("invalid request: {0}")]
  InvalidRequest(String),

  /// The message is in neither the message collection nor any alert.
  #[error("message {message_id} not found for user {user_id}")]
  NotFound { message_id: String, user_id: String },

  /// The message already holds the status the transition targets.
  #[error("message {message_id} is already {status}")]
  AlreadyInStatus { message_id: String, status: MessageStatus },

  #[error("primary write failed at step {step}: {source}")]
  PrimaryWrite {
    step:   Step,
    #[source]
    source: BoxError,
  },

  #[error("store error: {0}")]
  Store(#[source] BoxError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
