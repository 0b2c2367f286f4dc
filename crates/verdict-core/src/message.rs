//! Messages — the records a reviewer reclassifies.
//!
//! Messages are created by the ingestion pipeline (outside this workspace) and
//! are only ever mutated here, by the transition coordinator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::transition::Direction;

/// The classification of a message.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
  Serialize,
  Deserialize,
  AsRefStr,
  Display,
  EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MessageStatus {
  Safe,
  Fraud,
  #[default]
  Unknown,
}

/// Who last reviewed a message, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewMetadata {
  pub reviewed_by: String,
  pub action:      Direction,
  pub reason:      String,
  pub reviewed_at: DateTime<Utc>,
}

/// A message owned by a user, as stored in the `messages` collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
  pub message_id:      String,
  pub user_id:         String,
  pub content:         String,
  #[serde(default)]
  pub sender:          Option<String>,
  #[serde(default)]
  pub status:          MessageStatus,
  #[serde(default)]
  pub previous_status: Option<MessageStatus>,
  #[serde(default)]
  pub review:          Option<ReviewMetadata>,
  pub received_at:     DateTime<Utc>,
}

impl Message {
  /// Convenience constructor for a freshly ingested message.
  pub fn new(
    message_id: impl Into<String>,
    user_id: impl Into<String>,
    content: impl Into<String>,
    status: MessageStatus,
  ) -> Self {
    Self {
      message_id: message_id.into(),
      user_id: user_id.into(),
      content: content.into(),
      sender: None,
      status,
      previous_status: None,
      review: None,
      received_at: Utc::now(),
    }
  }
}
