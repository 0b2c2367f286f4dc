//! Alerts — the denormalised fraud records shown on the admin dashboard.
//!
//! An alert is keyed logically by `(message_id, user_id)`; its document id is
//! generated by the store. Some ingestion paths only ever wrote the alert, so
//! an alert may be the sole surviving record of a message.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AlertStatus {
  Active,
  AdminResolved,
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AlertPriority {
  Low,
  #[default]
  Medium,
  High,
}

/// What raised the alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertOrigin {
  #[default]
  Detector,
  Admin,
}

/// Attached when a reviewer marks the underlying message safe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertResolution {
  pub resolved_by: String,
  pub reason:      String,
  pub resolved_at: DateTime<Utc>,
}

/// Attached when a reviewer confirms the underlying message is fraud.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminVerification {
  pub verified_by: String,
  pub reason:      String,
  pub verified_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
  pub message_id:         String,
  pub user_id:            String,
  pub status:             AlertStatus,
  #[serde(default)]
  pub priority:           AlertPriority,
  #[serde(default)]
  pub origin:             AlertOrigin,
  pub created_at:         DateTime<Utc>,
  /// Historical copy of the message body, kept for alert-only messages.
  #[serde(default)]
  pub message_content:    Option<String>,
  #[serde(default)]
  pub sender:             Option<String>,
  #[serde(default)]
  pub resolution:         Option<AlertResolution>,
  #[serde(default)]
  pub admin_verification: Option<AdminVerification>,
}

impl Alert {
  pub fn is_active(&self) -> bool { self.status == AlertStatus::Active }
}
