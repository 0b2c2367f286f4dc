//! Audit records — one immutable row per attempted transition.
//!
//! Records are append-only; no backend ever updates or deletes one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use crate::{message::MessageStatus, transition::{Direction, Step}};

/// How far a transition got before the record was written.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AuditOutcome {
  /// Every attempted step succeeded.
  Completed,
  /// The primary write succeeded but at least one best-effort step failed.
  Degraded,
  /// The primary write failed; later steps were not attempted.
  PrimaryFailed,
}

/// Input to [`crate::store::AuditLog::append`].
/// `audit_id` and `recorded_at` are always set by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAuditRecord {
  pub message_id:      String,
  pub user_id:         String,
  pub reviewer:        String,
  pub direction:       Direction,
  pub reason:          String,
  pub previous_status: MessageStatus,
  pub new_status:      MessageStatus,
  /// Steps that were attempted, whether or not they succeeded.
  pub targets:         Vec<Step>,
  pub failed_steps:    Vec<Step>,
  pub outcome:         AuditOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
  pub audit_id:        Uuid,
  pub message_id:      String,
  pub user_id:         String,
  pub reviewer:        String,
  pub direction:       Direction,
  pub reason:          String,
  pub previous_status: MessageStatus,
  pub new_status:      MessageStatus,
  pub targets:         Vec<Step>,
  pub failed_steps:    Vec<Step>,
  pub outcome:         AuditOutcome,
  pub recorded_at:     DateTime<Utc>,
}

impl AuditRecord {
  /// Stamp a [`NewAuditRecord`] with its identity and time.
  pub fn from_new(input: NewAuditRecord, audit_id: Uuid, recorded_at: DateTime<Utc>) -> Self {
    Self {
      audit_id,
      message_id: input.message_id,
      user_id: input.user_id,
      reviewer: input.reviewer,
      direction: input.direction,
      reason: input.reason,
      previous_status: input.previous_status,
      new_status: input.new_status,
      targets: input.targets,
      failed_steps: input.failed_steps,
      outcome: input.outcome,
      recorded_at,
    }
  }
}
