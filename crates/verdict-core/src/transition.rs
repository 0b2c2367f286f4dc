//! Transition vocabulary: directions, saga steps, and outcome reports.
//!
//! A reclassification touches several independently stored documents with no
//! transaction around them. Each write is modelled as a [`Step`] with an
//! explicit [`StepKind`] that decides whether its failure fails the whole
//! transition.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use crate::{aggregate, message::MessageStatus};

/// Security score reward for correcting a false positive.
pub const FRAUD_TO_SAFE_SCORE_DELTA: i64 = 15;
/// Security score penalty for a missed fraud.
pub const SAFE_TO_FRAUD_SCORE_DELTA: i64 = -10;

// ─── Direction ───────────────────────────────────────────────────────────────

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
  Display,
  EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Direction {
  FraudToSafe,
  SafeToFraud,
}

impl Direction {
  /// The status a message holds after the transition.
  pub fn target(self) -> MessageStatus {
    match self {
      Self::FraudToSafe => MessageStatus::Safe,
      Self::SafeToFraud => MessageStatus::Fraud,
    }
  }

  pub fn score_delta(self) -> i64 {
    match self {
      Self::FraudToSafe => FRAUD_TO_SAFE_SCORE_DELTA,
      Self::SafeToFraud => SAFE_TO_FRAUD_SCORE_DELTA,
    }
  }

  /// +1 when moving towards fraud, -1 when moving towards safe.
  pub fn fraud_delta(self) -> i64 {
    match self {
      Self::FraudToSafe => -1,
      Self::SafeToFraud => 1,
    }
  }

  pub fn safe_delta(self) -> i64 { -self.fraud_delta() }

  /// The dashboard counter credited to this kind of admin action.
  pub fn admin_counter(self) -> &'static str {
    match self {
      Self::FraudToSafe => aggregate::dashboard::ADMIN_RESOLVED_FRAUD,
      Self::SafeToFraud => aggregate::dashboard::ADMIN_CREATED_FRAUD,
    }
  }
}

// ─── Policy ──────────────────────────────────────────────────────────────────

/// What to do when a message already holds the status a transition targets.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NoOpPolicy {
  /// Refuse the transition before any write happens.
  #[default]
  Reject,
  /// Apply every write again, including the counter deltas.
  Reapply,
}

// ─── Request ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRequest {
  pub message_id: String,
  pub user_id:    String,
  pub direction:  Direction,
  pub reviewer:   String,
  pub reason:     String,
}

// ─── Steps ───────────────────────────────────────────────────────────────────

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
  Display,
  EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Step {
  Locate,
  UpdateMessage,
  UpdateAlert,
  Dashboard,
  LocationStats,
  SecurityScore,
}

impl Step {
  /// Steps 2–6 in execution order; [`Step::Locate`] always runs first.
  pub const WRITES: [Step; 5] = [
    Step::UpdateMessage,
    Step::UpdateAlert,
    Step::Dashboard,
    Step::LocationStats,
    Step::SecurityScore,
  ];

  /// Whether a failure of this step fails the transition.
  ///
  /// The message write is always primary. The alert write is primary only
  /// when the alert is the sole record of the message.
  pub fn kind(self, located_in: LocatedIn) -> StepKind {
    match (self, located_in) {
      (Step::Locate, _) => StepKind::Gate,
      (Step::UpdateMessage, _) => StepKind::Primary,
      (Step::UpdateAlert, LocatedIn::AlertOnly) => StepKind::Primary,
      _ => StepKind::BestEffort,
    }
  }
}

/// How a step's failure affects the transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
  /// Failure aborts the transition before anything is written.
  Gate,
  /// Failure aborts the remaining steps and fails the transition.
  Primary,
  /// Failure is logged and recorded; the transition carries on.
  BestEffort,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepStatus {
  Applied,
  Skipped { reason: String },
  Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepReport {
  pub step:   Step,
  pub kind:   StepKind,
  #[serde(flatten)]
  pub status: StepStatus,
}

impl StepReport {
  pub fn attempted(&self) -> bool { !matches!(self.status, StepStatus::Skipped { .. }) }

  pub fn failed(&self) -> bool { matches!(self.status, StepStatus::Failed { .. }) }
}

// ─── Outcome ─────────────────────────────────────────────────────────────────

/// Where the message was found during the lookup step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocatedIn {
  Messages,
  /// Only an alert references the message; there is no message document.
  AlertOnly,
}

/// The result of a transition that passed the lookup and its primary write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionOutcome {
  pub message_id:      String,
  pub user_id:         String,
  pub direction:       Direction,
  pub reviewer:        String,
  pub located_in:      LocatedIn,
  pub previous_status: MessageStatus,
  pub new_status:      MessageStatus,
  pub reviewed_at:     DateTime<Utc>,
  pub steps:           Vec<StepReport>,
  /// `None` when the audit append itself failed.
  pub audit_id:        Option<Uuid>,
}

impl TransitionOutcome {
  /// True when at least one best-effort step failed.
  pub fn degraded(&self) -> bool { self.steps.iter().any(StepReport::failed) }

  pub fn report(&self, step: Step) -> Option<&StepReport> {
    self.steps.iter().find(|r| r.step == step)
  }
}
