//! Denormalised aggregate documents and their typed read projections.
//!
//! Aggregates are only ever written through atomic increments, so the field
//! names below are the whole write contract. The projections read whatever is
//! present and treat missing counters as zero.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::document::{Document, Fields};

/// Field names of the global dashboard document.
pub mod dashboard {
  use chrono::NaiveDate;

  /// Id of the single dashboard document.
  pub const DOC_ID: &str = "global";

  pub const ACTIVE_ALERTS: &str = "active_alerts";
  pub const ADMIN_RESOLVED_FRAUD: &str = "admin_resolved_fraud";
  pub const ADMIN_CREATED_FRAUD: &str = "admin_created_fraud";
  pub const TOTAL_SAFE_MESSAGES: &str = "total_safe_messages";
  pub const DAILY_ACTIONS_PREFIX: &str = "admin_actions_";

  /// The per-day admin action counter for `day`, e.g. `admin_actions_20261016`.
  pub fn daily_actions_field(day: NaiveDate) -> String {
    format!("{DAILY_ACTIONS_PREFIX}{}", day.format("%Y%m%d"))
  }
}

/// Field names of the per-user location statistics document.
pub mod location {
  pub const FRAUD_COUNT: &str = "fraud_count";
  pub const SAFE_COUNT: &str = "safe_count";
  pub const ADMIN_ACTIONS: &str = "admin_actions";
}

/// The score field, present in both `user_stats/{user}` and `users/{user}`.
pub const SECURITY_SCORE: &str = "security_score";

fn counter(fields: Option<&Fields>, name: &str) -> i64 {
  fields
    .and_then(|f| f.get(name))
    .and_then(serde_json::Value::as_i64)
    .unwrap_or(0)
}

// ─── Dashboard ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardAggregate {
  pub active_alerts:        i64,
  pub admin_resolved_fraud: i64,
  pub admin_created_fraud:  i64,
  pub total_safe_messages:  i64,
  /// Admin actions per calendar day (UTC).
  pub daily_actions:        BTreeMap<NaiveDate, i64>,
}

impl DashboardAggregate {
  pub fn from_document(doc: Option<&Document>) -> Self {
    let fields = doc.map(|d| &d.fields);
    let daily_actions = fields
      .into_iter()
      .flat_map(|f| f.iter())
      .filter_map(|(key, value)| {
        let day = key.strip_prefix(dashboard::DAILY_ACTIONS_PREFIX)?;
        let day = NaiveDate::parse_from_str(day, "%Y%m%d").ok()?;
        Some((day, value.as_i64()?))
      })
      .collect();

    Self {
      active_alerts: counter(fields, dashboard::ACTIVE_ALERTS),
      admin_resolved_fraud: counter(fields, dashboard::ADMIN_RESOLVED_FRAUD),
      admin_created_fraud: counter(fields, dashboard::ADMIN_CREATED_FRAUD),
      total_safe_messages: counter(fields, dashboard::TOTAL_SAFE_MESSAGES),
      daily_actions,
    }
  }

  pub fn actions_on(&self, day: NaiveDate) -> i64 {
    self.daily_actions.get(&day).copied().unwrap_or(0)
  }
}

// ─── Location ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationAggregate {
  pub user_id:       String,
  pub fraud_count:   i64,
  pub safe_count:    i64,
  pub admin_actions: i64,
}

impl LocationAggregate {
  pub fn from_document(user_id: &str, doc: Option<&Document>) -> Self {
    let fields = doc.map(|d| &d.fields);
    Self {
      user_id:       user_id.to_owned(),
      fraud_count:   counter(fields, location::FRAUD_COUNT),
      safe_count:    counter(fields, location::SAFE_COUNT),
      admin_actions: counter(fields, location::ADMIN_ACTIONS),
    }
  }
}

// ─── Security score ──────────────────────────────────────────────────────────

/// Both copies of a user's security score.
///
/// The two are written together but live in separate documents, so a reader
/// can observe them disagreeing after a partial failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityScore {
  pub user_id:       String,
  /// Value held in `user_stats/{user}`.
  pub stats_score:   Option<i64>,
  /// Value held in `users/{user}`.
  pub profile_score: Option<i64>,
}

impl SecurityScore {
  pub fn from_documents(
    user_id: &str,
    stats: Option<&Document>,
    profile: Option<&Document>,
  ) -> Self {
    Self {
      user_id:       user_id.to_owned(),
      stats_score:   stats.and_then(|d| d.int(SECURITY_SCORE)),
      profile_score: profile.and_then(|d| d.int(SECURITY_SCORE)),
    }
  }

  pub fn is_consistent(&self) -> bool { self.stats_score == self.profile_score }
}
