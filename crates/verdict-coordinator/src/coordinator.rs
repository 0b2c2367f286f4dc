//! [`Coordinator`] — runs one reclassification as an ordered saga.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{Instrument as _, debug, error, info, warn};
use uuid::Uuid;
use verdict_core::{
  aggregate::{SECURITY_SCORE, dashboard, location},
  alert::{AdminVerification, Alert, AlertOrigin, AlertPriority, AlertResolution, AlertStatus},
  audit::{AuditOutcome, NewAuditRecord},
  document::{Collection, DocQuery, Increment, to_fields},
  message::{Message, MessageStatus, ReviewMetadata},
  store::{AuditLog, DocumentStore},
  transition::{
    Direction, LocatedIn, NoOpPolicy, Step, StepKind, StepReport, StepStatus, TransitionOutcome,
    TransitionRequest,
  },
};

use crate::{
  Error, Result,
  error::BoxError,
};

// ─── Configuration ───────────────────────────────────────────────────────────

/// Tunables for the coordinator, usually read from the server config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorConfig {
  /// What to do with a transition into the status a message already holds.
  #[serde(default)]
  pub no_op_policy:     NoOpPolicy,
  /// Number of per-user shards a bulk request may run at once. `1` keeps
  /// bulk processing strictly sequential.
  #[serde(default = "default_bulk_concurrency")]
  pub bulk_concurrency: usize,
}

fn default_bulk_concurrency() -> usize { 1 }

impl Default for CoordinatorConfig {
  fn default() -> Self {
    Self {
      no_op_policy:     NoOpPolicy::default(),
      bulk_concurrency: default_bulk_concurrency(),
    }
  }
}

// ─── Coordinator ─────────────────────────────────────────────────────────────

/// Applies reviewer decisions across every view of a message.
///
/// Cloning is cheap; clones share the store and the dashboard lock.
pub struct Coordinator<S> {
  pub(crate) store:  Arc<S>,
  pub(crate) config: CoordinatorConfig,
  /// Serialises dashboard adjustments made from this process. The counters
  /// are already atomic per field; the lock keeps each transition's group of
  /// dashboard increments from interleaving with another's.
  dashboard_lock:    Arc<Mutex<()>>,
}

impl<S> Clone for Coordinator<S> {
  fn clone(&self) -> Self {
    Self {
      store:          Arc::clone(&self.store),
      config:         self.config,
      dashboard_lock: Arc::clone(&self.dashboard_lock),
    }
  }
}

/// Where the lookup found the message, and what it found there.
struct Located {
  located_in:     LocatedIn,
  current_status: MessageStatus,
  content:        Option<String>,
  sender:         Option<String>,
}

/// Everything a step needs to know about the transition in flight.
struct Saga<'a> {
  request:     &'a TransitionRequest,
  located:     &'a Located,
  reviewed_at: DateTime<Utc>,
}

enum StepResult {
  Applied,
  Skipped(&'static str),
}

#[derive(Serialize)]
struct MessagePatch<'a> {
  status:          MessageStatus,
  previous_status: MessageStatus,
  review:          &'a ReviewMetadata,
}

#[derive(Serialize)]
struct ResolveAlertPatch {
  status:     AlertStatus,
  resolution: AlertResolution,
}

#[derive(Serialize)]
struct ReactivateAlertPatch {
  status:             AlertStatus,
  priority:           AlertPriority,
  admin_verification: AdminVerification,
  /// Serialised as `null`, which removes any earlier resolution.
  resolution:         Option<AlertResolution>,
}

impl<S: AuditLog> Coordinator<S> {
  pub fn new(store: Arc<S>, config: CoordinatorConfig) -> Self {
    Self { store, config, dashboard_lock: Arc::new(Mutex::new(())) }
  }

  pub fn store(&self) -> &Arc<S> { &self.store }

  pub fn config(&self) -> &CoordinatorConfig { &self.config }

  /// Reclassify one message.
  ///
  /// Returns `Ok` once the primary write has landed, even if some
  /// best-effort aggregate adjustments failed; inspect
  /// [`TransitionOutcome::degraded`] for that. Fails with
  /// [`Error::NotFound`] or [`Error::AlreadyInStatus`] before any write, and
  /// with [`Error::PrimaryWrite`] after auditing a failed primary write.
  ///
  /// The saga runs on its own task. Dropping the returned future (a client
  /// disconnect, a caller timeout) does not stop it half way; every step and
  /// the audit append still run.
  #[tracing::instrument(
    skip_all,
    fields(
      message_id = %request.message_id,
      user_id = %request.user_id,
      direction = %request.direction,
    )
  )]
  pub async fn transition(&self, request: &TransitionRequest) -> Result<TransitionOutcome>
  where
    S: 'static,
  {
    let coordinator = self.clone();
    let request = request.clone();
    tokio::spawn(async move { coordinator.run_saga(&request).await }.in_current_span())
      .await
      .map_err(|e| Error::Store(Box::new(e)))?
  }

  async fn run_saga(&self, request: &TransitionRequest) -> Result<TransitionOutcome> {
    validate(request)?;

    let located = self.locate(request).await?;
    let target = request.direction.target();

    if located.current_status == target {
      match self.config.no_op_policy {
        NoOpPolicy::Reject => {
          return Err(Error::AlreadyInStatus {
            message_id: request.message_id.clone(),
            status:     target,
          });
        }
        NoOpPolicy::Reapply => {
          warn!(status = %target, "message already holds target status; reapplying");
        }
      }
    }

    let saga = Saga { request, located: &located, reviewed_at: Utc::now() };
    let mut reports = vec![StepReport {
      step:   Step::Locate,
      kind:   StepKind::Gate,
      status: StepStatus::Applied,
    }];

    for step in Step::WRITES {
      let kind = step.kind(located.located_in);
      match self.run_step(step, &saga).await {
        Ok(StepResult::Applied) => {
          debug!(%step, "step applied");
          reports.push(StepReport { step, kind, status: StepStatus::Applied });
        }
        Ok(StepResult::Skipped(reason)) => {
          debug!(%step, reason, "step skipped");
          reports.push(StepReport {
            step,
            kind,
            status: StepStatus::Skipped { reason: reason.to_owned() },
          });
        }
        Err(e) if kind == StepKind::Primary => {
          error!(%step, error = %e, "primary write failed; abandoning transition");
          reports.push(StepReport {
            step,
            kind,
            status: StepStatus::Failed { error: e.to_string() },
          });
          self.audit(&saga, &reports, AuditOutcome::PrimaryFailed).await;
          return Err(Error::PrimaryWrite { step, source: e });
        }
        Err(e) => {
          warn!(%step, error = %e, "best-effort step failed; continuing");
          reports.push(StepReport {
            step,
            kind,
            status: StepStatus::Failed { error: e.to_string() },
          });
        }
      }
    }

    let outcome = if reports.iter().any(StepReport::failed) {
      AuditOutcome::Degraded
    } else {
      AuditOutcome::Completed
    };
    let audit_id = self.audit(&saga, &reports, outcome).await;

    info!(%outcome, reviewer = %request.reviewer, "transition applied");

    Ok(TransitionOutcome {
      message_id: request.message_id.clone(),
      user_id: request.user_id.clone(),
      direction: request.direction,
      reviewer: request.reviewer.clone(),
      located_in: located.located_in,
      previous_status: located.current_status,
      new_status: target,
      reviewed_at: saga.reviewed_at,
      steps: reports,
      audit_id,
    })
  }

  // ── Step 1: lookup ──────────────────────────────────────────────────────

  async fn locate(&self, request: &TransitionRequest) -> Result<Located> {
    let doc = self
      .store
      .get(Collection::Messages, &request.message_id)
      .await
      .map_err(|e| Error::Store(Box::new(e)))?;

    if let Some(doc) = doc {
      let message: Message = doc.decode().map_err(|e| Error::Store(Box::new(e)))?;
      if message.user_id == request.user_id {
        return Ok(Located {
          located_in:     LocatedIn::Messages,
          current_status: message.status,
          content:        Some(message.content),
          sender:         message.sender,
        });
      }
      debug!(owner = %message.user_id, "message belongs to another user; checking alerts");
    }

    let alerts = self.find_alerts(request, None).await.map_err(Error::Store)?;
    let Some((_, first)) = alerts.first() else {
      return Err(Error::NotFound {
        message_id: request.message_id.clone(),
        user_id:    request.user_id.clone(),
      });
    };

    let current_status = if alerts.iter().any(|(_, a)| a.is_active()) {
      MessageStatus::Fraud
    } else {
      MessageStatus::Safe
    };

    Ok(Located {
      located_in: LocatedIn::AlertOnly,
      current_status,
      content: first.message_content.clone(),
      sender: first.sender.clone(),
    })
  }

  /// Alerts for the request's `(message_id, user_id)`, optionally narrowed to
  /// one status, paired with their document ids.
  async fn find_alerts(
    &self,
    request: &TransitionRequest,
    status: Option<AlertStatus>,
  ) -> Result<Vec<(String, Alert)>, BoxError> {
    let mut query = DocQuery::new()
      .filter("message_id", request.message_id.as_str())
      .filter("user_id", request.user_id.as_str());
    if let Some(status) = status {
      query = query.filter("status", status.to_string());
    }

    let docs = self.store.query(Collection::Alerts, &query).await?;
    let mut alerts = Vec::with_capacity(docs.len());
    for doc in docs {
      let alert = doc.decode::<Alert>()?;
      alerts.push((doc.id, alert));
    }
    Ok(alerts)
  }

  // ── Steps 2–6 ───────────────────────────────────────────────────────────

  async fn run_step(&self, step: Step, saga: &Saga<'_>) -> Result<StepResult, BoxError> {
    match step {
      Step::Locate => Ok(StepResult::Applied),
      Step::UpdateMessage => self.update_message(saga).await,
      Step::UpdateAlert => self.update_alerts(saga).await,
      Step::Dashboard => self.adjust_dashboard(saga).await,
      Step::LocationStats => self.adjust_location(saga).await,
      Step::SecurityScore => self.adjust_score(saga).await,
    }
  }

  async fn update_message(&self, saga: &Saga<'_>) -> Result<StepResult, BoxError> {
    if saga.located.located_in == LocatedIn::AlertOnly {
      return Ok(StepResult::Skipped("message is only referenced by an alert"));
    }

    let request = saga.request;
    let review = ReviewMetadata {
      reviewed_by: request.reviewer.clone(),
      action:      request.direction,
      reason:      request.reason.clone(),
      reviewed_at: saga.reviewed_at,
    };
    let patch = to_fields(&MessagePatch {
      status:          request.direction.target(),
      previous_status: saga.located.current_status,
      review:          &review,
    })?;

    self
      .store
      .update(Collection::Messages, &request.message_id, patch)
      .await?;
    Ok(StepResult::Applied)
  }

  async fn update_alerts(&self, saga: &Saga<'_>) -> Result<StepResult, BoxError> {
    let request = saga.request;

    match request.direction {
      Direction::FraudToSafe => {
        let active = self.find_alerts(request, Some(AlertStatus::Active)).await?;
        if active.is_empty() {
          return Ok(StepResult::Skipped("no active alert to resolve"));
        }

        let patch = to_fields(&ResolveAlertPatch {
          status:     AlertStatus::AdminResolved,
          resolution: AlertResolution {
            resolved_by: request.reviewer.clone(),
            reason:      request.reason.clone(),
            resolved_at: saga.reviewed_at,
          },
        })?;
        for (id, _) in &active {
          self.store.update(Collection::Alerts, id, patch.clone()).await?;
        }
      }

      Direction::SafeToFraud => {
        let verification = AdminVerification {
          verified_by: request.reviewer.clone(),
          reason:      request.reason.clone(),
          verified_at: saga.reviewed_at,
        };
        let existing = self.find_alerts(request, None).await?;

        if existing.is_empty() {
          let alert = Alert {
            message_id:         request.message_id.clone(),
            user_id:            request.user_id.clone(),
            status:             AlertStatus::Active,
            priority:           AlertPriority::High,
            origin:             AlertOrigin::Admin,
            created_at:         saga.reviewed_at,
            message_content:    saga.located.content.clone(),
            sender:             saga.located.sender.clone(),
            resolution:         None,
            admin_verification: Some(verification),
          };
          let id = self.store.add(Collection::Alerts, to_fields(&alert)?).await?;
          debug!(alert_id = %id, "created alert");
        } else {
          let patch = to_fields(&ReactivateAlertPatch {
            status:             AlertStatus::Active,
            priority:           AlertPriority::High,
            admin_verification: verification,
            resolution:         None,
          })?;
          for (id, _) in &existing {
            self.store.update(Collection::Alerts, id, patch.clone()).await?;
          }
        }
      }
    }

    Ok(StepResult::Applied)
  }

  async fn adjust_dashboard(&self, saga: &Saga<'_>) -> Result<StepResult, BoxError> {
    let direction = saga.request.direction;
    let day = saga.reviewed_at.date_naive();
    let batch = [
      Increment::new(
        Collection::Dashboard,
        dashboard::DOC_ID,
        dashboard::ACTIVE_ALERTS,
        direction.fraud_delta(),
      ),
      Increment::new(Collection::Dashboard, dashboard::DOC_ID, direction.admin_counter(), 1),
      Increment::new(
        Collection::Dashboard,
        dashboard::DOC_ID,
        dashboard::TOTAL_SAFE_MESSAGES,
        direction.safe_delta(),
      ),
      Increment::new(
        Collection::Dashboard,
        dashboard::DOC_ID,
        dashboard::daily_actions_field(day),
        1,
      ),
    ];

    let _guard = self.dashboard_lock.lock().await;
    self.store.increment_batch(&batch).await?;
    Ok(StepResult::Applied)
  }

  async fn adjust_location(&self, saga: &Saga<'_>) -> Result<StepResult, BoxError> {
    let direction = saga.request.direction;
    let user = saga.request.user_id.as_str();
    let batch = [
      Increment::new(Collection::LocationStats, user, location::FRAUD_COUNT, direction.fraud_delta()),
      Increment::new(Collection::LocationStats, user, location::SAFE_COUNT, direction.safe_delta()),
      Increment::new(Collection::LocationStats, user, location::ADMIN_ACTIONS, 1),
    ];

    self.store.increment_batch(&batch).await?;
    Ok(StepResult::Applied)
  }

  /// Both score copies move in one batch so they cannot drift apart.
  async fn adjust_score(&self, saga: &Saga<'_>) -> Result<StepResult, BoxError> {
    let delta = saga.request.direction.score_delta();
    let user = saga.request.user_id.as_str();
    let batch = [
      Increment::new(Collection::UserStats, user, SECURITY_SCORE, delta),
      Increment::new(Collection::Users, user, SECURITY_SCORE, delta),
    ];

    self.store.increment_batch(&batch).await?;
    Ok(StepResult::Applied)
  }

  // ── Step 7: audit ───────────────────────────────────────────────────────

  /// Append the audit record. A failure here is logged and reported as a
  /// missing audit id; it never changes the transition's result.
  async fn audit(
    &self,
    saga: &Saga<'_>,
    reports: &[StepReport],
    outcome: AuditOutcome,
  ) -> Option<Uuid> {
    let writes = reports.iter().filter(|r| r.step != Step::Locate);
    let record = NewAuditRecord {
      message_id: saga.request.message_id.clone(),
      user_id: saga.request.user_id.clone(),
      reviewer: saga.request.reviewer.clone(),
      direction: saga.request.direction,
      reason: saga.request.reason.clone(),
      previous_status: saga.located.current_status,
      new_status: saga.request.direction.target(),
      targets: writes.clone().filter(|r| r.attempted()).map(|r| r.step).collect(),
      failed_steps: writes.filter(|r| r.failed()).map(|r| r.step).collect(),
      outcome,
    };

    match self.store.append(record).await {
      Ok(stored) => Some(stored.audit_id),
      Err(e) => {
        warn!(error = %e, "failed to append audit record");
        None
      }
    }
  }
}

fn validate(request: &TransitionRequest) -> Result<()> {
  for (name, value) in [
    ("message_id", &request.message_id),
    ("user_id", &request.user_id),
    ("reviewer", &request.reviewer),
  ] {
    if value.trim().is_empty() {
      return Err(Error::InvalidRequest(format!("{name} must not be empty")));
    }
  }
  Ok(())
}
