//! Coordinator tests against an in-memory SQLite store, wrapped so individual
//! writes can be made to fail.

use std::{
  sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
  },
  time::Duration,
};

use chrono::Utc;
use verdict_core::{
  aggregate::DashboardAggregate,
  alert::{Alert, AlertOrigin, AlertPriority, AlertStatus},
  audit::{AuditOutcome, AuditRecord, NewAuditRecord},
  document::{Collection, DocQuery, Document, Fields, Increment, to_fields},
  message::{Message, MessageStatus},
  store::{AuditLog, DocumentStore},
  transition::{Direction, LocatedIn, NoOpPolicy, Step, StepKind, StepStatus, TransitionRequest},
};
use verdict_store_sqlite::SqliteStore;

use crate::{BulkItem, Coordinator, CoordinatorConfig, Error, FailureKind};

// ─── Faulty store ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fault {
  Update(Collection),
  Add(Collection),
  Increment(Collection),
  Append,
}

#[derive(Debug, thiserror::Error)]
enum FaultyError {
  #[error(transparent)]
  Store(#[from] verdict_store_sqlite::Error),
  #[error("injected failure")]
  Injected,
}

/// Delegates to SQLite, counts write attempts and fails on demand. Batched
/// increments can also be slowed down to hold a saga mid-flight.
struct FaultyStore {
  inner:  SqliteStore,
  faults: Mutex<Vec<Fault>>,
  writes: AtomicUsize,
  delay:  Mutex<Option<Duration>>,
}

impl FaultyStore {
  async fn new() -> Self {
    Self {
      inner:  SqliteStore::open_in_memory().await.expect("in-memory store"),
      faults: Mutex::new(Vec::new()),
      writes: AtomicUsize::new(0),
      delay:  Mutex::new(None),
    }
  }

  fn slow_down(&self, delay: Duration) { *self.delay.lock().unwrap() = Some(delay); }

  fn fail(&self, fault: Fault) { self.faults.lock().unwrap().push(fault); }

  fn writes(&self) -> usize { self.writes.load(Ordering::SeqCst) }

  fn check(&self, hit: impl Fn(&Fault) -> bool) -> Result<(), FaultyError> {
    self.writes.fetch_add(1, Ordering::SeqCst);
    if self.faults.lock().unwrap().iter().any(hit) {
      return Err(FaultyError::Injected);
    }
    Ok(())
  }
}

impl DocumentStore for FaultyStore {
  type Error = FaultyError;

  async fn get(&self, collection: Collection, id: &str) -> Result<Option<Document>, FaultyError> {
    Ok(self.inner.get(collection, id).await?)
  }

  async fn put(
    &self,
    collection: Collection,
    id: &str,
    fields: Fields,
  ) -> Result<Document, FaultyError> {
    Ok(self.inner.put(collection, id, fields).await?)
  }

  async fn update(&self, collection: Collection, id: &str, fields: Fields) -> Result<(), FaultyError> {
    self.check(|f| *f == Fault::Update(collection))?;
    Ok(self.inner.update(collection, id, fields).await?)
  }

  async fn add(&self, collection: Collection, fields: Fields) -> Result<String, FaultyError> {
    self.check(|f| *f == Fault::Add(collection))?;
    Ok(self.inner.add(collection, fields).await?)
  }

  async fn increment(
    &self,
    collection: Collection,
    id: &str,
    field: &str,
    delta: i64,
  ) -> Result<(), FaultyError> {
    self.check(|f| *f == Fault::Increment(collection))?;
    Ok(self.inner.increment(collection, id, field, delta).await?)
  }

  async fn increment_batch(&self, increments: &[Increment]) -> Result<(), FaultyError> {
    self.check(|f| increments.iter().any(|i| *f == Fault::Increment(i.collection)))?;
    let delay = *self.delay.lock().unwrap();
    if let Some(delay) = delay {
      tokio::time::sleep(delay).await;
    }
    Ok(self.inner.increment_batch(increments).await?)
  }

  async fn query(&self, collection: Collection, query: &DocQuery) -> Result<Vec<Document>, FaultyError> {
    Ok(self.inner.query(collection, query).await?)
  }
}

impl AuditLog for FaultyStore {
  async fn append(&self, record: NewAuditRecord) -> Result<AuditRecord, FaultyError> {
    self.check(|f| *f == Fault::Append)?;
    Ok(self.inner.append(record).await?)
  }

  async fn history(&self, message_id: &str, user_id: &str) -> Result<Vec<AuditRecord>, FaultyError> {
    Ok(self.inner.history(message_id, user_id).await?)
  }
}

// ─── Fixtures ────────────────────────────────────────────────────────────────

async fn setup(config: CoordinatorConfig) -> (Coordinator<FaultyStore>, Arc<FaultyStore>) {
  let store = Arc::new(FaultyStore::new().await);
  (Coordinator::new(Arc::clone(&store), config), store)
}

async fn seed_message(store: &FaultyStore, id: &str, user: &str, status: MessageStatus) {
  let message = Message::new(id, user, "you won a prize", status);
  store
    .inner
    .put(Collection::Messages, id, to_fields(&message).unwrap())
    .await
    .unwrap();
}

async fn seed_alert(store: &FaultyStore, message: &str, user: &str, status: AlertStatus) -> String {
  let alert = Alert {
    message_id:         message.into(),
    user_id:            user.into(),
    status,
    priority:           AlertPriority::Medium,
    origin:             AlertOrigin::Detector,
    created_at:         Utc::now(),
    message_content:    Some("you won a prize".into()),
    sender:             Some("+15550100".into()),
    resolution:         None,
    admin_verification: None,
  };
  store
    .inner
    .add(Collection::Alerts, to_fields(&alert).unwrap())
    .await
    .unwrap()
}

async fn alerts_for(store: &FaultyStore, message: &str, user: &str) -> Vec<Alert> {
  let q = DocQuery::new().filter("message_id", message).filter("user_id", user);
  store
    .inner
    .query(Collection::Alerts, &q)
    .await
    .unwrap()
    .iter()
    .map(|d| d.decode().unwrap())
    .collect()
}

async fn message(store: &FaultyStore, id: &str) -> Message {
  store
    .inner
    .get(Collection::Messages, id)
    .await
    .unwrap()
    .unwrap()
    .decode()
    .unwrap()
}

fn request(message: &str, user: &str, direction: Direction) -> TransitionRequest {
  TransitionRequest {
    message_id: message.into(),
    user_id: user.into(),
    direction,
    reviewer: "rev1".into(),
    reason: "manual review".into(),
  }
}

fn item(message: &str, user: &str, direction: Direction) -> BulkItem {
  BulkItem {
    message_id: message.into(),
    user_id: user.into(),
    direction,
    reason: String::new(),
  }
}

// ─── Single transitions ──────────────────────────────────────────────────────

#[tokio::test]
async fn fraud_to_safe_updates_every_view() {
  let (c, store) = setup(CoordinatorConfig::default()).await;
  seed_message(&store, "M1", "U1", MessageStatus::Fraud).await;
  seed_alert(&store, "M1", "U1", AlertStatus::Active).await;

  let outcome = c
    .transition(&TransitionRequest {
      reason: "false positive".into(),
      ..request("M1", "U1", Direction::FraudToSafe)
    })
    .await
    .unwrap();

  assert_eq!(outcome.located_in, LocatedIn::Messages);
  assert_eq!(outcome.previous_status, MessageStatus::Fraud);
  assert_eq!(outcome.new_status, MessageStatus::Safe);
  assert!(!outcome.degraded());

  let m = message(&store, "M1").await;
  assert_eq!(m.status, MessageStatus::Safe);
  assert_eq!(m.previous_status, Some(MessageStatus::Fraud));
  let review = m.review.unwrap();
  assert_eq!(review.reviewed_by, "rev1");
  assert_eq!(review.reason, "false positive");

  let alerts = alerts_for(&store, "M1", "U1").await;
  assert_eq!(alerts.len(), 1);
  assert_eq!(alerts[0].status, AlertStatus::AdminResolved);
  assert_eq!(alerts[0].resolution.as_ref().unwrap().resolved_by, "rev1");

  let dash = c.dashboard().await.unwrap();
  assert_eq!(dash.active_alerts, -1);
  assert_eq!(dash.total_safe_messages, 1);
  assert_eq!(dash.admin_resolved_fraud, 1);
  assert_eq!(dash.admin_created_fraud, 0);
  assert_eq!(dash.actions_on(outcome.reviewed_at.date_naive()), 1);

  let loc = c.location_stats("U1").await.unwrap();
  assert_eq!((loc.fraud_count, loc.safe_count, loc.admin_actions), (-1, 1, 1));

  let score = c.security_score("U1").await.unwrap();
  assert_eq!(score.stats_score, Some(15));
  assert!(score.is_consistent());

  let history = c.history("M1", "U1").await.unwrap();
  assert_eq!(history.len(), 1);
  assert_eq!(Some(history[0].audit_id), outcome.audit_id);
  assert_eq!(history[0].outcome, AuditOutcome::Completed);
  assert_eq!(history[0].targets, Step::WRITES);
  assert!(history[0].failed_steps.is_empty());
}

#[tokio::test]
async fn safe_to_fraud_creates_alert_and_penalises_score() {
  let (c, store) = setup(CoordinatorConfig::default()).await;
  seed_message(&store, "M2", "U2", MessageStatus::Safe).await;
  store
    .inner
    .put(Collection::Users, "U2", to_fields(&serde_json::json!({ "security_score": 50 })).unwrap())
    .await
    .unwrap();
  store
    .inner
    .put(
      Collection::UserStats,
      "U2",
      to_fields(&serde_json::json!({ "security_score": 50 })).unwrap(),
    )
    .await
    .unwrap();

  c.transition(&request("M2", "U2", Direction::SafeToFraud)).await.unwrap();

  assert_eq!(message(&store, "M2").await.status, MessageStatus::Fraud);

  let alerts = alerts_for(&store, "M2", "U2").await;
  assert_eq!(alerts.len(), 1);
  assert_eq!(alerts[0].status, AlertStatus::Active);
  assert_eq!(alerts[0].priority, AlertPriority::High);
  assert_eq!(alerts[0].origin, AlertOrigin::Admin);
  assert_eq!(alerts[0].message_content.as_deref(), Some("you won a prize"));
  assert_eq!(alerts[0].admin_verification.as_ref().unwrap().verified_by, "rev1");

  let dash = c.dashboard().await.unwrap();
  assert_eq!(dash.active_alerts, 1);
  assert_eq!(dash.total_safe_messages, -1);
  assert_eq!(dash.admin_created_fraud, 1);

  let loc = c.location_stats("U2").await.unwrap();
  assert_eq!((loc.fraud_count, loc.safe_count), (1, -1));

  let score = c.security_score("U2").await.unwrap();
  assert_eq!(score.stats_score, Some(40));
  assert_eq!(score.profile_score, Some(40));
}

#[tokio::test]
async fn safe_to_fraud_reactivates_resolved_alert() {
  let (c, store) = setup(CoordinatorConfig::default()).await;
  seed_message(&store, "M1", "U1", MessageStatus::Fraud).await;
  seed_alert(&store, "M1", "U1", AlertStatus::Active).await;

  c.transition(&request("M1", "U1", Direction::FraudToSafe)).await.unwrap();
  c.transition(&request("M1", "U1", Direction::SafeToFraud)).await.unwrap();

  let alerts = alerts_for(&store, "M1", "U1").await;
  assert_eq!(alerts.len(), 1, "no duplicate alert is created");
  assert_eq!(alerts[0].status, AlertStatus::Active);
  assert!(alerts[0].resolution.is_none());
  assert!(alerts[0].admin_verification.is_some());

  let score = c.security_score("U1").await.unwrap();
  assert_eq!(score.stats_score, Some(5));
  assert_eq!(c.dashboard().await.unwrap().active_alerts, 0);
}

#[tokio::test]
async fn fraud_to_safe_without_alert_skips_alert_step() {
  let (c, store) = setup(CoordinatorConfig::default()).await;
  seed_message(&store, "M1", "U1", MessageStatus::Fraud).await;

  let outcome = c.transition(&request("M1", "U1", Direction::FraudToSafe)).await.unwrap();

  let report = outcome.report(Step::UpdateAlert).unwrap();
  assert!(matches!(report.status, StepStatus::Skipped { .. }));
  assert!(!outcome.degraded());

  let history = c.history("M1", "U1").await.unwrap();
  assert!(!history[0].targets.contains(&Step::UpdateAlert));
}

#[tokio::test]
async fn unknown_status_message_can_be_classified() {
  let (c, store) = setup(CoordinatorConfig::default()).await;
  seed_message(&store, "M1", "U1", MessageStatus::Unknown).await;

  let outcome = c.transition(&request("M1", "U1", Direction::SafeToFraud)).await.unwrap();
  assert_eq!(outcome.previous_status, MessageStatus::Unknown);
  assert_eq!(message(&store, "M1").await.status, MessageStatus::Fraud);
}

// ─── Lookup ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn missing_message_fails_without_writes() {
  let (c, store) = setup(CoordinatorConfig::default()).await;

  let err = c
    .transition(&request("ghost", "U1", Direction::FraudToSafe))
    .await
    .unwrap_err();

  assert!(matches!(err, Error::NotFound { .. }));
  assert_eq!(store.writes(), 0);
  assert!(c.history("ghost", "U1").await.unwrap().is_empty());
  assert_eq!(c.dashboard().await.unwrap(), DashboardAggregate::default());
  assert_eq!(c.security_score("U1").await.unwrap().stats_score, None);
}

#[tokio::test]
async fn message_owned_by_another_user_is_not_found() {
  let (c, store) = setup(CoordinatorConfig::default()).await;
  seed_message(&store, "M1", "U1", MessageStatus::Fraud).await;

  let err = c
    .transition(&request("M1", "U2", Direction::FraudToSafe))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::NotFound { .. }));
  assert_eq!(store.writes(), 0);
  assert_eq!(message(&store, "M1").await.status, MessageStatus::Fraud);
}

#[tokio::test]
async fn alert_only_message_is_resolved_through_alert() {
  let (c, store) = setup(CoordinatorConfig::default()).await;
  seed_alert(&store, "M3", "U1", AlertStatus::Active).await;

  let outcome = c.transition(&request("M3", "U1", Direction::FraudToSafe)).await.unwrap();

  assert_eq!(outcome.located_in, LocatedIn::AlertOnly);
  assert_eq!(outcome.previous_status, MessageStatus::Fraud);
  let msg = outcome.report(Step::UpdateMessage).unwrap();
  assert!(matches!(msg.status, StepStatus::Skipped { .. }));
  assert_eq!(outcome.report(Step::UpdateAlert).unwrap().kind, StepKind::Primary);

  assert!(store.inner.get(Collection::Messages, "M3").await.unwrap().is_none());
  assert_eq!(alerts_for(&store, "M3", "U1").await[0].status, AlertStatus::AdminResolved);
  assert_eq!(c.security_score("U1").await.unwrap().profile_score, Some(15));
}

#[tokio::test]
async fn invalid_request_is_rejected_before_lookup() {
  let (c, store) = setup(CoordinatorConfig::default()).await;

  let err = c
    .transition(&TransitionRequest { reviewer: "  ".into(), ..request("M1", "U1", Direction::FraudToSafe) })
    .await
    .unwrap_err();
  assert!(matches!(err, Error::InvalidRequest(_)));
  assert_eq!(store.writes(), 0);
}

// ─── Failures ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn primary_failure_is_audited_and_stops_the_saga() {
  let (c, store) = setup(CoordinatorConfig::default()).await;
  seed_message(&store, "M1", "U1", MessageStatus::Fraud).await;
  seed_alert(&store, "M1", "U1", AlertStatus::Active).await;
  store.fail(Fault::Update(Collection::Messages));

  let err = c
    .transition(&request("M1", "U1", Direction::FraudToSafe))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::PrimaryWrite { step: Step::UpdateMessage, .. }));

  assert_eq!(message(&store, "M1").await.status, MessageStatus::Fraud);
  assert_eq!(alerts_for(&store, "M1", "U1").await[0].status, AlertStatus::Active);
  assert_eq!(c.dashboard().await.unwrap(), DashboardAggregate::default());

  let history = c.history("M1", "U1").await.unwrap();
  assert_eq!(history.len(), 1);
  assert_eq!(history[0].outcome, AuditOutcome::PrimaryFailed);
  assert_eq!(history[0].targets, [Step::UpdateMessage]);
  assert_eq!(history[0].failed_steps, [Step::UpdateMessage]);
}

#[tokio::test]
async fn alert_only_primary_failure_fails_transition() {
  let (c, store) = setup(CoordinatorConfig::default()).await;
  seed_alert(&store, "M3", "U1", AlertStatus::Active).await;
  store.fail(Fault::Update(Collection::Alerts));

  let err = c
    .transition(&request("M3", "U1", Direction::FraudToSafe))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::PrimaryWrite { step: Step::UpdateAlert, .. }));
  assert_eq!(c.location_stats("U1").await.unwrap().admin_actions, 0);
  assert_eq!(c.history("M3", "U1").await.unwrap()[0].outcome, AuditOutcome::PrimaryFailed);
}

#[tokio::test]
async fn alert_failure_is_best_effort_when_message_exists() {
  let (c, store) = setup(CoordinatorConfig::default()).await;
  seed_message(&store, "M1", "U1", MessageStatus::Fraud).await;
  seed_alert(&store, "M1", "U1", AlertStatus::Active).await;
  store.fail(Fault::Update(Collection::Alerts));

  let outcome = c.transition(&request("M1", "U1", Direction::FraudToSafe)).await.unwrap();

  assert!(outcome.degraded());
  assert_eq!(message(&store, "M1").await.status, MessageStatus::Safe);
  assert_eq!(alerts_for(&store, "M1", "U1").await[0].status, AlertStatus::Active);
  assert_eq!(c.dashboard().await.unwrap().active_alerts, -1);
}

#[tokio::test]
async fn failed_alert_creation_still_marks_message_fraud() {
  let (c, store) = setup(CoordinatorConfig::default()).await;
  seed_message(&store, "M2", "U2", MessageStatus::Safe).await;
  store.fail(Fault::Add(Collection::Alerts));

  let outcome = c.transition(&request("M2", "U2", Direction::SafeToFraud)).await.unwrap();

  assert!(outcome.report(Step::UpdateAlert).unwrap().failed());
  assert_eq!(message(&store, "M2").await.status, MessageStatus::Fraud);
  assert!(alerts_for(&store, "M2", "U2").await.is_empty());
  assert_eq!(c.security_score("U2").await.unwrap().stats_score, Some(-10));
}

#[tokio::test]
async fn best_effort_failure_degrades_but_continues() {
  let (c, store) = setup(CoordinatorConfig::default()).await;
  seed_message(&store, "M1", "U1", MessageStatus::Fraud).await;
  store.fail(Fault::Increment(Collection::Dashboard));

  let outcome = c.transition(&request("M1", "U1", Direction::FraudToSafe)).await.unwrap();

  assert!(outcome.degraded());
  let dash = outcome.report(Step::Dashboard).unwrap();
  assert_eq!(dash.kind, StepKind::BestEffort);
  assert!(dash.failed());

  // Later steps still ran.
  assert_eq!(c.location_stats("U1").await.unwrap().safe_count, 1);
  assert_eq!(c.security_score("U1").await.unwrap().stats_score, Some(15));

  let history = c.history("M1", "U1").await.unwrap();
  assert_eq!(history[0].outcome, AuditOutcome::Degraded);
  assert_eq!(history[0].failed_steps, [Step::Dashboard]);
}

#[tokio::test]
async fn score_copies_fail_together() {
  let (c, store) = setup(CoordinatorConfig::default()).await;
  seed_message(&store, "M1", "U1", MessageStatus::Fraud).await;
  store.fail(Fault::Increment(Collection::Users));

  let outcome = c.transition(&request("M1", "U1", Direction::FraudToSafe)).await.unwrap();

  assert!(outcome.report(Step::SecurityScore).unwrap().failed());
  let score = c.security_score("U1").await.unwrap();
  assert_eq!(score.stats_score, None);
  assert!(score.is_consistent());
}

#[tokio::test]
async fn audit_failure_leaves_transition_applied() {
  let (c, store) = setup(CoordinatorConfig::default()).await;
  seed_message(&store, "M1", "U1", MessageStatus::Fraud).await;
  store.fail(Fault::Append);

  let outcome = c.transition(&request("M1", "U1", Direction::FraudToSafe)).await.unwrap();

  assert!(outcome.audit_id.is_none());
  assert_eq!(message(&store, "M1").await.status, MessageStatus::Safe);
  assert!(c.history("M1", "U1").await.unwrap().is_empty());
}

// ─── Repeated transitions ────────────────────────────────────────────────────

#[tokio::test]
async fn repeated_transition_is_rejected_by_default() {
  let (c, store) = setup(CoordinatorConfig::default()).await;
  seed_message(&store, "M1", "U1", MessageStatus::Fraud).await;

  c.transition(&request("M1", "U1", Direction::FraudToSafe)).await.unwrap();
  let writes = store.writes();
  let err = c
    .transition(&request("M1", "U1", Direction::FraudToSafe))
    .await
    .unwrap_err();

  assert!(matches!(err, Error::AlreadyInStatus { status: MessageStatus::Safe, .. }));
  assert_eq!(store.writes(), writes);
  assert_eq!(c.dashboard().await.unwrap().total_safe_messages, 1);
  assert_eq!(c.security_score("U1").await.unwrap().stats_score, Some(15));
  assert_eq!(c.history("M1", "U1").await.unwrap().len(), 1);
}

#[tokio::test]
async fn repeated_transition_reapplies_under_reapply_policy() {
  let config = CoordinatorConfig { no_op_policy: NoOpPolicy::Reapply, ..Default::default() };
  let (c, store) = setup(config).await;
  seed_message(&store, "M1", "U1", MessageStatus::Fraud).await;

  c.transition(&request("M1", "U1", Direction::FraudToSafe)).await.unwrap();
  let second = c.transition(&request("M1", "U1", Direction::FraudToSafe)).await.unwrap();

  assert_eq!(second.previous_status, MessageStatus::Safe);
  assert_eq!(c.dashboard().await.unwrap().total_safe_messages, 2);
  assert_eq!(c.security_score("U1").await.unwrap().stats_score, Some(30));
  assert_eq!(c.history("M1", "U1").await.unwrap().len(), 2);
}

// ─── Bulk ────────────────────────────────────────────────────────────────────

async fn seed_bulk(store: &FaultyStore) -> Vec<BulkItem> {
  for (id, user) in [("B1", "U1"), ("B2", "U2"), ("B4", "U1"), ("B5", "U3")] {
    seed_message(store, id, user, MessageStatus::Fraud).await;
    seed_alert(store, id, user, AlertStatus::Active).await;
  }
  vec![
    item("B1", "U1", Direction::FraudToSafe),
    item("B2", "U2", Direction::FraudToSafe),
    item("missing", "U2", Direction::FraudToSafe),
    item("B4", "U1", Direction::FraudToSafe),
    item("B5", "U3", Direction::FraudToSafe),
  ]
}

#[tokio::test]
async fn bulk_tolerates_individual_failures() {
  let (c, store) = setup(CoordinatorConfig::default()).await;
  let items = seed_bulk(&store).await;

  let report = c.bulk_transition(items, "rev1").await;

  assert_eq!(report.summary.total, 5);
  assert_eq!(report.summary.successful, 4);
  assert_eq!(report.summary.failed, 1);
  assert_eq!(report.failed[0].index, 2);
  assert_eq!(report.failed[0].kind, FailureKind::NotFound);
  let indexes: Vec<_> = report.successful.iter().map(|s| s.index).collect();
  assert_eq!(indexes, [0, 1, 3, 4]);

  for id in ["B1", "B2", "B4", "B5"] {
    assert_eq!(message(&store, id).await.status, MessageStatus::Safe);
  }
  for (id, user) in [("B1", "U1"), ("B2", "U2"), ("B4", "U1"), ("B5", "U3")] {
    let alerts = alerts_for(&store, id, user).await;
    assert_eq!(alerts.len(), 1, "{id}");
    assert_eq!(alerts[0].status, AlertStatus::AdminResolved, "{id}");
  }
  assert_eq!(c.dashboard().await.unwrap().active_alerts, -4);

  let loc = c.location_stats("U1").await.unwrap();
  assert_eq!((loc.fraud_count, loc.safe_count, loc.admin_actions), (-2, 2, 2));
  assert_eq!(c.security_score("U1").await.unwrap().stats_score, Some(30));
  for user in ["U2", "U3"] {
    let loc = c.location_stats(user).await.unwrap();
    assert_eq!((loc.fraud_count, loc.safe_count, loc.admin_actions), (-1, 1, 1), "{user}");
    let score = c.security_score(user).await.unwrap();
    assert_eq!(score.stats_score, Some(15), "{user}");
    assert!(score.is_consistent(), "{user}");
  }
}

#[tokio::test]
async fn sharded_bulk_matches_sequential_result() {
  let config = CoordinatorConfig { bulk_concurrency: 4, ..Default::default() };
  let (c, store) = setup(config).await;
  let items = seed_bulk(&store).await;

  let report = c.bulk_transition(items, "rev1").await;

  assert_eq!(report.summary.successful, 4);
  assert_eq!(report.summary.failed, 1);
  let indexes: Vec<_> = report.successful.iter().map(|s| s.index).collect();
  assert_eq!(indexes, [0, 1, 3, 4]);

  let dash = c.dashboard().await.unwrap();
  assert_eq!(dash.active_alerts, -4);
  assert_eq!(dash.total_safe_messages, 4);
  assert_eq!(dash.admin_resolved_fraud, 4);
  assert_eq!(c.location_stats("U1").await.unwrap().admin_actions, 2);
}

#[tokio::test]
async fn bulk_repeat_within_batch_hits_status_guard() {
  let (c, store) = setup(CoordinatorConfig::default()).await;
  seed_message(&store, "M1", "U1", MessageStatus::Fraud).await;

  let report = c
    .bulk_transition(
      vec![
        item("M1", "U1", Direction::FraudToSafe),
        item("M1", "U1", Direction::FraudToSafe),
      ],
      "rev1",
    )
    .await;

  assert_eq!(report.summary.successful, 1);
  assert_eq!(report.failed[0].kind, FailureKind::AlreadyInStatus);
}

#[tokio::test]
async fn empty_bulk_reports_nothing() {
  let (c, _store) = setup(CoordinatorConfig::default()).await;
  let report = c.bulk_transition(Vec::new(), "rev1").await;
  assert_eq!(report.summary.total, 0);
  assert!(report.successful.is_empty() && report.failed.is_empty());
}

// ─── Cancellation ────────────────────────────────────────────────────────────

/// Wait until the audit log holds `n` records for the message.
async fn wait_for_history(c: &Coordinator<FaultyStore>, message: &str, user: &str, n: usize) {
  for _ in 0..200 {
    if c.history(message, user).await.unwrap().len() >= n {
      return;
    }
    tokio::time::sleep(Duration::from_millis(10)).await;
  }
  panic!("{message}: audit record never landed");
}

#[tokio::test]
async fn dropped_caller_does_not_cut_saga_short() {
  let (c, store) = setup(CoordinatorConfig::default()).await;
  seed_message(&store, "M1", "U1", MessageStatus::Fraud).await;
  seed_alert(&store, "M1", "U1", AlertStatus::Active).await;
  store.slow_down(Duration::from_millis(100));

  let timed_out = tokio::time::timeout(
    Duration::from_millis(50),
    c.transition(&request("M1", "U1", Direction::FraudToSafe)),
  )
  .await;
  assert!(timed_out.is_err(), "caller should give up mid-saga");

  wait_for_history(&c, "M1", "U1", 1).await;

  let history = c.history("M1", "U1").await.unwrap();
  assert_eq!(history.len(), 1);
  assert_eq!(history[0].outcome, AuditOutcome::Completed);
  assert!(history[0].failed_steps.is_empty());

  assert_eq!(message(&store, "M1").await.status, MessageStatus::Safe);
  let dash = c.dashboard().await.unwrap();
  assert_eq!((dash.active_alerts, dash.total_safe_messages), (-1, 1));
  let loc = c.location_stats("U1").await.unwrap();
  assert_eq!((loc.fraud_count, loc.safe_count), (-1, 1));
  assert_eq!(c.security_score("U1").await.unwrap().stats_score, Some(15));

  // The status guard now sees the finished transition.
  let retry = c.transition(&request("M1", "U1", Direction::FraudToSafe)).await;
  assert!(matches!(retry, Err(Error::AlreadyInStatus { .. })));
}

#[tokio::test]
async fn dropped_bulk_caller_still_applies_every_item() {
  for bulk_concurrency in [1, 4] {
    let (c, store) = setup(CoordinatorConfig { bulk_concurrency, ..Default::default() }).await;
    let items = seed_bulk(&store).await;
    store.slow_down(Duration::from_millis(50));

    let timed_out =
      tokio::time::timeout(Duration::from_millis(20), c.bulk_transition(items, "rev1")).await;
    assert!(timed_out.is_err(), "caller should give up mid-batch");

    let applied = [("B1", "U1"), ("B2", "U2"), ("B4", "U1"), ("B5", "U3")];
    for (id, user) in applied {
      wait_for_history(&c, id, user, 1).await;
    }
    for (id, user) in applied {
      assert_eq!(c.history(id, user).await.unwrap().len(), 1, "{id}");
      assert_eq!(message(&store, id).await.status, MessageStatus::Safe, "{id}");
    }

    let dash = c.dashboard().await.unwrap();
    assert_eq!((dash.active_alerts, dash.total_safe_messages), (-4, 4));
    assert_eq!(c.location_stats("U1").await.unwrap().safe_count, 2);
    assert_eq!(c.security_score("U1").await.unwrap().stats_score, Some(30));
    assert_eq!(c.security_score("U3").await.unwrap().stats_score, Some(15));
  }
}

// ─── History ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn history_is_newest_first() {
  let (c, store) = setup(CoordinatorConfig::default()).await;
  seed_message(&store, "M1", "U1", MessageStatus::Fraud).await;

  c.transition(&request("M1", "U1", Direction::FraudToSafe)).await.unwrap();
  c.transition(&request("M1", "U1", Direction::SafeToFraud)).await.unwrap();

  let directions: Vec<_> = c
    .history("M1", "U1")
    .await
    .unwrap()
    .iter()
    .map(|r| r.direction)
    .collect();
  assert_eq!(directions, [Direction::SafeToFraud, Direction::FraudToSafe]);
}

#[tokio::test]
async fn history_rejects_blank_ids() {
  let (c, _store) = setup(CoordinatorConfig::default()).await;
  assert!(matches!(c.history("", "U1").await, Err(Error::InvalidRequest(_))));
}
