//! Bulk transitions.
//!
//! Items run one at a time in input order by default, so two items touching
//! the same user's aggregates never race. With `bulk_concurrency > 1` items
//! are sharded by user: each shard is still sequential, shards run side by
//! side, and the dashboard singleton stays behind the coordinator's lock.

use std::{collections::BTreeMap, sync::Arc};

use serde::{Deserialize, Serialize};
use tokio::{sync::Semaphore, task::JoinSet};
use tracing::{Instrument as _, error, info};
use verdict_core::{
  store::AuditLog,
  transition::{Direction, TransitionOutcome, TransitionRequest},
};

use crate::{Coordinator, Error, Result};

/// One entry of a bulk request. The reviewer is shared by the whole batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkItem {
  pub message_id: String,
  pub user_id:    String,
  pub direction:  Direction,
  #[serde(default)]
  pub reason:     String,
}

impl BulkItem {
  fn request(&self, reviewer: &str) -> TransitionRequest {
    TransitionRequest {
      message_id: self.message_id.clone(),
      user_id:    self.user_id.clone(),
      direction:  self.direction,
      reviewer:   reviewer.to_owned(),
      reason:     self.reason.clone(),
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkSuccess {
  /// Position of the item in the request.
  pub index:   usize,
  pub outcome: TransitionOutcome,
}

/// Coarse classification of why an item failed, so callers can decide which
/// subset is worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
  InvalidRequest,
  NotFound,
  AlreadyInStatus,
  PrimaryWrite,
  Store,
  /// The worker running the item's shard died before reporting.
  Aborted,
}

impl From<&Error> for FailureKind {
  fn from(e: &Error) -> Self {
    match e {
      Error::InvalidRequest(_) => Self::InvalidRequest,
      Error::NotFound { .. } => Self::NotFound,
      Error::AlreadyInStatus { .. } => Self::AlreadyInStatus,
      Error::PrimaryWrite { .. } => Self::PrimaryWrite,
      Error::Store(_) => Self::Store,
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkFailure {
  pub index:      usize,
  pub message_id: String,
  pub user_id:    String,
  pub direction:  Direction,
  pub kind:       FailureKind,
  pub error:      String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkSummary {
  pub total:      usize,
  pub successful: usize,
  pub failed:     usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BulkReport {
  pub successful: Vec<BulkSuccess>,
  pub failed:     Vec<BulkFailure>,
  pub summary:    BulkSummary,
}

impl BulkReport {
  /// Build the report from per-item results. Items with no result are
  /// reported as [`FailureKind::Aborted`].
  fn collect(items: &[BulkItem], results: Vec<ItemResult>) -> Self {
    let mut report = BulkReport::default();
    let mut seen = vec![false; items.len()];
    for (index, result) in results {
      seen[index] = true;
      report.push(index, &items[index], result);
    }
    for (index, item) in items.iter().enumerate().filter(|(i, _)| !seen[*i]) {
      report.push_failure(
        index,
        item,
        FailureKind::Aborted,
        "bulk worker aborted before completing this item".to_owned(),
      );
    }
    report.failed.sort_by_key(|f| f.index);

    report.summary = BulkSummary {
      total:      items.len(),
      successful: report.successful.len(),
      failed:     report.failed.len(),
    };
    report
  }

  fn push(&mut self, index: usize, item: &BulkItem, result: Result<TransitionOutcome>) {
    match result {
      Ok(outcome) => self.successful.push(BulkSuccess { index, outcome }),
      Err(e) => self.push_failure(index, item, FailureKind::from(&e), e.to_string()),
    }
  }

  fn push_failure(&mut self, index: usize, item: &BulkItem, kind: FailureKind, error: String) {
    self.failed.push(BulkFailure {
      index,
      message_id: item.message_id.clone(),
      user_id: item.user_id.clone(),
      direction: item.direction,
      kind,
      error,
    });
  }
}

type ItemResult = (usize, Result<TransitionOutcome>);

impl<S: AuditLog + 'static> Coordinator<S> {
  /// Apply `items` on behalf of `reviewer`.
  ///
  /// Never fails as a whole: each item lands in either `successful` or
  /// `failed`, both ordered by input position. Like
  /// [`Coordinator::transition`], the batch runs on its own task and keeps
  /// going if the caller stops waiting.
  #[tracing::instrument(skip_all, fields(items = items.len(), reviewer = %reviewer))]
  pub async fn bulk_transition(&self, items: Vec<BulkItem>, reviewer: &str) -> BulkReport {
    let items = Arc::new(items);
    let coordinator = self.clone();
    let batch = Arc::clone(&items);
    let reviewer = reviewer.to_owned();

    let results = tokio::spawn(
      async move {
        if coordinator.config.bulk_concurrency <= 1 {
          coordinator.run_sequential(&batch, &reviewer).await
        } else {
          coordinator.run_sharded(&batch, &reviewer).await
        }
      }
      .in_current_span(),
    )
    .await
    .unwrap_or_else(|e| {
      error!(error = %e, "bulk worker failed");
      Vec::new()
    });

    let report = BulkReport::collect(&items, results);
    info!(
      successful = report.summary.successful,
      failed = report.summary.failed,
      "bulk transition finished"
    );
    report
  }

  async fn run_sequential(&self, items: &[BulkItem], reviewer: &str) -> Vec<ItemResult> {
    let mut results = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
      results.push((index, self.transition(&item.request(reviewer)).await));
    }
    results
  }

  async fn run_sharded(&self, items: &[BulkItem], reviewer: &str) -> Vec<ItemResult> {
    let mut shards: BTreeMap<&str, Vec<(usize, TransitionRequest)>> = BTreeMap::new();
    for (index, item) in items.iter().enumerate() {
      shards
        .entry(item.user_id.as_str())
        .or_default()
        .push((index, item.request(reviewer)));
    }

    let permits = Arc::new(Semaphore::new(self.config.bulk_concurrency));
    let mut set = JoinSet::new();
    for (_, shard) in shards {
      let coordinator = self.clone();
      let permits = Arc::clone(&permits);
      set.spawn(
        async move {
          // The semaphore is never closed, so acquiring only waits.
          let _permit = permits.acquire_owned().await;
          let mut out = Vec::with_capacity(shard.len());
          for (index, request) in shard {
            out.push((index, coordinator.transition(&request).await));
          }
          out
        }
        .in_current_span(),
      );
    }

    let mut results = Vec::with_capacity(items.len());
    while let Some(joined) = set.join_next().await {
      match joined {
        Ok(shard) => results.extend(shard),
        Err(e) => error!(error = %e, "bulk shard worker failed"),
      }
    }
    results.sort_by_key(|(index, _)| *index);
    results
  }
}
