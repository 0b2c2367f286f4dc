//! Read-side views: a message's audit history and the aggregates the
//! coordinator maintains.

use verdict_core::{
  aggregate::{DashboardAggregate, LocationAggregate, SecurityScore, dashboard},
  audit::AuditRecord,
  document::Collection,
  store::{AuditLog, DocumentStore},
};

use crate::{Coordinator, Error, Result};

fn store_err<E: std::error::Error + Send + Sync + 'static>(e: E) -> Error {
  Error::Store(Box::new(e))
}

impl<S: AuditLog> Coordinator<S> {
  /// Every audit record for `(message_id, user_id)`, newest first. A message
  /// that was never reviewed has an empty history.
  pub async fn history(&self, message_id: &str, user_id: &str) -> Result<Vec<AuditRecord>> {
    for (name, value) in [("message_id", message_id), ("user_id", user_id)] {
      if value.trim().is_empty() {
        return Err(Error::InvalidRequest(format!("{name} must not be empty")));
      }
    }
    self.store.history(message_id, user_id).await.map_err(store_err)
  }

  pub async fn dashboard(&self) -> Result<DashboardAggregate> {
    let doc = self
      .store
      .get(Collection::Dashboard, dashboard::DOC_ID)
      .await
      .map_err(store_err)?;
    Ok(DashboardAggregate::from_document(doc.as_ref()))
  }

  pub async fn location_stats(&self, user_id: &str) -> Result<LocationAggregate> {
    let doc = self
      .store
      .get(Collection::LocationStats, user_id)
      .await
      .map_err(store_err)?;
    Ok(LocationAggregate::from_document(user_id, doc.as_ref()))
  }

  /// Both copies of the user's score, so callers can spot drift.
  pub async fn security_score(&self, user_id: &str) -> Result<SecurityScore> {
    let stats = self
      .store
      .get(Collection::UserStats, user_id)
      .await
      .map_err(store_err)?;
    let profile = self
      .store
      .get(Collection::Users, user_id)
      .await
      .map_err(store_err)?;
    Ok(SecurityScore::from_documents(user_id, stats.as_ref(), profile.as_ref()))
  }
}
