//! `GET /users/{user_id}/messages/{message_id}/history`

use axum::{
  Json,
  extract::{Path, State},
};
use verdict_core::{audit::AuditRecord, store::AuditLog};

use crate::{AppState, auth::Reviewer, error::ApiError};

/// Audit records for one message, newest first. Empty when the message was
/// never reviewed.
pub async fn handler<S>(
  State(state): State<AppState<S>>,
  _reviewer: Reviewer,
  Path((user_id, message_id)): Path<(String, String)>,
) -> Result<Json<Vec<AuditRecord>>, ApiError>
where
  S: AuditLog + 'static,
{
  let records = state.coordinator.history(&message_id, &user_id).await?;
  Ok(Json(records))
}
