//! Handlers for `/transitions` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/transitions` | Body: [`TransitionBody`]; returns the [`TransitionOutcome`] |
//! | `POST` | `/transitions/bulk` | Body: [`BulkBody`]; always 200 with a [`BulkReport`] |

use axum::{
  Json,
  extract::{State, rejection::JsonRejection},
};
use serde::Deserialize;
use verdict_coordinator::{BulkItem, BulkReport};
use verdict_core::{
  store::AuditLog,
  transition::{Direction, TransitionOutcome, TransitionRequest},
};

use crate::{AppState, auth::Reviewer, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct TransitionBody {
  pub message_id: String,
  pub user_id:    String,
  pub direction:  Direction,
  #[serde(default)]
  pub reason:     String,
}

/// `POST /transitions`
pub async fn create<S>(
  State(state): State<AppState<S>>,
  Reviewer(reviewer): Reviewer,
  body: Result<Json<TransitionBody>, JsonRejection>,
) -> Result<Json<TransitionOutcome>, ApiError>
where
  S: AuditLog + 'static,
{
  let Json(body) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
  let request = TransitionRequest {
    message_id: body.message_id,
    user_id: body.user_id,
    direction: body.direction,
    reviewer,
    reason: body.reason,
  };

  let outcome = state.coordinator.transition(&request).await?;
  Ok(Json(outcome))
}

#[derive(Debug, Deserialize)]
pub struct BulkBody {
  pub items: Vec<BulkItem>,
}

/// `POST /transitions/bulk`
///
/// Per-item failures are reported inside the body; only a malformed or
/// oversized request is rejected outright.
pub async fn bulk<S>(
  State(state): State<AppState<S>>,
  Reviewer(reviewer): Reviewer,
  body: Result<Json<BulkBody>, JsonRejection>,
) -> Result<Json<BulkReport>, ApiError>
where
  S: AuditLog + 'static,
{
  let Json(body) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
  if body.items.is_empty() {
    return Err(ApiError::BadRequest("items must not be empty".to_owned()));
  }
  if body.items.len() > state.max_bulk_items {
    return Err(ApiError::BadRequest(format!(
      "too many items: {} (limit {})",
      body.items.len(),
      state.max_bulk_items
    )));
  }

  let report = state.coordinator.bulk_transition(body.items, &reviewer).await;
  Ok(Json(report))
}
