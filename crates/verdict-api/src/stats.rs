//! Handlers for the aggregate views.
//!
//! | Method | Path |
//! |--------|------|
//! | `GET`  | `/dashboard` |
//! | `GET`  | `/users/{user_id}/location-stats` |
//! | `GET`  | `/users/{user_id}/security-score` |

use axum::{
  Json,
  extract::{Path, State},
};
use verdict_core::{
  aggregate::{DashboardAggregate, LocationAggregate, SecurityScore},
  store::AuditLog,
};

use crate::{AppState, auth::Reviewer, error::ApiError};

pub async fn dashboard<S>(
  State(state): State<AppState<S>>,
  _reviewer: Reviewer,
) -> Result<Json<DashboardAggregate>, ApiError>
where
  S: AuditLog + 'static,
{
  Ok(Json(state.coordinator.dashboard().await?))
}

pub async fn location_stats<S>(
  State(state): State<AppState<S>>,
  _reviewer: Reviewer,
  Path(user_id): Path<String>,
) -> Result<Json<LocationAggregate>, ApiError>
where
  S: AuditLog + 'static,
{
  Ok(Json(state.coordinator.location_stats(&user_id).await?))
}

/// Both stored copies of the score; a client can compare them to spot drift.
pub async fn security_score<S>(
  State(state): State<AppState<S>>,
  _reviewer: Reviewer,
  Path(user_id): Path<String>,
) -> Result<Json<SecurityScore>, ApiError>
where
  S: AuditLog + 'static,
{
  Ok(Json(state.coordinator.security_score(&user_id).await?))
}
