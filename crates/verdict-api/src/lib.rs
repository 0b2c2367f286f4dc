//! JSON REST API for Verdict.
//!
//! Exposes an axum [`Router`] backed by a [`Coordinator`] over any
//! [`verdict_core::store::AuditLog`]. Every route requires HTTP Basic auth;
//! the authenticated username becomes the reviewer of a transition. TLS and
//! transport concerns are the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", verdict_api::api_router(state))
//! ```

pub mod auth;
pub mod error;
pub mod history;
pub mod stats;
pub mod transitions;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post},
};
use verdict_coordinator::Coordinator;
use verdict_core::store::AuditLog;

pub use auth::{AuthConfig, Reviewer, ReviewerCredential};
pub use error::ApiError;

/// Default cap on the number of items in one bulk request.
pub const DEFAULT_MAX_BULK_ITEMS: usize = 500;

/// Shared state threaded through all axum handlers.
pub struct AppState<S> {
  pub coordinator:    Coordinator<S>,
  pub auth:           Arc<AuthConfig>,
  pub max_bulk_items: usize,
}

impl<S> Clone for AppState<S> {
  fn clone(&self) -> Self {
    Self {
      coordinator:    self.coordinator.clone(),
      auth:           Arc::clone(&self.auth),
      max_bulk_items: self.max_bulk_items,
    }
  }
}

/// Build a fully-materialised API router for `state`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(state: AppState<S>) -> Router<()>
where
  S: AuditLog + 'static,
{
  Router::new()
    // Transitions
    .route("/transitions", post(transitions::create::<S>))
    .route("/transitions/bulk", post(transitions::bulk::<S>))
    // History
    .route(
      "/users/{user_id}/messages/{message_id}/history",
      get(history::handler::<S>),
    )
    // Aggregates
    .route("/dashboard", get(stats::dashboard::<S>))
    .route("/users/{user_id}/location-stats", get(stats::location_stats::<S>))
    .route("/users/{user_id}/security-score", get(stats::security_score::<S>))
    .with_state(state)
}
