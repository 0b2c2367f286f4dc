//! HTTP Basic-auth extractor and standalone verifier.
//!
//! The authenticated username is the reviewer identity recorded on every
//! transition, so it is never taken from the request body.

use argon2::{Argon2, PasswordHash, PasswordVerifier};
use axum::{
  extract::FromRequestParts,
  http::{HeaderMap, header, request::Parts},
};
use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
use serde::Deserialize;
use verdict_core::store::AuditLog;

use crate::{AppState, error::ApiError};

/// One reviewer allowed to use the API.
#[derive(Debug, Clone, Deserialize)]
pub struct ReviewerCredential {
  pub username:      String,
  /// PHC string produced by argon2, e.g. `$argon2id$v=19$…`
  pub password_hash: String,
}

/// Credentials accepted as valid for this server instance.
#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
  pub reviewers: Vec<ReviewerCredential>,
}

impl AuthConfig {
  pub fn new(reviewers: Vec<ReviewerCredential>) -> Self { Self { reviewers } }
}

/// The authenticated reviewer's username.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reviewer(pub String);

/// Verify credentials directly from headers and return the username.
pub fn verify_auth(headers: &HeaderMap, config: &AuthConfig) -> Result<String, ApiError> {
  let header_val = headers
    .get(header::AUTHORIZATION)
    .and_then(|v| v.to_str().ok())
    .ok_or(ApiError::Unauthorized)?;

  let encoded = header_val
    .strip_prefix("Basic ")
    .ok_or(ApiError::Unauthorized)?;

  let decoded = B64.decode(encoded).map_err(|_| ApiError::Unauthorized)?;
  let creds = std::str::from_utf8(&decoded).map_err(|_| ApiError::Unauthorized)?;

  let (username, password) = creds.split_once(':').ok_or(ApiError::Unauthorized)?;

  let reviewer = config
    .reviewers
    .iter()
    .find(|r| r.username == username)
    .ok_or(ApiError::Unauthorized)?;

  let parsed_hash =
    PasswordHash::new(&reviewer.password_hash).map_err(|_| ApiError::Unauthorized)?;

  Argon2::default()
    .verify_password(password.as_bytes(), &parsed_hash)
    .map_err(|_| ApiError::Unauthorized)?;

  Ok(reviewer.username.clone())
}

impl<S> FromRequestParts<AppState<S>> for Reviewer
where
  S: AuditLog + 'static,
{
  type Rejection = ApiError;

  async fn from_request_parts(
    parts: &mut Parts,
    state: &AppState<S>,
  ) -> Result<Self, Self::Rejection> {
    verify_auth(&parts.headers, &state.auth).map(Reviewer)
  }
}
