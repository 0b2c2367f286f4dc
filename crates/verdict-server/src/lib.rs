//! Wiring for the Verdict server binary: configuration, reviewer password
//! hashing and the top-level router.

use std::{
  io::{self, BufRead, Write},
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::Context as _;
use argon2::{Argon2, PasswordHasher, password_hash::SaltString};
use axum::Router;
use rand_core::OsRng;
use serde::Deserialize;
use tower_http::trace::TraceLayer;
use verdict_api::{AppState, AuthConfig, DEFAULT_MAX_BULK_ITEMS, ReviewerCredential};
use verdict_coordinator::{Coordinator, CoordinatorConfig};
use verdict_core::{store::AuditLog, transition::NoOpPolicy};

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` layered with
/// `VERDICT_*` environment variables.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:             String,
  #[serde(default = "default_port")]
  pub port:             u16,
  pub store_path:       PathBuf,
  #[serde(default)]
  pub reviewers:        Vec<ReviewerCredential>,
  #[serde(default)]
  pub no_op_policy:     NoOpPolicy,
  #[serde(default = "default_bulk_concurrency")]
  pub bulk_concurrency: usize,
  #[serde(default = "default_max_bulk_items")]
  pub max_bulk_items:   usize,
}

fn default_host() -> String { "127.0.0.1".to_owned() }

fn default_port() -> u16 { 8080 }

fn default_bulk_concurrency() -> usize { CoordinatorConfig::default().bulk_concurrency }

fn default_max_bulk_items() -> usize { DEFAULT_MAX_BULK_ITEMS }

impl ServerConfig {
  /// Load the config file at `path` (optional) layered with `VERDICT_*`
  /// environment variables.
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(config::Environment::with_prefix("VERDICT"))
      .build()
      .context("failed to read config file")?
      .try_deserialize()
      .context("failed to deserialise ServerConfig")
  }

  /// `store_path` with a leading `~/` replaced by `$HOME`.
  pub fn resolved_store_path(&self) -> PathBuf {
    expand_tilde(&self.store_path, std::env::var_os("HOME").map(PathBuf::from))
  }

  pub fn coordinator_config(&self) -> CoordinatorConfig {
    CoordinatorConfig {
      no_op_policy:     self.no_op_policy,
      bulk_concurrency: self.bulk_concurrency.max(1),
    }
  }

  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }
}

fn expand_tilde(path: &Path, home: Option<PathBuf>) -> PathBuf {
  match (path.strip_prefix("~"), home) {
    (Ok(rest), Some(home)) => home.join(rest),
    _ => path.to_path_buf(),
  }
}

// ─── Reviewer passwords ───────────────────────────────────────────────────────

/// The argon2 PHC string for `password`, suitable for a `[[reviewers]]`
/// entry.
pub fn hash_password(password: &str) -> anyhow::Result<String> {
  let salt = SaltString::generate(&mut OsRng);
  Argon2::default()
    .hash_password(password.as_bytes(), &salt)
    .map(|hash| hash.to_string())
    .map_err(|e| anyhow::anyhow!("argon2 error: {e}"))
}

/// Prompt for a password and read one line from stdin.
pub fn read_password() -> anyhow::Result<String> {
  print!("Password: ");
  io::stdout().flush().ok();
  let mut line = String::new();
  io::stdin().lock().read_line(&mut line)?;
  Ok(line.trim_end_matches(['\n', '\r']).to_owned())
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the application state for `store` from `config`.
pub fn app_state<S: AuditLog>(store: Arc<S>, config: &ServerConfig) -> AppState<S> {
  AppState {
    coordinator:    Coordinator::new(store, config.coordinator_config()),
    auth:           Arc::new(AuthConfig::new(config.reviewers.clone())),
    max_bulk_items: config.max_bulk_items,
  }
}

/// The full application: the API under `/api`, with request tracing.
pub fn router<S: AuditLog + 'static>(state: AppState<S>) -> Router {
  Router::new()
    .nest("/api", verdict_api::api_router(state))
    .layer(TraceLayer::new_for_http())
}
