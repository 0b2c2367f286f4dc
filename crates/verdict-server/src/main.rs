//! verdict server binary.
//!
//! Reads `config.toml` (or the path specified with `--config`), opens an
//! in-process SQLite store, and serves the review API over HTTP.
//!
//! # Password hash generation
//!
//! To generate the argon2 PHC string for a `[[reviewers]]` entry:
//!
//! ```
//! cargo run -p verdict-server -- --hash-password
//! ```

use std::{path::PathBuf, sync::Arc};

use anyhow::Context as _;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use verdict_server::{ServerConfig, app_state, hash_password, read_password, router};
use verdict_store_sqlite::SqliteStore;

#[derive(Parser)]
#[command(author, version, about = "Verdict review server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  /// Print the argon2 hash for a password entered on stdin and exit.
  #[arg(long)]
  hash_password: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  if cli.hash_password {
    println!("{}", hash_password(&read_password()?)?);
    return Ok(());
  }

  let server_cfg = ServerConfig::load(&cli.config)?;
  if server_cfg.reviewers.is_empty() {
    tracing::warn!("no reviewers configured; every request will be rejected");
  }

  let store_path = server_cfg.resolved_store_path();
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  let address = server_cfg.address();
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;
  tracing::info!(
    no_op_policy = %server_cfg.no_op_policy,
    bulk_concurrency = server_cfg.coordinator_config().bulk_concurrency,
    "listening on http://{address}"
  );

  axum::serve(listener, router(app_state(Arc::new(store), &server_cfg)))
    .await
    .context("server error")?;
  Ok(())
}
