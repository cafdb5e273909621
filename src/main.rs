//! HintEval console backend
//!
//! - Axum HTTP + WebSocket API over the reconciled hint-evaluation session
//! - Upstream HintEval service for generation, evaluation and storage
//! - Local snapshot cache, reconciled against the upstream session at startup
//! - Static SPA fallback (./static/index.html)
//!
//! Important env variables:
//!   PORT                : u16 (default 3000)
//!   HINTEVAL_API        : upstream base url (default "http://localhost:8001")
//!   HINTEVAL_MODEL      : default generation model
//!   CONSOLE_CACHE_DIR   : snapshot cache directory (default ".cache")
//!   CONSOLE_CONFIG_PATH : path to TOML config
//!   LOG_LEVEL           : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT          : "pretty" (default) or "json"

use std::{net::SocketAddr, sync::Arc};

use tokio::net::TcpListener;
use tracing::{error, info};

use hinteval_console::cache::JsonFileStore;
use hinteval_console::config::load_console_config_from_env;
use hinteval_console::console::Console;
use hinteval_console::routes::build_router;
use hinteval_console::service::HintEvalClient;
use hinteval_console::telemetry;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  let cfg = load_console_config_from_env();
  let client = HintEvalClient::from_config(&cfg.service)?;
  let store = JsonFileStore::new(&cfg.cache.dir, &cfg.cache.scope);
  info!(target: "hinteval_console", upstream = %client.base_url(), cache = %store.path().display(), "Console configured");

  let console = Arc::new(Console::from_config(Arc::new(client), Arc::new(store), &cfg));

  // A failed reconciliation leaves the console usable for a new session.
  match console.reconcile().await {
    Ok(outcome) => info!(target: "hinteval_console", ?outcome, "Session reconciled"),
    Err(e) => error!(target: "hinteval_console", error = %e, "Session reconciliation failed"),
  }

  let app = build_router(console.clone());

  let addr = SocketAddr::from(([0, 0, 0, 0], cfg.server.port));
  let listener = TcpListener::bind(addr).await?;
  info!(target: "hinteval_console", %addr, "HTTP server listening");
  axum::serve(listener, app)
    .with_graceful_shutdown(async {
      let _ = tokio::signal::ctrl_c().await;
      info!(target: "hinteval_console", "Shutdown requested");
    })
    .await?;
  Ok(())
}
