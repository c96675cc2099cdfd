//! CodeKata · Coding Practice Backend
//!
//! - Axum HTTP + WebSocket session API
//! - Same-origin relay to the AI backend at /api/relay
//! - Static SPA fallback (./static/index.html)
//!
//! Important env variables:
//!   PORT                 : u16 (default 3000)
//!   GEMINI_API_KEY       : enables the upstream AI client and the relay
//!   GEMINI_BASE_URL      : default "https://generativelanguage.googleapis.com/v1beta"
//!   GEMINI_MODEL         : default "gemini-flash-latest"
//!   RELAY_URL            : send session prompts to this relay instead of calling upstream directly
//!   PRACTICE_CONFIG_PATH : path to TOML config (prompts, difficulty table, paste rules)
//!   LOG_LEVEL            : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT           : "pretty" (default) or "json"
//!
//! With neither GEMINI_API_KEY nor RELAY_URL set, sessions run on built-in seed content.

mod telemetry;
mod util;
mod domain;
mod config;
mod timer;
mod anticheat;
mod prompts;
mod gemini;
mod gateway;
mod seeds;
mod session;
mod state;
mod protocol;
mod logic;
mod routes;

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{info, instrument};

use crate::routes::build_router;
use crate::state::AppState;

#[instrument(level = "info", skip_all)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  // Session registry, config, AI gateway and relay client.
  let state = Arc::new(AppState::new());
  state.spawn_sweeper();

  let app = build_router(state.clone());

  let addr: SocketAddr = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "codekata_backend", %addr, "HTTP server listening");
  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await?;
  info!(target: "codekata_backend", "Server stopped");
  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    tracing::error!(target: "codekata_backend", error = %e, "Failed to listen for Ctrl+C");
    std::future::pending::<()>().await;
  }
  info!(target: "codekata_backend", "Shutdown requested");
}
