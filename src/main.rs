//! NutriLab · Statistics Learning Backend
//!
//! - Axum HTTP + WebSocket API for the statistics games
//! - Class management with a soft-delete trash bin and invite codes
//! - Static SPA fallback (./static/index.html)
//!
//! Important env variables:
//!   PORT             : u16 (default 3000)
//!   APP_CONFIG_PATH  : path to TOML config (retention, points, notification timings, extra quizzes)
//!   LOG_LEVEL        : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT       : "pretty" (default) or "json"

mod telemetry;
mod domain;
mod config;
mod seeds;
mod engine;
mod matching;
mod simulation;
mod dates;
mod notify;
mod classes;
mod shell;
mod state;
mod protocol;
mod logic;
mod routes;

use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tracing::{info, instrument};

use crate::routes::build_router;
use crate::state::AppState;

#[instrument(level = "info", skip_all)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  // Catalog, in-memory stores and notification queues.
  let state = Arc::new(AppState::new());

  // Purge expired trash in the background; 0 turns it off.
  if state.cleanup_interval_secs > 0 {
    let every = Duration::from_secs(state.cleanup_interval_secs);
    tokio::spawn(logic::run_trash_cleanup(state.clone(), every));
    info!(target: "nutrilab", interval_secs = state.cleanup_interval_secs, "Trash cleanup scheduled");
  }

  // Drop quiz sessions nobody has touched for a while; 0 turns it off.
  if state.session_sweep_secs > 0 {
    let every = Duration::from_secs(state.session_sweep_secs);
    let max_idle = Duration::from_secs(state.session_idle_secs);
    tokio::spawn(logic::run_session_sweep(state.clone(), every, max_idle));
    info!(target: "nutrilab", interval_secs = state.session_sweep_secs, idle_secs = state.session_idle_secs, "Session sweep scheduled");
  }

  let app = build_router(state.clone());

  let addr: SocketAddr = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "nutrilab", %addr, "HTTP server listening");
  axum::serve(listener, app).await?;
  Ok(())
}
