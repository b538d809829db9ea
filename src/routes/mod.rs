//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! The daemon serves one websocket endpoint for brokers plus a health probe,
//! both over the Unix socket bound in `main`.

pub mod ws;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::get;

use crate::state::AppState;

pub fn app(state: AppState) -> Router {
    Router::new().route("/ws", get(ws::handle_ws)).route("/healthz", get(healthz)).with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}
