//! Axum Router Configuration

use crate::{relay::ws_handler, state::AppState};
use axum::{Router, routing::get};
use std::sync::Arc;

/// Creates the relay router. Clients upgrade to a WebSocket on `/`.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(ws_handler))
        .with_state(app_state)
}
