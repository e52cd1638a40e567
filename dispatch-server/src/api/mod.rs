//! HTTP surface: REST routes, the WebSocket upgrade and session tokens.

pub mod auth;
pub mod rest;
pub mod ws;

use std::sync::Arc;

use axum::Router;
use axum::routing::get;

use crate::app::App;

/// Assemble the complete HTTP router: REST surface plus the `/ws` upgrade.
pub fn router(app: Arc<App>) -> Router {
    Router::new()
        .route("/ws", get(ws::ws_handler))
        .with_state(app.clone())
        .merge(rest::router(app))
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
