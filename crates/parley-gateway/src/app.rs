use axum::{routing::get, Router};
use std::sync::Arc;

use crate::listener::ListenerHandle;

/// Central shared state, passed as Arc<AppState> to all Axum handlers.
pub struct AppState {
    /// Bearer token guarding the listener control endpoints, if configured.
    pub control_token: Option<String>,
    pub listener: ListenerHandle,
}

impl AppState {
    pub fn new(control_token: Option<String>, listener: ListenerHandle) -> Self {
        Self {
            control_token,
            listener,
        }
    }
}

/// Assemble the full Axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(crate::http::health::health_handler))
        .route(
            "/remove-listener",
            get(crate::http::listener::remove_listener),
        )
        .route(
            "/restore-listener",
            get(crate::http::listener::restore_listener),
        )
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
