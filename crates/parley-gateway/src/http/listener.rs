//! Listener control endpoints: GET /remove-listener and GET /restore-listener.
//!
//! When `gateway.control_token` is set, both require
//! `Authorization: Bearer <token>`.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
};
use std::sync::Arc;
use tracing::{info, warn};

use crate::app::AppState;

type Reply = (StatusCode, &'static str);

/// GET /remove-listener: stop pulling from the subscription.
pub async fn remove_listener(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Reply, Reply> {
    authorize(&state, &headers)?;
    info!("removing listener...");
    let changed = state.listener.detach().await;
    info!(changed, "listener removed!");
    Ok((StatusCode::OK, "listener removed!"))
}

/// GET /restore-listener: resume pulling from the subscription.
pub async fn restore_listener(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Reply, Reply> {
    authorize(&state, &headers)?;
    info!("restoring listener...");
    let changed = state.listener.attach().await;
    info!(changed, "listener restored!");
    Ok((StatusCode::OK, "listener restored!"))
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), Reply> {
    let Some(expected) = state.control_token.as_deref() else {
        return Ok(());
    };
    verify_bearer_token(headers, expected).map_err(|reason| {
        warn!(reason = %reason, "listener control request rejected");
        (StatusCode::UNAUTHORIZED, "unauthorized")
    })
}

/// Verify a static bearer token in the `Authorization: Bearer <token>` header.
fn verify_bearer_token(headers: &HeaderMap, expected: &str) -> Result<(), String> {
    let auth_header = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| "missing Authorization header".to_string())?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or_else(|| "Authorization header must use Bearer scheme".to_string())?;

    if token == expected {
        Ok(())
    } else {
        Err("bearer token mismatch".to_string())
    }
}
