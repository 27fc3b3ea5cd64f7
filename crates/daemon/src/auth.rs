// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Two authentication layers, mirroring the original implementation's
//! `@token_required` (backend-facing routes) and `@from_localhost`
//! (child-facing routes) decorators.

use axum::extract::{ConnectInfo, Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::api::AppState;
use dsh_adapters::{EngineCallbackClient, ProcessSupervisor, RegistryClient};
use dsh_core::Clock;

fn error_response(status: StatusCode, msg: &str) -> Response {
    (status, axum::Json(json!({ "status": "error", "error": msg }))).into_response()
}

/// Requires `Authorization: Bearer <token>` matching the configured backend
/// token. A `None` configured token disables the check (local/dev use).
pub async fn require_backend_token<S, R, C, K>(
    State(state): State<Arc<AppState<S, R, C, K>>>,
    request: Request,
    next: Next,
) -> Response
where
    S: ProcessSupervisor,
    R: RegistryClient + Clone,
    C: EngineCallbackClient,
    K: Clock,
{
    let Some(expected) = state.backend_bearer_token.as_deref() else {
        return next.run(request).await;
    };

    let provided = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match provided {
        Some(token) if token == expected => next.run(request).await,
        _ => error_response(StatusCode::UNAUTHORIZED, "Bearer token not found"),
    }
}

/// Requires the request to originate from the loopback interface, the same
/// restriction the original implementation places on every route only the
/// locally-spawned dedicated-server child is meant to call.
pub async fn require_loopback(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Response {
    if addr.ip().is_loopback() {
        next.run(request).await
    } else {
        error_response(StatusCode::FORBIDDEN, "restricted to localhost")
    }
}
