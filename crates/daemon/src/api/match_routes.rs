// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Backend-facing routes: create a match and add late-joining users.
//! Grounded in `original_source`'s `create_match`/`add_user` Flask routes.

use axum::extract::{ConnectInfo, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use dsh_core::{MatchId, UserId};
use serde::Deserialize;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;

use super::AppState;
use dsh_adapters::{EngineCallbackClient, ProcessSupervisor, RegistryClient};
use dsh_core::Clock;
use dsh_engine::EngineError;

fn gateway_timeout(msg: &str) -> Response {
    (
        StatusCode::GATEWAY_TIMEOUT,
        Json(json!({ "status": "error", "error": msg })),
    )
        .into_response()
}

/// `POST /match/{id}/`: reserves a port, spawns the child, and waits for it
/// to report ready, bounded by `state.request_timeout` (`spec.md` §5:
/// "the wait is bounded by the transport"). A timeout does not cancel the
/// underlying spawn/ready rendezvous — the child may still complete it and
/// the publisher will still pick up the match — it only gives up on this
/// particular HTTP response.
pub async fn create_match<S, R, C, K>(
    State(state): State<Arc<AppState<S, R, C, K>>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Response
where
    S: ProcessSupervisor,
    R: RegistryClient + Clone,
    C: EngineCallbackClient,
    K: Clock,
{
    let match_id = MatchId::new(id);
    let created = match state.engine.create_match(match_id, addr.ip(), body).await {
        Ok(created) => created,
        Err(e) => return e.into_response(),
    };

    match tokio::time::timeout(state.request_timeout, created.ready).await {
        Ok(Ok(())) => Json(json!({
            "status": "OK",
            "host": state.public_ip,
            "port": created.port,
        }))
        .into_response(),
        Ok(Err(_)) => EngineError::Internal(
            "dedicated server exited before reporting ready".to_string(),
        )
        .into_response(),
        Err(_) => gateway_timeout("timed out waiting for dedicated server to report ready"),
    }
}

#[derive(Debug, Deserialize)]
pub struct AddUserRequest {
    users: Vec<String>,
    user_data: Vec<Option<Value>>,
    #[serde(default)]
    match_data: Value,
}

/// `PUT /match/{id}/`: buffers a late-joiner batch and waits for the child's
/// next `pending_users` drain to release it, bounded by
/// `state.request_timeout` like `create_match` above.
pub async fn add_user<S, R, C, K>(
    State(state): State<Arc<AppState<S, R, C, K>>>,
    Path(id): Path<String>,
    Json(body): Json<AddUserRequest>,
) -> Response
where
    S: ProcessSupervisor,
    R: RegistryClient + Clone,
    C: EngineCallbackClient,
    K: Clock,
{
    let match_id = MatchId::new(id);
    let users = body.users.into_iter().map(UserId::new).collect();
    let completion = match state
        .engine
        .add_user(&match_id, users, body.user_data, body.match_data)
    {
        Ok(completion) => completion,
        Err(e) => return e.into_response(),
    };

    match tokio::time::timeout(state.request_timeout, completion).await {
        Ok(Ok(())) => {
            let port = state.engine.registry().get_port(&match_id).unwrap_or(0);
            Json(json!({
                "status": "OK",
                "host": state.public_ip,
                "port": port,
            }))
            .into_response()
        }
        Ok(Err(_)) => {
            EngineError::Internal("match removed before batch was drained".to_string()).into_response()
        }
        Err(_) => gateway_timeout("timed out waiting for the batch to be drained"),
    }
}
