// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Child-facing routes: the dedicated-server process's side of the
//! protocol. Restricted to loopback callers by [`crate::auth::require_loopback`].
//! Grounded in `original_source`'s `@from_localhost`-decorated routes.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use dsh_core::{MatchId, UserId};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use super::AppState;
use dsh_adapters::{CallbackError, EngineCallbackClient, ProcessSupervisor, RegistryClient};
use dsh_core::Clock;
use dsh_engine::EngineError;

/// `GET /match/{id}/`: the record's stored `data` blob, with `match_data`
/// and `user_data` promoted one level and the nested `data` key dropped,
/// preserving the original implementation's response shape exactly.
///
/// Unlike every other child route, an unknown match here is a plain 404
/// (`spec.md` §6), not the general `MatchNotFound` -> 500 mapping the other
/// routes use.
pub async fn get_match_data<S, R, C, K>(
    State(state): State<Arc<AppState<S, R, C, K>>>,
    Path(id): Path<String>,
) -> Response
where
    S: ProcessSupervisor,
    R: RegistryClient + Clone,
    C: EngineCallbackClient,
    K: Clock,
{
    let match_id = MatchId::new(id);
    let Some(mut data) = state.engine.get_match_data(&match_id) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let (match_data, user_data) = data
        .get("data")
        .map(|nested| {
            (
                nested.get("match_data").cloned().unwrap_or(Value::Null),
                nested.get("user_data").cloned().unwrap_or(Value::Null),
            )
        })
        .unwrap_or((Value::Null, Value::Null));

    if let Some(obj) = data.as_object_mut() {
        obj.remove("data");
        obj.insert("match_data".to_string(), match_data);
        obj.insert("user_data".to_string(), user_data);
    }

    Json(json!({ "status": "ok", "data": data })).into_response()
}

/// `POST /match/{id}/ready`: no trailing slash, preserved as-is.
pub async fn ready_match<S, R, C, K>(
    State(state): State<Arc<AppState<S, R, C, K>>>,
    Path(id): Path<String>,
) -> Json<Value>
where
    S: ProcessSupervisor,
    R: RegistryClient + Clone,
    C: EngineCallbackClient,
    K: Clock,
{
    let match_id = MatchId::new(id);
    state.engine.notify_ready(&match_id);
    state.engine.report_match_state(&match_id, json!({}));
    Json(json!({ "status": "ok" }))
}

pub async fn heartbeat<S, R, C, K>(
    State(state): State<Arc<AppState<S, R, C, K>>>,
    Path(id): Path<String>,
) -> Json<Value>
where
    S: ProcessSupervisor,
    R: RegistryClient + Clone,
    C: EngineCallbackClient,
    K: Clock,
{
    state.engine.heartbeat(&MatchId::new(id));
    Json(json!({ "status": "ok" }))
}

pub async fn report_state<S, R, C, K>(
    State(state): State<Arc<AppState<S, R, C, K>>>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Json<Value>
where
    S: ProcessSupervisor,
    R: RegistryClient + Clone,
    C: EngineCallbackClient,
    K: Clock,
{
    state.engine.report_match_state(&MatchId::new(id), body);
    Json(json!({ "status": "ok" }))
}

pub async fn report_result<S, R, C, K>(
    State(state): State<Arc<AppState<S, R, C, K>>>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, CallbackError>
where
    S: ProcessSupervisor,
    R: RegistryClient + Clone,
    C: EngineCallbackClient,
    K: Clock,
{
    state
        .callback_router
        .match_result(&MatchId::new(id), body)
        .await?;
    Ok(Json(json!({ "status": "ok" })))
}

pub async fn engine_callback<S, R, C, K>(
    State(state): State<Arc<AppState<S, R, C, K>>>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, CallbackError>
where
    S: ProcessSupervisor,
    R: RegistryClient + Clone,
    C: EngineCallbackClient,
    K: Clock,
{
    state
        .callback_router
        .engine_callback(&MatchId::new(id), body)
        .await?;
    Ok(Json(json!({ "status": "ok" })))
}

#[derive(Debug, Deserialize)]
pub struct UidRequest {
    uid: String,
}

/// Fire-and-forget per `spec.md` §7: a `BackendUnreachable` failure here is
/// logged but never surfaced to the child, unlike `report_result` /
/// `engine_callback` below.
pub async fn user_joined<S, R, C, K>(
    State(state): State<Arc<AppState<S, R, C, K>>>,
    Path(id): Path<String>,
    Json(body): Json<UidRequest>,
) -> Json<Value>
where
    S: ProcessSupervisor,
    R: RegistryClient + Clone,
    C: EngineCallbackClient,
    K: Clock,
{
    let match_id = MatchId::new(id);
    if let Err(e) = state.callback_router.user_joined(&match_id, &UserId::new(body.uid)).await {
        tracing::warn!(%match_id, error = %e, "user_joined callback failed");
    }
    Json(json!({ "status": "ok" }))
}

/// Fire-and-forget; see `user_joined` above.
pub async fn user_left<S, R, C, K>(
    State(state): State<Arc<AppState<S, R, C, K>>>,
    Path(id): Path<String>,
    Json(body): Json<UidRequest>,
) -> Json<Value>
where
    S: ProcessSupervisor,
    R: RegistryClient + Clone,
    C: EngineCallbackClient,
    K: Clock,
{
    let match_id = MatchId::new(id);
    if let Err(e) = state.callback_router.user_left(&match_id, &UserId::new(body.uid)).await {
        tracing::warn!(%match_id, error = %e, "user_left callback failed");
    }
    Json(json!({ "status": "ok" }))
}

/// `POST /match/{id}/pending_users/`: the child's drain operation. Empty
/// and unknown-match both respond `{status:"OK"}` with no further fields,
/// matching the original implementation which can't tell the two apart.
pub async fn pending_users<S, R, C, K>(
    State(state): State<Arc<AppState<S, R, C, K>>>,
    Path(id): Path<String>,
) -> Json<Value>
where
    S: ProcessSupervisor,
    R: RegistryClient + Clone,
    C: EngineCallbackClient,
    K: Clock,
{
    match state.engine.get_pending_users(&MatchId::new(id)) {
        Some((users, match_data)) => {
            let tokens: Vec<String> = users.iter().map(|(uid, _)| uid.as_str().to_string()).collect();
            let user_data: Vec<Value> = users.into_iter().map(|(_, data)| data).collect();
            Json(json!({
                "status": "OK",
                "users": tokens,
                "user_data": user_data,
                "match_data": match_data,
            }))
        }
        None => Json(json!({ "status": "OK" })),
    }
}
