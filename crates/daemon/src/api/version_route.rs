// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `POST /server/version/`: the startup version probe's target, grounded
//! in `original_source`'s `report_ds_version`.

use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use super::AppState;
use dsh_adapters::{EngineCallbackClient, ProcessSupervisor, RegistryClient};
use dsh_core::Clock;
use dsh_engine::EngineError;

#[derive(Debug, Deserialize)]
pub struct VersionRequest {
    version: Option<String>,
}

pub async fn report_version<S, R, C, K>(
    State(state): State<Arc<AppState<S, R, C, K>>>,
    Json(body): Json<VersionRequest>,
) -> Result<Json<Value>, EngineError>
where
    S: ProcessSupervisor,
    R: RegistryClient + Clone,
    C: EngineCallbackClient,
    K: Clock,
{
    let version = body
        .version
        .ok_or_else(|| EngineError::InvalidRequest("Invalid version".to_string()))?;
    state.engine.set_version(version)?;
    Ok(Json(json!({ "status": "OK" })))
}
