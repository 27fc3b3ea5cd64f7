// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Maps [`EngineError`] to the JSON error envelope and status codes the
//! original implementation's `make_error_response` produced.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use dsh_adapters::CallbackError;
use dsh_engine::EngineError;
use serde_json::json;

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        // `spec.md` §7: only the two creation-time errors are 400; every
        // other kind, including `MatchNotFound`, falls through to 500.
        let status = match &self {
            EngineError::AlreadyCreated | EngineError::CapacityExceeded => StatusCode::BAD_REQUEST,
            EngineError::MatchNotFound
            | EngineError::SpawnFailure(_)
            | EngineError::InvalidRequest(_)
            | EngineError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "status": "error", "error": self.to_string() }))).into_response()
    }
}

/// `spec.md` §7: result/callback propagation failures bubble up to the
/// child as 500 so it may retry.
impl IntoResponse for CallbackError {
    fn into_response(self) -> Response {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "status": "error", "error": self.to_string() })),
        )
            .into_response()
    }
}
