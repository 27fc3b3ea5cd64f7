// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine-level error kinds, per `spec.md` §7. Propagation to HTTP status
//! codes is `dsh-daemon`'s concern; this crate stays transport-agnostic.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("match already exists")]
    AlreadyCreated,
    #[error("match not found")]
    MatchNotFound,
    #[error("no capacity for another match")]
    CapacityExceeded,
    #[error("failed to spawn dedicated-server process: {0}")]
    SpawnFailure(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("internal error: {0}")]
    Internal(String),
}
