// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! dsh-adapters: pluggable strategies the lifecycle engine is generic over —
//! process supervisors (per-engine spawn conventions), registry clients
//! (key/value vs. REST-with-OAuth state publishing), and the outbound
//! HTTP transport used for backend callbacks.

pub mod callback;
pub mod registry_client;
pub mod supervisor;
pub mod traced;

pub use callback::{CallbackError, EngineCallbackClient, HttpEngineCallbackClient};
pub use registry_client::{RegistryClient, RegistryError};
pub use supervisor::{ProcessExitSink, ProcessSupervisor, SpawnRequest, SupervisorConfig, SupervisorError};
