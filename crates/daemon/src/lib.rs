// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! dsh-daemon: `dshd`, the dedicated-server host agent's HTTP surface and
//! process entry point.

pub mod api;
pub mod auth;
pub mod error;
pub mod wiring;

pub use api::{build_router, AppState};
pub use wiring::{build, WireError, Wired};
