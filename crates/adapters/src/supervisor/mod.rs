// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process supervisor: launches a dedicated-server child for a match,
//! watches for its exit, and enforces the configured uptime cap.
//!
//! Grounded in `original_source`'s `unity_manager.py` / `ue4_manager.py`:
//! both spin up `gevent.spawn(wait)` and, when a max uptime is configured,
//! `gevent.spawn(wait_timeout)` right after the child is launched. The async
//! translation here is a single `tokio::spawn`ed task per child that races
//! its exit against the uptime cap (see [`launch`] for why it isn't two).

mod ue4;
mod unity;

pub use ue4::Ue4Spawner;
pub use unity::UnitySpawner;

#[cfg(any(test, feature = "test-support"))]
pub mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeProcessSupervisor;

use async_trait::async_trait;
use dsh_core::MatchId;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Everything a concrete spawner needs to build and launch argv for one
/// match, independent of the engine flavor.
#[derive(Debug, Clone)]
pub struct SpawnRequest {
    pub match_id: MatchId,
    pub port: u16,
    pub beacon_port: Option<u16>,
    pub data: serde_json::Value,
    pub max_uptime: Duration,
}

/// Static per-host settings a spawner consults for every match: the binary
/// to launch, where to reach the agent's own REST API, and the heartbeat
/// interval to pass through as `-FunapiHeartbeat`.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub binary_path: PathBuf,
    pub rest_port: u16,
    pub heartbeat_interval: Duration,
    pub run_as_unity_editor: bool,
}

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("failed to spawn child process: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("spawned child reported no pid")]
    NoPid,
}

/// Callback the supervisor invokes exactly once per spawned child, whether
/// it exits on its own or is force-killed after the uptime cap.
#[async_trait]
pub trait ProcessExitSink: Send + Sync + 'static {
    async fn notify_finished(&self, match_id: MatchId);
}

/// A pluggable strategy for launching an engine-specific dedicated-server
/// binary. Implementations return a pid synchronously and deliver
/// `notify_finished` asynchronously via the supplied sink.
#[async_trait]
pub trait ProcessSupervisor: Send + Sync + 'static {
    async fn spawn(
        &self,
        request: SpawnRequest,
        exit_sink: Arc<dyn ProcessExitSink>,
    ) -> Result<u32, SupervisorError>;
}

/// Extract `data.args` as a vector of string arguments, matching the
/// original implementation's `data.pop('args', [])`. Non-string entries are
/// rendered with their JSON representation rather than dropped.
pub(crate) fn extract_args(data: &serde_json::Value) -> Vec<String> {
    data.get("args")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
                .collect()
        })
        .unwrap_or_default()
}

/// Launch `cmd`, detaching it into its own process group on Unix so the
/// agent's own signals (e.g. the shell job-control group) don't propagate to
/// the child, then spawn a single task that owns the child handle for its
/// whole lifetime: it races the child's natural exit against the uptime
/// cap (when configured) and kills the child if the cap wins, guaranteeing
/// `notify_finished` fires exactly once either way.
///
/// A single owning task is deliberate rather than the two independently
/// locking tasks the naive translation of "exit watcher" + "uptime watcher"
/// suggests: `Child::wait`/`Child::kill` both need `&mut self`, and a
/// `tokio::sync::Mutex<Child>` guard taken for the `wait()` future would be
/// held for the child's entire lifetime, starving the kill-side task of the
/// lock exactly when a child that never exits needs killing.
pub(crate) async fn launch(
    mut cmd: tokio::process::Command,
    request: &SpawnRequest,
    exit_sink: Arc<dyn ProcessExitSink>,
) -> Result<u32, SupervisorError> {
    cmd.kill_on_drop(false);
    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = cmd.spawn().map_err(SupervisorError::Spawn)?;
    let pid = child.id().ok_or(SupervisorError::NoPid)?;

    let match_id = request.match_id.clone();
    let max_uptime = request.max_uptime;

    tokio::spawn(async move {
        let status = if max_uptime > Duration::ZERO {
            tokio::select! {
                status = child.wait() => Some(status),
                _ = tokio::time::sleep(max_uptime) => None,
            }
        } else {
            Some(child.wait().await)
        };

        match status {
            Some(Ok(status)) => tracing::info!(%match_id, ?status, "dedicated-server process exited"),
            Some(Err(e)) => tracing::warn!(%match_id, error = %e, "failed to wait on dedicated-server process"),
            None => {
                tracing::warn!(%match_id, "uptime cap exceeded, killing dedicated-server process");
                if let Err(e) = child.kill().await {
                    tracing::warn!(%match_id, error = %e, "failed to kill dedicated-server process");
                }
            }
        }
        exit_sink.notify_finished(match_id).await;
    });

    Ok(pid)
}
