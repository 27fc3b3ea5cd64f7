// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Unity dedicated-server spawn strategy, grounded in
//! `original_source/unity_manager.py`.

use super::{extract_args, launch, ProcessExitSink, ProcessSupervisor, SpawnRequest, SupervisorConfig, SupervisorError};
use async_trait::async_trait;
use std::process::Stdio;
use std::sync::Arc;

/// Builds argv for a Unity dedicated-server build:
/// `<binary> [data.args...] -port=<p> [-nographics -batchmode]
/// -RunDedicatedServer -FunapiMatchID=<id>
/// -FunapiManagerServer=127.0.0.1:<rest_port> -FunapiHeartbeat=<secs>`.
///
/// `-nographics -batchmode` are omitted when `run_as_unity_editor` is set,
/// matching the Python manager's editor-mode branch used for local testing.
pub struct UnitySpawner {
    config: SupervisorConfig,
}

impl UnitySpawner {
    pub fn new(config: SupervisorConfig) -> Self {
        Self { config }
    }
}

/// Builds the dedicated-server argv in isolation from process spawning, so
/// the convention can be unit-tested without launching a real child.
fn build_argv(request: &SpawnRequest, config: &SupervisorConfig) -> Vec<String> {
    let mut argv = extract_args(&request.data);
    argv.push(format!("-port={}", request.port));
    if !config.run_as_unity_editor {
        argv.push("-nographics".to_string());
        argv.push("-batchmode".to_string());
    }
    argv.push("-RunDedicatedServer".to_string());
    argv.push(format!("-FunapiMatchID={}", request.match_id));
    argv.push(format!("-FunapiManagerServer=127.0.0.1:{}", config.rest_port));
    argv.push(format!(
        "-FunapiHeartbeat={}",
        config.heartbeat_interval.as_secs()
    ));
    argv
}

#[async_trait]
impl ProcessSupervisor for UnitySpawner {
    async fn spawn(
        &self,
        request: SpawnRequest,
        exit_sink: Arc<dyn ProcessExitSink>,
    ) -> Result<u32, SupervisorError> {
        let mut cmd = tokio::process::Command::new(&self.config.binary_path);
        cmd.args(build_argv(&request, &self.config));
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::null());
        cmd.stderr(Stdio::null());

        launch(cmd, &request, exit_sink).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dsh_core::MatchId;
    use std::time::Duration;

    fn config(run_as_unity_editor: bool) -> SupervisorConfig {
        SupervisorConfig {
            binary_path: "/opt/ds/server.x86_64".into(),
            rest_port: 9000,
            heartbeat_interval: Duration::from_secs(10),
            run_as_unity_editor,
        }
    }

    fn request() -> SpawnRequest {
        SpawnRequest {
            match_id: MatchId::new("m1"),
            port: 7500,
            beacon_port: None,
            data: serde_json::json!({ "args": ["-map=Lobby"] }),
            max_uptime: Duration::ZERO,
        }
    }

    #[test]
    fn standard_argv_includes_batchmode_flags() {
        let argv = build_argv(&request(), &config(false));
        assert_eq!(
            argv,
            vec![
                "-map=Lobby",
                "-port=7500",
                "-nographics",
                "-batchmode",
                "-RunDedicatedServer",
                "-FunapiMatchID=m1",
                "-FunapiManagerServer=127.0.0.1:9000",
                "-FunapiHeartbeat=10",
            ]
        );
    }

    #[test]
    fn editor_mode_omits_batchmode_flags() {
        let argv = build_argv(&request(), &config(true));
        assert!(!argv.contains(&"-nographics".to_string()));
        assert!(!argv.contains(&"-batchmode".to_string()));
        assert!(argv.contains(&"-RunDedicatedServer".to_string()));
    }
}
