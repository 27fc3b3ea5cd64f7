// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! UE4 dedicated-server spawn strategy, grounded in
//! `original_source/ue4_manager.py`.

use super::{extract_args, launch, ProcessExitSink, ProcessSupervisor, SpawnRequest, SupervisorConfig, SupervisorError};
use async_trait::async_trait;
use std::process::Stdio;
use std::sync::Arc;

/// Builds argv for a UE4 dedicated-server build:
/// `<binary> [data.args...] -port=<p> [-beaconport=<bp>]
/// -FunapiMatchID=<id> -FunapiManagerServer=127.0.0.1:<rest_port>
/// -FunapiHeartbeat=<secs>`.
///
/// Unlike Unity, UE4 never receives `-nographics -batchmode
/// -RunDedicatedServer` and is the engine flavor that uses beacon ports.
pub struct Ue4Spawner {
    config: SupervisorConfig,
}

impl Ue4Spawner {
    pub fn new(config: SupervisorConfig) -> Self {
        Self { config }
    }
}

/// Builds the dedicated-server argv in isolation from process spawning, so
/// the convention can be unit-tested without launching a real child.
fn build_argv(request: &SpawnRequest, config: &SupervisorConfig) -> Vec<String> {
    let mut argv = extract_args(&request.data);
    argv.push(format!("-port={}", request.port));
    if let Some(beacon_port) = request.beacon_port {
        argv.push(format!("-beaconport={beacon_port}"));
    }
    argv.push(format!("-FunapiMatchID={}", request.match_id));
    argv.push(format!("-FunapiManagerServer=127.0.0.1:{}", config.rest_port));
    argv.push(format!(
        "-FunapiHeartbeat={}",
        config.heartbeat_interval.as_secs()
    ));
    argv
}

#[async_trait]
impl ProcessSupervisor for Ue4Spawner {
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

    fn config() -> SupervisorConfig {
        SupervisorConfig {
            binary_path: "/opt/ds/UE4Server".into(),
            rest_port: 9000,
            heartbeat_interval: Duration::from_secs(15),
            run_as_unity_editor: false,
        }
    }

    #[test]
    fn beacon_port_flag_included_when_set() {
        let request = SpawnRequest {
            match_id: MatchId::new("m1"),
            port: 7500,
            beacon_port: Some(7501),
            data: serde_json::json!({}),
            max_uptime: Duration::ZERO,
        };
        let argv = build_argv(&request, &config());
        assert!(argv.contains(&"-beaconport=7501".to_string()));
        assert!(!argv.iter().any(|a| a == "-nographics" || a == "-batchmode"));
    }

    #[test]
    fn beacon_port_flag_omitted_without_beacon_mode() {
        let request = SpawnRequest {
            match_id: MatchId::new("m1"),
            port: 7500,
            beacon_port: None,
            data: serde_json::json!({}),
            max_uptime: Duration::ZERO,
        };
        let argv = build_argv(&request, &config());
        assert!(!argv.iter().any(|a| a.starts_with("-beaconport")));
    }
}
