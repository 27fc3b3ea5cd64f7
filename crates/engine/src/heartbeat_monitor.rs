// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Heartbeat monitor: a self-rescheduling timer task that sweeps for matches
//! whose last heartbeat is older than `heartbeat_interval * 2.5` and treats
//! them as if the child had exited, per `spec.md` §4.2.

use crate::lifecycle::Engine;
use dsh_adapters::{ProcessSupervisor, RegistryClient};
use dsh_core::Clock;
use std::time::Duration;

/// Spawn the heartbeat monitor as a background task, ticking every
/// `interval` seconds. Returns the task handle so `dshd`'s `main` can hold
/// it (and, if ever needed, abort it on shutdown).
pub fn spawn_heartbeat_monitor<S, R, C, K>(engine: Engine<S, R, C, K>, interval: Duration) -> tokio::task::JoinHandle<()>
where
    S: ProcessSupervisor,
    R: RegistryClient,
    C: Send + Sync + 'static,
    K: Clock,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick fires immediately; skip it so we don't sweep before
        // any match has had a chance to send its first heartbeat.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            engine.sweep_stale_heartbeats().await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::EngineConfig;
    use crate::publisher::{HostStaticInfo, StatePublisher};
    use dsh_adapters::registry_client::FakeRegistryClient;
    use dsh_adapters::supervisor::FakeProcessSupervisor;
    use dsh_core::{FakeClock, MatchId, MatchRegistry, PortPool};
    use std::sync::Arc;

    fn test_engine() -> (
        Engine<FakeProcessSupervisor, FakeRegistryClient, (), FakeClock>,
        FakeClock,
    ) {
        let clock = FakeClock::new(1_000);
        let registry = Arc::new(MatchRegistry::new(PortPool::new(7500, 4, false), 4));
        let publisher = StatePublisher::new(
            Arc::clone(&registry),
            FakeRegistryClient::new(),
            HostStaticInfo {
                server_id: "host-1".into(),
                public_ip: "203.0.113.1".into(),
                instance_id: "inst-1".into(),
                region: "us".into(),
                max_matches: 4,
            },
            clock.clone(),
        );
        let engine = Engine::new(
            registry,
            FakeProcessSupervisor::new(),
            publisher,
            clock.clone(),
            EngineConfig {
                rest_port: 9000,
                max_ds_uptime_seconds: 0,
                heartbeat_interval: Duration::from_secs(10),
            },
        );
        (engine, clock)
    }

    #[tokio::test(start_paused = true)]
    async fn stale_heartbeat_removes_match() {
        let (engine, clock) = test_engine();
        let id = MatchId::new("m1");
        let created = engine
            .create_match(id.clone(), "127.0.0.1".parse().unwrap(), serde_json::json!({"port": 1}))
            .await
            .unwrap();
        drop(created);
        engine.notify_ready(&id);
        assert!(engine.registry().contains(&id));

        // heartbeat_interval * 2.5 = 25s; advance past it without a heartbeat.
        clock.advance(26);
        engine.sweep_stale_heartbeats().await;
        assert!(!engine.registry().contains(&id));
    }

    #[tokio::test(start_paused = true)]
    async fn fresh_heartbeat_survives_sweep() {
        let (engine, clock) = test_engine();
        let id = MatchId::new("m1");
        engine
            .create_match(id.clone(), "127.0.0.1".parse().unwrap(), serde_json::json!({"port": 1}))
            .await
            .unwrap();
        engine.notify_ready(&id);
        clock.advance(5);
        engine.heartbeat(&id);
        clock.advance(5);
        engine.sweep_stale_heartbeats().await;
        assert!(engine.registry().contains(&id));
    }
}
