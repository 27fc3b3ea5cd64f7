// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The match lifecycle engine: composes the in-memory registry, the
//! pluggable process supervisor, and the state publisher behind the public
//! contract described in `spec.md` §4.2.

use crate::error::EngineError;
use crate::publisher::StatePublisher;
use async_trait::async_trait;
use dsh_adapters::{ProcessExitSink, ProcessSupervisor, SpawnRequest};
use dsh_core::{Clock, MatchId, MatchRegistry, Origin, ReserveError, UserId};
use parking_lot::Mutex;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

/// Static settings the lifecycle engine consults on every `create_match`,
/// separate from the ambient `dsh_core::Config` so the engine doesn't need
/// to know about unrelated settings like log paths or bearer tokens.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub rest_port: u16,
    pub max_ds_uptime_seconds: u64,
    pub heartbeat_interval: Duration,
}

/// What `create_match` hands back to the HTTP boundary: the allocated port
/// (to answer the backend once the child is ready) and the one-shot
/// receiver the route handler awaits.
pub struct CreateMatchResult {
    pub port: u16,
    pub ready: oneshot::Receiver<()>,
}

struct EngineState {
    probe_signal: Option<oneshot::Sender<Option<String>>>,
}

struct EngineInner<S, R, C, K> {
    registry: Arc<MatchRegistry>,
    supervisor: S,
    clock: K,
    config: EngineConfig,
    state: Mutex<EngineState>,
    publisher: StatePublisher<R>,
    _callback: std::marker::PhantomData<C>,
}

/// Clonable handle into the lifecycle engine. Constructed once at startup
/// and passed into every HTTP route as `axum::extract::State`, per
/// `spec.md` §9.
pub struct Engine<S, R, C, K> {
    inner: Arc<EngineInner<S, R, C, K>>,
}

impl<S, R, C, K> Clone for Engine<S, R, C, K> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S, R, C, K> Engine<S, R, C, K>
where
    S: ProcessSupervisor,
    R: dsh_adapters::RegistryClient,
    C: Send + Sync + 'static,
    K: Clock,
{
    pub fn new(
        registry: Arc<MatchRegistry>,
        supervisor: S,
        publisher: StatePublisher<R>,
        clock: K,
        config: EngineConfig,
    ) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                registry,
                supervisor,
                clock,
                config,
                state: Mutex::new(EngineState { probe_signal: None }),
                publisher,
                _callback: std::marker::PhantomData,
            }),
        }
    }

    pub fn registry(&self) -> &MatchRegistry {
        &self.inner.registry
    }

    pub fn server_version(&self) -> Option<String> {
        self.inner.publisher.server_version()
    }

    /// An `Arc<dyn ProcessExitSink>` handle the supervisor calls back into
    /// when a child exits or is force-killed.
    fn exit_sink(&self) -> Arc<dyn ProcessExitSink> {
        Arc::clone(&self.inner) as Arc<dyn ProcessExitSink>
    }

    /// §4.2 step 1-5. `caller_addr` is the backend's remote address,
    /// captured as the match's `origin` (together with the `port` field the
    /// caller sent in `data`) for callback URL resolution.
    pub async fn create_match(
        &self,
        id: MatchId,
        caller_addr: IpAddr,
        mut data: serde_json::Value,
    ) -> Result<CreateMatchResult, EngineError> {
        let now = self.inner.clock.now();

        let caller_port = data
            .get("port")
            .and_then(|v| v.as_u64())
            .map(|p| p as u16)
            .unwrap_or(0);

        let (port, beacon_port, ready) = self.inner.registry.reserve(id.clone(), data.clone(), now).map_err(|e| match e {
            ReserveError::AlreadyExists => EngineError::AlreadyCreated,
            ReserveError::Capacity => EngineError::CapacityExceeded,
        })?;

        self.inner
            .registry
            .set_origin(&id, Origin { host: caller_addr, port: caller_port });

        // Overwrite the caller-supplied port with the agent's own REST port
        // before handing `data` to the supervisor / storing it for the
        // child's GET; this is the coupling `spec.md` §9 documents.
        if let Some(obj) = data.as_object_mut() {
            obj.insert("port".to_string(), serde_json::json!(self.inner.config.rest_port));
            obj.insert("created".to_string(), serde_json::json!(now));
        }
        self.inner.registry.set_data(&id, data.clone());

        let max_uptime = Duration::from_secs(self.inner.config.max_ds_uptime_seconds);
        let request = SpawnRequest {
            match_id: id.clone(),
            port,
            beacon_port,
            data,
            max_uptime,
        };

        match self.inner.supervisor.spawn(request, self.exit_sink()).await {
            Ok(pid) => {
                self.inner.registry.attach_instance(&id, pid);
            }
            Err(e) => {
                self.inner.registry.remove(&id);
                return Err(EngineError::SpawnFailure(e.to_string()));
            }
        }

        self.inner.publisher.publish_host_state_soon();

        Ok(CreateMatchResult { port, ready })
    }

    /// §4.2 `add_user`: buffers a late-joiner batch, normalizing missing
    /// `user_data` entries to empty objects.
    pub fn add_user(
        &self,
        id: &MatchId,
        users: Vec<UserId>,
        user_data: Vec<Option<serde_json::Value>>,
        match_data: serde_json::Value,
    ) -> Result<oneshot::Receiver<()>, EngineError> {
        let paired = users
            .into_iter()
            .zip(user_data)
            .map(|(uid, data)| (uid, data.unwrap_or_else(|| serde_json::json!({}))))
            .collect();

        self.inner
            .registry
            .append_batch(id, paired, match_data)
            .ok_or(EngineError::MatchNotFound)
    }

    /// §4.2 `get_pending_users`: atomic drain under the lock, signal release
    /// outside it.
    #[allow(clippy::type_complexity)]
    pub fn get_pending_users(
        &self,
        id: &MatchId,
    ) -> Option<(Vec<(UserId, serde_json::Value)>, Vec<serde_json::Value>)> {
        let (users, match_data, signals) = self.inner.registry.drain_batches(id)?;
        for signal in signals {
            let _ = signal.send(());
        }
        Some((users, match_data))
    }

    /// §4.2 `notify_ready`: idempotent-on-absence, fires at most once.
    pub fn notify_ready(&self, id: &MatchId) {
        let now = self.inner.clock.now();
        if let Some(signal) = self.inner.registry.mark_ready(id, now) {
            let _ = signal.send(());
        }
    }

    /// §4.2 `heartbeat`: unknown ids are ignored.
    pub fn heartbeat(&self, id: &MatchId) {
        let now = self.inner.clock.now();
        self.inner.registry.touch_heartbeat(id, now);
    }

    pub fn get_match_data(&self, id: &MatchId) -> Option<serde_json::Value> {
        self.inner.registry.get_data(id)
    }

    /// `POST /match/{id}/state/`: forward the child's reported state blob to
    /// the registry client, per `spec.md` §4.4. Fire-and-forget; the
    /// publisher retries in the background.
    pub fn report_match_state(&self, id: &MatchId, state: serde_json::Value) {
        self.inner.publisher.publish_match_state_soon(id.clone(), state);
    }

    /// Heartbeat monitor tick: for every match whose `last_heartbeat` is
    /// older than `heartbeat_interval * 2.5`, treat it as if the child had
    /// exited.
    pub async fn sweep_stale_heartbeats(&self) {
        let now = self.inner.clock.now();
        let timeout = (self.inner.config.heartbeat_interval.as_secs() as f64 * 2.5) as u64;
        let stale: Vec<MatchId> = self
            .inner
            .registry
            .snapshot_heartbeats()
            .into_iter()
            .filter(|(_, last)| now > last.saturating_add(timeout))
            .map(|(id, _)| id)
            .collect();
        for id in stale {
            tracing::warn!(%id, "heartbeat timeout, treating as child exit");
            ProcessExitSink::notify_finished(self.inner.as_ref(), id).await;
        }
    }

    /// §4.4 startup-time version probe. Returns `None` if the 30s ceiling
    /// elapses or the child exits before reporting a version.
    pub async fn check_version(&self, tail_port: u16) -> Option<String> {
        let (tx, rx) = oneshot::channel();
        self.inner.state.lock().probe_signal = Some(tx);

        let request = SpawnRequest {
            match_id: MatchId::null(),
            port: tail_port,
            beacon_port: None,
            data: serde_json::json!({ "args": ["-FunapiVersion"] }),
            max_uptime: Duration::from_secs(30),
        };
        if let Err(e) = self.inner.supervisor.spawn(request, self.exit_sink()).await {
            tracing::error!(error = %e, "version probe spawn failed");
            return None;
        }

        match tokio::time::timeout(Duration::from_secs(30), rx).await {
            Ok(Ok(version)) => version,
            _ => None,
        }
    }

    /// Child's `/server/version/` callback. Fails once a version has
    /// already been set (first caller wins).
    pub fn set_version(&self, version: String) -> Result<(), EngineError> {
        let sender = self.inner.state.lock().probe_signal.take();
        match sender {
            Some(tx) => {
                self.inner.publisher.set_server_version(version.clone());
                let _ = tx.send(Some(version));
                self.inner.publisher.publish_host_state_soon();
                Ok(())
            }
            None => Err(EngineError::InvalidRequest("version already set".to_string())),
        }
    }
}

#[async_trait]
impl<S, R, C, K> ProcessExitSink for EngineInner<S, R, C, K>
where
    S: ProcessSupervisor,
    R: dsh_adapters::RegistryClient,
    C: Send + Sync + 'static,
    K: Clock,
{
    /// §4.2 `notify_finished`: terminal callback from the supervisor. For
    /// the version-probe sentinel, releases the probe signal only. For a
    /// real match, returns the port to the pool, deletes the record and any
    /// pending batches (releasing their signals with "still buffered"
    /// semantics so no task is left blocked), tells the registry client to
    /// drop the match's published state, and republishes host state.
    async fn notify_finished(&self, match_id: MatchId) {
        if match_id.is_null() {
            if let Some(tx) = self.state.lock().probe_signal.take() {
                let _ = tx.send(None);
            }
            return;
        }

        let drained = self.registry.drain_batches(&match_id);
        if let Some((_, _, signals)) = drained {
            for signal in signals {
                let _ = signal.send(());
            }
        }

        if self.registry.remove(&match_id) {
            self.publisher.delete_match_soon(match_id.clone());
            self.publisher.publish_host_state_soon();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dsh_adapters::registry_client::FakeRegistryClient;
    use dsh_adapters::supervisor::FakeProcessSupervisor;
    use dsh_core::{FakeClock, PortPool};

    type TestEngine = Engine<FakeProcessSupervisor, FakeRegistryClient, (), FakeClock>;

    fn build(max_matches: usize) -> (TestEngine, FakeProcessSupervisor) {
        let registry = Arc::new(MatchRegistry::new(PortPool::new(7000, 4, false), max_matches));
        let supervisor = FakeProcessSupervisor::new();
        let clock = FakeClock::new(1_000);
        let publisher = StatePublisher::new(
            Arc::clone(&registry),
            FakeRegistryClient::new(),
            crate::publisher::HostStaticInfo {
                server_id: "host-1".to_string(),
                public_ip: "10.0.0.1".to_string(),
                instance_id: "i-1".to_string(),
                region: "us".to_string(),
                max_matches,
            },
            clock.clone(),
        );
        let engine: TestEngine = Engine::new(
            registry,
            supervisor.clone(),
            publisher,
            clock,
            EngineConfig {
                rest_port: 9000,
                max_ds_uptime_seconds: 0,
                heartbeat_interval: Duration::from_secs(10),
            },
        );
        (engine, supervisor)
    }

    #[tokio::test]
    async fn create_match_reserves_a_port_and_spawns() {
        let (engine, supervisor) = build(4);
        let result = engine
            .create_match(
                MatchId::new("m1"),
                "203.0.113.1".parse().unwrap(),
                serde_json::json!({ "port": 5000 }),
            )
            .await
            .expect("create_match should succeed");

        assert_eq!(result.port, 7000);
        let calls = supervisor.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].match_id, MatchId::new("m1"));
        // the caller-supplied port is overwritten with the agent's rest_port
        // before the data blob is handed to the supervisor
        assert_eq!(calls[0].data.get("port").unwrap(), &serde_json::json!(9000));
    }

    #[tokio::test]
    async fn duplicate_create_match_is_rejected() {
        let (engine, _supervisor) = build(4);
        engine
            .create_match(MatchId::new("m1"), "203.0.113.1".parse().unwrap(), serde_json::json!({}))
            .await
            .unwrap();

        let second = engine
            .create_match(MatchId::new("m1"), "203.0.113.1".parse().unwrap(), serde_json::json!({}))
            .await;
        assert!(matches!(second, Err(EngineError::AlreadyCreated)));
    }

    #[tokio::test]
    async fn create_match_past_capacity_is_rejected_and_releases_no_port() {
        let (engine, _supervisor) = build(1);
        engine
            .create_match(MatchId::new("m1"), "203.0.113.1".parse().unwrap(), serde_json::json!({}))
            .await
            .unwrap();

        let second = engine
            .create_match(MatchId::new("m2"), "203.0.113.1".parse().unwrap(), serde_json::json!({}))
            .await;
        assert!(matches!(second, Err(EngineError::CapacityExceeded)));
    }

    #[tokio::test]
    async fn spawn_failure_rolls_back_the_reservation() {
        let (engine, supervisor) = build(4);
        supervisor.fail_next_spawn();

        let result = engine
            .create_match(MatchId::new("m1"), "203.0.113.1".parse().unwrap(), serde_json::json!({}))
            .await;
        assert!(matches!(result, Err(EngineError::SpawnFailure(_))));

        // the reservation was rolled back, so a retry with the same id succeeds
        let retried = engine
            .create_match(MatchId::new("m1"), "203.0.113.1".parse().unwrap(), serde_json::json!({}))
            .await;
        assert!(retried.is_ok());
    }

    #[tokio::test]
    async fn notify_ready_fires_the_ready_signal_exactly_once() {
        let (engine, _supervisor) = build(4);
        let result = engine
            .create_match(MatchId::new("m1"), "203.0.113.1".parse().unwrap(), serde_json::json!({}))
            .await
            .unwrap();

        engine.notify_ready(&MatchId::new("m1"));
        result.ready.await.expect("ready signal should fire");

        // a second notify_ready on an already-ready match is a no-op, not a panic
        engine.notify_ready(&MatchId::new("m1"));
    }

    #[tokio::test]
    async fn add_user_normalizes_missing_user_data_and_drains_in_order() {
        let (engine, _supervisor) = build(4);
        engine
            .create_match(MatchId::new("m1"), "203.0.113.1".parse().unwrap(), serde_json::json!({}))
            .await
            .unwrap();

        let mut completion = engine
            .add_user(
                &MatchId::new("m1"),
                vec![UserId::new("u1"), UserId::new("u2")],
                vec![Some(serde_json::json!({"team": 1})), None],
                serde_json::json!({}),
            )
            .unwrap();

        assert!(completion.try_recv().is_err());

        let (users, _match_data) = engine.get_pending_users(&MatchId::new("m1")).unwrap();
        assert_eq!(users.len(), 2);
        assert_eq!(users[0].0, UserId::new("u1"));
        assert_eq!(users[1].1, serde_json::json!({}));
        completion.try_recv().expect("draining releases the batch's completion signal");
    }

    #[tokio::test]
    async fn add_user_on_unknown_match_is_rejected() {
        let (engine, _supervisor) = build(4);
        let result = engine.add_user(&MatchId::new("ghost"), vec![], vec![], serde_json::json!({}));
        assert!(matches!(result, Err(EngineError::MatchNotFound)));
    }

    #[tokio::test]
    async fn sweep_stale_heartbeats_removes_only_matches_past_the_threshold() {
        let (engine, _supervisor) = build(4);
        engine
            .create_match(MatchId::new("stale"), "203.0.113.1".parse().unwrap(), serde_json::json!({}))
            .await
            .unwrap();
        engine
            .create_match(MatchId::new("fresh"), "203.0.113.1".parse().unwrap(), serde_json::json!({}))
            .await
            .unwrap();

        engine.heartbeat(&MatchId::new("stale"));
        engine.heartbeat(&MatchId::new("fresh"));

        // heartbeat_interval is 10s, so the stale threshold is 25s
        engine.inner.clock.advance(26);
        engine.heartbeat(&MatchId::new("fresh"));

        engine.sweep_stale_heartbeats().await;

        assert!(!engine.registry().contains(&MatchId::new("stale")));
        assert!(engine.registry().contains(&MatchId::new("fresh")));
    }

    #[tokio::test]
    async fn check_version_returns_none_if_the_probe_never_reports() {
        let (engine, supervisor) = build(4);
        supervisor.fail_next_spawn();
        let version = engine.check_version(7100).await;
        assert!(version.is_none());
    }

    #[tokio::test]
    async fn set_version_is_idempotent_once() {
        let (engine, _supervisor) = build(4);
        // drive the probe signal in directly, bypassing the 30s-bounded wait
        {
            let (tx, _rx) = oneshot::channel();
            engine.inner.state.lock().probe_signal = Some(tx);
        }
        engine.set_version("1.2.3".to_string()).unwrap();
        assert_eq!(engine.server_version(), Some("1.2.3".to_string()));

        let second = engine.set_version("9.9.9".to_string());
        assert!(matches!(second, Err(EngineError::InvalidRequest(_))));
    }
}
