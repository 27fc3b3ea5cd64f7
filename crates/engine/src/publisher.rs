// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! State publisher: periodic host-state push, match-state push/delete, with
//! capped exponential backoff on registry-client failure, per `spec.md` §4.4.
//!
//! The registry client is treated as fail-soft throughout: every call in
//! this module retries until it succeeds and never returns an error to its
//! caller. `create_match`/`notify_finished` only ever *schedule* a publish
//! (`publish_host_state_soon`) — the retry loop runs on its own background
//! task so a slow or down registry never stalls match operations, matching
//! the mutex-scope discipline `spec.md` §9 calls out.

use dsh_adapters::RegistryClient;
use dsh_core::{Clock, HostRecord, MatchId, MatchInstanceInfo, MatchRegistry};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// Starting backoff delay; doubles on every failed attempt up to
/// [`MAX_BACKOFF`].
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(16);
/// Host-state is republished unconditionally on this cadence, in addition to
/// every mutation-triggered publish.
const PERIODIC_INTERVAL: Duration = Duration::from_secs(30);

/// Host identity fields that don't change once the agent starts, supplied by
/// `dsh_daemon` from `Config`.
#[derive(Debug, Clone)]
pub struct HostStaticInfo {
    pub server_id: String,
    pub public_ip: String,
    pub instance_id: String,
    pub region: String,
    pub max_matches: usize,
}

struct Inner<R> {
    registry: Arc<MatchRegistry>,
    client: R,
    info: HostStaticInfo,
    version: Mutex<Option<String>>,
    now: Box<dyn Fn() -> u64 + Send + Sync>,
    dirty: Notify,
}

/// Publishes host/match state to the pluggable registry client. Cheaply
/// `Clone`-able; the background loop started by [`StatePublisher::spawn`]
/// owns the only strong reference needed to keep running.
pub struct StatePublisher<R> {
    inner: Arc<Inner<R>>,
}

impl<R> Clone for StatePublisher<R> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<R: RegistryClient> StatePublisher<R> {
    pub fn new<K: Clock>(registry: Arc<MatchRegistry>, client: R, info: HostStaticInfo, clock: K) -> Self {
        Self {
            inner: Arc::new(Inner {
                registry,
                client,
                info,
                version: Mutex::new(None),
                now: Box::new(move || clock.now()),
                dirty: Notify::new(),
            }),
        }
    }

    /// Record the server version once `check_version`'s probe reports it.
    /// Host state is not published before this is called at least once, per
    /// `spec.md` §4.2.
    pub fn set_server_version(&self, version: String) {
        *self.inner.version.lock() = Some(version);
    }

    pub fn server_version(&self) -> Option<String> {
        self.inner.version.lock().clone()
    }

    /// Request a host-state publish. Coalesces with any publish already in
    /// flight or pending — cheap to call on every mutation.
    pub fn publish_host_state_soon(&self) {
        self.inner.dirty.notify_one();
    }

    /// Push `{svr_id, state}` for one match, retried in the background. The
    /// `svr_id` wrapper is added here so callers only ever hand over the raw
    /// state blob the child reported.
    pub fn publish_match_state_soon(&self, match_id: MatchId, state: serde_json::Value) {
        let inner = Arc::clone(&self.inner);
        let body = serde_json::json!({ "svr_id": inner.info.server_id, "state": state });
        tokio::spawn(async move {
            retry_with_backoff("match state publish", || {
                let inner = Arc::clone(&inner);
                let match_id = match_id.clone();
                let body = body.clone();
                async move { inner.client.put_match(&match_id, body).await }
            })
            .await;
        });
    }

    /// Remove a match's published state, retried in the background.
    pub fn delete_match_soon(&self, match_id: MatchId) {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            retry_with_backoff("match state delete", || {
                let inner = Arc::clone(&inner);
                let match_id = match_id.clone();
                async move { inner.client.delete_match(&match_id).await }
            })
            .await;
        });
    }

    /// Run the self-rescheduling host-state publish loop forever. Spawn this
    /// once from `dshd`'s `main` after the engine is constructed.
    pub async fn run(self) {
        loop {
            tokio::select! {
                _ = self.inner.dirty.notified() => {}
                _ = tokio::time::sleep(PERIODIC_INTERVAL) => {}
            }

            // No version yet: the host hasn't completed its startup probe,
            // so nothing is published (spec.md §4.2).
            if self.inner.version.lock().is_none() {
                continue;
            }

            let inner = Arc::clone(&self.inner);
            retry_with_backoff("host state publish", || {
                let inner = Arc::clone(&inner);
                async move {
                    let body = inner.snapshot_host_json();
                    inner.client.put_host(&inner.info.server_id, body).await
                }
            })
            .await;
        }
    }
}

impl<R> Inner<R> {
    fn snapshot_host_json(&self) -> serde_json::Value {
        let matches: HashMap<MatchId, MatchInstanceInfo> = self
            .registry
            .snapshot_instances()
            .into_iter()
            .map(|m| {
                (
                    m.id,
                    MatchInstanceInfo {
                        pid: m.pid,
                        port: m.port,
                        beacon_port: m.beacon_port,
                    },
                )
            })
            .collect();

        let record = HostRecord {
            server_id: self.info.server_id.clone(),
            matches,
            max_matches: self.info.max_matches,
            ts: (self.now)(),
            public_ip: self.info.public_ip.clone(),
            server_version: self.version.lock().clone(),
            instance_id: self.info.instance_id.clone(),
            region: self.info.region.clone(),
        };
        serde_json::to_value(record).unwrap_or(serde_json::Value::Null)
    }
}

/// Retry `op` with exponential backoff doubling from 1s to a 16s cap, never
/// giving up. Every attempt's error is logged at WARN.
async fn retry_with_backoff<F, Fut, E>(label: &'static str, mut op: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<(), E>>,
    E: std::fmt::Display,
{
    let mut delay = INITIAL_BACKOFF;
    loop {
        match op().await {
            Ok(()) => return,
            Err(e) => {
                tracing::warn!(operation = label, error = %e, delay_secs = delay.as_secs(), "registry client call failed, retrying");
                tokio::time::sleep(delay).await;
                delay = std::cmp::min(delay * 2, MAX_BACKOFF);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dsh_adapters::registry_client::FakeRegistryClient;
    use dsh_core::{FakeClock, PortPool};

    fn publisher() -> (StatePublisher<FakeRegistryClient>, FakeRegistryClient) {
        let registry = Arc::new(MatchRegistry::new(PortPool::new(7500, 4, false), 4));
        let client = FakeRegistryClient::new();
        let info = HostStaticInfo {
            server_id: "host-1".into(),
            public_ip: "203.0.113.1".into(),
            instance_id: "inst-1".into(),
            region: "us".into(),
            max_matches: 4,
        };
        let publisher = StatePublisher::new(Arc::clone(&registry), client.clone(), info, FakeClock::new(100));
        (publisher, client)
    }

    #[test]
    fn no_version_means_no_publish_body_built() {
        let (publisher, _client) = publisher();
        assert!(publisher.server_version().is_none());
    }

    #[test]
    fn set_server_version_is_readable_back() {
        let (publisher, _client) = publisher();
        publisher.set_server_version("1.2.3".to_string());
        assert_eq!(publisher.server_version(), Some("1.2.3".to_string()));
    }
}
