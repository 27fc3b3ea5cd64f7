// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory match registry.
//!
//! All mutation happens under a single lock and is synchronous; callers are
//! responsible for doing any I/O (spawning a process, calling out to the
//! registry client) outside the lock, using the values this module hands
//! back.

use crate::id::{MatchId, UserId};
use crate::match_record::{MatchRecord, MatchState, Origin, PendingBatch};
use crate::port_pool::PortPool;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::oneshot;

/// Failure reserving a new match slot.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ReserveError {
    #[error("match already exists")]
    AlreadyExists,
    #[error("no free ports")]
    Capacity,
}

/// A point-in-time, clonable view of one match, suitable for publishing to
/// the external registry without holding the lock.
#[derive(Debug, Clone)]
pub struct MatchSnapshot {
    pub id: MatchId,
    pub port: u16,
    pub beacon_port: Option<u16>,
    pub pid: Option<u32>,
    pub created: u64,
    pub last_heartbeat: Option<u64>,
    pub state: MatchState,
}

struct Inner {
    matches: std::collections::HashMap<MatchId, MatchRecord>,
    ports: PortPool,
    max_matches: usize,
}

/// Mutex-guarded in-memory store of match state and the port pool.
pub struct MatchRegistry {
    inner: Mutex<Inner>,
}

impl MatchRegistry {
    pub fn new(ports: PortPool, max_matches: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                matches: std::collections::HashMap::new(),
                ports,
                max_matches,
            }),
        }
    }

    /// The tail port of the pool, used for the version-probe spawn (never
    /// popped from the pool).
    pub fn tail_port(&self) -> Option<u16> {
        self.inner.lock().ports.tail_port()
    }

    /// Reserve a port and register a new match record in `Reserved` state.
    /// Returns the acquired port, beacon port (if any), and the one-shot
    /// receiver that fires when the child reports ready.
    #[allow(clippy::type_complexity)]
    pub fn reserve(
        &self,
        id: MatchId,
        data: serde_json::Value,
        created: u64,
    ) -> Result<(u16, Option<u16>, oneshot::Receiver<()>), ReserveError> {
        let mut inner = self.inner.lock();
        if inner.matches.contains_key(&id) {
            return Err(ReserveError::AlreadyExists);
        }
        if inner.matches.len() >= inner.max_matches {
            return Err(ReserveError::Capacity);
        }
        let (port, beacon_port) = inner.ports.acquire().ok_or(ReserveError::Capacity)?;
        let mut record = MatchRecord::new(id.clone(), data, port, created);
        record.beacon_port = beacon_port;
        let (tx, rx) = oneshot::channel();
        record.ready_signal = Some(tx);
        inner.matches.insert(id, record);
        Ok((port, beacon_port, rx))
    }

    /// Record the caller-supplied remote origin for a match (used for
    /// child->backend callback URL resolution when no global engine URL is
    /// configured).
    pub fn set_origin(&self, id: &MatchId, origin: Origin) {
        if let Some(record) = self.inner.lock().matches.get_mut(id) {
            record.origin = Some(origin);
        }
    }

    pub fn get_origin(&self, id: &MatchId) -> Option<Origin> {
        self.inner.lock().matches.get(id).and_then(|r| r.origin)
    }

    /// Fall back to an arbitrary other match's origin when the target match's
    /// origin is unknown. Preserves a documented fragile behavior of the
    /// original implementation; gated by the caller via a conformance flag.
    pub fn any_other_origin(&self, exclude: &MatchId) -> Option<Origin> {
        self.inner
            .lock()
            .matches
            .iter()
            .find(|(id, _)| *id != exclude)
            .and_then(|(_, r)| r.origin)
    }

    /// Record that `spawn` returned successfully with a pid.
    pub fn attach_instance(&self, id: &MatchId, pid: u32) -> bool {
        let mut inner = self.inner.lock();
        match inner.matches.get_mut(id) {
            Some(record) => {
                record.pid = Some(pid);
                record.state = MatchState::Spawned;
                true
            }
            None => false,
        }
    }

    /// Transition to `Ready` and take the ready signal to fire outside the
    /// lock. Also stamps the first heartbeat timestamp.
    pub fn mark_ready(&self, id: &MatchId, now: u64) -> Option<oneshot::Sender<()>> {
        let mut inner = self.inner.lock();
        let record = inner.matches.get_mut(id)?;
        record.state = MatchState::Ready;
        record.last_heartbeat = Some(now);
        record.ready_signal.take()
    }

    /// Update the last-heartbeat timestamp for a match; also promotes a
    /// `Ready` match to `Running` on its first heartbeat. Silently ignores
    /// unknown match ids.
    pub fn touch_heartbeat(&self, id: &MatchId, now: u64) -> bool {
        let mut inner = self.inner.lock();
        match inner.matches.get_mut(id) {
            Some(record) => {
                record.last_heartbeat = Some(now);
                if record.state == MatchState::Ready {
                    record.state = MatchState::Running;
                }
                true
            }
            None => false,
        }
    }

    pub fn mark_terminating(&self, id: &MatchId) -> bool {
        let mut inner = self.inner.lock();
        match inner.matches.get_mut(id) {
            Some(record) => {
                record.state = MatchState::Terminating;
                true
            }
            None => false,
        }
    }

    pub fn get_data(&self, id: &MatchId) -> Option<serde_json::Value> {
        self.inner.lock().matches.get(id).map(|r| r.data.clone())
    }

    /// Overwrite the stored `data` blob for a match, used by `create_match`
    /// once the agent's REST port and `created` timestamp have been folded
    /// into the caller-supplied payload.
    pub fn set_data(&self, id: &MatchId, data: serde_json::Value) -> bool {
        match self.inner.lock().matches.get_mut(id) {
            Some(record) => {
                record.data = data;
                true
            }
            None => false,
        }
    }

    pub fn get_port(&self, id: &MatchId) -> Option<u16> {
        self.inner.lock().matches.get(id).map(|r| r.port)
    }

    pub fn contains(&self, id: &MatchId) -> bool {
        self.inner.lock().matches.contains_key(id)
    }

    /// Snapshot every match that has sent at least one heartbeat, for the
    /// heartbeat-timeout monitor. Excludes the version-probe sentinel.
    pub fn snapshot_heartbeats(&self) -> Vec<(MatchId, u64)> {
        self.inner
            .lock()
            .matches
            .iter()
            .filter(|(id, _)| !id.is_null())
            .filter_map(|(id, r)| r.last_heartbeat.map(|hb| (id.clone(), hb)))
            .collect()
    }

    /// Snapshot all matches for publishing host state. Excludes the
    /// version-probe sentinel, matching the original implementation.
    pub fn snapshot_instances(&self) -> Vec<MatchSnapshot> {
        self.inner
            .lock()
            .matches
            .iter()
            .filter(|(id, _)| !id.is_null())
            .map(|(id, r)| MatchSnapshot {
                id: id.clone(),
                port: r.port,
                beacon_port: r.beacon_port,
                pid: r.pid,
                created: r.created,
                last_heartbeat: r.last_heartbeat,
                state: r.state,
            })
            .collect()
    }

    /// Remove a match and return its port to the pool. Returns `false` (and
    /// logs nothing itself — the caller logs) if the match was unknown.
    pub fn remove(&self, id: &MatchId) -> bool {
        let mut inner = self.inner.lock();
        match inner.matches.remove(id) {
            Some(record) => {
                inner.ports.release(record.port);
                true
            }
            None => false,
        }
    }

    /// Buffer a batch of late-joining users against a match. Returns `false`
    /// if the match is unknown.
    pub fn append_batch(
        &self,
        id: &MatchId,
        users: Vec<(UserId, serde_json::Value)>,
        match_data: serde_json::Value,
    ) -> Option<oneshot::Receiver<()>> {
        let mut inner = self.inner.lock();
        let record = inner.matches.get_mut(id)?;
        let (tx, rx) = oneshot::channel();
        record.pending.push(PendingBatch {
            users,
            match_data,
            completion: tx,
        });
        Some(rx)
    }

    /// Atomically drain every buffered batch for a match, in FIFO batch
    /// order with intra-batch order preserved. The caller fires the returned
    /// completion senders outside the lock.
    #[allow(clippy::type_complexity)]
    pub fn drain_batches(
        &self,
        id: &MatchId,
    ) -> Option<(
        Vec<(UserId, serde_json::Value)>,
        Vec<serde_json::Value>,
        Vec<oneshot::Sender<()>>,
    )> {
        let mut inner = self.inner.lock();
        let record = inner.matches.get_mut(id)?;
        if record.pending.is_empty() {
            return None;
        }
        let batches = std::mem::take(&mut record.pending);
        let mut users = Vec::new();
        let mut match_data = Vec::new();
        let mut signals = Vec::new();
        for batch in batches {
            users.extend(batch.users);
            match_data.push(batch.match_data);
            signals.push(batch.completion);
        }
        Some((users, match_data, signals))
    }
}
