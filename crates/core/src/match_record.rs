// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Match and host records held in the in-memory registry.

use crate::id::{MatchId, UserId};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use tokio::sync::oneshot;

/// Lifecycle state of a match, per the `absent -> Reserved -> Spawned -> Ready
/// -> Running -> Terminating -> absent` state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchState {
    /// Port reserved, child process not spawned yet.
    Reserved,
    /// `spawn` has returned a pid; waiting for the child to report ready.
    Spawned,
    /// The child called back to report it is ready to accept players.
    Ready,
    /// At least one heartbeat has been observed since becoming ready.
    Running,
    /// A kill has been issued (uptime cap or external request); awaiting exit.
    Terminating,
}

/// The remote address and port a `create_match` caller reported as its own,
/// used as the base for child->backend callback URLs when no global
/// `engine_url` is configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Origin {
    pub host: IpAddr,
    pub port: u16,
}

/// One buffered `add_user` call: the users it carries and the signal that
/// fires once `get_pending_users` drains the batch.
pub struct PendingBatch {
    pub users: Vec<(UserId, serde_json::Value)>,
    pub match_data: serde_json::Value,
    pub completion: oneshot::Sender<()>,
}

/// Everything the engine knows about one match.
pub struct MatchRecord {
    pub id: MatchId,
    pub data: serde_json::Value,
    pub origin: Option<Origin>,
    pub port: u16,
    pub beacon_port: Option<u16>,
    pub pid: Option<u32>,
    pub created: u64,
    pub last_heartbeat: Option<u64>,
    pub state: MatchState,
    pub ready_signal: Option<oneshot::Sender<()>>,
    pub pending: Vec<PendingBatch>,
}

impl MatchRecord {
    pub fn new(id: MatchId, data: serde_json::Value, port: u16, created: u64) -> Self {
        Self {
            id,
            data,
            origin: None,
            port,
            beacon_port: None,
            pid: None,
            created,
            last_heartbeat: None,
            state: MatchState::Reserved,
            ready_signal: None,
            pending: Vec::new(),
        }
    }
}

/// One match's entry in a published [`HostRecord`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MatchInstanceInfo {
    pub pid: Option<u32>,
    pub port: u16,
    pub beacon_port: Option<u16>,
}

/// Snapshot of a host, published to the external registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostRecord {
    pub server_id: String,
    pub matches: std::collections::HashMap<MatchId, MatchInstanceInfo>,
    pub max_matches: usize,
    pub ts: u64,
    pub public_ip: String,
    pub server_version: Option<String>,
    pub instance_id: String,
    pub region: String,
}
