// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake process supervisor for lifecycle-engine tests: records spawn
//! requests and lets the test drive exit/ready notifications explicitly
//! instead of launching real child processes.

use super::{ProcessExitSink, ProcessSupervisor, SpawnRequest, SupervisorError};
use async_trait::async_trait;
use dsh_core::MatchId;
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct RecordedSpawn {
    pub match_id: MatchId,
    pub port: u16,
    pub beacon_port: Option<u16>,
    pub data: serde_json::Value,
}

struct FakeState {
    calls: Vec<RecordedSpawn>,
    next_pid: u32,
    fail_next: bool,
}

/// A [`ProcessSupervisor`] double. `spawn` succeeds synchronously with an
/// incrementing fake pid unless `fail_next` has been armed. The test drives
/// exit delivery itself via [`FakeProcessSupervisor::finish`].
#[derive(Clone)]
pub struct FakeProcessSupervisor {
    inner: Arc<Mutex<FakeState>>,
}

impl Default for FakeProcessSupervisor {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(FakeState {
                calls: Vec::new(),
                next_pid: 1,
                fail_next: false,
            })),
        }
    }
}

impl FakeProcessSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<RecordedSpawn> {
        self.inner.lock().calls.clone()
    }

    pub fn fail_next_spawn(&self) {
        self.inner.lock().fail_next = true;
    }

    /// Simulate the supervisor's exit watcher firing for `match_id`, as if
    /// the child had exited or been force-killed.
    pub async fn finish(&self, sink: &Arc<dyn ProcessExitSink>, match_id: MatchId) {
        sink.notify_finished(match_id).await;
    }
}

#[async_trait]
impl ProcessSupervisor for FakeProcessSupervisor {
    async fn spawn(
        &self,
        request: SpawnRequest,
        _exit_sink: Arc<dyn ProcessExitSink>,
    ) -> Result<u32, SupervisorError> {
        let mut state = self.inner.lock();
        if state.fail_next {
            state.fail_next = false;
            return Err(SupervisorError::Spawn(std::io::Error::other(
                "fake spawn failure",
            )));
        }
        let pid = state.next_pid;
        state.next_pid += 1;
        state.calls.push(RecordedSpawn {
            match_id: request.match_id,
            port: request.port,
            beacon_port: request.beacon_port,
            data: request.data,
        });
        Ok(pid)
    }
}
