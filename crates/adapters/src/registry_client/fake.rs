// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake registry client for tests: records every call behind a mutex
//! instead of talking to a real store.

use super::{RegistryClient, RegistryError};
use async_trait::async_trait;
use dsh_core::MatchId;
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub enum RecordedCall {
    PutHost { server_id: String, body: serde_json::Value },
    PutMatch { match_id: MatchId, body: serde_json::Value },
    DeleteMatch { match_id: MatchId },
}

struct FakeState {
    calls: Vec<RecordedCall>,
    fail_next: bool,
}

#[derive(Clone)]
pub struct FakeRegistryClient {
    inner: Arc<Mutex<FakeState>>,
}

impl Default for FakeRegistryClient {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(FakeState {
                calls: Vec::new(),
                fail_next: false,
            })),
        }
    }
}

impl FakeRegistryClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.inner.lock().calls.clone()
    }

    pub fn fail_next_call(&self) {
        self.inner.lock().fail_next = true;
    }

    fn check_fail(&self) -> Result<(), RegistryError> {
        let mut state = self.inner.lock();
        if state.fail_next {
            state.fail_next = false;
            return Err(RegistryError::Auth("fake failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl RegistryClient for FakeRegistryClient {
    async fn put_host(&self, server_id: &str, body: serde_json::Value) -> Result<(), RegistryError> {
        self.check_fail()?;
        self.inner.lock().calls.push(RecordedCall::PutHost {
            server_id: server_id.to_string(),
            body,
        });
        Ok(())
    }

    async fn put_match(&self, match_id: &MatchId, body: serde_json::Value) -> Result<(), RegistryError> {
        self.check_fail()?;
        self.inner.lock().calls.push(RecordedCall::PutMatch {
            match_id: match_id.clone(),
            body,
        });
        Ok(())
    }

    async fn delete_match(&self, match_id: &MatchId) -> Result<(), RegistryError> {
        self.check_fail()?;
        self.inner.lock().calls.push(RecordedCall::DeleteMatch {
            match_id: match_id.clone(),
        });
        Ok(())
    }

    async fn auth_header(&self) -> Option<(String, String)> {
        None
    }
}
