// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake engine callback client for tests.

use super::{CallbackError, EngineCallbackClient};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct RecordedPost {
    pub url: String,
    pub auth_header: Option<(String, String)>,
    pub body: serde_json::Value,
}

struct FakeState {
    calls: Vec<RecordedPost>,
}

#[derive(Clone)]
pub struct FakeEngineCallbackClient {
    inner: Arc<Mutex<FakeState>>,
}

impl Default for FakeEngineCallbackClient {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(FakeState { calls: Vec::new() })),
        }
    }
}

impl FakeEngineCallbackClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<RecordedPost> {
        self.inner.lock().calls.clone()
    }
}

#[async_trait]
impl EngineCallbackClient for FakeEngineCallbackClient {
    async fn post_json(
        &self,
        url: &str,
        auth_header: Option<(String, String)>,
        body: serde_json::Value,
    ) -> Result<(), CallbackError> {
        self.inner.lock().calls.push(RecordedPost {
            url: url.to_string(),
            auth_header,
            body,
        });
        Ok(())
    }
}
