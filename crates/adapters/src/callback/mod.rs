// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Outbound HTTP transport used for backend callbacks (`user_joined`,
//! `user_left`, `match_result`, `engine_callback`). Base-URL resolution
//! (global `engine_url` vs. per-match origin, including the documented
//! fallback to an arbitrary other match's origin) is the lifecycle engine's
//! concern — see `dsh_engine::callback` — this module is purely the
//! transport that posts a resolved URL.

#[cfg(any(test, feature = "test-support"))]
pub mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeEngineCallbackClient;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CallbackError {
    #[error("backend unreachable: {0}")]
    Unreachable(#[from] reqwest::Error),
}

/// Posts a JSON body to a fully-resolved backend URL, attaching the
/// registry client's auth header when present.
#[async_trait]
pub trait EngineCallbackClient: Send + Sync + 'static {
    async fn post_json(
        &self,
        url: &str,
        auth_header: Option<(String, String)>,
        body: serde_json::Value,
    ) -> Result<(), CallbackError>;
}

pub struct HttpEngineCallbackClient {
    http: reqwest::Client,
}

impl Default for HttpEngineCallbackClient {
    fn default() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }
}

impl HttpEngineCallbackClient {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EngineCallbackClient for HttpEngineCallbackClient {
    async fn post_json(
        &self,
        url: &str,
        auth_header: Option<(String, String)>,
        body: serde_json::Value,
    ) -> Result<(), CallbackError> {
        let mut request = self.http.post(url).json(&body);
        if let Some((name, value)) = auth_header {
            request = request.header(name, value);
        }
        request.send().await?.error_for_status()?;
        Ok(())
    }
}
