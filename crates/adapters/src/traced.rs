// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Traced adapter wrapper for consistent observability across registry
//! backends, the same decorator shape as the teacher's `TracedSession`.

use crate::registry_client::{RegistryClient, RegistryError};
use async_trait::async_trait;
use dsh_core::MatchId;
use tracing::Instrument;

/// Wraps any [`RegistryClient`], logging and spanning every call so the
/// fail-soft retry loop in the state publisher has something to log
/// against.
#[derive(Clone)]
pub struct TracedRegistryClient<R> {
    inner: R,
}

impl<R> TracedRegistryClient<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<R: RegistryClient> RegistryClient for TracedRegistryClient<R> {
    async fn put_host(&self, server_id: &str, body: serde_json::Value) -> Result<(), RegistryError> {
        async {
            let result = self.inner.put_host(server_id, body).await;
            match &result {
                Ok(()) => tracing::debug!("host state published"),
                Err(e) => tracing::warn!(error = %e, "host state publish failed"),
            }
            result
        }
        .instrument(tracing::info_span!("registry.put_host", server_id))
        .await
    }

    async fn put_match(&self, match_id: &MatchId, body: serde_json::Value) -> Result<(), RegistryError> {
        async {
            let result = self.inner.put_match(match_id, body).await;
            match &result {
                Ok(()) => tracing::debug!("match state published"),
                Err(e) => tracing::warn!(error = %e, "match state publish failed"),
            }
            result
        }
        .instrument(tracing::info_span!("registry.put_match", %match_id))
        .await
    }

    async fn delete_match(&self, match_id: &MatchId) -> Result<(), RegistryError> {
        async {
            let result = self.inner.delete_match(match_id).await;
            match &result {
                Ok(()) => tracing::debug!("match state deleted"),
                Err(e) => tracing::warn!(error = %e, "match state delete failed"),
            }
            result
        }
        .instrument(tracing::info_span!("registry.delete_match", %match_id))
        .await
    }

    async fn auth_header(&self) -> Option<(String, String)> {
        self.inner.auth_header().await
    }
}
