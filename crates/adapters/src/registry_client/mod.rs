// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Registry client: abstracts the key/value store vs. REST-with-OAuth
//! backing store the agent publishes host/match state to.

mod http_oauth;
mod redis_kv;

pub use http_oauth::HttpOAuthRegistryClient;
pub use redis_kv::RedisRegistryClient;

#[cfg(any(test, feature = "test-support"))]
pub mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeRegistryClient;

use async_trait::async_trait;
use dsh_core::MatchId;
use std::sync::Arc;
use thiserror::Error;

/// Hash key host state is published under, per `original_source`'s
/// `RedisStateProxy` / `StateApiProxy`.
pub const HOSTS_KEY: &str = "ife-dedi-hosts";
/// Hash key match state is published under.
pub const MATCHES_KEY: &str = "ife-dedi-matches";

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("http transport error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("oauth token request failed: {0}")]
    Auth(String),
}

/// Capability set a registry backend exposes to the state publisher:
/// `{put_host, put_match, delete_match, auth_header}`.
#[async_trait]
pub trait RegistryClient: Send + Sync + 'static {
    async fn put_host(&self, server_id: &str, body: serde_json::Value) -> Result<(), RegistryError>;
    async fn put_match(&self, match_id: &MatchId, body: serde_json::Value) -> Result<(), RegistryError>;
    async fn delete_match(&self, match_id: &MatchId) -> Result<(), RegistryError>;

    /// Authentication header to attach to outbound calls this client's
    /// backing store requires (none for the key/value backend). Async
    /// because the OAuth-backed implementation may need to refresh its
    /// cached token on demand.
    async fn auth_header(&self) -> Option<(String, String)>;
}

/// Lets a single non-`Clone` registry client be shared, e.g. between
/// `StatePublisher` and `CallbackRouter`, behind one `Arc`.
#[async_trait]
impl<T: RegistryClient + ?Sized> RegistryClient for Arc<T> {
    async fn put_host(&self, server_id: &str, body: serde_json::Value) -> Result<(), RegistryError> {
        (**self).put_host(server_id, body).await
    }

    async fn put_match(&self, match_id: &MatchId, body: serde_json::Value) -> Result<(), RegistryError> {
        (**self).put_match(match_id, body).await
    }

    async fn delete_match(&self, match_id: &MatchId) -> Result<(), RegistryError> {
        (**self).delete_match(match_id).await
    }

    async fn auth_header(&self) -> Option<(String, String)> {
        (**self).auth_header().await
    }
}
