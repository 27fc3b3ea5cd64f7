// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! REST registry client authenticated via OAuth2 client-credentials,
//! grounded in `original_source/__init__.py`'s `StateApiProxy`.

use super::{RegistryClient, RegistryError};
use async_trait::async_trait;
use dsh_core::MatchId;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// How long before the token's reported expiry we proactively refresh it.
const REFRESH_SKEW: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

pub struct HttpOAuthRegistryClient {
    http: reqwest::Client,
    base_url: String,
    token_url: String,
    client_id: String,
    client_secret: String,
    token: Mutex<Option<CachedToken>>,
}

impl HttpOAuthRegistryClient {
    pub fn new(base_url: String, token_url: String, client_id: String, client_secret: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
            token_url,
            client_id,
            client_secret,
            token: Mutex::new(None),
        }
    }

    /// Returns the cached bearer token, refreshing it if unset, expired, or
    /// within [`REFRESH_SKEW`] of expiry. One retry on auth failure before
    /// the caller surfaces `RegistryUnavailable`.
    async fn token(&self) -> Result<String, RegistryError> {
        {
            let cached = self.token.lock().await;
            if let Some(cached) = cached.as_ref() {
                if cached.expires_at > Instant::now() {
                    return Ok(cached.value.clone());
                }
            }
        }
        match self.fetch_token().await {
            Ok(token) => Ok(token),
            Err(_) => self.fetch_token().await,
        }
    }

    async fn fetch_token(&self) -> Result<String, RegistryError> {
        let response = self
            .http
            .post(&self.token_url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ])
            .send()
            .await?
            .error_for_status()
            .map_err(|e| RegistryError::Auth(e.to_string()))?;

        let parsed: TokenResponse = response
            .json()
            .await
            .map_err(|e| RegistryError::Auth(e.to_string()))?;

        let expires_at = Instant::now()
            + Duration::from_secs(parsed.expires_in).saturating_sub(REFRESH_SKEW);
        let mut cached = self.token.lock().await;
        *cached = Some(CachedToken {
            value: parsed.access_token.clone(),
            expires_at,
        });
        Ok(parsed.access_token)
    }

    fn host_url(&self, server_id: &str) -> String {
        let mut url = match url::Url::parse(&self.base_url) {
            Ok(url) => url,
            Err(_) => return format!("{}/host/{}/", self.base_url.trim_end_matches('/'), server_id),
        };
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push("host").push(server_id).push("");
        }
        url.to_string()
    }

    fn match_url(&self, match_id: &MatchId) -> String {
        let mut url = match url::Url::parse(&self.base_url) {
            Ok(url) => url,
            Err(_) => {
                return format!(
                    "{}/match/{}/",
                    self.base_url.trim_end_matches('/'),
                    match_id
                )
            }
        };
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push("match").push(match_id.as_str()).push("");
        }
        url.to_string()
    }
}

#[async_trait]
impl RegistryClient for HttpOAuthRegistryClient {
    async fn put_host(&self, server_id: &str, body: serde_json::Value) -> Result<(), RegistryError> {
        let token = self.token().await?;
        self.http
            .post(self.host_url(server_id))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn put_match(&self, match_id: &MatchId, body: serde_json::Value) -> Result<(), RegistryError> {
        let token = self.token().await?;
        self.http
            .post(self.match_url(match_id))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn delete_match(&self, match_id: &MatchId) -> Result<(), RegistryError> {
        let token = self.token().await?;
        self.http
            .delete(self.match_url(match_id))
            .bearer_auth(token)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn auth_header(&self) -> Option<(String, String)> {
        let token = self.token().await.ok()?;
        Some(("Authorization".to_string(), format!("Bearer {token}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> HttpOAuthRegistryClient {
        HttpOAuthRegistryClient::new(
            "https://registry.example".to_string(),
            "https://auth.example/token".to_string(),
            "client-id".to_string(),
            "client-secret".to_string(),
        )
    }

    #[test]
    fn host_url_escapes_a_server_id_containing_a_slash() {
        let c = client();
        let url = c.host_url("http://10.0.0.5:8090");
        // A server id that is itself a URL (containing `/`) must not split
        // the resulting path into extra segments: the slashes are escaped.
        assert!(url.starts_with("https://registry.example/host/"));
        assert!(url.ends_with('/'));
        assert!(!url["https://registry.example/host/".len()..url.len() - 1].contains('/'));
    }

    #[test]
    fn match_url_is_scoped_under_match() {
        let c = client();
        assert_eq!(
            c.match_url(&MatchId::new("m1")),
            "https://registry.example/match/m1/"
        );
    }
}
