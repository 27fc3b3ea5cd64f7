// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine callback client: outbound HTTP to the game backend, per
//! `spec.md` §4.6. Resolves the base URL for a match (global `engine_url`
//! override, or the match's recorded `origin`) and posts one of the four
//! known operations.

use dsh_adapters::{CallbackError, EngineCallbackClient, RegistryClient};
use dsh_core::{MatchId, MatchRegistry, UserId};
use std::sync::Arc;

const SUFFIX_RESULT: &str = "result/";
const SUFFIX_CALLBACK: &str = "callback/";

/// Resolves per-match backend URLs and posts engine callbacks, attaching the
/// registry client's auth header when present.
pub struct CallbackRouter<C, R> {
    registry: Arc<MatchRegistry>,
    client: C,
    registry_client: R,
    engine_url: Option<String>,
    /// `spec.md` §9: fall back to an arbitrary other match's origin when the
    /// target's origin is unknown. Documented as almost certainly wrong;
    /// gated behind this conformance flag.
    fallback_to_other_origin: bool,
}

impl<C: EngineCallbackClient, R: RegistryClient> CallbackRouter<C, R> {
    pub fn new(
        registry: Arc<MatchRegistry>,
        client: C,
        registry_client: R,
        engine_url: Option<String>,
        fallback_to_other_origin: bool,
    ) -> Self {
        Self {
            registry,
            client,
            registry_client,
            engine_url,
            fallback_to_other_origin,
        }
    }

    /// `spec.md` §9: the uid is embedded in the path, not the body, and the
    /// trailing slash `user_joined` has is preserved verbatim even though
    /// `user_left` (below) lacks one.
    pub async fn user_joined(&self, match_id: &MatchId, uid: &UserId) -> Result<(), CallbackError> {
        let suffix = format!("user_joined/{uid}/");
        self.post(match_id, &suffix, serde_json::json!({})).await
    }

    /// Missing trailing slash preserved as-is; see `user_joined` above.
    pub async fn user_left(&self, match_id: &MatchId, uid: &UserId) -> Result<(), CallbackError> {
        let suffix = format!("user_left/{uid}");
        self.post(match_id, &suffix, serde_json::json!({})).await
    }

    pub async fn match_result(&self, match_id: &MatchId, body: serde_json::Value) -> Result<(), CallbackError> {
        self.post(match_id, SUFFIX_RESULT, body).await
    }

    pub async fn engine_callback(&self, match_id: &MatchId, body: serde_json::Value) -> Result<(), CallbackError> {
        self.post(match_id, SUFFIX_CALLBACK, body).await
    }

    async fn post(&self, match_id: &MatchId, suffix: &str, body: serde_json::Value) -> Result<(), CallbackError> {
        let url = self.resolve_url(match_id, suffix);
        let auth = self.registry_client.auth_header().await;
        self.client.post_json(&url, auth, body).await
    }

    fn resolve_url(&self, match_id: &MatchId, suffix: &str) -> String {
        if let Some(base) = &self.engine_url {
            return format!("{}/{}/{}", base.trim_end_matches('/'), match_id, suffix);
        }

        let origin = self.registry.get_origin(match_id).or_else(|| {
            self.fallback_to_other_origin
                .then(|| self.registry.any_other_origin(match_id))
                .flatten()
        });

        match origin {
            Some(origin) => format!(
                "http://{}:{}/v1/dedicated_server/{}/{}",
                origin.host, origin.port, match_id, suffix
            ),
            // No origin known at all (unknown match, no other matches either).
            // There is nothing sensible to send to; the caller logs the
            // resulting transport failure.
            None => format!("http://0.0.0.0:0/v1/dedicated_server/{match_id}/{suffix}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dsh_adapters::callback::FakeEngineCallbackClient;
    use dsh_adapters::registry_client::FakeRegistryClient;
    use dsh_core::{Origin, PortPool};

    fn router(engine_url: Option<String>, fallback: bool) -> (CallbackRouter<FakeEngineCallbackClient, FakeRegistryClient>, Arc<MatchRegistry>, FakeEngineCallbackClient) {
        let registry = Arc::new(MatchRegistry::new(PortPool::new(7500, 4, false), 4));
        let client = FakeEngineCallbackClient::new();
        let router = CallbackRouter::new(
            Arc::clone(&registry),
            client.clone(),
            FakeRegistryClient::new(),
            engine_url,
            fallback,
        );
        (router, registry, client)
    }

    #[tokio::test]
    async fn uses_global_engine_url_when_configured() {
        let (router, _registry, client) = router(Some("http://backend.example".to_string()), false);
        let id = MatchId::new("m1");
        router.user_joined(&id, &UserId::new("u1")).await.unwrap();
        assert_eq!(client.calls()[0].url, "http://backend.example/m1/user_joined/u1/");
    }

    #[tokio::test]
    async fn uses_match_origin_with_v1_path_when_no_global_url() {
        let (router, registry, client) = router(None, false);
        let id = MatchId::new("m1");
        registry.reserve(id.clone(), serde_json::json!({}), 0).unwrap();
        registry.set_origin(&id, Origin { host: "10.0.0.5".parse().unwrap(), port: 4000 });
        router.user_left(&id, &UserId::new("u1")).await.unwrap();
        // Preserves the missing trailing slash on `user_left`.
        assert_eq!(client.calls()[0].url, "http://10.0.0.5:4000/v1/dedicated_server/m1/user_left/u1");
    }

    #[tokio::test]
    async fn falls_back_to_other_origin_when_enabled() {
        let (router, registry, client) = router(None, true);
        let known = MatchId::new("known");
        registry.reserve(known.clone(), serde_json::json!({}), 0).unwrap();
        registry.set_origin(&known, Origin { host: "10.0.0.9".parse().unwrap(), port: 5000 });

        let unknown = MatchId::new("unknown");
        router.match_result(&unknown, serde_json::json!({"ok": true})).await.unwrap();
        assert_eq!(client.calls()[0].url, "http://10.0.0.9:5000/v1/dedicated_server/unknown/result/");
    }
}
