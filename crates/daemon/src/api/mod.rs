// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP surface: two trust domains sharing one port, per `spec.md` §6 —
//! backend-facing routes behind a bearer token, child-facing routes
//! restricted to loopback callers.

mod child_routes;
mod match_routes;
mod version_route;

use axum::routing::{get, post};
use axum::{middleware, Router};
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;

use crate::auth::{require_backend_token, require_loopback};
use dsh_adapters::{EngineCallbackClient, ProcessSupervisor, RegistryClient};
use dsh_core::Clock;
use dsh_engine::{CallbackRouter, Engine, EngineError};

/// Shared application state, constructed once in `main` from
/// [`crate::wiring::build`] and held behind one `Arc` for the life of the
/// process. Generic over the same adapter choices `Engine` is, so tests can
/// build the router against fakes without touching the HTTP layer.
pub struct AppState<S, R, C, K> {
    pub engine: Engine<S, R, C, K>,
    pub callback_router: CallbackRouter<C, R>,
    /// Advertised to the backend as `host` in create/add_user responses and
    /// published as `public_ip` in host state.
    pub public_ip: String,
    /// `None` disables bearer-token enforcement (local/dev use).
    pub backend_bearer_token: Option<String>,
    /// How long `create_match`/`add_user` wait on the child's ready/drain
    /// rendezvous before responding `504`; the wait itself is not cancelled
    /// (`spec.md` §5).
    pub request_timeout: Duration,
}

pub fn build_router<S, R, C, K>(state: Arc<AppState<S, R, C, K>>) -> Router
where
    S: ProcessSupervisor,
    R: RegistryClient + Clone,
    C: EngineCallbackClient,
    K: Clock,
{
    let backend_routes = Router::new()
        .route(
            "/match/:id/",
            post(match_routes::create_match).put(match_routes::add_user),
        )
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            require_backend_token,
        ));

    let child_routes = Router::new()
        .route("/match/:id/", get(child_routes::get_match_data))
        .route("/match/:id/ready", post(child_routes::ready_match))
        .route("/match/:id/heartbeat/", post(child_routes::heartbeat))
        .route("/match/:id/state/", post(child_routes::report_state))
        .route("/match/:id/result/", post(child_routes::report_result))
        .route("/match/:id/callback/", post(child_routes::engine_callback))
        .route("/match/:id/joined/", post(child_routes::user_joined))
        .route("/match/:id/left/", post(child_routes::user_left))
        .route(
            "/match/:id/pending_users/",
            post(child_routes::pending_users),
        )
        .route("/server/version/", post(version_route::report_version))
        .route_layer(middleware::from_fn(require_loopback));

    Router::new()
        .route("/", get(|| async { "OK" }))
        .merge(backend_routes)
        .merge(child_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Shorthand every handler uses to surface an [`EngineError`] as its JSON
/// error response.
pub(crate) type HandlerResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::extract::ConnectInfo;
    use axum::http::{Request, StatusCode};
    use dsh_adapters::callback::FakeEngineCallbackClient;
    use dsh_adapters::registry_client::FakeRegistryClient;
    use dsh_adapters::supervisor::FakeProcessSupervisor;
    use dsh_core::{FakeClock, MatchId, MatchRegistry, PortPool};
    use dsh_engine::publisher::{HostStaticInfo, StatePublisher};
    use dsh_engine::EngineConfig;
    use http_body_util::BodyExt;
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};
    use std::time::Duration;
    use tower::ServiceExt;

    type TestEngine = Engine<FakeProcessSupervisor, FakeRegistryClient, FakeEngineCallbackClient, FakeClock>;
    type TestState = AppState<FakeProcessSupervisor, FakeRegistryClient, FakeEngineCallbackClient, FakeClock>;

    const LOOPBACK: SocketAddr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 40000);
    const REMOTE: SocketAddr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(203, 0, 113, 7)), 40000);

    fn test_state(backend_bearer_token: Option<String>) -> (Arc<TestState>, TestEngine) {
        let registry = Arc::new(MatchRegistry::new(PortPool::new(7500, 4, false), 4));
        let registry_client = FakeRegistryClient::new();
        let clock = FakeClock::new(1_000);
        let publisher = StatePublisher::new(
            Arc::clone(&registry),
            registry_client.clone(),
            HostStaticInfo {
                server_id: "host-1".into(),
                public_ip: "203.0.113.1".into(),
                instance_id: "inst-1".into(),
                region: "us".into(),
                max_matches: 4,
            },
            clock.clone(),
        );
        let callback_router = CallbackRouter::new(
            Arc::clone(&registry),
            FakeEngineCallbackClient::new(),
            registry_client,
            Some("http://backend.example".to_string()),
            false,
        );
        let engine = Engine::new(
            registry,
            FakeProcessSupervisor::new(),
            publisher,
            clock,
            EngineConfig {
                rest_port: 9000,
                max_ds_uptime_seconds: 0,
                heartbeat_interval: Duration::from_secs(10),
            },
        );
        let state = Arc::new(AppState {
            engine: engine.clone(),
            callback_router,
            public_ip: "203.0.113.1".to_string(),
            backend_bearer_token,
            request_timeout: Duration::from_secs(5),
        });
        (state, engine)
    }

    fn request(method: &str, uri: &str, addr: SocketAddr, body: serde_json::Value) -> Request<Body> {
        let mut req = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap();
        req.extensions_mut().insert(ConnectInfo(addr));
        req
    }

    async fn body_json(resp: axum::response::Response) -> serde_json::Value {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn root_route_reports_ok() {
        let (state, _engine) = test_state(None);
        let app = build_router(state);
        let resp = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn backend_route_without_token_is_rejected_when_configured() {
        let (state, _engine) = test_state(Some("s3cret".to_string()));
        let app = build_router(state);
        let resp = app
            .oneshot(request("POST", "/match/m1/", REMOTE, serde_json::json!({})))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn backend_route_with_valid_token_reaches_the_handler() {
        let (state, engine) = test_state(Some("s3cret".to_string()));
        // Reserve the id up front so the authenticated request fails fast on
        // `AlreadyCreated` instead of blocking on child readiness.
        let _existing = engine
            .create_match(MatchId::new("m1"), REMOTE.ip(), serde_json::json!({}))
            .await
            .unwrap();

        let mut req = request("POST", "/match/m1/", REMOTE, serde_json::json!({}));
        req.headers_mut()
            .insert("authorization", "Bearer s3cret".parse().unwrap());

        let app = build_router(state);
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(resp).await["error"], "match already created");
    }

    #[tokio::test]
    async fn child_route_rejects_non_loopback_caller() {
        let (state, _engine) = test_state(None);
        let app = build_router(state);
        let resp = app
            .oneshot(request("POST", "/match/m1/heartbeat/", REMOTE, serde_json::json!({})))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn heartbeat_from_loopback_ignores_unknown_match() {
        let (state, _engine) = test_state(None);
        let app = build_router(state);
        let resp = app
            .oneshot(request("POST", "/match/unknown/heartbeat/", LOOPBACK, serde_json::json!({})))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn get_match_data_promotes_match_and_user_data() {
        let (state, engine) = test_state(None);
        let id = MatchId::new("m1");
        engine
            .create_match(
                id.clone(),
                REMOTE.ip(),
                serde_json::json!({ "data": { "match_data": {"map": "dust"}, "user_data": {} } }),
            )
            .await
            .unwrap();

        let app = build_router(state);
        let resp = app
            .oneshot(Request::builder().uri("/match/m1/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["data"]["match_data"]["map"], "dust");
        assert!(body["data"].get("data").is_none());
    }

    #[tokio::test]
    async fn pending_users_drains_an_add_user_batch() {
        let (state, engine) = test_state(None);
        let id = MatchId::new("m1");
        engine.create_match(id.clone(), REMOTE.ip(), serde_json::json!({})).await.unwrap();
        let _completion = engine
            .add_user(
                &id,
                vec![dsh_core::UserId::new("u1")],
                vec![Some(serde_json::json!({"team": 1}))],
                serde_json::json!({"round": 2}),
            )
            .unwrap();

        let app = build_router(state);
        let resp = app
            .oneshot(request("POST", "/match/m1/pending_users/", LOOPBACK, serde_json::json!({})))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["status"], "OK");
        assert_eq!(body["users"][0], "u1");
        assert_eq!(body["match_data"][0]["round"], 2);
    }

    #[tokio::test]
    async fn engine_callback_posts_to_configured_backend_url() {
        let (state, _engine) = test_state(None);
        let app = build_router(state);
        let resp = app
            .oneshot(request(
                "POST",
                "/match/m1/callback/",
                LOOPBACK,
                serde_json::json!({"op": "score"}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn version_already_set_is_rejected() {
        let (state, _engine) = test_state(None);
        let app = build_router(state);
        let resp = app
            .oneshot(request(
                "POST",
                "/server/version/",
                LOOPBACK,
                serde_json::json!({"version": "1.2.3"}),
            ))
            .await
            .unwrap();
        // No startup probe ran, so the engine has no pending probe signal to
        // resolve; the route surfaces that as a 500.
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test(start_paused = true)]
    async fn create_match_times_out_if_child_never_reports_ready() {
        let (state, _engine) = test_state(None);
        let app = build_router(state);
        let req = request("POST", "/match/m1/", REMOTE, serde_json::json!({}));

        // Paused virtual time auto-advances past the pending
        // `request_timeout` once this request is the only outstanding work.
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::GATEWAY_TIMEOUT);
    }
}
