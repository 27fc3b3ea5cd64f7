// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wires a [`Config`] into concrete adapter choices and constructs the
//! generic [`Engine`]/[`StatePublisher`]/[`CallbackRouter`] stack `main`
//! needs. Kept separate from `main.rs` so the selection logic (which
//! engine-argv convention, which registry backend) is unit-testable without
//! spinning up the HTTP server.

use async_trait::async_trait;
use dsh_adapters::registry_client::{HttpOAuthRegistryClient, RedisRegistryClient};
use dsh_adapters::supervisor::{SupervisorConfig, Ue4Spawner, UnitySpawner};
use dsh_adapters::traced::TracedRegistryClient;
use dsh_adapters::{ProcessExitSink, ProcessSupervisor, RegistryClient, RegistryError, SpawnRequest, SupervisorError};
use dsh_core::{Clock, Config, MatchId, MatchRegistry, PortPool, RegistryBackend, SystemClock};
use dsh_engine::publisher::HostStaticInfo;
use dsh_engine::{CallbackRouter, Engine, EngineConfig, StatePublisher};
use std::sync::Arc;
use thiserror::Error;

/// Dispatches to the engine-specific spawn strategy selected by
/// `Config::engine_type`. An enum rather than a trait object so `Engine` can
/// stay generic over `ProcessSupervisor` without `dyn`-compatibility games.
pub enum SpawnerChoice {
    Unity(UnitySpawner),
    Ue4(Ue4Spawner),
}

#[async_trait]
impl ProcessSupervisor for SpawnerChoice {
    async fn spawn(
        &self,
        request: SpawnRequest,
        exit_sink: Arc<dyn ProcessExitSink>,
    ) -> Result<u32, SupervisorError> {
        match self {
            Self::Unity(s) => s.spawn(request, exit_sink).await,
            Self::Ue4(s) => s.spawn(request, exit_sink).await,
        }
    }
}

/// Dispatches to the registry backend selected by `Config::registry_backend`.
pub enum RegistryChoice {
    Redis(RedisRegistryClient),
    HttpOAuth(HttpOAuthRegistryClient),
}

#[async_trait]
impl RegistryClient for RegistryChoice {
    async fn put_host(&self, server_id: &str, body: serde_json::Value) -> Result<(), RegistryError> {
        match self {
            Self::Redis(c) => c.put_host(server_id, body).await,
            Self::HttpOAuth(c) => c.put_host(server_id, body).await,
        }
    }

    async fn put_match(&self, match_id: &MatchId, body: serde_json::Value) -> Result<(), RegistryError> {
        match self {
            Self::Redis(c) => c.put_match(match_id, body).await,
            Self::HttpOAuth(c) => c.put_match(match_id, body).await,
        }
    }

    async fn delete_match(&self, match_id: &MatchId) -> Result<(), RegistryError> {
        match self {
            Self::Redis(c) => c.delete_match(match_id).await,
            Self::HttpOAuth(c) => c.delete_match(match_id).await,
        }
    }

    async fn auth_header(&self) -> Option<(String, String)> {
        match self {
            Self::Redis(c) => c.auth_header().await,
            Self::HttpOAuth(c) => c.auth_header().await,
        }
    }
}

#[derive(Debug, Error)]
pub enum WireError {
    #[error("missing required setting for redis backend: {0}")]
    MissingRedisSetting(&'static str),
    #[error("missing required setting for http_oauth backend: {0}")]
    MissingOAuthSetting(&'static str),
    #[error("failed to connect to redis: {0}")]
    Redis(#[from] RegistryError),
}

pub type DshSupervisor = SpawnerChoice;
pub type DshRegistryClient = Arc<TracedRegistryClient<RegistryChoice>>;
pub type DshEngine = Engine<DshSupervisor, DshRegistryClient, dsh_adapters::HttpEngineCallbackClient, SystemClock>;
pub type DshCallbackRouter = CallbackRouter<dsh_adapters::HttpEngineCallbackClient, DshRegistryClient>;
pub type DshPublisher = StatePublisher<DshRegistryClient>;

/// Everything `main` assembles once at startup and holds for the lifetime
/// of the process.
pub struct Wired {
    pub engine: DshEngine,
    pub callback_router: DshCallbackRouter,
    pub publisher: DshPublisher,
}

/// Build the spawner, registry client, registry, publisher, callback router
/// and engine from `config`. Fallible only on registry backend setup
/// (missing credentials, unreachable Redis).
pub async fn build(config: &Config) -> Result<Wired, WireError> {
    let spawner = build_spawner(config);
    let registry_client = Arc::new(TracedRegistryClient::new(build_registry_client(config).await?));
    let registry = Arc::new(MatchRegistry::new(
        PortPool::new(config.base_port, config.port_pool_size, config.use_beacon),
        config.max_matches,
    ));

    let info = HostStaticInfo {
        server_id: config.server_id(),
        public_ip: config.rest_ip.to_string(),
        instance_id: config.instance_id.clone(),
        region: config.region.clone(),
        max_matches: config.max_matches,
    };
    let publisher = StatePublisher::new(
        Arc::clone(&registry),
        Arc::clone(&registry_client),
        info,
        SystemClock,
    );

    let callback_router = CallbackRouter::new(
        Arc::clone(&registry),
        dsh_adapters::HttpEngineCallbackClient::new(),
        Arc::clone(&registry_client),
        config.engine_url.clone(),
        config.conformance.fallback_to_other_origin,
    );

    let engine = Engine::new(
        registry,
        spawner,
        publisher.clone(),
        SystemClock,
        EngineConfig {
            rest_port: config.rest_port,
            max_ds_uptime_seconds: config.max_ds_uptime_seconds,
            heartbeat_interval: config.heartbeat_interval,
        },
    );

    Ok(Wired {
        engine,
        callback_router,
        publisher,
    })
}

fn build_spawner(config: &Config) -> SpawnerChoice {
    let supervisor_config = SupervisorConfig {
        binary_path: config.binary_path.clone(),
        rest_port: config.rest_port,
        heartbeat_interval: config.heartbeat_interval,
        run_as_unity_editor: config.run_as_unity_editor,
    };
    match config.engine_type {
        dsh_core::EngineType::Unity => SpawnerChoice::Unity(UnitySpawner::new(supervisor_config)),
        dsh_core::EngineType::Ue4 => SpawnerChoice::Ue4(Ue4Spawner::new(supervisor_config)),
    }
}

async fn build_registry_client(config: &Config) -> Result<RegistryChoice, WireError> {
    match config.registry_backend {
        RegistryBackend::Redis => {
            let url = config
                .redis_url
                .clone()
                .ok_or(WireError::MissingRedisSetting("DSH_REDIS_URL"))?;
            let client = RedisRegistryClient::connect(&url).await?;
            Ok(RegistryChoice::Redis(client))
        }
        RegistryBackend::HttpOAuth => {
            let base_url = config
                .registry_base_url
                .clone()
                .ok_or(WireError::MissingOAuthSetting("DSH_REGISTRY_BASE_URL"))?;
            let token_url = config
                .oauth_token_url
                .clone()
                .ok_or(WireError::MissingOAuthSetting("DSH_OAUTH_TOKEN_URL"))?;
            let client_id = config
                .oauth_client_id
                .clone()
                .ok_or(WireError::MissingOAuthSetting("DSH_OAUTH_CLIENT_ID"))?;
            let client_secret = config
                .oauth_client_secret
                .clone()
                .ok_or(WireError::MissingOAuthSetting("DSH_OAUTH_CLIENT_SECRET"))?;
            Ok(RegistryChoice::HttpOAuth(HttpOAuthRegistryClient::new(
                base_url,
                token_url,
                client_id,
                client_secret,
            )))
        }
    }
}
