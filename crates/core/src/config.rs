// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Host agent configuration: environment variables with an optional
//! `toml` file overlay, mirroring the daemon's own `Config::load` pattern.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("missing required setting: {0}")]
    Missing(&'static str),
}

/// Which dedicated-server engine family this host spawns, selecting the
/// `ProcessSupervisor` argv convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineType {
    Unity,
    Ue4,
}

/// Registry backend to publish host/match state to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistryBackend {
    Redis,
    HttpOAuth,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Conformance {
    /// Preserve the original implementation's fallback to an arbitrary other
    /// match's origin when a callback target's origin is unknown.
    pub fallback_to_other_origin: bool,
}

impl Default for Conformance {
    fn default() -> Self {
        Self {
            fallback_to_other_origin: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub engine_type: EngineType,
    pub binary_path: PathBuf,
    pub run_as_unity_editor: bool,

    pub rest_ip: std::net::IpAddr,
    pub rest_port: u16,
    pub external_url: Option<String>,

    pub base_port: u16,
    pub port_pool_size: usize,
    pub use_beacon: bool,

    pub heartbeat_interval: Duration,
    pub max_matches: usize,
    pub max_ds_uptime_seconds: u64,
    /// Upper bound on how long a backend's `create_match`/`add_user` request
    /// waits on the child's ready/drain rendezvous before the HTTP layer
    /// gives up with a 504; the underlying wait itself is never cancelled
    /// (`spec.md` §5, `SPEC_FULL.md` §6).
    pub request_timeout: Duration,

    pub engine_url: Option<String>,
    pub region: String,
    pub instance_id: String,

    pub registry_backend: RegistryBackend,
    pub redis_url: Option<String>,
    pub oauth_client_id: Option<String>,
    pub oauth_client_secret: Option<String>,
    pub oauth_token_url: Option<String>,
    pub registry_base_url: Option<String>,

    pub backend_bearer_token: Option<String>,

    #[serde(default)]
    pub conformance: Conformance,

    pub log_path: PathBuf,
    pub verbose: bool,
}

impl Config {
    /// Load configuration from environment variables, with an optional
    /// `DSH_CONFIG_FILE` toml overlay for fields the environment doesn't set.
    pub fn load() -> Result<Self, ConfigError> {
        let mut overlay: toml::Value = toml::Value::Table(Default::default());
        if let Ok(path) = std::env::var("DSH_CONFIG_FILE") {
            let path = PathBuf::from(path);
            let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
                path: path.clone(),
                source,
            })?;
            overlay = toml::from_str(&text).map_err(|source| ConfigError::Parse { path, source })?;
        }

        let env_or_overlay = |key: &str| -> Option<String> {
            std::env::var(key).ok().or_else(|| {
                overlay
                    .get(key.to_ascii_lowercase())
                    .and_then(|v| v.as_str())
                    .map(|s| s.to_string())
            })
        };

        let engine_type = match env_or_overlay("DSH_ENGINE_TYPE").as_deref() {
            Some("ue4") => EngineType::Ue4,
            Some("unity") | None => EngineType::Unity,
            Some(other) => {
                tracing::warn!(engine_type = other, "unknown engine type, defaulting to unity");
                EngineType::Unity
            }
        };

        let registry_backend = match env_or_overlay("DSH_REGISTRY_BACKEND").as_deref() {
            Some("http_oauth") => RegistryBackend::HttpOAuth,
            Some("redis") | None => RegistryBackend::Redis,
            Some(other) => {
                tracing::warn!(backend = other, "unknown registry backend, defaulting to redis");
                RegistryBackend::Redis
            }
        };

        let binary_path = env_or_overlay("DSH_BINARY_PATH")
            .map(PathBuf::from)
            .ok_or(ConfigError::Missing("DSH_BINARY_PATH"))?;

        let rest_ip = env_or_overlay("DSH_REST_IP")
            .unwrap_or_else(|| "0.0.0.0".to_string())
            .parse()
            .unwrap_or(std::net::IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED));

        let rest_port: u16 = env_or_overlay("DSH_REST_PORT")
            .and_then(|s| s.parse().ok())
            .unwrap_or(8090);

        let base_port: u16 = env_or_overlay("DSH_BASE_PORT")
            .and_then(|s| s.parse().ok())
            .unwrap_or(7500);

        let port_pool_size: usize = env_or_overlay("DSH_PORT_POOL_SIZE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(500);

        let use_beacon = env_or_overlay("DSH_USE_BEACON")
            .map(|s| s == "1" || s.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        let heartbeat_interval = Duration::from_secs(
            env_or_overlay("DSH_HEARTBEAT_INTERVAL_SECS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),
        );

        let max_matches: usize = env_or_overlay("DSH_MAX_MATCHES")
            .and_then(|s| s.parse().ok())
            .unwrap_or(10);

        let max_ds_uptime_seconds: u64 = env_or_overlay("DSH_MAX_DS_UPTIME_SECONDS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);

        let request_timeout = Duration::from_secs(
            env_or_overlay("DSH_REQUEST_TIMEOUT_SECS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(60),
        );

        let log_path = env_or_overlay("DSH_LOG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("dshd.log"));

        let verbose = env_or_overlay("DSH_VERBOSE")
            .map(|s| s == "1" || s.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        let region = env_or_overlay("DSH_REGION").unwrap_or_else(|| "unknown".to_string());
        let instance_id =
            env_or_overlay("DSH_INSTANCE_ID").unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        Ok(Self {
            engine_type,
            binary_path,
            run_as_unity_editor: env_or_overlay("DSH_UNITY_EDITOR")
                .map(|s| s == "1" || s.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            rest_ip,
            rest_port,
            external_url: env_or_overlay("DSH_EXTERNAL_URL"),
            base_port,
            port_pool_size,
            use_beacon,
            heartbeat_interval,
            max_matches,
            max_ds_uptime_seconds,
            request_timeout,
            engine_url: env_or_overlay("DSH_ENGINE_URL"),
            region,
            instance_id,
            registry_backend,
            redis_url: env_or_overlay("DSH_REDIS_URL"),
            oauth_client_id: env_or_overlay("DSH_OAUTH_CLIENT_ID"),
            oauth_client_secret: env_or_overlay("DSH_OAUTH_CLIENT_SECRET"),
            oauth_token_url: env_or_overlay("DSH_OAUTH_TOKEN_URL"),
            registry_base_url: env_or_overlay("DSH_REGISTRY_BASE_URL"),
            backend_bearer_token: env_or_overlay("DSH_BACKEND_BEARER_TOKEN"),
            conformance: Conformance {
                fallback_to_other_origin: env_or_overlay("DSH_FALLBACK_TO_OTHER_ORIGIN")
                    .map(|s| s == "1" || s.eq_ignore_ascii_case("true"))
                    .unwrap_or_else(|| Conformance::default().fallback_to_other_origin),
            },
            log_path,
            verbose,
        })
    }

    /// `server_id` used when publishing host state: the configured external
    /// URL, or `http://{rest_ip}:{rest_port}`.
    pub fn server_id(&self) -> String {
        self.external_url
            .clone()
            .unwrap_or_else(|| format!("http://{}:{}", self.rest_ip, self.rest_port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_id_falls_back_to_rest_address() {
        let cfg = Config {
            engine_type: EngineType::Unity,
            binary_path: PathBuf::from("/bin/ds"),
            run_as_unity_editor: false,
            rest_ip: "127.0.0.1".parse().unwrap(),
            rest_port: 9000,
            external_url: None,
            base_port: 7500,
            port_pool_size: 10,
            use_beacon: false,
            heartbeat_interval: Duration::from_secs(10),
            max_matches: 5,
            max_ds_uptime_seconds: 0,
            request_timeout: Duration::from_secs(60),
            engine_url: None,
            region: "local".into(),
            instance_id: "inst".into(),
            registry_backend: RegistryBackend::Redis,
            redis_url: None,
            oauth_client_id: None,
            oauth_client_secret: None,
            oauth_token_url: None,
            registry_base_url: None,
            backend_bearer_token: None,
            conformance: Conformance::default(),
            log_path: PathBuf::from("x.log"),
            verbose: false,
        };
        assert_eq!(cfg.server_id(), "http://127.0.0.1:9000");
    }
}
