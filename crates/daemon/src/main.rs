// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dedicated Server Host daemon (dshd).
//!
//! Spawns and supervises dedicated-server child processes on this machine,
//! mediates the REST protocol between them and the matchmaking backend, and
//! publishes host/match state to the configured registry.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

use std::net::SocketAddr;
use std::sync::Arc;

use dsh_core::Config;
use dsh_daemon::{build_router, AppState};
use dsh_engine::spawn_heartbeat_monitor;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let log_guard = setup_logging(&config)?;

    info!(
        engine_type = ?config.engine_type,
        registry_backend = ?config.registry_backend,
        "starting dedicated-server host agent"
    );

    let wired = dsh_daemon::wiring::build(&config).await?;
    let dsh_daemon::wiring::Wired {
        engine,
        callback_router,
        publisher,
    } = wired;

    // Startup version probe: spawn a throwaway instance with
    // `-FunapiVersion` and wait (bounded at 30s) for it to report back via
    // `/server/version/`. Host state is never published before this
    // completes.
    match engine.registry().tail_port() {
        Some(tail_port) => match engine.check_version(tail_port).await {
            Some(version) => info!(version, "dedicated server version detected"),
            None => {
                error!("failed to determine dedicated server version within 30s, exiting");
                drop(log_guard);
                std::process::exit(0);
            }
        },
        None => {
            error!("no free port available for the version probe, exiting");
            drop(log_guard);
            std::process::exit(0);
        }
    }

    let _heartbeat_monitor = spawn_heartbeat_monitor(engine.clone(), config.heartbeat_interval);
    tokio::spawn(publisher.run());

    let state = Arc::new(AppState {
        engine,
        callback_router,
        public_ip: config.rest_ip.to_string(),
        backend_bearer_token: config.backend_bearer_token.clone(),
        request_timeout: config.request_timeout,
    });

    let app = build_router(state);
    let addr = SocketAddr::new(config.rest_ip, config.rest_port);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "listening");

    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    );

    if let Err(e) = server.with_graceful_shutdown(shutdown_signal()).await {
        error!(error = %e, "server exited with error");
    }

    info!("daemon stopped");
    drop(log_guard);
    Ok(())
}

async fn shutdown_signal() {
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "failed to install SIGTERM handler");
            return;
        }
    };
    let mut sigint = match signal(SignalKind::interrupt()) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "failed to install SIGINT handler");
            return;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
        _ = sigint.recv() => info!("received SIGINT, shutting down"),
    }
}

fn setup_logging(
    config: &Config,
) -> Result<tracing_appender::non_blocking::WorkerGuard, Box<dyn std::error::Error>> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    if let Some(parent) = config.log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let file_appender = tracing_appender::rolling::never(
        config.log_path.parent().unwrap_or_else(|| std::path::Path::new(".")),
        config.log_path.file_name().ok_or("invalid log path")?,
    );
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let default_level = if config.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(non_blocking))
        .init();

    Ok(guard)
}
