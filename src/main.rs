// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::net::SocketAddr;
use std::process::ExitCode;
use std::time::Duration;

use axum_server::{tls_rustls::RustlsConfig, Handle};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use tenant_session_server::{
    api::router,
    config::AppConfig,
    logging::{self, LogFormat},
    state::{AppState, StartupError},
};

/// Time in-flight requests get to finish after a shutdown signal.
const GRACE_PERIOD: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            logging::init(LogFormat::from_env_value(
                std::env::var("LOG_FORMAT").ok().as_deref(),
            ));
            error!(error = %e, "Invalid configuration");
            return ExitCode::FAILURE;
        }
    };
    logging::init(config.log_format);

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Server failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: AppConfig) -> Result<(), StartupError> {
    // Ring provider for rustls; a second install is a no-op
    let _ = rustls::crypto::ring::default_provider().install_default();

    let (state, tasks) = AppState::from_config(&config)?;
    info!(
        tenants = state.tenants.len(),
        data_dir = %config.data_dir.display(),
        "Application state ready"
    );

    let shutdown = CancellationToken::new();
    let sweeper = tokio::spawn(tasks.sweeper.run(shutdown.clone()));
    let refresher = tokio::spawn(tasks.refresher.run(shutdown.clone()));
    let persist = tokio::spawn(tasks.persist.run(shutdown.clone()));

    let addr: SocketAddr = config
        .bind_address()
        .parse()
        .map_err(|e| StartupError::Bind(format!("{}: {e}", config.bind_address())))?;

    let handle = Handle::new();
    tokio::spawn(watch_signals(handle.clone(), shutdown.clone()));

    let app = router(state).into_make_service_with_connect_info::<SocketAddr>();
    let served = match &config.tls {
        Some(tls) => {
            let rustls = RustlsConfig::from_pem_file(&tls.cert, &tls.key).await?;
            info!("Listening on https://{addr} (docs at /docs)");
            axum_server::bind_rustls(addr, rustls)
                .handle(handle)
                .serve(app)
                .await
        }
        None => {
            info!("Listening on http://{addr} (docs at /docs)");
            axum_server::bind(addr).handle(handle).serve(app).await
        }
    };

    // Server stopped on its own; make sure the tasks follow
    shutdown.cancel();
    for (name, task) in [("sweeper", sweeper), ("jwks", refresher), ("persist", persist)] {
        if let Err(e) = task.await {
            warn!(task = name, error = %e, "Background task ended abnormally");
        }
    }
    info!("Shutdown complete");

    served.map_err(StartupError::from)
}

/// Wait for Ctrl-C or SIGTERM, then stop accepting connections and cancel
/// the background tasks.
async fn watch_signals(handle: Handle<SocketAddr>, shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Ctrl-C handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
        _ = shutdown.cancelled() => {},
    }

    info!("Shutdown signal received");
    handle.graceful_shutdown(Some(GRACE_PERIOD));
    shutdown.cancel();
}
