//! Start the HTTP/WebSocket agent endpoint.

use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tracing::info;

use crate::agent::RagAgent;
use crate::config::Config;
use crate::server::{self, AppState};
use crate::session::SessionStore;

pub async fn run(host: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    let config = Config::new();

    let deps = super::build_agent_deps(&config, None)
        .await
        .context("failed to initialize agent dependencies")?;
    let agent = Arc::new(RagAgent::from_config(&config)?);
    let sessions = Arc::new(SessionStore::default());

    let state = AppState {
        agent,
        deps,
        sessions,
    };

    let host = host.unwrap_or_else(|| config.server_host.clone());
    let port = port.unwrap_or(config.server_port);
    let addr = format!("{}:{}", host, port);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Agent endpoint listening on {}", addr);

    axum::serve(listener, server::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Server stopped");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
