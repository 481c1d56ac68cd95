//! HTTP server — the broker's wire surface.
//!
//! The router exposes the same operations as the in-process facade,
//! JSON in and out, behind a constant-time bearer check. `/health` is
//! the only unauthenticated route. SIGINT/SIGTERM shut the listener
//! down gracefully; running injector children are not signaled.

pub mod auth;
pub mod daemon;
pub mod handlers;
pub mod state;

pub use state::AppState;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::config::Config;
use crate::errors::{BrokerError, Result};
use crate::service::LocalBroker;

/// Assemble the route table around the shared state.
pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/secrets", get(handlers::list_secrets).post(handlers::add_secret))
        .route("/secrets/resolve/:ref_or_uuid", get(handlers::resolve_secret))
        .route(
            "/secrets/:uuid",
            get(handlers::get_secret).delete(handlers::remove_secret),
        )
        .route("/requests", post(handlers::create_request))
        .route("/grants/:request_id", get(handlers::validate_grant))
        .route("/inject", post(handlers::inject))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth::require_bearer,
        ));

    Router::new()
        .route("/health", get(handlers::health))
        .nest("/api", api)
        .fallback(handlers::not_found)
        .with_state(state)
}

/// Bind and serve until a shutdown signal arrives.
///
/// A missing `server.authToken` is a hard startup failure — the
/// protected surface must never come up open.
pub async fn run(config: Config) -> Result<()> {
    let token = config.server.auth_token.clone().ok_or_else(|| {
        BrokerError::ConfigError(
            "server.authToken must be configured before starting the server — run `2kc server token generate`"
                .into(),
        )
    })?;

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e| BrokerError::ConfigError(format!("server address: {e}")))?;

    let broker = Arc::new(LocalBroker::new(&config)?);
    let state = AppState::new(broker, token);

    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "broker server listening");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| {
            error!(error = %e, "server terminated unexpectedly");
            BrokerError::ServerError(e.to_string())
        })
}

/// Spin up a runtime and serve; the CLI entry point.
pub fn run_blocking(config: Config) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(run(config))
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
        info!("shutdown signal received");
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutdown signal received");
    }
}
