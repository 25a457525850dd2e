use std::net::SocketAddr;

use axum::middleware;
use crewline_core::api::AppContext;
use tokio::signal;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use uuid::Uuid;

use super::{
    middleware::{create_middleware_stack, request_logger},
    routes::create_router,
    AppState,
};
use crate::commands::cli::ServeArgs;
use crate::commands::engine_with_crews;
use crate::crews::load_crews_dir;
use crate::error::CliError;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    /// CLI flags win over the `[http_server]` config section.
    pub fn resolve(args: &ServeArgs, ctx: &AppContext) -> Self {
        let cfg = &ctx.cfg().http_server;
        Self {
            host: args.host.clone().unwrap_or_else(|| cfg.host.clone()),
            port: args.port.unwrap_or(cfg.port),
        }
    }
}

pub async fn handle_serve(args: ServeArgs, ctx: &AppContext) -> Result<i32, CliError> {
    let crews = match &args.crews_dir {
        Some(dir) => load_crews_dir(dir)?,
        None => Vec::new(),
    };
    let (_store, engine) = engine_with_crews(ctx, crews.clone()).await?;
    for crew in &crews {
        if let Err(e) = engine.validate_crew(crew) {
            warn!(crew_id = %crew.id, "crew will be rejected at trigger: {}", e);
        }
    }
    info!(crews = crews.len(), "crews loaded");

    let (shutdown_tx, _) = broadcast::channel(1);
    let state = AppState::new(Uuid::new_v4().to_string(), engine.clone(), shutdown_tx);

    let config = ServerConfig::resolve(&args, ctx);
    start_server(config, state)
        .await
        .map_err(|e| CliError::Command(e.to_string()))?;

    engine.shutdown().await;
    Ok(0)
}

pub async fn start_server(
    config: ServerConfig,
    state: AppState,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let app = create_router(state.clone())
        .layer(middleware::from_fn(request_logger))
        .layer(TraceLayer::new_for_http())
        .layer(create_middleware_stack());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(session_id = %state.session_id, "HTTP server listening on http://{}", addr);

    let mut shutdown_rx = state.shutdown_tx.subscribe();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = signal::ctrl_c() => {
                    info!("Received Ctrl+C signal");
                }
                _ = shutdown_rx.recv() => {
                    info!("Received shutdown signal from API");
                }
                _ = wait_for_sigterm() => {
                    info!("Received SIGTERM signal");
                }
            }
            info!("Starting graceful shutdown...");
        })
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_sigterm() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            warn!("SIGTERM handler unavailable: {}", e);
            std::future::pending::<()>().await
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_sigterm() {
    std::future::pending::<()>().await
}
