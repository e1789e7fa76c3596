//! Scoreboard sync binary entrypoint wiring the remote store, sync engine, REST and SSE layers.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod dao;
mod dto;
mod error;
mod routes;
mod services;
mod state;

use config::AppConfig;
use dao::{identity::Identity, remote_store::BackendKind};
use services::{sse_service, storage_supervisor};
use state::{AppState, SharedState, sync_engine::SyncEngine};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let backend = env::var("SCOREBOARD_BACKEND")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .map(|value| value.parse::<BackendKind>())
        .transpose()
        .map_err(anyhow::Error::msg)?
        .unwrap_or(BackendKind::Firebase);

    let store = dao::remote_store::connect(backend)
        .await
        .with_context(|| format!("configuring {backend} store"))?;
    let engine = SyncEngine::new(store, config.engine_settings());
    let app_state = AppState::new(engine.clone(), env::var("ADMIN_PASSWORD").ok());

    tokio::spawn(storage_supervisor::run(app_state.clone()));
    tokio::spawn(sse_service::forward_state_changes(app_state.clone()));
    tokio::spawn(auto_sign_in(engine.clone()));

    // Build the HTTP router once the shared state is ready.
    let app = build_router(app_state);

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, %backend, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    let service = app.into_make_service();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    engine.shutdown().await;
    Ok(())
}

/// Open a session at startup when `SCOREBOARD_AUTO_SIGN_IN` is set.
///
/// `anonymous` requests a fresh anonymous identity; any other value is used as
/// the uid, with `SCOREBOARD_TOKEN` as its bearer credential.
async fn auto_sign_in(engine: Arc<SyncEngine>) {
    let Some(mode) = env::var("SCOREBOARD_AUTO_SIGN_IN")
        .ok()
        .filter(|value| !value.trim().is_empty())
    else {
        return;
    };

    let identity = match mode.trim() {
        "anonymous" => None,
        uid => Some(Identity::new(uid, env::var("SCOREBOARD_TOKEN").ok())),
    };
    match engine.sign_in(identity).await {
        Ok(identity) => info!(uid = %identity.uid, "signed in at startup"),
        Err(err) => warn!(error = %err, "startup sign-in failed; waiting for POST /session"),
    }
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler; waiting for Ctrl+C");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
