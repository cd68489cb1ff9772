//! HTTP server initialization and routing

use axum::routing::get;
use axum::Router;
use log::info;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::configure_auth_routes;
use crate::chat::configure_chat_routes;
use crate::directory::configure_directory_routes;
use crate::events::configure_events_routes;
use crate::finance::api::configure_finance_routes;
use crate::meetings::configure_meeting_routes;
use crate::permissions::configure_permission_routes;
use crate::shared::state::AppState;

use super::{health_check, health_check_simple, shutdown_signal};

pub fn build_router(app_state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check_simple))
        .route("/api/health", get(health_check))
        .merge(configure_auth_routes())
        .merge(configure_directory_routes())
        .merge(configure_permission_routes())
        .merge(configure_finance_routes())
        .merge(configure_meeting_routes())
        .merge(configure_chat_routes())
        .merge(configure_events_routes())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app_state)
}

pub async fn run_server(app_state: Arc<AppState>) -> std::io::Result<()> {
    let host = app_state.config.server.host.clone();
    let port = app_state.config.server.port;
    let app = build_router(app_state);

    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, format!("{e}")))?;

    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        std::io::Error::new(
            e.kind(),
            format!("Failed to bind to {addr}: {e} - is another instance running?"),
        )
    })?;

    info!("Listening on {addr}");
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
}
