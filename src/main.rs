// Agora - discussion feed server

use axum::Router;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;

use agora::{app_state::AppState, config::Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize application state
    let app_state = AppState::new(config.clone()).await?;

    // Build main application router
    let feed_router = agora::api::create_feed_router(app_state.feed_api.clone());
    let app = Router::new()
        .nest("/api/v1", feed_router)
        .layer(CorsLayer::permissive());

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Agora feed server listening on http://{}", addr);
    tracing::info!("  GET /api/v1/feed/{{viewer_id}}                       - Materialized public feed");
    tracing::info!("  GET /api/v1/nodes/{{node_id}}/comments/{{viewer_id}} - Comment subtree of a node");
    tracing::info!("  GET /api/v1/health                                 - Liveness check");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
