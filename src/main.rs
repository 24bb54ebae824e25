// PawFeed Server - social feed and live comment threads over HTTP

use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use pawfeed::{app_state::AppState, config::Config, social_interface::create_social_router};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pawfeed=info")),
        )
        .init();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize application state
    let app_state = AppState::new(config.clone()).await?;

    // Build main application router
    let app = Router::new()
        .nest("/api/v1", create_social_router(app_state.social.clone()))
        .layer(CorsLayer::permissive());

    // Start server
    let addr = config.server_address();
    info!("PawFeed server starting on http://{}", addr);
    info!("  GET    /api/v1/feed/{{user_id}}");
    info!("  POST   /api/v1/posts");
    info!("  GET    /api/v1/posts/{{post_id}}/comments?user_id=");
    info!("  POST   /api/v1/posts/{{post_id}}/comments");
    info!("  GET    /api/v1/posts/{{post_id}}/thread/stream?user_id=");
    info!("  POST   /api/v1/likes/toggle");
    info!("  POST   /api/v1/saves/toggle");

    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
