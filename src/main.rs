mod auth;
mod config;
mod docs;
mod handlers;
mod models;
mod routes;
mod services;
mod ws;

use axum::http::HeaderValue;
use axum::Router;
use std::panic;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use config::Config;
use docs::ApiDoc;
use routes::api::{create_api_routes, create_ws_routes};
use ws::hub::CollabHub;

#[tokio::main(flavor = "current_thread")]
async fn main() {

    // Set panic hook for better error messages
    panic::set_hook(Box::new(|info| {
        eprintln!("PANIC: {info}");
    }));

    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            // Default to info level, but allow debug for our app
            "gradebook_live=debug,tower_http=debug,axum::rejection=trace,info".into()
        }))
        .init();

    info!("Starting server...");

    // Load configuration
    let config = Config::load().unwrap_or_else(|e| {
        error!("Failed to load configuration: {}", e);
        warn!("Using default configuration");
        Config::default()
    });
    config::init_config(config.clone());

    // Initialize the token cache for the auth boundary
    services::auth_service::init_token_cache();
    if config.auth_jwt_secret.is_none() {
        warn!("No JWT secret configured - all connections will be rejected");
    }

    // The one long-lived shared-state object; every handler gets this Arc
    let hub = Arc::new(CollabHub::new());

    // Spawn the idle-session sweeper
    let sweeper_hub = hub.clone();
    let sweep_interval = config.sweep_interval_secs;
    let idle_threshold = config.session_idle_secs;
    tokio::spawn(async move {
        ws::sweeper::run_idle_sweeper(sweeper_hub, sweep_interval, idle_threshold).await;
    });

    // CORS: explicit origin list when configured, permissive otherwise
    let cors = match &config.cors_origins {
        Some(origins) => {
            let origins: Vec<HeaderValue> = origins
                .split(',')
                .filter_map(|o| o.trim().parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(origins))
                .allow_methods(Any)
                .allow_headers(Any)
        }
        None => CorsLayer::permissive(),
    };

    // Combine all routes
    let app_routes = Router::new()
        // Mount API routes
        .nest("/api", create_api_routes(hub.clone()))
        // Mount WebSocket routes
        .merge(create_ws_routes(hub))
        // Mount Swagger UI
        .merge(SwaggerUi::new("/swagger").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // Add tracing layer
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    // Start the server
    let listener = tokio::net::TcpListener::bind(config.server_address())
        .await
        .unwrap_or_else(|_| panic!("Failed to bind to {}", config.server_address()));

    info!("🚀 Server running on http://{}", config.server_address());
    info!(
        "📡 Collaboration WebSocket at ws://{}/ws/collaboration/:assignment_id",
        config.server_address()
    );
    info!("📚 Swagger UI available at http://{}/swagger", config.server_address());

    axum::serve(listener, app_routes)
        .await
        .expect("Server failed to start");
}
