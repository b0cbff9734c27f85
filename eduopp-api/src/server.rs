use anyhow::Result;
use axum::{
    extract::Extension,
    routing::{get, post},
    Router,
};
use eduopp_channels::ChannelRegistry;
use eduopp_core::AppContext;
use std::env;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tracing;

use crate::{handlers, webhooks};

pub async fn run(ctx: AppContext, channels: Arc<ChannelRegistry>) -> Result<()> {
    let port = ctx.config.server.port;

    // Allow specific origins when CORS_ORIGINS is set, permissive otherwise.
    let cors_layer = if let Ok(origins) = env::var("CORS_ORIGINS") {
        let mut cors = CorsLayer::new();
        for origin in origins.split(',').map(|s| s.trim()) {
            if let Ok(parsed) = origin.parse::<axum::http::HeaderValue>() {
                cors = cors.allow_origin(parsed);
            }
        }
        cors.allow_methods(Any).allow_headers(Any)
    } else {
        tracing::warn!("CORS_ORIGINS not set, using permissive CORS. Set CORS_ORIGINS for production!");
        CorsLayer::permissive()
    };

    let app = Router::new()
        .route("/health", get(handlers::health))
        .route("/api/v1/users", post(handlers::create_user))
        .route(
            "/api/v1/users/:id",
            get(handlers::get_user)
                .patch(handlers::update_user)
                .delete(handlers::delete_user),
        )
        .route(
            "/api/v1/users/:id/bindings",
            get(handlers::list_bindings).post(handlers::add_binding),
        )
        .route(
            "/api/v1/users/:id/preferences",
            get(handlers::get_preferences).put(handlers::put_preferences),
        )
        .route("/api/v1/users/:id/welcome", post(handlers::send_welcome))
        .route(
            "/api/v1/users/:id/recommendations",
            get(handlers::recommendations),
        )
        .route(
            "/api/v1/users/:id/deliveries",
            get(handlers::list_deliveries),
        )
        .route(
            "/api/v1/users/:id/deliveries/read",
            post(handlers::mark_deliveries_read),
        )
        .route(
            "/api/v1/opportunities",
            get(handlers::search_opportunities).post(handlers::create_opportunity),
        )
        .route(
            "/api/v1/opportunities/:id",
            get(handlers::get_opportunity)
                .patch(handlers::update_opportunity)
                .delete(handlers::delete_opportunity),
        )
        .route(
            "/api/v1/users/:id/opportunities",
            get(handlers::opportunities_by_creator),
        )
        .route(
            "/api/v1/opportunities/:id/subscribers",
            get(handlers::opportunity_subscribers),
        )
        .route("/api/v1/opportunities/:id/subscribe", post(handlers::subscribe))
        .route(
            "/api/v1/opportunities/:id/unsubscribe",
            post(handlers::unsubscribe),
        )
        .route("/api/v1/opportunities/:id/alert", post(handlers::send_alert))
        .route("/webhooks/telegram", post(webhooks::telegram))
        .route("/webhooks/discord", post(webhooks::discord))
        .route("/webhooks/whatsapp", post(webhooks::whatsapp))
        .layer(
            ServiceBuilder::new()
                .layer(Extension(ctx))
                .layer(Extension(channels))
                .layer(cors_layer),
        );

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
