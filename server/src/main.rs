mod api;
mod config;
mod models;
mod providers;
mod services;
mod sync;
#[cfg(test)]
mod testing;

use axum::http::{header, HeaderValue, Method};
use std::sync::Arc;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa_swagger_ui::SwaggerUi;

use config::{Config, API_URL_ENV};
use providers::departures_api::DepartureApiClient;
use sync::{SyncManager, SystemClock};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "departure_board=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.yaml".to_string());
    let config = Config::load_or_default(&config_path)?.with_env_overrides();

    info!(
        api_url = %config.api_url,
        timezone = %config.timezone,
        "Starting departure board"
    );
    if config.api_url.is_empty() {
        warn!(
            env = API_URL_ENV,
            "No departures endpoint configured, the board will show the fallback timetable"
        );
    }

    let client = DepartureApiClient::new(
        config.api_url.clone(),
        config.request_timeout()?,
        config.connect_timeout()?,
    )?;
    let manager = Arc::new(SyncManager::new(client, SystemClock, config.sync_settings()?));
    let reader = manager.reader();
    let sync_handle = manager.start();

    // Build router
    let (app, api) = api::router(reader).split_for_parts();
    let app = app
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", api))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&config));

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    info!(addr = %config.listen_addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sync_handle.shutdown().await;

    Ok(())
}

fn cors_layer(config: &Config) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    if config.cors_permissive {
        warn!("CORS is permissive, allowing all origins");
        return cors.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(origin = %origin, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    cors.allow_origin(AllowOrigin::list(origins))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        return;
    }
    info!("Shutdown signal received");
}
