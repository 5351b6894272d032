use std::sync::Arc;

use pickup_dispatch::api;
use pickup_dispatch::clock::SystemClock;
use pickup_dispatch::config::{Config, LogFormat, RoutingConfig};
use pickup_dispatch::engine::sweeper::run_sweeper;
use pickup_dispatch::error::AppError;
use pickup_dispatch::routing::RouteService;
use pickup_dispatch::routing::direct::DirectLineRouteService;
use pickup_dispatch::routing::ors::OrsRouteService;
use pickup_dispatch::routing::retry::RetryingRouteService;
use pickup_dispatch::state::AppState;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = Config::from_env()?;

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .with_target(false);
    match config.log_format {
        LogFormat::Json => subscriber.json().init(),
        LogFormat::Compact => subscriber.compact().init(),
    }

    let routes = route_service(&config.routing)?;
    let shared_state = Arc::new(AppState::new(
        config.dispatch.clone(),
        config.event_buffer_size,
        routes,
        Arc::new(SystemClock),
    ));

    let app = api::rest::router(shared_state.clone());

    tokio::spawn(run_sweeper(shared_state.clone()));

    let bind_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| AppError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    tracing::info!(http_port = config.http_port, "http server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::Internal(format!("server error: {err}")))?;

    Ok(())
}

fn route_service(config: &RoutingConfig) -> Result<Arc<dyn RouteService>, AppError> {
    match &config.api_key {
        Some(api_key) => {
            let ors = OrsRouteService::new(config, api_key.clone())?;
            tracing::info!(base_url = %config.base_url, profile = %config.profile, "using road routing");
            Ok(Arc::new(RetryingRouteService::new(
                Arc::new(ors),
                config.max_retries,
                config.backoff,
            )))
        }
        None => {
            tracing::warn!("ROUTING_API_KEY not set; routes use straight-line estimates");
            Ok(Arc::new(DirectLineRouteService))
        }
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
