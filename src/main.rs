//! Jeepney tracker service

use std::sync::Arc;

use tokio::signal;
use tracing::info;

use jeepney_tracker::bridge::HttpDeliveryBridge;
use jeepney_tracker::config::AppConfig;
use jeepney_tracker::errors::TrackerError;
use jeepney_tracker::relay::RelayServer;
use jeepney_tracker::routes::RouteRegistry;
use jeepney_tracker::{api, build_state};

#[tokio::main]
async fn main() -> Result<(), TrackerError> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load configuration, preferring environment variables and config files
    let config = AppConfig::load()?;

    let registry = match &config.tracking.routes_file {
        Some(path) => RouteRegistry::from_file(path)?,
        None => RouteRegistry::new(),
    };

    let sink = Arc::new(HttpDeliveryBridge::new(&config.bridge)?);
    let state = build_state(&config.tracking, registry, sink);

    let relay = RelayServer::bind(config.relay.bind_addr, state.relay.clone()).await?;

    let listener = tokio::net::TcpListener::bind(config.http.bind_addr).await?;
    info!("HTTP API listening on {}", listener.local_addr()?);
    let app = api::router(state);

    let shutdown_signal = signal::ctrl_c();

    tokio::select! {
        result = relay.run() => {
            info!("Relay stopped: {:?}", result);
        }
        result = async { axum::serve(listener, app).await } => {
            info!("HTTP server stopped: {:?}", result);
        }
        _ = shutdown_signal => {
            info!("Received shutdown signal");
        }
    }

    Ok(())
}
