// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Lockout Coordinator Server
//!
//! Serves the REST API for lockout activities and the WebSocket relay that
//! keeps totems in sync on which equipment is in use.

use anyhow::Context;
use lockout_coordinator::{
    config::Config,
    db::Store,
    services::{LockerDevice, OccupancyTracker},
    ws, AppState,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured JSON logging
    init_logging()?;

    // Load configuration from environment
    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!(
        port = config.port,
        relay_port = config.relay_port,
        "Starting lockout coordinator"
    );

    let store = match &config.data_file {
        Some(path) => Store::open(path.clone())
            .await
            .context("Failed to open data file")?,
        None => Store::in_memory(),
    };

    let occupancy = match &config.state_file {
        Some(path) => OccupancyTracker::load(path.clone())
            .await
            .context("Failed to load equipment state")?,
        None => OccupancyTracker::in_memory(),
    };

    let device = LockerDevice::new(&config.locker_device_url, config.device_timeout)
        .context("Failed to initialize locker device client")?;
    tracing::info!(url = %config.locker_device_url, "Locker device client initialized");

    let state = Arc::new(AppState::new(
        config.clone(),
        store,
        Arc::new(occupancy),
        device,
    ));

    // Drop claims left behind by activities that no longer exist or are done
    let released = state.lockout.reconcile_occupancy().await?;
    if released > 0 {
        tracing::warn!(released, "Released stale equipment claims at startup");
    }

    ws::start_heartbeat(state.ws.clone());
    ws::start_occupancy_forwarder(&state.occupancy, state.ws.clone());

    let api = lockout_coordinator::routes::create_router(state.clone());
    let relay = ws::create_relay_router(state.clone());

    let api_addr = format!("0.0.0.0:{}", config.port);
    let relay_addr = format!("0.0.0.0:{}", config.relay_port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr).await?;
    let relay_listener = tokio::net::TcpListener::bind(&relay_addr).await?;
    tracing::info!(address = %api_addr, "API listening");
    tracing::info!(address = %relay_addr, "Relay listening");

    let result = tokio::try_join!(
        axum::serve(api_listener, api).with_graceful_shutdown(shutdown_signal()),
        axum::serve(relay_listener, relay).with_graceful_shutdown(shutdown_signal()),
    );

    state.ws.shutdown_all();
    tracing::info!("Server stopped");
    result?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

/// Initialize structured JSON logging.
fn init_logging() -> anyhow::Result<()> {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("lockout_coordinator=debug".parse()?)
                .add_directive("info".parse()?),
        )
        .with(format)
        .init();
    Ok(())
}
