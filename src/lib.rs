// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Lockout coordinator: LOTO (lockout/tagout) backend for safety totems.
//!
//! This crate serves the REST API used by the operator console and the
//! WebSocket relay that totems use to claim and release equipment.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod ws;

use config::Config;
use db::Store;
use services::{LockerDevice, LockoutService, OccupancyTracker, PinHasher};
use std::sync::Arc;
use ws::WsManager;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub store: Store,
    pub occupancy: Arc<OccupancyTracker>,
    pub lockout: LockoutService,
    pub device: LockerDevice,
    pub pins: PinHasher,
    pub ws: Arc<WsManager>,
}

impl AppState {
    /// Wire the services together over an existing store and tracker.
    pub fn new(
        config: Config,
        store: Store,
        occupancy: Arc<OccupancyTracker>,
        device: LockerDevice,
    ) -> Self {
        let pins = PinHasher::new(config.pin_secret.clone());
        let lockout = LockoutService::new(store.clone(), occupancy.clone(), pins.clone());
        Self {
            config,
            store,
            occupancy,
            lockout,
            device,
            pins,
            ws: Arc::new(WsManager::new()),
        }
    }
}
