//! WebSocket relay for live equipment occupancy.
//!
//! Totems connect here, announce themselves with `register-totem`, claim and
//! release equipment, and receive `actualizar-equipos` / `actualizar-clientes`
//! broadcasts.

mod handler;
mod heartbeat;
pub mod manager;
pub mod protocol;

pub use handler::{handle_client_message, on_disconnect, ws_handler, RelayRejection};
pub use heartbeat::{start_heartbeat, start_occupancy_forwarder};
pub use manager::WsManager;

use crate::AppState;
use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Router served on the relay port.
pub fn create_relay_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(ws_handler))
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
