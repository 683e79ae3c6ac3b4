use std::sync::Arc;
use std::time::Duration;

use crate::services::OccupancyTracker;
use crate::ws::manager::WsManager;
use crate::ws::protocol::ServerEvent;
use tokio::sync::broadcast::error::RecvError;

/// Interval between heartbeat pings (in seconds).
const HEARTBEAT_INTERVAL_SECS: u64 = 30;

/// Spawn a background task that pings every relay client periodically.
pub fn start_heartbeat(ws_manager: Arc<WsManager>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(HEARTBEAT_INTERVAL_SECS));

        loop {
            interval.tick().await;
            tracing::debug!(count = ws_manager.connection_count(), "Relay heartbeat ping");
            ws_manager.ping_all();
        }
    })
}

/// Spawn a task that broadcasts `actualizar-equipos` after every occupancy
/// change, whether it came from the relay or the REST API.
pub fn start_occupancy_forwarder(
    occupancy: &OccupancyTracker,
    ws_manager: Arc<WsManager>,
) -> tokio::task::JoinHandle<()> {
    let mut updates = occupancy.subscribe();
    tokio::spawn(async move {
        loop {
            match updates.recv().await {
                Ok(snapshot) => ws_manager.broadcast(&ServerEvent::Equipment(snapshot)),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Occupancy forwarder lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}
