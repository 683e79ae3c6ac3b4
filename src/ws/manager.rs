// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Registry of connected relay clients.

use crate::ws::protocol::{ClientInfo, ServerEvent};
use axum::body::Bytes;
use axum::extract::ws::Message;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::mpsc;

/// Channel sender half for pushing messages to a WebSocket connection.
pub type WsSender = mpsc::UnboundedSender<Message>;

/// Metadata for a single relay connection.
pub struct WsConnection {
    /// Totem id announced with `register-totem`.
    pub totem_id: Option<String>,
    pub sender: WsSender,
    pub connected_at: DateTime<Utc>,
}

/// Tracks every live relay connection.
#[derive(Default)]
pub struct WsManager {
    connections: DashMap<String, WsConnection>,
}

impl WsManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection and return the receiver for its outbound frames.
    pub fn add(&self, conn_id: String) -> mpsc::UnboundedReceiver<Message> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.connections.insert(
            conn_id,
            WsConnection {
                totem_id: None,
                sender: tx,
                connected_at: Utc::now(),
            },
        );
        rx
    }

    /// Remove a connection, returning the totem it had registered as.
    pub fn remove(&self, conn_id: &str) -> Option<String> {
        self.connections
            .remove(conn_id)
            .and_then(|(_, conn)| conn.totem_id)
    }

    /// Tag a connection with its totem id. Returns false for unknown ids.
    pub fn register_totem(&self, conn_id: &str, totem_id: &str) -> bool {
        match self.connections.get_mut(conn_id) {
            Some(mut conn) => {
                conn.totem_id = Some(totem_id.to_string());
                true
            }
            None => false,
        }
    }

    /// Totem id for a connection, falling back to the connection id.
    pub fn totem_for(&self, conn_id: &str) -> String {
        self.connections
            .get(conn_id)
            .and_then(|conn| conn.totem_id.clone())
            .unwrap_or_else(|| conn_id.to_string())
    }

    /// Connected clients, oldest first.
    pub fn clients(&self) -> Vec<ClientInfo> {
        let mut clients: Vec<ClientInfo> = self
            .connections
            .iter()
            .map(|entry| ClientInfo {
                id: entry.key().clone(),
                totem_id: entry.totem_id.clone(),
                connected_at: entry.connected_at,
            })
            .collect();
        clients.sort_by(|a, b| a.connected_at.cmp(&b.connected_at).then_with(|| a.id.cmp(&b.id)));
        clients
    }

    /// Send an event to one connection.
    pub fn send_to(&self, conn_id: &str, event: &ServerEvent) -> bool {
        let Some(message) = event.to_message() else {
            return false;
        };
        self.connections
            .get(conn_id)
            .is_some_and(|conn| conn.sender.send(message).is_ok())
    }

    /// Send an event to every connection.
    ///
    /// Closed channels are skipped; their receive loop removes them.
    pub fn broadcast(&self, event: &ServerEvent) {
        let Some(message) = event.to_message() else {
            return;
        };
        for conn in self.connections.iter() {
            let _ = conn.sender.send(message.clone());
        }
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Send a Ping frame to every connection.
    pub fn ping_all(&self) {
        for conn in self.connections.iter() {
            let _ = conn.sender.send(Message::Ping(Bytes::new()));
        }
    }

    /// Send a Close frame to every connection and forget them.
    pub fn shutdown_all(&self) {
        let count = self.connections.len();
        for conn in self.connections.iter() {
            let _ = conn.sender.send(Message::Close(None));
        }
        self.connections.clear();
        tracing::info!(count, "Closed all relay connections");
    }
}
