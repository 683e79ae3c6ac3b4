// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Relay connection lifecycle and event dispatch.

use crate::services::{ClaimRequest, OccupancyError};
use crate::ws::protocol::{ClientEvent, RelayError, ServerEvent};
use crate::AppState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;

/// HTTP handler that upgrades the connection to WebSocket.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Manage a single relay connection after upgrade.
///
/// Registers the connection, sends the current equipment snapshot, then
/// forwards outbound frames from a spawned task while inbound frames are
/// dispatched on this one.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    tracing::info!(conn_id = %conn_id, "Relay client connected");

    let mut rx = state.ws.add(conn_id.clone());
    let (mut sink, mut stream) = socket.split();

    let sender_conn_id = conn_id.clone();
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sink.send(msg).await.is_err() {
                tracing::debug!(conn_id = %sender_conn_id, "Relay sink closed");
                break;
            }
        }
    });

    state.ws.send_to(
        &conn_id,
        &ServerEvent::Equipment(state.occupancy.snapshot().await),
    );
    state.ws.broadcast(&ServerEvent::Clients(state.ws.clients()));

    while let Some(result) = stream.next().await {
        match result {
            Ok(Message::Text(text)) => handle_client_message(&state, &conn_id, text.as_str()).await,
            Ok(Message::Close(_)) => break,
            Ok(Message::Pong(_)) => {
                tracing::trace!(conn_id = %conn_id, "Pong received");
            }
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(conn_id = %conn_id, error = %e, "Relay receive error");
                break;
            }
        }
    }

    on_disconnect(&state, &conn_id).await;
    send_task.abort();
}

/// Dispatch one inbound text frame from `conn_id`.
pub async fn handle_client_message(state: &AppState, conn_id: &str, text: &str) {
    let event = match ClientEvent::parse(text) {
        Ok(event) => event,
        Err(e) => {
            tracing::debug!(conn_id, error = %e, "Rejected relay message");
            reply_error(state, conn_id, "mensaje_invalido", e.to_string(), None);
            return;
        }
    };

    match event {
        ClientEvent::RegisterTotem(payload) => {
            if payload.totem_id.trim().is_empty() {
                reply_error(
                    state,
                    conn_id,
                    "campo_requerido",
                    "Missing required field: totemId".to_string(),
                    None,
                );
                return;
            }
            state.ws.register_totem(conn_id, &payload.totem_id);
            tracing::info!(conn_id, totem_id = %payload.totem_id, "Totem registered");
            state.ws.broadcast(&ServerEvent::Clients(state.ws.clients()));
        }
        ClientEvent::UseEquipment(payload) => {
            let check = check_relay_claim(state, &payload.equipo_id, &payload.actividad_id).await;
            if let Err(e) = check {
                reply_error(state, conn_id, e.code(), e.to_string(), Some(payload.equipo_id));
                return;
            }
            let totem = state.ws.totem_for(conn_id);
            let result = state
                .occupancy
                .use_equipment(ClaimRequest {
                    equipment_id: &payload.equipo_id,
                    activity_id: &payload.actividad_id,
                    activity_name: &payload.actividad_nombre,
                    totem: &totem,
                })
                .await;
            // Successful changes reach every client through the occupancy
            // forwarder; only failures are answered here.
            if let Err(e) = result {
                reply_occupancy_error(state, conn_id, &payload.equipo_id, e);
            }
        }
        ClientEvent::ReleaseEquipment(payload) => {
            let check =
                check_relay_release(state, &payload.equipo_id, &payload.actividad_id).await;
            if let Err(e) = check {
                reply_error(state, conn_id, e.code(), e.to_string(), Some(payload.equipo_id));
                return;
            }
            let result = state
                .occupancy
                .release_equipment(&payload.equipo_id, &payload.actividad_id)
                .await;
            if let Err(e) = result {
                reply_occupancy_error(state, conn_id, &payload.equipo_id, e);
            }
        }
        ClientEvent::GetClients => {
            state
                .ws
                .send_to(conn_id, &ServerEvent::Clients(state.ws.clients()));
        }
        ClientEvent::GetEquipment => {
            state.ws.send_to(
                conn_id,
                &ServerEvent::Equipment(state.occupancy.snapshot().await),
            );
        }
    }
}

/// Forget a connection and tell the remaining clients.
pub async fn on_disconnect(state: &AppState, conn_id: &str) {
    let totem = state.ws.remove(conn_id);
    tracing::info!(conn_id, totem = ?totem, "Relay client disconnected");

    if state.config.release_on_disconnect {
        let totem = totem.unwrap_or_else(|| conn_id.to_string());
        if let Err(e) = state.occupancy.release_totem(&totem).await {
            tracing::error!(error = %e, totem = %totem, "Failed to release totem equipment");
        }
    }

    state.ws.broadcast(&ServerEvent::Clients(state.ws.clients()));
}

/// Relay requests the activity store does not allow.
#[derive(Debug, thiserror::Error)]
pub enum RelayRejection {
    #[error("Activity {0} not found")]
    UnknownActivity(String),

    #[error("Activity {0} is finalized")]
    FinalizedActivity(String),

    #[error("Equipment {equipment_id} is locked out by activity {activity_id}")]
    Locked {
        equipment_id: String,
        activity_id: String,
    },

    #[error("Equipment {equipment_id} belongs to activity {activity_id}; release it there")]
    AssignedToActivity {
        equipment_id: String,
        activity_id: String,
    },
}

impl RelayRejection {
    pub fn code(&self) -> &'static str {
        match self {
            RelayRejection::UnknownActivity(_) => "actividad_no_encontrada",
            RelayRejection::FinalizedActivity(_) => "actividad_finalizada",
            RelayRejection::Locked { .. } => "equipo_bloqueado",
            RelayRejection::AssignedToActivity { .. } => "equipo_en_actividad",
        }
    }
}

/// Relay claims are only accepted for activities that are still open.
///
/// Empty ids are left to the occupancy tracker, which reports the missing field.
async fn check_relay_claim(
    state: &AppState,
    equipment_id: &str,
    activity_id: &str,
) -> Result<(), RelayRejection> {
    if equipment_id.is_empty() || activity_id.is_empty() {
        return Ok(());
    }
    state
        .store
        .read(|data| match data.activities.get(activity_id) {
            None => Err(RelayRejection::UnknownActivity(activity_id.to_string())),
            Some(a) if a.is_finalized() => {
                Err(RelayRejection::FinalizedActivity(activity_id.to_string()))
            }
            Some(_) => Ok(()),
        })
        .await
}

/// A relay release must not undo equipment the activity itself tracks.
///
/// Equipment listed on an open activity is released through the activity,
/// and nothing is released while that activity is blocked.
async fn check_relay_release(
    state: &AppState,
    equipment_id: &str,
    activity_id: &str,
) -> Result<(), RelayRejection> {
    state
        .store
        .read(|data| {
            let Some(activity) = data.activities.get(activity_id) else {
                return Ok(());
            };
            if activity.is_finalized() {
                return Ok(());
            }
            if activity.is_blocked {
                return Err(RelayRejection::Locked {
                    equipment_id: equipment_id.to_string(),
                    activity_id: activity_id.to_string(),
                });
            }
            if activity.equipments.iter().any(|e| e == equipment_id) {
                return Err(RelayRejection::AssignedToActivity {
                    equipment_id: equipment_id.to_string(),
                    activity_id: activity_id.to_string(),
                });
            }
            Ok(())
        })
        .await
}

fn reply_occupancy_error(state: &AppState, conn_id: &str, equipo_id: &str, err: OccupancyError) {
    if let OccupancyError::Storage(e) = &err {
        tracing::error!(error = %e, "Occupancy state could not be saved");
    }
    reply_error(
        state,
        conn_id,
        err.code(),
        err.to_string(),
        Some(equipo_id.to_string()),
    );
}

fn reply_error(
    state: &AppState,
    conn_id: &str,
    code: &str,
    message: String,
    equipo_id: Option<String>,
) {
    state.ws.send_to(
        conn_id,
        &ServerEvent::Error(RelayError {
            code: code.to_string(),
            message,
            equipo_id,
        }),
    );
}
