// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Relay wire format.
//!
//! Every frame is a JSON text message `{ "event": <name>, "data": <payload> }`.

use crate::services::EquipmentSnapshot;
use axum::extract::ws::Message;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Raw inbound frame before the payload is interpreted.
#[derive(Debug, Deserialize)]
pub struct Envelope {
    pub event: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterTotem {
    pub totem_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UseEquipment {
    #[serde(default)]
    pub equipo_id: String,
    #[serde(default)]
    pub actividad_id: String,
    #[serde(default)]
    pub actividad_nombre: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseEquipment {
    #[serde(default)]
    pub equipo_id: String,
    #[serde(default)]
    pub actividad_id: String,
}

/// Events a relay client can send.
#[derive(Debug)]
pub enum ClientEvent {
    RegisterTotem(RegisterTotem),
    UseEquipment(UseEquipment),
    ReleaseEquipment(ReleaseEquipment),
    GetClients,
    GetEquipment,
}

/// Why an inbound frame could not be understood.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Unknown event: {0}")]
    UnknownEvent(String),
}

impl ClientEvent {
    /// Parse a text frame.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let envelope: Envelope = serde_json::from_str(text)?;
        let event = match envelope.event.as_str() {
            "register-totem" => {
                ClientEvent::RegisterTotem(serde_json::from_value(envelope.data)?)
            }
            "usar-equipo" => ClientEvent::UseEquipment(serde_json::from_value(envelope.data)?),
            "liberar-equipo" => {
                ClientEvent::ReleaseEquipment(serde_json::from_value(envelope.data)?)
            }
            "get-clients" => ClientEvent::GetClients,
            "get-equipos" => ClientEvent::GetEquipment,
            _ => return Err(ProtocolError::UnknownEvent(envelope.event)),
        };
        Ok(event)
    }
}

/// A connected relay client as reported in `actualizar-clientes`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    pub id: String,
    pub totem_id: Option<String>,
    pub connected_at: DateTime<Utc>,
}

/// Payload of `error-equipo`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub equipo_id: Option<String>,
}

/// Events the relay sends.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "actualizar-equipos")]
    Equipment(EquipmentSnapshot),
    #[serde(rename = "actualizar-clientes")]
    Clients(Vec<ClientInfo>),
    #[serde(rename = "error-equipo")]
    Error(RelayError),
}

impl ServerEvent {
    /// Encode as a text frame.
    pub fn to_message(&self) -> Option<Message> {
        match serde_json::to_string(self) {
            Ok(json) => Some(Message::Text(json.into())),
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode relay event");
                None
            }
        }
    }
}
