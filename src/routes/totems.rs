// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Totem and locker routes, including physically opening a locker.

use crate::error::{AppError, Result};
use crate::models::{Locker, LockerStatus, Totem};
use crate::routes::validated;
use crate::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/totem", get(list_totems).post(create_totem))
        .route(
            "/totem/{id}",
            get(get_totem).put(update_totem).delete(delete_totem),
        )
        .route("/totem/{id}/casillero", post(add_locker))
        .route("/totem/{id}/casillero/{casillero_id}", get(get_locker))
        .route(
            "/totem/{id}/casillero/{casillero_id}/update-status",
            put(update_locker_status),
        )
        .route("/totem/{id}/casillero/{casillero_id}/abrir", post(open_locker))
        .route("/totem/{id}/casillero/{casillero_id}/cerrar", post(close_locker))
}

async fn list_totems(State(state): State<Arc<AppState>>) -> Json<Vec<Totem>> {
    Json(
        state
            .store
            .read(|data| data.totems.values().cloned().collect())
            .await,
    )
}

#[derive(Deserialize, Validate)]
pub struct TotemRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(length(max = 200))]
    pub location: Option<String>,
}

async fn create_totem(
    State(state): State<Arc<AppState>>,
    Json(body): Json<TotemRequest>,
) -> Result<(StatusCode, Json<Totem>)> {
    let body = validated(body)?;
    let totem = Totem {
        id: uuid::Uuid::new_v4().to_string(),
        name: body.name,
        location: body.location,
        lockers: Vec::new(),
    };

    state
        .store
        .update(|data| {
            data.log("totem.create", None, format!("Totem '{}' creado", totem.name));
            data.totems.insert(totem.id.clone(), totem.clone());
            Ok(())
        })
        .await?;

    tracing::info!(totem_id = %totem.id, "Totem created");
    Ok((StatusCode::CREATED, Json(totem)))
}

async fn get_totem(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Totem>> {
    Ok(Json(state.store.read(|data| data.totem(&id).cloned()).await?))
}

async fn update_totem(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<TotemRequest>,
) -> Result<Json<Totem>> {
    let body = validated(body)?;
    let totem = state
        .store
        .update(|data| {
            let totem = data.totem_mut(&id)?;
            totem.name = body.name;
            totem.location = body.location;
            let updated = totem.clone();
            data.log("totem.update", None, format!("Totem '{}' actualizado", updated.name));
            Ok(updated)
        })
        .await?;
    Ok(Json(totem))
}

async fn delete_totem(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    state
        .store
        .update(|data| {
            let totem = data.totem(&id)?;
            if totem
                .lockers
                .iter()
                .any(|l| l.status == LockerStatus::Ocupado)
            {
                return Err(AppError::Conflict(
                    "Totem still has occupied lockers".to_string(),
                ));
            }
            if let Some(totem) = data.totems.remove(&id) {
                data.log("totem.delete", None, format!("Totem '{}' eliminado", totem.name));
            }
            Ok(())
        })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

// ─── Lockers ─────────────────────────────────────────────────

#[derive(Deserialize, Validate)]
pub struct AddLockerRequest {
    #[validate(range(min = 1, max = 999))]
    pub number: u32,
}

async fn add_locker(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<AddLockerRequest>,
) -> Result<(StatusCode, Json<Locker>)> {
    let body = validated(body)?;
    let locker = state
        .store
        .update(|data| {
            let totem = data.totem_mut(&id)?;
            if totem.lockers.iter().any(|l| l.number == body.number) {
                return Err(AppError::Conflict(format!(
                    "Locker number {} already exists in this totem",
                    body.number
                )));
            }
            let locker = Locker::new(body.number);
            totem.lockers.push(locker.clone());
            data.log(
                "locker.create",
                None,
                format!("Casillero {} agregado al totem {}", body.number, id),
            );
            Ok(locker)
        })
        .await?;
    Ok((StatusCode::CREATED, Json(locker)))
}

async fn get_locker(
    State(state): State<Arc<AppState>>,
    Path((id, casillero_id)): Path<(String, String)>,
) -> Result<Json<Locker>> {
    let locker = state
        .store
        .read(|data| {
            data.totem(&id)?
                .locker(&casillero_id)
                .cloned()
                .ok_or_else(|| locker_not_found(&casillero_id))
        })
        .await?;
    Ok(Json(locker))
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: LockerStatus,
}

/// Manual status change. Occupancy is owned by activity assignment, so
/// `ocupado` can be neither set nor cleared here.
async fn update_locker_status(
    State(state): State<Arc<AppState>>,
    Path((id, casillero_id)): Path<(String, String)>,
    Json(body): Json<UpdateStatusRequest>,
) -> Result<Json<Locker>> {
    if body.status == LockerStatus::Ocupado {
        return Err(AppError::BadRequest(
            "Lockers become occupied only through activity assignment".to_string(),
        ));
    }

    let locker = state
        .store
        .update(|data| {
            let locker = data
                .totem_mut(&id)?
                .locker_mut(&casillero_id)
                .ok_or_else(|| locker_not_found(&casillero_id))?;
            if locker.status == LockerStatus::Ocupado {
                return Err(AppError::Conflict(
                    "Locker is held by an activity".to_string(),
                ));
            }
            let previous = locker.status;
            locker.status = body.status;
            let updated = locker.clone();
            data.log(
                "locker.status",
                None,
                format!(
                    "Casillero {} del totem {}: {} -> {}",
                    updated.number, id, previous, updated.status
                ),
            );
            Ok(updated)
        })
        .await?;
    Ok(Json(locker))
}

#[derive(Serialize)]
pub struct OpenLockerResponse {
    pub opened: bool,
    pub locker: Locker,
}

/// Physically open a locker through the hardware API.
///
/// The device is driven first; state only changes once it confirms.
async fn open_locker(
    State(state): State<Arc<AppState>>,
    Path((id, casillero_id)): Path<(String, String)>,
) -> Result<Json<OpenLockerResponse>> {
    let (number, status) = state
        .store
        .read(|data| {
            data.totem(&id)?
                .locker(&casillero_id)
                .map(|l| (l.number, l.status))
                .ok_or_else(|| locker_not_found(&casillero_id))
        })
        .await?;

    if status == LockerStatus::Mantenimiento {
        return Err(AppError::Conflict(
            "Locker is under maintenance".to_string(),
        ));
    }

    if let Err(e) = state.device.open_box(number).await {
        tracing::warn!(totem_id = %id, locker = number, error = %e, "Locker did not open");
        let message = format!("Fallo apertura casillero {} del totem {}: {}", number, id, e);
        // The device failure is what the caller needs to see.
        if let Err(log_err) = state
            .store
            .update(|data| {
                data.log("locker.open_failed", None, message);
                Ok(())
            })
            .await
        {
            tracing::warn!(totem_id = %id, error = %log_err, "Could not record failed opening");
        }
        return Err(e.into());
    }

    let locker = state
        .store
        .update(|data| {
            let locker = data
                .totem_mut(&id)?
                .locker_mut(&casillero_id)
                .ok_or_else(|| locker_not_found(&casillero_id))?;
            // Occupied lockers stay occupied while open.
            if locker.status == LockerStatus::Disponible {
                locker.status = LockerStatus::Abierto;
            }
            let updated = locker.clone();
            data.log(
                "locker.open",
                updated.activity_id.as_deref(),
                format!("Casillero {} del totem {} abierto", number, id),
            );
            Ok(updated)
        })
        .await?;

    tracing::info!(totem_id = %id, locker = number, "Locker opened");
    Ok(Json(OpenLockerResponse {
        opened: true,
        locker,
    }))
}

async fn close_locker(
    State(state): State<Arc<AppState>>,
    Path((id, casillero_id)): Path<(String, String)>,
) -> Result<Json<Locker>> {
    let locker = state
        .store
        .update(|data| {
            let locker = data
                .totem_mut(&id)?
                .locker_mut(&casillero_id)
                .ok_or_else(|| locker_not_found(&casillero_id))?;
            if locker.status != LockerStatus::Abierto {
                return Err(AppError::Conflict(format!(
                    "Locker {} is {}, not abierto",
                    locker.number, locker.status
                )));
            }
            locker.status = LockerStatus::Disponible;
            let updated = locker.clone();
            data.log(
                "locker.close",
                updated.activity_id.as_deref(),
                format!("Casillero {} del totem {} cerrado", updated.number, id),
            );
            Ok(updated)
        })
        .await?;
    Ok(Json(locker))
}

fn locker_not_found(locker_id: &str) -> AppError {
    AppError::NotFound(format!("Locker {} not found", locker_id))
}
