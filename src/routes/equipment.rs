// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Area and equipment routes.

use crate::error::{AppError, Result};
use crate::models::{Area, Equipment};
use crate::routes::validated;
use crate::services::{EquipmentClaim, EquipmentSnapshot};
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/areas", get(list_areas).post(create_area))
        .route(
            "/areas/{id}",
            get(get_area).put(update_area).delete(delete_area),
        )
        .route("/equipment", get(list_equipment).post(create_equipment))
        .route("/equipment/in-use", get(get_in_use))
        .route(
            "/equipment/{id}",
            get(get_equipment)
                .put(update_equipment)
                .delete(delete_equipment),
        )
}

// ─── Areas ───────────────────────────────────────────────────

#[derive(Deserialize, Validate)]
pub struct AreaRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(length(max = 500))]
    pub description: Option<String>,
}

async fn list_areas(State(state): State<Arc<AppState>>) -> Json<Vec<Area>> {
    let mut areas: Vec<Area> = state
        .store
        .read(|data| data.areas.values().cloned().collect())
        .await;
    areas.sort_by(|a, b| a.name.cmp(&b.name));
    Json(areas)
}

async fn create_area(
    State(state): State<Arc<AppState>>,
    Json(body): Json<AreaRequest>,
) -> Result<(StatusCode, Json<Area>)> {
    let body = validated(body)?;
    let area = Area {
        id: uuid::Uuid::new_v4().to_string(),
        name: body.name,
        description: body.description,
    };
    state
        .store
        .update(|data| {
            data.log("area.create", None, format!("Area '{}' creada", area.name));
            data.areas.insert(area.id.clone(), area.clone());
            Ok(())
        })
        .await?;
    Ok((StatusCode::CREATED, Json(area)))
}

async fn get_area(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Area>> {
    Ok(Json(state.store.read(|data| data.area(&id).cloned()).await?))
}

async fn update_area(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<AreaRequest>,
) -> Result<Json<Area>> {
    let body = validated(body)?;
    let area = state
        .store
        .update(|data| {
            let area = data
                .areas
                .get_mut(&id)
                .ok_or_else(|| AppError::NotFound(format!("Area {} not found", id)))?;
            area.name = body.name;
            area.description = body.description;
            let updated = area.clone();
            data.log("area.update", None, format!("Area '{}' actualizada", updated.name));
            Ok(updated)
        })
        .await?;
    Ok(Json(area))
}

async fn delete_area(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    state
        .store
        .update(|data| {
            data.area(&id)?;
            if data.equipment.values().any(|e| e.area_id == id) {
                return Err(AppError::Conflict(
                    "Area still has equipment".to_string(),
                ));
            }
            if let Some(area) = data.areas.remove(&id) {
                data.log("area.delete", None, format!("Area '{}' eliminada", area.name));
            }
            Ok(())
        })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

// ─── Equipment ───────────────────────────────────────────────

/// Equipment plus its live occupancy.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EquipmentResponse {
    #[serde(flatten)]
    pub equipment: Equipment,
    pub in_use: bool,
    pub claim: Option<EquipmentClaim>,
}

impl EquipmentResponse {
    fn new(equipment: Equipment, snapshot: &EquipmentSnapshot) -> Self {
        let claim = snapshot.get(&equipment.id).cloned();
        Self {
            in_use: claim.is_some(),
            claim,
            equipment,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EquipmentQuery {
    area_id: Option<String>,
}

async fn list_equipment(
    State(state): State<Arc<AppState>>,
    Query(params): Query<EquipmentQuery>,
) -> Json<Vec<EquipmentResponse>> {
    let snapshot = state.occupancy.snapshot().await;
    let mut equipment: Vec<Equipment> = state
        .store
        .read(|data| {
            data.equipment
                .values()
                .filter(|e| params.area_id.as_deref().map_or(true, |a| e.area_id == a))
                .cloned()
                .collect()
        })
        .await;
    equipment.sort_by(|a, b| a.name.cmp(&b.name));
    Json(
        equipment
            .into_iter()
            .map(|e| EquipmentResponse::new(e, &snapshot))
            .collect(),
    )
}

/// Current relay occupancy map (`equiposEnUso`).
async fn get_in_use(State(state): State<Arc<AppState>>) -> Json<EquipmentSnapshot> {
    Json(state.occupancy.snapshot().await)
}

#[derive(Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct EquipmentRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(length(min = 1))]
    pub area_id: String,
}

async fn create_equipment(
    State(state): State<Arc<AppState>>,
    Json(body): Json<EquipmentRequest>,
) -> Result<(StatusCode, Json<Equipment>)> {
    let body = validated(body)?;
    let equipment = Equipment {
        id: uuid::Uuid::new_v4().to_string(),
        name: body.name,
        area_id: body.area_id,
        zero_energy_validated: false,
        locked: false,
    };
    state
        .store
        .update(|data| {
            data.area(&equipment.area_id)?;
            data.log(
                "equipment.create",
                None,
                format!("Equipo '{}' creado", equipment.name),
            );
            data.equipment
                .insert(equipment.id.clone(), equipment.clone());
            Ok(())
        })
        .await?;
    Ok((StatusCode::CREATED, Json(equipment)))
}

async fn get_equipment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<EquipmentResponse>> {
    let equipment = state.store.read(|data| data.equipment(&id).cloned()).await?;
    let snapshot = state.occupancy.snapshot().await;
    Ok(Json(EquipmentResponse::new(equipment, &snapshot)))
}

async fn update_equipment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<EquipmentRequest>,
) -> Result<Json<Equipment>> {
    let body = validated(body)?;
    let equipment = state
        .store
        .update(|data| {
            data.area(&body.area_id)?;
            let equipment = data
                .equipment
                .get_mut(&id)
                .ok_or_else(|| AppError::NotFound(format!("Equipment {} not found", id)))?;
            equipment.name = body.name;
            equipment.area_id = body.area_id;
            let updated = equipment.clone();
            data.log(
                "equipment.update",
                None,
                format!("Equipo '{}' actualizado", updated.name),
            );
            Ok(updated)
        })
        .await?;
    Ok(Json(equipment))
}

async fn delete_equipment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    if let Some(claim) = state.occupancy.claim_of(&id).await {
        return Err(AppError::Conflict(format!(
            "Equipment is in use by activity '{}'",
            claim.activity_name
        )));
    }
    state
        .store
        .update(|data| {
            data.equipment(&id)?;
            if data
                .activities
                .values()
                .any(|a| !a.is_finalized() && a.equipments.contains(&id))
            {
                return Err(AppError::Conflict(
                    "Equipment is assigned to an open activity".to_string(),
                ));
            }
            if let Some(equipment) = data.equipment.remove(&id) {
                data.log(
                    "equipment.delete",
                    None,
                    format!("Equipo '{}' eliminado", equipment.name),
                );
            }
            Ok(())
        })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
