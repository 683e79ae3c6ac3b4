// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Activity routes: CRUD, equipment and locker assignment, the blocking
//! chain, finalization and locker conflict detection.

use crate::error::Result;
use crate::models::{Activity, ActivityStatus};
use crate::routes::validated;
use crate::services::{
    find_conflicts, resolve_conflicts, ActivityPatch, LockerConflict, RemovedAssignment,
};
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/activities", get(list_activities).post(create_activity))
        .route("/activities/conflicts", get(get_conflicts))
        .route("/activities/conflicts/resolve", post(resolve))
        .route(
            "/activities/{id}",
            get(get_activity).put(update_activity).delete(delete_activity),
        )
        .route("/activities/{id}/equipments", post(assign_equipment))
        .route(
            "/activities/{id}/equipments/{equipment_id}",
            delete(unassign_equipment),
        )
        .route("/activities/{id}/lockers", post(assign_locker))
        .route(
            "/activities/{id}/lockers/{totem_id}/{locker_id}",
            delete(unassign_locker),
        )
        .route("/activities/{id}/zero-energy", post(validate_zero_energy))
        .route("/activities/{id}/energy-owners", post(assign_energy_owner))
        .route(
            "/activities/{id}/energy-owners/{owner_id}/unlock",
            post(unlock_energy_owner),
        )
        .route(
            "/activities/{id}/energy-owners/{owner_id}/supervisors",
            post(assign_supervisor),
        )
        .route(
            "/activities/{id}/energy-owners/{owner_id}/supervisors/{supervisor_id}/unlock",
            post(unlock_supervisor),
        )
        .route(
            "/activities/{id}/energy-owners/{owner_id}/supervisors/{supervisor_id}/workers",
            post(assign_worker),
        )
        .route(
            "/activities/{id}/energy-owners/{owner_id}/supervisors/{supervisor_id}/workers/{worker_id}/unlock",
            post(unlock_worker),
        )
        .route("/activities/{id}/finalize", post(finalize))
}

// ─── CRUD ────────────────────────────────────────────────────

#[derive(Deserialize)]
struct ActivitiesQuery {
    status: Option<ActivityStatus>,
}

async fn list_activities(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ActivitiesQuery>,
) -> Json<Vec<Activity>> {
    let mut activities: Vec<Activity> = state
        .store
        .read(|data| {
            data.activities
                .values()
                .filter(|a| params.status.map_or(true, |s| a.status == s))
                .cloned()
                .collect()
        })
        .await;
    activities.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Json(activities)
}

#[derive(Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateActivityRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[serde(default)]
    #[validate(length(max = 2000))]
    pub description: String,
    #[validate(length(min = 1, max = 50))]
    pub block_type: Option<String>,
}

async fn create_activity(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateActivityRequest>,
) -> Result<(StatusCode, Json<Activity>)> {
    let body = validated(body)?;
    let activity = state
        .lockout
        .create_activity(body.name, body.description, body.block_type)
        .await?;
    Ok((StatusCode::CREATED, Json(activity)))
}

async fn get_activity(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Activity>> {
    let activity = state.store.read(|data| data.activity(&id).cloned()).await?;
    Ok(Json(activity))
}

#[derive(Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateActivityRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    #[validate(length(min = 1, max = 50))]
    pub block_type: Option<String>,
}

async fn update_activity(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<UpdateActivityRequest>,
) -> Result<Json<Activity>> {
    let body = validated(body)?;
    let patch = ActivityPatch {
        name: body.name,
        description: body.description,
        block_type: body.block_type,
    };
    Ok(Json(state.lockout.update_activity(&id, patch).await?))
}

async fn delete_activity(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    state.lockout.delete_activity(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ─── Equipment & Lockers ─────────────────────────────────────

#[derive(Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AssignEquipmentRequest {
    #[validate(length(min = 1))]
    pub equipment_id: String,
    pub totem_id: Option<String>,
}

async fn assign_equipment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<AssignEquipmentRequest>,
) -> Result<Json<Activity>> {
    let body = validated(body)?;
    let activity = state
        .lockout
        .assign_equipment(&id, &body.equipment_id, body.totem_id.as_deref())
        .await?;
    Ok(Json(activity))
}

async fn unassign_equipment(
    State(state): State<Arc<AppState>>,
    Path((id, equipment_id)): Path<(String, String)>,
) -> Result<Json<Activity>> {
    Ok(Json(
        state.lockout.unassign_equipment(&id, &equipment_id).await?,
    ))
}

#[derive(Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AssignLockerRequest {
    #[validate(length(min = 1))]
    pub totem_id: String,
    #[validate(length(min = 1))]
    pub locker_id: String,
}

async fn assign_locker(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<AssignLockerRequest>,
) -> Result<Json<Activity>> {
    let body = validated(body)?;
    let activity = state
        .lockout
        .assign_locker(&id, &body.totem_id, &body.locker_id)
        .await?;
    Ok(Json(activity))
}

async fn unassign_locker(
    State(state): State<Arc<AppState>>,
    Path((id, totem_id, locker_id)): Path<(String, String, String)>,
) -> Result<Json<Activity>> {
    Ok(Json(
        state
            .lockout
            .unassign_locker(&id, &totem_id, &locker_id)
            .await?,
    ))
}

// ─── Zero-energy & Blocking Chain ────────────────────────────

#[derive(Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ZeroEnergyRequest {
    #[validate(length(min = 1))]
    pub validated_by: String,
    #[validate(length(min = 4, max = 12))]
    pub pin: String,
    #[validate(range(min = 0.0))]
    pub voltage: f64,
    #[validate(length(max = 500))]
    pub notes: Option<String>,
}

async fn validate_zero_energy(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<ZeroEnergyRequest>,
) -> Result<Json<Activity>> {
    let body = validated(body)?;
    let activity = state
        .lockout
        .validate_zero_energy(&id, &body.validated_by, &body.pin, body.voltage, body.notes)
        .await?;
    Ok(Json(activity))
}

/// Person joining the chain, identified by their PIN.
#[derive(Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ChainMemberRequest {
    #[validate(length(min = 1))]
    pub user_id: String,
    #[validate(length(min = 4, max = 12))]
    pub pin: String,
}

/// PIN of the person removing their own lock.
#[derive(Deserialize, Validate)]
pub struct UnlockRequest {
    #[validate(length(min = 4, max = 12))]
    pub pin: String,
}

async fn assign_energy_owner(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<ChainMemberRequest>,
) -> Result<Json<Activity>> {
    let body = validated(body)?;
    Ok(Json(
        state
            .lockout
            .assign_energy_owner(&id, &body.user_id, &body.pin)
            .await?,
    ))
}

async fn assign_supervisor(
    State(state): State<Arc<AppState>>,
    Path((id, owner_id)): Path<(String, String)>,
    Json(body): Json<ChainMemberRequest>,
) -> Result<Json<Activity>> {
    let body = validated(body)?;
    Ok(Json(
        state
            .lockout
            .assign_supervisor(&id, &owner_id, &body.user_id, &body.pin)
            .await?,
    ))
}

async fn assign_worker(
    State(state): State<Arc<AppState>>,
    Path((id, owner_id, supervisor_id)): Path<(String, String, String)>,
    Json(body): Json<ChainMemberRequest>,
) -> Result<Json<Activity>> {
    let body = validated(body)?;
    Ok(Json(
        state
            .lockout
            .assign_worker(&id, &owner_id, &supervisor_id, &body.user_id, &body.pin)
            .await?,
    ))
}

async fn unlock_worker(
    State(state): State<Arc<AppState>>,
    Path((id, owner_id, supervisor_id, worker_id)): Path<(String, String, String, String)>,
    Json(body): Json<UnlockRequest>,
) -> Result<Json<Activity>> {
    let body = validated(body)?;
    Ok(Json(
        state
            .lockout
            .unlock_worker(&id, &owner_id, &supervisor_id, &worker_id, &body.pin)
            .await?,
    ))
}

async fn unlock_supervisor(
    State(state): State<Arc<AppState>>,
    Path((id, owner_id, supervisor_id)): Path<(String, String, String)>,
    Json(body): Json<UnlockRequest>,
) -> Result<Json<Activity>> {
    let body = validated(body)?;
    Ok(Json(
        state
            .lockout
            .unlock_supervisor(&id, &owner_id, &supervisor_id, &body.pin)
            .await?,
    ))
}

async fn unlock_energy_owner(
    State(state): State<Arc<AppState>>,
    Path((id, owner_id)): Path<(String, String)>,
    Json(body): Json<UnlockRequest>,
) -> Result<Json<Activity>> {
    let body = validated(body)?;
    Ok(Json(
        state
            .lockout
            .unlock_energy_owner(&id, &owner_id, &body.pin)
            .await?,
    ))
}

async fn finalize(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Activity>> {
    Ok(Json(state.lockout.finalize(&id).await?))
}

// ─── Conflicts ───────────────────────────────────────────────

#[derive(Serialize)]
pub struct ConflictsResponse {
    pub conflicts: Vec<LockerConflict>,
}

async fn get_conflicts(State(state): State<Arc<AppState>>) -> Json<ConflictsResponse> {
    let conflicts = state
        .store
        .read(|data| find_conflicts(data.activities.values()))
        .await;
    Json(ConflictsResponse { conflicts })
}

#[derive(Serialize)]
pub struct ResolveResponse {
    pub removed: Vec<RemovedAssignment>,
}

async fn resolve(State(state): State<Arc<AppState>>) -> Result<Json<ResolveResponse>> {
    let removed = state
        .store
        .update(|data| {
            let removed = resolve_conflicts(data);
            for r in &removed {
                data.log(
                    "activity.locker.conflict_resolved",
                    Some(&r.activity_id),
                    format!(
                        "Casillero {} del totem {} queda con la actividad {}",
                        r.locker_id, r.totem_id, r.kept_activity_id
                    ),
                );
            }
            Ok(removed)
        })
        .await?;
    Ok(Json(ResolveResponse { removed }))
}
