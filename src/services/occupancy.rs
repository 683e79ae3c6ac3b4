// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Equipment occupancy tracking.
//!
//! Owns the authoritative "which equipment is in use, by which activity,
//! from which totem" state. Both the WebSocket relay and the REST API claim
//! and release equipment through this service; every change is persisted
//! to the state file and published to subscribers.

use crate::db::file::{read_json, write_json_atomic, StoreError};
use crate::error::AppError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use tokio::sync::{broadcast, Mutex};

/// Capacity of the snapshot broadcast channel. Slow subscribers skip to the
/// newest snapshot.
const UPDATE_CHANNEL_CAPACITY: usize = 64;

/// Who holds a piece of equipment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EquipmentClaim {
    pub totem: String,
    pub activity_id: String,
    pub activity_name: String,
}

/// Equipment id -> claim.
pub type EquipmentSnapshot = BTreeMap<String, EquipmentClaim>;

#[derive(Debug, Clone, Default)]
struct OccupancyState {
    equipos_en_uso: EquipmentSnapshot,
    actividades_equipos: BTreeMap<String, BTreeSet<String>>,
}

/// On-disk layout of the state file.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersistedOccupancy {
    equipos_en_uso: EquipmentSnapshot,
    actividades_equipos: BTreeMap<String, Vec<String>>,
    timestamp: DateTime<Utc>,
}

/// Errors from claiming or releasing equipment.
#[derive(Debug, thiserror::Error)]
pub enum OccupancyError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Equipment {equipment_id} is already assigned to activity {activity_id}")]
    AlreadyClaimed {
        equipment_id: String,
        activity_id: String,
    },

    #[error("Equipment {equipment_id} is in use by activity {holder}")]
    InUseByOther { equipment_id: String, holder: String },

    #[error("Equipment {equipment_id} is not assigned to activity {activity_id}")]
    NotClaimed {
        equipment_id: String,
        activity_id: String,
    },

    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl OccupancyError {
    /// Code sent to relay clients in `error-equipo`.
    pub fn code(&self) -> &'static str {
        match self {
            OccupancyError::MissingField(_) => "campo_requerido",
            OccupancyError::AlreadyClaimed { .. } => "equipo_ya_asignado",
            OccupancyError::InUseByOther { .. } => "equipo_ocupado",
            OccupancyError::NotClaimed { .. } => "equipo_no_asignado",
            OccupancyError::Storage(_) => "error_persistencia",
        }
    }
}

impl From<OccupancyError> for AppError {
    fn from(err: OccupancyError) -> Self {
        match err {
            OccupancyError::MissingField(_) => AppError::BadRequest(err.to_string()),
            OccupancyError::AlreadyClaimed { .. } | OccupancyError::InUseByOther { .. } => {
                AppError::Conflict(err.to_string())
            }
            OccupancyError::NotClaimed { .. } => AppError::NotFound(err.to_string()),
            OccupancyError::Storage(e) => e.into(),
        }
    }
}

/// Request to claim a piece of equipment.
#[derive(Debug, Clone)]
pub struct ClaimRequest<'a> {
    pub equipment_id: &'a str,
    pub activity_id: &'a str,
    pub activity_name: &'a str,
    pub totem: &'a str,
}

/// Tracks equipment in use across all activities.
pub struct OccupancyTracker {
    state: Mutex<OccupancyState>,
    path: Option<PathBuf>,
    updates: broadcast::Sender<EquipmentSnapshot>,
}

impl OccupancyTracker {
    /// Load state from `path`. A corrupt file is logged and replaced by an
    /// empty state on the next write.
    pub async fn load(path: PathBuf) -> Result<Self, StoreError> {
        let state = match read_json::<PersistedOccupancy>(&path).await {
            Ok(Some(persisted)) => {
                tracing::info!(
                    path = %path.display(),
                    equipment = persisted.equipos_en_uso.len(),
                    saved_at = %persisted.timestamp,
                    "Occupancy state restored"
                );
                OccupancyState {
                    equipos_en_uso: persisted.equipos_en_uso,
                    actividades_equipos: persisted
                        .actividades_equipos
                        .into_iter()
                        .map(|(k, v)| (k, v.into_iter().collect()))
                        .collect(),
                }
            }
            Ok(None) => OccupancyState::default(),
            Err(StoreError::Malformed { path, source }) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %source,
                    "Occupancy state file is corrupt, starting empty"
                );
                OccupancyState::default()
            }
            Err(e) => return Err(e),
        };

        Ok(Self::with_state(state, Some(path)))
    }

    /// Tracker that is never persisted (tests).
    pub fn in_memory() -> Self {
        Self::with_state(OccupancyState::default(), None)
    }

    fn with_state(state: OccupancyState, path: Option<PathBuf>) -> Self {
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        Self {
            state: Mutex::new(state),
            path,
            updates,
        }
    }

    /// Subscribe to snapshots published after every mutation.
    pub fn subscribe(&self) -> broadcast::Receiver<EquipmentSnapshot> {
        self.updates.subscribe()
    }

    /// Current equipment-in-use map.
    pub async fn snapshot(&self) -> EquipmentSnapshot {
        self.state.lock().await.equipos_en_uso.clone()
    }

    /// Claim holding `equipment_id`, if any.
    pub async fn claim_of(&self, equipment_id: &str) -> Option<EquipmentClaim> {
        self.state
            .lock()
            .await
            .equipos_en_uso
            .get(equipment_id)
            .cloned()
    }

    /// Equipment ids held by an activity.
    pub async fn equipment_for(&self, activity_id: &str) -> Vec<String> {
        self.state
            .lock()
            .await
            .actividades_equipos
            .get(activity_id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Mark equipment as in use by an activity.
    pub async fn use_equipment(
        &self,
        req: ClaimRequest<'_>,
    ) -> Result<EquipmentSnapshot, OccupancyError> {
        if req.equipment_id.trim().is_empty() {
            return Err(OccupancyError::MissingField("equipoId"));
        }
        if req.activity_id.trim().is_empty() {
            return Err(OccupancyError::MissingField("actividadId"));
        }

        self.mutate(|state| {
            if state
                .actividades_equipos
                .get(req.activity_id)
                .is_some_and(|set| set.contains(req.equipment_id))
            {
                return Err(OccupancyError::AlreadyClaimed {
                    equipment_id: req.equipment_id.to_string(),
                    activity_id: req.activity_id.to_string(),
                });
            }

            if let Some(existing) = state.equipos_en_uso.get(req.equipment_id) {
                return Err(OccupancyError::InUseByOther {
                    equipment_id: req.equipment_id.to_string(),
                    holder: existing.activity_id.clone(),
                });
            }

            state.equipos_en_uso.insert(
                req.equipment_id.to_string(),
                EquipmentClaim {
                    totem: req.totem.to_string(),
                    activity_id: req.activity_id.to_string(),
                    activity_name: req.activity_name.to_string(),
                },
            );
            state
                .actividades_equipos
                .entry(req.activity_id.to_string())
                .or_default()
                .insert(req.equipment_id.to_string());

            tracing::info!(
                equipment_id = req.equipment_id,
                activity_id = req.activity_id,
                totem = req.totem,
                "Equipment claimed"
            );
            Ok(())
        })
        .await
    }

    /// Release equipment held by an activity.
    pub async fn release_equipment(
        &self,
        equipment_id: &str,
        activity_id: &str,
    ) -> Result<EquipmentSnapshot, OccupancyError> {
        if equipment_id.trim().is_empty() {
            return Err(OccupancyError::MissingField("equipoId"));
        }
        if activity_id.trim().is_empty() {
            return Err(OccupancyError::MissingField("actividadId"));
        }

        self.mutate(|state| {
            match state.equipos_en_uso.get(equipment_id) {
                Some(claim) if claim.activity_id == activity_id => {}
                Some(claim) => {
                    return Err(OccupancyError::InUseByOther {
                        equipment_id: equipment_id.to_string(),
                        holder: claim.activity_id.clone(),
                    })
                }
                None => {
                    return Err(OccupancyError::NotClaimed {
                        equipment_id: equipment_id.to_string(),
                        activity_id: activity_id.to_string(),
                    })
                }
            }

            state.equipos_en_uso.remove(equipment_id);
            remove_from_activity(state, activity_id, equipment_id);

            tracing::info!(equipment_id, activity_id, "Equipment released");
            Ok(())
        })
        .await
    }

    /// Release everything an activity holds. Returns the released ids.
    pub async fn release_activity(&self, activity_id: &str) -> Result<Vec<String>, OccupancyError> {
        let mut released = Vec::new();
        self.mutate(|state| {
            if let Some(set) = state.actividades_equipos.remove(activity_id) {
                for equipment_id in set {
                    state.equipos_en_uso.remove(&equipment_id);
                    released.push(equipment_id);
                }
            }
            Ok(())
        })
        .await?;

        if !released.is_empty() {
            tracing::info!(activity_id, count = released.len(), "Activity equipment released");
        }
        Ok(released)
    }

    /// Release everything claimed from a totem. Returns the released ids.
    pub async fn release_totem(&self, totem: &str) -> Result<Vec<String>, OccupancyError> {
        let mut released = Vec::new();
        self.mutate(|state| {
            let held: Vec<(String, String)> = state
                .equipos_en_uso
                .iter()
                .filter(|(_, claim)| claim.totem == totem)
                .map(|(id, claim)| (id.clone(), claim.activity_id.clone()))
                .collect();

            for (equipment_id, activity_id) in held {
                state.equipos_en_uso.remove(&equipment_id);
                remove_from_activity(state, &activity_id, &equipment_id);
                released.push(equipment_id);
            }
            Ok(())
        })
        .await?;

        if !released.is_empty() {
            tracing::warn!(totem, count = released.len(), "Totem equipment released");
        }
        Ok(released)
    }

    /// Apply `f` to a draft; persist and publish only when it succeeds and
    /// actually changed something.
    async fn mutate(
        &self,
        f: impl FnOnce(&mut OccupancyState) -> Result<(), OccupancyError>,
    ) -> Result<EquipmentSnapshot, OccupancyError> {
        let mut guard = self.state.lock().await;
        let mut draft = guard.clone();
        f(&mut draft)?;

        let changed = draft.equipos_en_uso != guard.equipos_en_uso;
        if changed {
            if let Some(path) = &self.path {
                write_json_atomic(path, &draft.to_persisted()).await?;
            }
        }

        *guard = draft;
        let snapshot = guard.equipos_en_uso.clone();
        drop(guard);

        if changed {
            // No subscribers is fine.
            let _ = self.updates.send(snapshot.clone());
        }
        Ok(snapshot)
    }
}

impl OccupancyState {
    fn to_persisted(&self) -> PersistedOccupancy {
        PersistedOccupancy {
            equipos_en_uso: self.equipos_en_uso.clone(),
            actividades_equipos: self
                .actividades_equipos
                .iter()
                .map(|(k, v)| (k.clone(), v.iter().cloned().collect()))
                .collect(),
            timestamp: Utc::now(),
        }
    }
}

fn remove_from_activity(state: &mut OccupancyState, activity_id: &str, equipment_id: &str) {
    if let Some(set) = state.actividades_equipos.get_mut(activity_id) {
        set.remove(equipment_id);
        if set.is_empty() {
            state.actividades_equipos.remove(activity_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claim<'a>(equipment_id: &'a str, activity_id: &'a str, totem: &'a str) -> ClaimRequest<'a> {
        ClaimRequest {
            equipment_id,
            activity_id,
            activity_name: "Mantencion bomba",
            totem,
        }
    }

    #[tokio::test]
    async fn test_same_activity_cannot_claim_twice() {
        let tracker = OccupancyTracker::in_memory();
        tracker.use_equipment(claim("eq1", "act1", "t1")).await.unwrap();

        let err = tracker
            .use_equipment(claim("eq1", "act1", "t1"))
            .await
            .unwrap_err();
        assert!(matches!(err, OccupancyError::AlreadyClaimed { .. }));
        assert_eq!(err.code(), "equipo_ya_asignado");
    }

    #[tokio::test]
    async fn test_other_activity_is_rejected() {
        let tracker = OccupancyTracker::in_memory();
        tracker.use_equipment(claim("eq1", "act1", "t1")).await.unwrap();

        let err = tracker
            .use_equipment(claim("eq1", "act2", "t2"))
            .await
            .unwrap_err();
        match err {
            OccupancyError::InUseByOther { holder, .. } => assert_eq!(holder, "act1"),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(tracker.claim_of("eq1").await.unwrap().totem, "t1");
    }

    #[tokio::test]
    async fn test_release_drops_empty_activity_entry() {
        let tracker = OccupancyTracker::in_memory();
        tracker.use_equipment(claim("eq1", "act1", "t1")).await.unwrap();
        tracker.use_equipment(claim("eq2", "act1", "t1")).await.unwrap();

        tracker.release_equipment("eq1", "act1").await.unwrap();
        assert_eq!(tracker.equipment_for("act1").await, vec!["eq2".to_string()]);

        let snapshot = tracker.release_equipment("eq2", "act1").await.unwrap();
        assert!(snapshot.is_empty());
        assert!(tracker.state.lock().await.actividades_equipos.is_empty());
    }

    #[tokio::test]
    async fn test_release_by_wrong_activity_rejected() {
        let tracker = OccupancyTracker::in_memory();
        tracker.use_equipment(claim("eq1", "act1", "t1")).await.unwrap();

        let err = tracker.release_equipment("eq1", "act2").await.unwrap_err();
        assert!(matches!(err, OccupancyError::InUseByOther { .. }));

        let err = tracker.release_equipment("eq9", "act1").await.unwrap_err();
        assert!(matches!(err, OccupancyError::NotClaimed { .. }));
    }

    #[tokio::test]
    async fn test_missing_ids_rejected() {
        let tracker = OccupancyTracker::in_memory();
        let err = tracker.use_equipment(claim("", "act1", "t1")).await.unwrap_err();
        assert!(matches!(err, OccupancyError::MissingField("equipoId")));

        let err = tracker.release_equipment("eq1", " ").await.unwrap_err();
        assert!(matches!(err, OccupancyError::MissingField("actividadId")));
    }

    #[tokio::test]
    async fn test_release_totem_only_touches_that_totem() {
        let tracker = OccupancyTracker::in_memory();
        tracker.use_equipment(claim("eq1", "act1", "t1")).await.unwrap();
        tracker.use_equipment(claim("eq2", "act2", "t2")).await.unwrap();

        let released = tracker.release_totem("t1").await.unwrap();
        assert_eq!(released, vec!["eq1".to_string()]);

        let snapshot = tracker.snapshot().await;
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.contains_key("eq2"));
    }

    #[tokio::test]
    async fn test_updates_are_published() {
        let tracker = OccupancyTracker::in_memory();
        let mut rx = tracker.subscribe();

        tracker.use_equipment(claim("eq1", "act1", "t1")).await.unwrap();
        let snapshot = rx.recv().await.unwrap();
        assert_eq!(snapshot["eq1"].activity_id, "act1");

        // No-op release publishes nothing.
        tracker.release_activity("unknown").await.unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_state_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("equipment-state.json");

        let tracker = OccupancyTracker::load(path.clone()).await.unwrap();
        tracker.use_equipment(claim("eq1", "act1", "t1")).await.unwrap();

        let raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(raw["equiposEnUso"]["eq1"]["activityId"], "act1");
        assert_eq!(raw["actividadesEquipos"]["act1"][0], "eq1");
        assert!(raw["timestamp"].is_string());

        let reloaded = OccupancyTracker::load(path).await.unwrap();
        assert_eq!(reloaded.equipment_for("act1").await, vec!["eq1".to_string()]);
    }

    #[tokio::test]
    async fn test_corrupt_state_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("equipment-state.json");
        std::fs::write(&path, "{{{").unwrap();

        let tracker = OccupancyTracker::load(path).await.unwrap();
        assert!(tracker.snapshot().await.is_empty());
    }
}
