// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Lockout workflow service.
//!
//! Drives an activity through its lifecycle:
//! 1. Equipment is claimed (through the occupancy tracker)
//! 2. Lockers are assigned and marked occupied
//! 3. Zero-energy validation is recorded
//! 4. The blocking chain is applied: energy owner -> supervisor -> worker
//! 5. The chain is released in reverse order
//! 6. The activity is finalized and its lockers and equipment freed
//!
//! Every step is one store transaction, so a failed precondition never
//! leaves a half-applied change behind.

use crate::db::{Store, StoreData};
use crate::error::{AppError, Result};
use crate::models::{
    Activity, ActivityStatus, AssignedLocker, EnergyOwnerAssignment, LockerStatus, Person, Role,
    SupervisorAssignment, WorkerAssignment, ZeroEnergyValidation,
};
use crate::services::conflicts::holder_of;
use crate::services::occupancy::{ClaimRequest, OccupancyTracker};
use crate::services::PinHasher;
use std::sync::Arc;

/// Editable activity fields.
#[derive(Debug, Default, Clone)]
pub struct ActivityPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub block_type: Option<String>,
}

/// Coordinates activities, lockers, equipment and personnel.
#[derive(Clone)]
pub struct LockoutService {
    store: Store,
    occupancy: Arc<OccupancyTracker>,
    pins: PinHasher,
}

impl LockoutService {
    pub fn new(store: Store, occupancy: Arc<OccupancyTracker>, pins: PinHasher) -> Self {
        Self {
            store,
            occupancy,
            pins,
        }
    }

    // ─── Activity CRUD ───────────────────────────────────────────

    pub async fn create_activity(
        &self,
        name: String,
        description: String,
        block_type: Option<String>,
    ) -> Result<Activity> {
        let activity = Activity::new(name, description, block_type);
        self.store
            .update(|data| {
                data.log(
                    "activity.create",
                    Some(&activity.id),
                    format!("Actividad '{}' creada", activity.name),
                );
                data.activities
                    .insert(activity.id.clone(), activity.clone());
                Ok(())
            })
            .await?;

        tracing::info!(activity_id = %activity.id, name = %activity.name, "Activity created");
        Ok(activity)
    }

    pub async fn update_activity(&self, id: &str, patch: ActivityPatch) -> Result<Activity> {
        self.store
            .update(|data| {
                let activity = active_activity_mut(data, id)?;
                if let Some(name) = patch.name {
                    activity.name = name;
                }
                if let Some(description) = patch.description {
                    activity.description = description;
                }
                if patch.block_type.is_some() {
                    activity.block_type = patch.block_type;
                }
                activity.touch();
                let updated = activity.clone();
                data.log("activity.update", Some(id), "Actividad actualizada");
                Ok(updated)
            })
            .await
    }

    /// Delete an activity, freeing its lockers and equipment.
    pub async fn delete_activity(&self, id: &str) -> Result<()> {
        self.store
            .update(|data| {
                let activity = data.activity(id)?;
                if activity.any_blocked() {
                    return Err(AppError::Conflict(
                        "Activity still has personnel locked in".to_string(),
                    ));
                }
                free_lockers(data, id);
                clear_equipment_flags(data, id);
                let removed = data.activities.remove(id);
                if let Some(activity) = removed {
                    data.log(
                        "activity.delete",
                        Some(id),
                        format!("Actividad '{}' eliminada", activity.name),
                    );
                }
                Ok(())
            })
            .await?;

        self.occupancy.release_activity(id).await?;
        tracing::info!(activity_id = id, "Activity deleted");
        Ok(())
    }

    // ─── Equipment ───────────────────────────────────────────────

    /// Attach equipment to an activity, claiming it in the occupancy tracker.
    pub async fn assign_equipment(
        &self,
        id: &str,
        equipment_id: &str,
        totem: Option<&str>,
    ) -> Result<Activity> {
        let activity_name = self
            .store
            .read(|data| -> Result<String> {
                let activity = data.activity(id)?;
                ensure_editable(activity)?;
                data.equipment(equipment_id)?;
                Ok(activity.name.clone())
            })
            .await?;

        self.occupancy
            .use_equipment(ClaimRequest {
                equipment_id,
                activity_id: id,
                activity_name: &activity_name,
                totem: totem.unwrap_or("api"),
            })
            .await?;

        let result = self
            .store
            .update(|data| {
                let activity = active_activity_mut(data, id)?;
                ensure_editable(activity)?;
                activity.equipments.push(equipment_id.to_string());
                activity.zero_energy_validation = None;
                activity.touch();
                let updated = activity.clone();
                sync_locker_equipment(data, &updated);
                clear_zero_energy_flags(data, &updated.equipments);
                data.log(
                    "activity.equipment.assign",
                    Some(id),
                    format!("Equipo {} asignado", equipment_id),
                );
                Ok(updated)
            })
            .await;

        if result.is_err() {
            // Undo the claim so the tracker and the store agree.
            if let Err(e) = self.occupancy.release_equipment(equipment_id, id).await {
                tracing::error!(
                    error = %e,
                    equipment_id,
                    activity_id = id,
                    "Failed to roll back equipment claim"
                );
            }
        }
        result
    }

    pub async fn unassign_equipment(&self, id: &str, equipment_id: &str) -> Result<Activity> {
        let updated = self
            .store
            .update(|data| {
                let activity = active_activity_mut(data, id)?;
                ensure_editable(activity)?;
                let before = activity.equipments.len();
                activity.equipments.retain(|e| e != equipment_id);
                if activity.equipments.len() == before {
                    return Err(AppError::NotFound(format!(
                        "Equipment {} is not assigned to activity {}",
                        equipment_id, id
                    )));
                }
                activity.zero_energy_validation = None;
                activity.touch();
                let updated = activity.clone();
                sync_locker_equipment(data, &updated);
                clear_zero_energy_flags(data, &updated.equipments);
                clear_zero_energy_flags(data, &[equipment_id.to_string()]);
                data.log(
                    "activity.equipment.unassign",
                    Some(id),
                    format!("Equipo {} liberado", equipment_id),
                );
                Ok(updated)
            })
            .await?;

        match self.occupancy.release_equipment(equipment_id, id).await {
            Ok(_) => {}
            Err(crate::services::OccupancyError::NotClaimed { .. }) => {
                tracing::warn!(equipment_id, activity_id = id, "Equipment was not claimed");
            }
            Err(e) => return Err(e.into()),
        }
        Ok(updated)
    }

    // ─── Lockers ─────────────────────────────────────────────────

    pub async fn assign_locker(
        &self,
        id: &str,
        totem_id: &str,
        locker_id: &str,
    ) -> Result<Activity> {
        self.store
            .update(|data| {
                let max_lockers = data.settings.max_lockers_per_activity as usize;
                let activity = data.activity(id)?;
                ensure_not_finalized(activity)?;

                if activity.holds_locker(totem_id, locker_id) {
                    return Err(AppError::Conflict(format!(
                        "Locker {} is already assigned to this activity",
                        locker_id
                    )));
                }
                if activity.assigned_lockers.len() >= max_lockers {
                    return Err(AppError::Conflict(format!(
                        "Activity already holds the maximum of {} lockers",
                        max_lockers
                    )));
                }
                if let Some(holder) = holder_of(data.activities.values(), totem_id, locker_id, id) {
                    return Err(AppError::Conflict(format!(
                        "Locker {} is already assigned to activity '{}'",
                        locker_id, holder.name
                    )));
                }

                let equipments = activity.equipments.clone();
                let locker = data
                    .totem_mut(totem_id)?
                    .locker_mut(locker_id)
                    .ok_or_else(|| AppError::NotFound(format!("Locker {} not found", locker_id)))?;

                if !matches!(locker.status, LockerStatus::Disponible | LockerStatus::Abierto) {
                    return Err(AppError::Conflict(format!(
                        "Locker {} is {}",
                        locker_id, locker.status
                    )));
                }

                locker.status = LockerStatus::Ocupado;
                locker.equipos = equipments;
                locker.activity_id = Some(id.to_string());
                let number = locker.number;

                let activity = data.activity_mut(id)?;
                activity.assigned_lockers.push(AssignedLocker {
                    totem_id: totem_id.to_string(),
                    locker_id: locker_id.to_string(),
                    assigned_at: chrono::Utc::now(),
                });
                activity.touch();
                let updated = activity.clone();

                data.log(
                    "activity.locker.assign",
                    Some(id),
                    format!("Casillero {} del totem {} asignado", number, totem_id),
                );
                tracing::info!(activity_id = id, totem_id, locker_id, "Locker assigned");
                Ok(updated)
            })
            .await
    }

    pub async fn unassign_locker(
        &self,
        id: &str,
        totem_id: &str,
        locker_id: &str,
    ) -> Result<Activity> {
        self.store
            .update(|data| {
                let activity = active_activity_mut(data, id)?;
                if activity.any_blocked() {
                    return Err(AppError::Conflict(
                        "Lockers cannot be released while personnel are locked in".to_string(),
                    ));
                }
                if !activity.holds_locker(totem_id, locker_id) {
                    return Err(AppError::NotFound(format!(
                        "Locker {} is not assigned to activity {}",
                        locker_id, id
                    )));
                }
                activity
                    .assigned_lockers
                    .retain(|l| !(l.totem_id == totem_id && l.locker_id == locker_id));
                activity.touch();
                let updated = activity.clone();

                if let Some(locker) = data
                    .totems
                    .get_mut(totem_id)
                    .and_then(|t| t.locker_mut(locker_id))
                {
                    if locker.activity_id.as_deref() == Some(id) {
                        locker.release();
                    }
                }

                data.log(
                    "activity.locker.unassign",
                    Some(id),
                    format!("Casillero {} del totem {} liberado", locker_id, totem_id),
                );
                Ok(updated)
            })
            .await
    }

    // ─── Zero-energy validation ──────────────────────────────────

    pub async fn validate_zero_energy(
        &self,
        id: &str,
        user_id: &str,
        pin: &str,
        voltage: f64,
        notes: Option<String>,
    ) -> Result<Activity> {
        self.store
            .update(|data| {
                let max_voltage = data.settings.zero_energy_max_voltage;
                self.authenticate(data, user_id, pin, Role::DuenoEnergia)?;

                let activity = active_activity_mut(data, id)?;
                if activity.equipments.is_empty() {
                    return Err(AppError::Conflict(
                        "Activity has no equipment to validate".to_string(),
                    ));
                }
                if voltage > max_voltage {
                    return Err(AppError::Conflict(format!(
                        "Residual voltage {:.2} V exceeds {:.2} V",
                        voltage, max_voltage
                    )));
                }

                activity.zero_energy_validation = Some(ZeroEnergyValidation {
                    validated_by: user_id.to_string(),
                    voltage,
                    notes,
                    validated_at: chrono::Utc::now(),
                });
                activity.touch();
                let updated = activity.clone();

                for equipment_id in &updated.equipments {
                    if let Some(equipment) = data.equipment.get_mut(equipment_id) {
                        equipment.zero_energy_validated = true;
                    }
                }

                data.log(
                    "activity.zero_energy",
                    Some(id),
                    format!("Energia cero validada ({:.2} V)", voltage),
                );
                Ok(updated)
            })
            .await
    }

    // ─── Blocking chain ──────────────────────────────────────────

    pub async fn assign_energy_owner(
        &self,
        id: &str,
        user_id: &str,
        pin: &str,
    ) -> Result<Activity> {
        self.store
            .update(|data| {
                let require_validation = data.settings.require_zero_energy_validation;
                let person_name = self
                    .authenticate(data, user_id, pin, Role::DuenoEnergia)?
                    .name
                    .clone();

                let activity = active_activity_mut(data, id)?;
                if activity.assigned_lockers.is_empty() {
                    return Err(AppError::Conflict(
                        "Assign a locker before locking the activity".to_string(),
                    ));
                }
                if require_validation && activity.zero_energy_validation.is_none() {
                    return Err(AppError::Conflict(
                        "Zero-energy validation is required first".to_string(),
                    ));
                }
                ensure_not_involved(activity, user_id)?;

                activity.energy_owners.push(EnergyOwnerAssignment {
                    user_id: user_id.to_string(),
                    is_blocked: true,
                    supervisors: Vec::new(),
                });
                activity.is_blocked = true;
                activity.status = ActivityStatus::EnProceso;
                activity.touch();
                let updated = activity.clone();

                set_equipment_locked(data, &updated.equipments, true);
                data.log(
                    "activity.energy_owner.assign",
                    Some(id),
                    format!("Dueno de energia {} bloqueado", person_name),
                );
                tracing::info!(activity_id = id, user_id, "Energy owner locked in");
                Ok(updated)
            })
            .await
    }

    pub async fn assign_supervisor(
        &self,
        id: &str,
        owner_id: &str,
        user_id: &str,
        pin: &str,
    ) -> Result<Activity> {
        self.store
            .update(|data| {
                let person_name = self
                    .authenticate(data, user_id, pin, Role::Supervisor)?
                    .name
                    .clone();

                let activity = active_activity_mut(data, id)?;
                ensure_not_involved(activity, user_id)?;
                let owner = find_owner(activity, owner_id)?;
                if !owner.is_blocked {
                    return Err(AppError::Conflict(
                        "Energy owner has already unlocked".to_string(),
                    ));
                }
                owner.supervisors.push(SupervisorAssignment {
                    user_id: user_id.to_string(),
                    is_blocked: true,
                    workers: Vec::new(),
                });
                activity.touch();
                let updated = activity.clone();

                data.log(
                    "activity.supervisor.assign",
                    Some(id),
                    format!("Supervisor {} bloqueado", person_name),
                );
                Ok(updated)
            })
            .await
    }

    pub async fn assign_worker(
        &self,
        id: &str,
        owner_id: &str,
        supervisor_id: &str,
        user_id: &str,
        pin: &str,
    ) -> Result<Activity> {
        self.store
            .update(|data| {
                let person_name = self
                    .authenticate(data, user_id, pin, Role::Trabajador)?
                    .name
                    .clone();

                let activity = active_activity_mut(data, id)?;
                ensure_not_involved(activity, user_id)?;
                let supervisor = find_owner(activity, owner_id)?
                    .supervisor_mut(supervisor_id)
                    .ok_or_else(|| supervisor_not_found(supervisor_id))?;
                if !supervisor.is_blocked {
                    return Err(AppError::Conflict(
                        "Supervisor has already unlocked".to_string(),
                    ));
                }
                supervisor.workers.push(WorkerAssignment {
                    user_id: user_id.to_string(),
                    is_blocked: true,
                });
                activity.touch();
                let updated = activity.clone();

                data.log(
                    "activity.worker.assign",
                    Some(id),
                    format!("Trabajador {} bloqueado", person_name),
                );
                Ok(updated)
            })
            .await
    }

    pub async fn unlock_worker(
        &self,
        id: &str,
        owner_id: &str,
        supervisor_id: &str,
        worker_id: &str,
        pin: &str,
    ) -> Result<Activity> {
        self.store
            .update(|data| {
                self.authenticate(data, worker_id, pin, Role::Trabajador)?;

                let activity = active_activity_mut(data, id)?;
                let worker = find_owner(activity, owner_id)?
                    .supervisor_mut(supervisor_id)
                    .ok_or_else(|| supervisor_not_found(supervisor_id))?
                    .worker_mut(worker_id)
                    .ok_or_else(|| {
                        AppError::NotFound(format!("Worker {} not in this activity", worker_id))
                    })?;
                if !worker.is_blocked {
                    return Err(AppError::Conflict("Worker is already unlocked".to_string()));
                }
                worker.is_blocked = false;
                activity.touch();
                let updated = activity.clone();

                data.log("activity.worker.unlock", Some(id), "Trabajador desbloqueado");
                Ok(updated)
            })
            .await
    }

    pub async fn unlock_supervisor(
        &self,
        id: &str,
        owner_id: &str,
        supervisor_id: &str,
        pin: &str,
    ) -> Result<Activity> {
        self.store
            .update(|data| {
                self.authenticate(data, supervisor_id, pin, Role::Supervisor)?;

                let activity = active_activity_mut(data, id)?;
                let supervisor = find_owner(activity, owner_id)?
                    .supervisor_mut(supervisor_id)
                    .ok_or_else(|| supervisor_not_found(supervisor_id))?;
                if !supervisor.is_blocked {
                    return Err(AppError::Conflict(
                        "Supervisor is already unlocked".to_string(),
                    ));
                }
                if supervisor.workers.iter().any(|w| w.is_blocked) {
                    return Err(AppError::Conflict(
                        "All workers must unlock before their supervisor".to_string(),
                    ));
                }
                supervisor.is_blocked = false;
                activity.touch();
                let updated = activity.clone();

                data.log("activity.supervisor.unlock", Some(id), "Supervisor desbloqueado");
                Ok(updated)
            })
            .await
    }

    /// Unlock an energy owner. Once every owner is unlocked the activity
    /// itself is no longer blocked.
    pub async fn unlock_energy_owner(
        &self,
        id: &str,
        owner_id: &str,
        pin: &str,
    ) -> Result<Activity> {
        self.store
            .update(|data| {
                self.authenticate(data, owner_id, pin, Role::DuenoEnergia)?;

                let activity = active_activity_mut(data, id)?;
                let owner = find_owner(activity, owner_id)?;
                if !owner.is_blocked {
                    return Err(AppError::Conflict(
                        "Energy owner is already unlocked".to_string(),
                    ));
                }
                if owner.supervisors.iter().any(|s| s.is_blocked) {
                    return Err(AppError::Conflict(
                        "All supervisors must unlock before the energy owner".to_string(),
                    ));
                }
                owner.is_blocked = false;
                activity.is_blocked = activity.any_blocked();
                activity.touch();
                let updated = activity.clone();

                if !updated.is_blocked {
                    set_equipment_locked(data, &updated.equipments, false);
                }
                data.log(
                    "activity.energy_owner.unlock",
                    Some(id),
                    "Dueno de energia desbloqueado",
                );
                Ok(updated)
            })
            .await
    }

    /// Close an activity and free everything it holds.
    pub async fn finalize(&self, id: &str) -> Result<Activity> {
        let updated = self
            .store
            .update(|data| {
                let activity = active_activity_mut(data, id)?;
                if activity.any_blocked() {
                    return Err(AppError::Conflict(
                        "Every lock in the chain must be removed before finalizing".to_string(),
                    ));
                }
                let now = chrono::Utc::now();
                activity.status = ActivityStatus::Finalizada;
                activity.is_blocked = false;
                activity.finalized_at = Some(now);
                activity.updated_at = now;
                let updated = activity.clone();

                free_lockers(data, id);
                clear_equipment_flags(data, id);
                data.log("activity.finalize", Some(id), "Actividad finalizada");
                Ok(updated)
            })
            .await?;

        self.occupancy.release_activity(id).await?;
        tracing::info!(activity_id = id, "Activity finalized");
        Ok(updated)
    }

    /// Drop occupancy claims that belong to finalized or deleted activities.
    ///
    /// Run at startup: a crash between a store commit and the matching
    /// occupancy release leaves such claims behind.
    pub async fn reconcile_occupancy(&self) -> Result<usize> {
        let snapshot = self.occupancy.snapshot().await;
        let mut stale: Vec<String> = self
            .store
            .read(|data| {
                snapshot
                    .values()
                    .map(|claim| claim.activity_id.clone())
                    .filter(|activity_id| {
                        data.activities
                            .get(activity_id)
                            .map_or(true, |a| a.is_finalized())
                    })
                    .collect()
            })
            .await;
        stale.sort();
        stale.dedup();

        let mut released = 0;
        for activity_id in &stale {
            released += self.occupancy.release_activity(activity_id).await?.len();
        }
        if released > 0 {
            tracing::warn!(
                activities = stale.len(),
                equipment = released,
                "Released stale occupancy claims"
            );
        }
        Ok(released)
    }

    // ─── Helpers ─────────────────────────────────────────────────

    /// Check a person's PIN and role.
    fn authenticate<'a>(
        &self,
        data: &'a StoreData,
        user_id: &str,
        pin: &str,
        role: Role,
    ) -> Result<&'a Person> {
        let person = data.person(user_id)?;
        if !person.active {
            return Err(AppError::Unauthorized);
        }
        if !self.pins.verify(pin, &person.pin_digest)? {
            tracing::warn!(user_id, "PIN verification failed");
            return Err(AppError::Unauthorized);
        }
        if person.role != role {
            return Err(AppError::BadRequest(format!(
                "{} has role {}, expected {}",
                person.name, person.role, role
            )));
        }
        Ok(person)
    }
}

fn ensure_not_finalized(activity: &Activity) -> Result<()> {
    if activity.is_finalized() {
        return Err(AppError::Conflict(format!(
            "Activity {} is finalized",
            activity.id
        )));
    }
    Ok(())
}

/// Equipment can only change before isolation is applied.
fn ensure_editable(activity: &Activity) -> Result<()> {
    ensure_not_finalized(activity)?;
    if activity.is_blocked {
        return Err(AppError::Conflict(
            "Equipment cannot change while the activity is blocked".to_string(),
        ));
    }
    Ok(())
}

fn ensure_not_involved(activity: &Activity, user_id: &str) -> Result<()> {
    if activity.involves(user_id) {
        return Err(AppError::Conflict(format!(
            "User {} is already part of this activity",
            user_id
        )));
    }
    Ok(())
}

fn active_activity_mut<'a>(data: &'a mut StoreData, id: &str) -> Result<&'a mut Activity> {
    let activity = data.activity_mut(id)?;
    ensure_not_finalized(activity)?;
    Ok(activity)
}

fn find_owner<'a>(
    activity: &'a mut Activity,
    owner_id: &str,
) -> Result<&'a mut EnergyOwnerAssignment> {
    activity.energy_owner_mut(owner_id).ok_or_else(|| {
        AppError::NotFound(format!("Energy owner {} not in this activity", owner_id))
    })
}

fn supervisor_not_found(supervisor_id: &str) -> AppError {
    AppError::NotFound(format!("Supervisor {} not in this activity", supervisor_id))
}

/// Release every locker the activity holds.
fn free_lockers(data: &mut StoreData, activity_id: &str) {
    for totem in data.totems.values_mut() {
        for locker in &mut totem.lockers {
            if locker.activity_id.as_deref() == Some(activity_id) {
                locker.release();
            }
        }
    }
}

/// Keep the equipment list stored in each held locker in step with the activity.
fn sync_locker_equipment(data: &mut StoreData, activity: &Activity) {
    for assigned in &activity.assigned_lockers {
        if let Some(locker) = data
            .totems
            .get_mut(&assigned.totem_id)
            .and_then(|t| t.locker_mut(&assigned.locker_id))
        {
            locker.equipos = activity.equipments.clone();
        }
    }
}

fn set_equipment_locked(data: &mut StoreData, equipment_ids: &[String], locked: bool) {
    for equipment_id in equipment_ids {
        if let Some(equipment) = data.equipment.get_mut(equipment_id) {
            equipment.locked = locked;
        }
    }
}

/// A changed equipment list invalidates the activity's zero-energy reading.
fn clear_zero_energy_flags(data: &mut StoreData, equipment_ids: &[String]) {
    for equipment_id in equipment_ids {
        if let Some(equipment) = data.equipment.get_mut(equipment_id) {
            equipment.zero_energy_validated = false;
        }
    }
}

fn clear_equipment_flags(data: &mut StoreData, activity_id: &str) {
    let equipment_ids = data
        .activities
        .get(activity_id)
        .map(|a| a.equipments.clone())
        .unwrap_or_default();
    for equipment_id in &equipment_ids {
        if let Some(equipment) = data.equipment.get_mut(equipment_id) {
            equipment.locked = false;
            equipment.zero_energy_validated = false;
        }
    }
}
