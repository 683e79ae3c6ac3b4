// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Lockout activity model and the blocking chain attached to it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Lifecycle of an activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[serde(rename_all = "snake_case")]
pub enum ActivityStatus {
    #[default]
    Pendiente,
    EnProceso,
    Finalizada,
}

impl ActivityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityStatus::Pendiente => "pendiente",
            ActivityStatus::EnProceso => "en_proceso",
            ActivityStatus::Finalizada => "finalizada",
        }
    }
}

/// Stored lockout activity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub id: String,
    pub name: String,
    pub description: String,
    pub status: ActivityStatus,
    pub is_blocked: bool,
    /// Kind of isolation applied (e.g. "electrico", "mecanico")
    pub block_type: Option<String>,
    pub assigned_lockers: Vec<AssignedLocker>,
    pub energy_owners: Vec<EnergyOwnerAssignment>,
    /// Equipment ids, in assignment order
    pub equipments: Vec<String>,
    pub zero_energy_validation: Option<ZeroEnergyValidation>,
    #[cfg_attr(feature = "binding-generation", ts(type = "string"))]
    pub created_at: DateTime<Utc>,
    #[cfg_attr(feature = "binding-generation", ts(type = "string"))]
    pub updated_at: DateTime<Utc>,
    #[cfg_attr(feature = "binding-generation", ts(type = "string | null"))]
    pub finalized_at: Option<DateTime<Utc>>,
}

impl Activity {
    pub fn new(name: String, description: String, block_type: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name,
            description,
            status: ActivityStatus::Pendiente,
            is_blocked: false,
            block_type,
            assigned_lockers: Vec::new(),
            energy_owners: Vec::new(),
            equipments: Vec::new(),
            zero_energy_validation: None,
            created_at: now,
            updated_at: now,
            finalized_at: None,
        }
    }

    pub fn is_finalized(&self) -> bool {
        self.status == ActivityStatus::Finalizada
    }

    pub fn holds_locker(&self, totem_id: &str, locker_id: &str) -> bool {
        self.assigned_lockers
            .iter()
            .any(|l| l.totem_id == totem_id && l.locker_id == locker_id)
    }

    /// True while anyone in the chain still has their lock applied.
    pub fn any_blocked(&self) -> bool {
        self.energy_owners.iter().any(|o| {
            o.is_blocked
                || o.supervisors
                    .iter()
                    .any(|s| s.is_blocked || s.workers.iter().any(|w| w.is_blocked))
        })
    }

    pub fn energy_owner_mut(&mut self, user_id: &str) -> Option<&mut EnergyOwnerAssignment> {
        self.energy_owners.iter_mut().find(|o| o.user_id == user_id)
    }

    /// Whether a person already appears anywhere in this activity's chain.
    pub fn involves(&self, user_id: &str) -> bool {
        self.energy_owners.iter().any(|o| {
            o.user_id == user_id
                || o.supervisors.iter().any(|s| {
                    s.user_id == user_id || s.workers.iter().any(|w| w.user_id == user_id)
                })
        })
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// A locker held by an activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[serde(rename_all = "camelCase")]
pub struct AssignedLocker {
    pub totem_id: String,
    pub locker_id: String,
    #[cfg_attr(feature = "binding-generation", ts(type = "string"))]
    pub assigned_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[serde(rename_all = "camelCase")]
pub struct EnergyOwnerAssignment {
    pub user_id: String,
    pub is_blocked: bool,
    pub supervisors: Vec<SupervisorAssignment>,
}

impl EnergyOwnerAssignment {
    pub fn supervisor_mut(&mut self, user_id: &str) -> Option<&mut SupervisorAssignment> {
        self.supervisors.iter_mut().find(|s| s.user_id == user_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[serde(rename_all = "camelCase")]
pub struct SupervisorAssignment {
    pub user_id: String,
    pub is_blocked: bool,
    pub workers: Vec<WorkerAssignment>,
}

impl SupervisorAssignment {
    pub fn worker_mut(&mut self, user_id: &str) -> Option<&mut WorkerAssignment> {
        self.workers.iter_mut().find(|w| w.user_id == user_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[serde(rename_all = "camelCase")]
pub struct WorkerAssignment {
    pub user_id: String,
    pub is_blocked: bool,
}

/// Measurement confirming the activity's equipment is de-energized.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[serde(rename_all = "camelCase")]
pub struct ZeroEnergyValidation {
    pub validated_by: String,
    /// Residual voltage measured (volts)
    pub voltage: f64,
    pub notes: Option<String>,
    #[cfg_attr(feature = "binding-generation", ts(type = "string"))]
    pub validated_at: DateTime<Utc>,
}
