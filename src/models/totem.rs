// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Totem (locker kiosk) and locker models.

use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Status of a physical locker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[serde(rename_all = "snake_case")]
pub enum LockerStatus {
    #[default]
    Disponible,
    Ocupado,
    Mantenimiento,
    Abierto,
}

impl std::fmt::Display for LockerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LockerStatus::Disponible => "disponible",
            LockerStatus::Ocupado => "ocupado",
            LockerStatus::Mantenimiento => "mantenimiento",
            LockerStatus::Abierto => "abierto",
        };
        f.write_str(s)
    }
}

/// A kiosk hosting a set of lockers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "camelCase")]
pub struct Totem {
    pub id: String,
    pub name: String,
    pub location: Option<String>,
    pub lockers: Vec<Locker>,
}

impl Totem {
    pub fn locker(&self, locker_id: &str) -> Option<&Locker> {
        self.lockers.iter().find(|l| l.id == locker_id)
    }

    pub fn locker_mut(&mut self, locker_id: &str) -> Option<&mut Locker> {
        self.lockers.iter_mut().find(|l| l.id == locker_id)
    }
}

/// A locker ("casillero") inside a totem.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[serde(rename_all = "camelCase")]
pub struct Locker {
    pub id: String,
    /// Box number understood by the locker hardware
    pub number: u32,
    pub status: LockerStatus,
    /// Equipment whose isolation keys are stored in this locker
    pub equipos: Vec<String>,
    /// Activity currently holding the locker
    pub activity_id: Option<String>,
}

impl Locker {
    pub fn new(number: u32) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            number,
            status: LockerStatus::Disponible,
            equipos: Vec::new(),
            activity_id: None,
        }
    }

    /// Return the locker to the free pool.
    pub fn release(&mut self) {
        self.status = LockerStatus::Disponible;
        self.equipos.clear();
        self.activity_id = None;
    }
}
