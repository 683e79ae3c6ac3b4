// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod activity;
pub mod equipment;
pub mod log;
pub mod person;
pub mod totem;

pub use activity::{
    Activity, ActivityStatus, AssignedLocker, EnergyOwnerAssignment, SupervisorAssignment,
    WorkerAssignment, ZeroEnergyValidation,
};
pub use equipment::{Area, Equipment};
pub use log::{LogEntry, Settings};
pub use person::{Person, Role};
pub use totem::{Locker, LockerStatus, Totem};
