// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod conflicts;
pub mod credentials;
pub mod locker_device;
pub mod lockout;
pub mod occupancy;

pub use conflicts::{find_conflicts, resolve_conflicts, LockerConflict, RemovedAssignment};
pub use credentials::PinHasher;
pub use locker_device::{DeviceError, LockerDevice};
pub use lockout::{ActivityPatch, LockoutService};
pub use occupancy::{
    ClaimRequest, EquipmentClaim, EquipmentSnapshot, OccupancyError, OccupancyTracker,
};
