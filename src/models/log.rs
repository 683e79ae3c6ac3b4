// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Audit log entries and system settings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One audit log entry. `seq` grows monotonically across restarts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub action: String,
    pub activity_id: Option<String>,
    pub message: String,
}

/// Settings editable through `/configuracion`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Energy owners may only lock after zero-energy validation
    pub require_zero_energy_validation: bool,
    pub max_lockers_per_activity: u32,
    /// Highest residual voltage accepted as "zero energy"
    pub zero_energy_max_voltage: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            require_zero_energy_validation: true,
            max_lockers_per_activity: 4,
            zero_energy_max_voltage: 0.5,
        }
    }
}
