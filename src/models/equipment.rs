//! Areas and the equipment isolated during lockout.

use serde::{Deserialize, Serialize};

/// Plant area grouping equipment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Area {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
}

/// Isolable equipment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Equipment {
    pub id: String,
    pub name: String,
    pub area_id: String,
    pub zero_energy_validated: bool,
    pub locked: bool,
}
