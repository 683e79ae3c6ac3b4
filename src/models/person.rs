//! Personnel who take part in the lockout chain.

use serde::{Deserialize, Serialize};

/// Role a person plays in the lockout chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    DuenoEnergia,
    Supervisor,
    Trabajador,
    Admin,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Role::DuenoEnergia => "dueno_energia",
            Role::Supervisor => "supervisor",
            Role::Trabajador => "trabajador",
            Role::Admin => "admin",
        };
        f.write_str(s)
    }
}

/// Person stored in the personnel registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Person {
    pub id: String,
    pub name: String,
    pub username: String,
    pub role: Role,
    /// HMAC-SHA256 digest of the PIN (hex)
    pub pin_digest: String,
    pub active: bool,
}
