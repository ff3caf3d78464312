use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

/// Seeded role names. `SuperAdmin` is only ever granted globally.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema,
)]
pub enum RoleName {
    SuperAdmin,
    Admin,
    Responder,
    Reporter,
}

pub const SUPER_ADMIN_ONLY: &[RoleName] = &[RoleName::SuperAdmin];
pub const ADMINS: &[RoleName] = &[RoleName::Admin, RoleName::SuperAdmin];
pub const RESPONDERS: &[RoleName] = &[RoleName::Responder, RoleName::Admin, RoleName::SuperAdmin];
pub const MEMBERS: &[RoleName] = &[
    RoleName::Reporter,
    RoleName::Responder,
    RoleName::Admin,
    RoleName::SuperAdmin,
];

impl RoleName {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoleName::SuperAdmin => "SuperAdmin",
            RoleName::Admin => "Admin",
            RoleName::Responder => "Responder",
            RoleName::Reporter => "Reporter",
        }
    }

    /// Roles that handle reports for an event.
    pub fn is_responder(&self) -> bool {
        matches!(self, RoleName::Responder | RoleName::Admin)
    }
}

impl fmt::Display for RoleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoleName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SuperAdmin" => Ok(RoleName::SuperAdmin),
            "Admin" => Ok(RoleName::Admin),
            "Responder" => Ok(RoleName::Responder),
            "Reporter" => Ok(RoleName::Reporter),
            other => Err(format!("unknown role: {other}")),
        }
    }
}
