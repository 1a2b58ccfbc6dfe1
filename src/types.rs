/// Shared types used across the codebase

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Staff and student roles carried in bearer tokens.
/// Endpoints dispatch on this with exhaustive matches, so a new role has to be
/// placed explicitly at every authorization point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Student,
    Instructor,
    ProgramHead,
    Dean,
    Registrar,
    Accounting,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Instructor => "instructor",
            Role::ProgramHead => "program_head",
            Role::Dean => "dean",
            Role::Registrar => "registrar",
            Role::Accounting => "accounting",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "student" => Ok(Role::Student),
            "instructor" => Ok(Role::Instructor),
            "program_head" => Ok(Role::ProgramHead),
            "dean" => Ok(Role::Dean),
            "registrar" => Ok(Role::Registrar),
            "accounting" => Ok(Role::Accounting),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

/// Already-authenticated caller: a student id or a staff id plus role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub id: i64,
    pub role: Role,
    pub name: String,
}

impl Principal {
    pub fn new(id: i64, role: Role, name: impl Into<String>) -> Self {
        Self {
            id,
            role,
            name: name.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trips_through_its_wire_name() {
        for role in [
            Role::Student,
            Role::Instructor,
            Role::ProgramHead,
            Role::Dean,
            Role::Registrar,
            Role::Accounting,
            Role::Admin,
        ] {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
            let json = serde_json::to_value(role).unwrap();
            assert_eq!(json, serde_json::json!(role.as_str()));
        }
    }

    #[test]
    fn unknown_role_is_rejected() {
        assert!("superuser".parse::<Role>().is_err());
    }
}
