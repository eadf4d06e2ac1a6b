//! Program, facility and staff value types used by the authorize flow.

use serde::{Deserialize, Serialize};

/// An organisational program a user can work in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Program {
    pub id: String,
    pub name: String,
    pub organisation_id: String,
}

/// A health facility attached to a program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Facility {
    pub id: String,
    pub name: String,
}

/// A user's staff record within one program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaffProfile {
    pub id: String,
    pub user_id: String,
    pub program_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_facility_id: Option<String>,
}
