//! Creation and update payloads consumed by the aggregate store.
//!
//! `Create*` structs carry fully resolved values: derived fields such as
//! `Attendance.hours_contributed` are computed by the service layer before
//! the store sees them. `Update*` structs use `Some` to mean "set this
//! field" and `None` to mean "leave it alone".

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::{EventStatus, Provider};
use crate::permissions::Role;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUser {
    pub email: String,
    pub name: String,
    pub password_hash: String,
    pub image: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateUser {
    pub name: Option<String>,
    pub image: Option<String>,
    pub phone_number: Option<String>,
    pub address: Option<String>,
    pub skills: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAccount {
    pub provider: Provider,
    pub provider_id: String,
    pub user_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOrganization {
    pub name: String,
    pub description: Option<String>,
    pub logo: Option<String>,
    pub owner_id: String,
    pub invite_code: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateOrganization {
    pub name: Option<String>,
    pub description: Option<String>,
    pub logo: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateMember {
    pub user_id: String,
    pub organization_id: String,
    pub role: Role,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateProgram {
    pub organization_id: String,
    pub name: String,
    pub description: Option<String>,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub created_by: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateProgram {
    pub name: Option<String>,
    pub description: Option<String>,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateEvent {
    pub organization_id: String,
    pub program_id: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub status: Option<EventStatus>,
    pub required_volunteer: i64,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub created_by: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateEvent {
    pub title: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub status: Option<EventStatus>,
    pub program_id: Option<String>,
    pub required_volunteer: Option<i64>,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
}

/// Fully resolved attendance row. `hours_contributed` has already been
/// derived from the timestamps (or taken from the explicit field) by the
/// aggregator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAttendance {
    pub event_id: String,
    pub user_id: String,
    pub is_present: bool,
    pub check_in: Option<DateTime<Utc>>,
    pub check_out: Option<DateTime<Utc>>,
    pub hours_contributed: f64,
    pub feedback: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateAttendance {
    pub is_present: Option<bool>,
    pub check_in: Option<DateTime<Utc>>,
    pub check_out: Option<DateTime<Utc>>,
    pub hours_contributed: Option<f64>,
    pub feedback: Option<String>,
}
