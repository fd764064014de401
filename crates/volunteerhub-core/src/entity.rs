//! Persisted entity types.
//!
//! These are the concrete documents the aggregate store reads and writes.
//! Two fields are denormalized aggregates and must stay consistent with the
//! attendance rows they summarize: [`Event::registered_volunteer`] and
//! [`User::total_volunteer_hours`]. The store's counter primitives are the
//! only code allowed to mutate them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::permissions::Role;

/// Login provider for an [`Account`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Provider {
    Email,
    Google,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "EMAIL",
            Self::Google => "GOOGLE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "EMAIL" => Some(Self::Email),
            "GOOGLE" => Some(Self::Google),
            _ => None,
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of an [`Event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventStatus {
    Pending,
    Active,
    Completed,
    Cancelled,
    Postponed,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Active => "ACTIVE",
            Self::Completed => "COMPLETED",
            Self::Cancelled => "CANCELLED",
            Self::Postponed => "POSTPONED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(Self::Pending),
            "ACTIVE" => Some(Self::Active),
            "COMPLETED" => Some(Self::Completed),
            "CANCELLED" => Some(Self::Cancelled),
            "POSTPONED" => Some(Self::Postponed),
            _ => None,
        }
    }
}

impl std::fmt::Display for EventStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A registered volunteer.
///
/// `current_organization` is a weak pointer: when non-null it must reference
/// an organization the user holds a [`Member`] row for. Membership and
/// lifecycle operations repair it inside their own transactions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub image: Option<String>,
    #[serde(rename = "phoneNumber")]
    pub phone_number: Option<String>,
    pub address: Option<String>,
    pub skills: Option<String>,
    /// Sum of `hours_contributed` over this user's attendance rows.
    #[serde(rename = "totalVolunteerHours")]
    pub total_volunteer_hours: f64,
    #[serde(rename = "currentOrganization")]
    pub current_organization: Option<String>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

/// A provider-credential binding. One per (provider, provider_id) pair;
/// exists so a user can hold several login methods.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub provider: Provider,
    #[serde(rename = "providerId")]
    pub provider_id: String,
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

/// A volunteer organization. `owner_id` is immutable after creation and the
/// owner always retains an OWNER membership.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Organization {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub logo: Option<String>,
    #[serde(rename = "ownerId")]
    pub owner_id: String,
    #[serde(rename = "inviteCode")]
    pub invite_code: String,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

/// A (user, organization, role) binding. Unique per (user_id,
/// organization_id).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Member {
    pub id: String,
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(rename = "organizationId")]
    pub organization_id: String,
    pub role: Role,
    /// Organization-scoped hours. Declared in the data model but not
    /// aggregated by any operation; see DESIGN.md.
    #[serde(rename = "volunteerHours")]
    pub volunteer_hours: f64,
    #[serde(rename = "joinedAt")]
    pub joined_at: DateTime<Utc>,
}

/// Groups events under an organization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Program {
    pub id: String,
    #[serde(rename = "organizationId")]
    pub organization_id: String,
    pub name: String,
    pub description: Option<String>,
    #[serde(rename = "startsAt")]
    pub starts_at: Option<DateTime<Utc>>,
    #[serde(rename = "endsAt")]
    pub ends_at: Option<DateTime<Utc>>,
    #[serde(rename = "createdBy")]
    pub created_by: String,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

/// A volunteer event.
///
/// `registered_volunteer` is derived: it must equal the live count of
/// attendance rows referencing this event. `required_volunteer` is a
/// declared capacity that attendance creation does not enforce (see
/// DESIGN.md).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    #[serde(rename = "organizationId")]
    pub organization_id: String,
    #[serde(rename = "programId")]
    pub program_id: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub status: EventStatus,
    #[serde(rename = "requiredVolunteer")]
    pub required_volunteer: i64,
    #[serde(rename = "registeredVolunteer")]
    pub registered_volunteer: i64,
    #[serde(rename = "startsAt")]
    pub starts_at: Option<DateTime<Utc>>,
    #[serde(rename = "endsAt")]
    pub ends_at: Option<DateTime<Utc>>,
    #[serde(rename = "createdBy")]
    pub created_by: String,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

/// An (event, user) registration with check-in/check-out bookkeeping.
/// Unique per pair. `hours_contributed` is derived from the timestamps when
/// both are present, otherwise it carries the explicitly supplied value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attendance {
    pub id: String,
    #[serde(rename = "eventId")]
    pub event_id: String,
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(rename = "isPresent")]
    pub is_present: bool,
    #[serde(rename = "checkIn")]
    pub check_in: Option<DateTime<Utc>>,
    #[serde(rename = "checkOut")]
    pub check_out: Option<DateTime<Utc>>,
    #[serde(rename = "hoursContributed")]
    pub hours_contributed: f64,
    pub feedback: Option<String>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}
