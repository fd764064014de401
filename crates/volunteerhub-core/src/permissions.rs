//! Role and permission catalog.
//!
//! Roles are a fixed, globally shared set baked into the binary. There is no
//! seeded role table: an unknown role string read back from storage is a
//! data-integrity failure, not a lookup miss.

use serde::{Deserialize, Serialize};

/// Named role a member holds within an organization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Owner,
    Admin,
    Member,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Owner => "OWNER",
            Self::Admin => "ADMIN",
            Self::Member => "MEMBER",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "OWNER" => Some(Self::Owner),
            "ADMIN" => Some(Self::Admin),
            "MEMBER" => Some(Self::Member),
            _ => None,
        }
    }

    /// The immutable permission set for this role.
    pub fn permissions(&self) -> &'static [Permission] {
        match self {
            Self::Owner => &[
                Permission::CreateOrganization,
                Permission::EditOrganization,
                Permission::DeleteOrganization,
                Permission::ManageOrganizationSettings,
                Permission::AddMember,
                Permission::ChangeMemberRole,
                Permission::RemoveMember,
                Permission::CreateProgram,
                Permission::EditProgram,
                Permission::DeleteProgram,
                Permission::CreateEvent,
                Permission::EditEvent,
                Permission::DeleteEvent,
                Permission::ViewOnly,
            ],
            Self::Admin => &[
                Permission::AddMember,
                Permission::CreateProgram,
                Permission::EditProgram,
                Permission::DeleteProgram,
                Permission::CreateEvent,
                Permission::EditEvent,
                Permission::DeleteEvent,
                Permission::ManageOrganizationSettings,
                Permission::ViewOnly,
            ],
            Self::Member => &[
                Permission::ViewOnly,
                Permission::CreateEvent,
                Permission::EditEvent,
            ],
        }
    }

    /// Check that this role grants a single permission.
    pub fn grants(&self, permission: Permission) -> bool {
        self.permissions().contains(&permission)
    }

    /// Check that this role grants every permission in `required`.
    pub fn grants_all(&self, required: &[Permission]) -> bool {
        required.iter().all(|p| self.grants(*p))
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Permission tokens an operation may require.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Permission {
    CreateOrganization,
    EditOrganization,
    DeleteOrganization,
    ManageOrganizationSettings,
    AddMember,
    ChangeMemberRole,
    RemoveMember,
    CreateProgram,
    EditProgram,
    DeleteProgram,
    CreateEvent,
    EditEvent,
    DeleteEvent,
    ViewOnly,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_has_full_permissions() {
        assert!(Role::Owner.grants(Permission::DeleteOrganization));
        assert!(Role::Owner.grants(Permission::RemoveMember));
        assert!(Role::Owner.grants(Permission::ChangeMemberRole));
        assert!(Role::Owner.grants_all(&[
            Permission::CreateProgram,
            Permission::DeleteEvent,
            Permission::ViewOnly,
        ]));
    }

    #[test]
    fn admin_cannot_delete_organization() {
        assert!(Role::Admin.grants(Permission::CreateProgram));
        assert!(Role::Admin.grants(Permission::AddMember));
        assert!(!Role::Admin.grants(Permission::DeleteOrganization));
        assert!(!Role::Admin.grants(Permission::RemoveMember));
    }

    #[test]
    fn member_is_mostly_read_only() {
        assert!(Role::Member.grants(Permission::ViewOnly));
        assert!(Role::Member.grants(Permission::CreateEvent));
        assert!(!Role::Member.grants(Permission::CreateProgram));
        assert!(!Role::Member.grants(Permission::ChangeMemberRole));
    }

    #[test]
    fn grants_all_requires_every_permission() {
        assert!(!Role::Admin.grants_all(&[
            Permission::CreateProgram,
            Permission::DeleteOrganization,
        ]));
    }

    #[test]
    fn role_round_trips_through_strings() {
        for role in [Role::Owner, Role::Admin, Role::Member] {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
        assert_eq!(Role::parse("SUPERUSER"), None);
    }
}
