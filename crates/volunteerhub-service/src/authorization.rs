//! Authorization gate.
//!
//! A pure predicate over the permission catalog plus a membership lookup to
//! resolve the actor's role. Denial is `Unauthorized`, matching the error
//! contract of the membership lookups themselves.

use volunteerhub_core::{AggregateStore, Error, Permission, Result, Role};

use crate::context::ServiceContext;

/// Check that `role` grants every permission in `required`.
pub fn check(role: Role, required: &[Permission]) -> Result<()> {
    if role.grants_all(required) {
        Ok(())
    } else {
        Err(Error::unauthorized(
            "You do not have the required permissions for this action",
        ))
    }
}

/// Resolve the actor's role in the organization, then [`check`] it.
///
/// Returns the resolved role so callers can branch on it without a second
/// lookup.
pub async fn require_permissions<S: AggregateStore>(
    ctx: &ServiceContext<S>,
    user_id: &str,
    organization_id: &str,
    required: &[Permission],
) -> Result<Role> {
    let member = ctx
        .store()
        .get_member(organization_id, user_id)
        .await?
        .ok_or_else(|| Error::unauthorized("You are not a member of this organization"))?;
    check(member.role, required)?;
    Ok(member.role)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_denies_missing_permission() {
        assert!(check(Role::Member, &[Permission::ViewOnly]).is_ok());
        let err = check(Role::Member, &[Permission::DeleteProgram]).unwrap_err();
        assert_eq!(err.status_code(), 401);
    }
}
