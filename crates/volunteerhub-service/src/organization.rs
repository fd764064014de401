//! Organization lifecycle: create, read, update, invite codes, analytics,
//! and the cascading delete.
//!
//! Create and delete are the two operations that span multiple documents.
//! Create writes the Organization, the OWNER membership, and the owner's
//! `current_organization` pointer in one transaction. Delete removes every
//! row scoped to the organization in one transaction and repairs the pointer
//! of every user that referenced it.

use serde::Serialize;
use volunteerhub_core::types::{CreateMember, CreateOrganization, UpdateOrganization};
use volunteerhub_core::{
    generate_invite_code, AggregateStore, DatabaseError, Error, Organization, Permission, Result,
    Role, StoreTransaction,
};

use crate::authorization::require_permissions;
use crate::context::{constraint_to_conflict, with_tx_retry, ServiceContext};

#[derive(Debug, Clone)]
pub struct CreateOrganizationInput {
    pub name: String,
    pub description: Option<String>,
    pub logo: Option<String>,
}

/// Per-organization rollup counts.
#[derive(Debug, Clone, Serialize)]
pub struct OrganizationAnalytics {
    #[serde(rename = "totalMembers")]
    pub total_members: u64,
    #[serde(rename = "totalPrograms")]
    pub total_programs: u64,
    #[serde(rename = "totalEvents")]
    pub total_events: u64,
    #[serde(rename = "activeEvents")]
    pub active_events: u64,
    #[serde(rename = "completedEvents")]
    pub completed_events: u64,
}

/// Create an organization owned by `owner_id`.
pub async fn create_organization<S: AggregateStore>(
    ctx: &ServiceContext<S>,
    owner_id: &str,
    input: CreateOrganizationInput,
) -> Result<Organization> {
    if input.name.is_empty() {
        return Err(Error::bad_request("Organization name is required"));
    }
    with_tx_retry(ctx.config(), "create_organization", || {
        try_create(ctx, owner_id, &input)
    })
    .await
}

async fn try_create<S: AggregateStore>(
    ctx: &ServiceContext<S>,
    owner_id: &str,
    input: &CreateOrganizationInput,
) -> Result<Organization> {
    let mut tx = ctx.store().begin().await?;

    if tx.find_organization_by_name(&input.name).await?.is_some() {
        return Err(Error::conflict(
            "An organization with this name already exists",
        ));
    }
    tx.find_user(owner_id)
        .await?
        .ok_or_else(|| Error::not_found("User not found"))?;

    let invite_code = generate_invite_code(ctx.config().invite_code_length);
    let org = tx
        .insert_organization(CreateOrganization {
            name: input.name.clone(),
            description: input.description.clone(),
            logo: input.logo.clone(),
            owner_id: owner_id.to_string(),
            invite_code,
        })
        .await
        .map_err(classify_insert_error)?;
    tx.insert_member(CreateMember {
        user_id: owner_id.to_string(),
        organization_id: org.id.clone(),
        role: Role::Owner,
    })
    .await?;
    tx.set_current_organization(owner_id, Some(&org.id)).await?;
    tx.commit().await?;

    tracing::info!(organization_id = %org.id, owner_id, "organization created");
    Ok(org)
}

/// A unique violation on insert is either the name, which the caller must
/// resolve, or a generated invite code colliding with another organization's.
/// The latter is transient: the retry loop draws a fresh code.
fn classify_insert_error(err: Error) -> Error {
    match err {
        Error::Database(DatabaseError::Constraint(detail)) if detail.contains("invite") => {
            Error::Database(DatabaseError::Transaction(detail))
        }
        other => constraint_to_conflict(other, "An organization with this name already exists"),
    }
}

/// Fetch an organization the actor is a member of.
pub async fn get_organization<S: AggregateStore>(
    ctx: &ServiceContext<S>,
    user_id: &str,
    organization_id: &str,
) -> Result<Organization> {
    let org = ctx
        .store()
        .get_organization(organization_id)
        .await?
        .ok_or_else(|| Error::not_found("Organization not found"))?;
    ctx.store()
        .get_member(organization_id, user_id)
        .await?
        .ok_or_else(|| Error::unauthorized("You are not a member of this organization"))?;
    Ok(org)
}

/// All organizations the user is a member of.
pub async fn list_user_organizations<S: AggregateStore>(
    ctx: &ServiceContext<S>,
    user_id: &str,
) -> Result<Vec<Organization>> {
    ctx.store().list_user_organizations(user_id).await
}

pub async fn update_organization<S: AggregateStore>(
    ctx: &ServiceContext<S>,
    requester_id: &str,
    organization_id: &str,
    update: UpdateOrganization,
) -> Result<Organization> {
    require_permissions(
        ctx,
        requester_id,
        organization_id,
        &[Permission::EditOrganization],
    )
    .await?;
    ctx.store()
        .update_organization(organization_id, update)
        .await
        .map_err(|e| constraint_to_conflict(e, "An organization with this name already exists"))
}

/// Replace the invite code, invalidating the previous one.
pub async fn regenerate_invite_code<S: AggregateStore>(
    ctx: &ServiceContext<S>,
    requester_id: &str,
    organization_id: &str,
) -> Result<Organization> {
    require_permissions(
        ctx,
        requester_id,
        organization_id,
        &[Permission::ManageOrganizationSettings],
    )
    .await?;
    let code = generate_invite_code(ctx.config().invite_code_length);
    ctx.store().set_invite_code(organization_id, &code).await
}

/// Rollup counts for an organization the actor is a member of.
pub async fn organization_analytics<S: AggregateStore>(
    ctx: &ServiceContext<S>,
    user_id: &str,
    organization_id: &str,
) -> Result<OrganizationAnalytics> {
    ctx.store()
        .get_organization(organization_id)
        .await?
        .ok_or_else(|| Error::not_found("Organization not found"))?;
    ctx.store()
        .get_member(organization_id, user_id)
        .await?
        .ok_or_else(|| Error::unauthorized("You are not a member of this organization"))?;

    let store = ctx.store();
    Ok(OrganizationAnalytics {
        total_members: store.list_members(organization_id).await?.len() as u64,
        total_programs: store.count_programs(organization_id).await?,
        total_events: store.count_events(organization_id).await?,
        active_events: store
            .count_events_with_status(organization_id, volunteerhub_core::EventStatus::Active)
            .await?,
        completed_events: store
            .count_events_with_status(organization_id, volunteerhub_core::EventStatus::Completed)
            .await?,
    })
}

/// Delete an organization and everything scoped to it.
///
/// Only the owner may delete. Hours contributed through the organization's
/// events are subtracted from the surviving users; counters on rows deleted
/// in the same transaction are left alone.
pub async fn delete_organization<S: AggregateStore>(
    ctx: &ServiceContext<S>,
    requester_id: &str,
    organization_id: &str,
) -> Result<()> {
    with_tx_retry(ctx.config(), "delete_organization", || {
        try_delete(ctx, requester_id, organization_id)
    })
    .await
}

async fn try_delete<S: AggregateStore>(
    ctx: &ServiceContext<S>,
    requester_id: &str,
    organization_id: &str,
) -> Result<()> {
    let mut tx = ctx.store().begin().await?;

    let org = tx
        .find_organization(organization_id)
        .await?
        .ok_or_else(|| Error::not_found("Organization not found"))?;
    if org.owner_id != requester_id {
        return Err(Error::forbidden(
            "Only the organization owner can delete the organization",
        ));
    }

    // Attendance first: the users survive, so their hour totals must come
    // down before the rows disappear. The events die in this transaction,
    // so their registered counters are not touched.
    let events = tx.list_events_in_organization(organization_id).await?;
    for event in &events {
        let rows = tx.list_attendance_for_event(&event.id).await?;
        for row in &rows {
            if row.hours_contributed != 0.0 {
                tx.incr_user_hours(&row.user_id, -row.hours_contributed)
                    .await?;
            }
        }
        tx.delete_attendance_for_event(&event.id).await?;
    }
    tx.delete_events_in_organization(organization_id).await?;
    tx.delete_programs_in_organization(organization_id).await?;
    tx.delete_members_in_organization(organization_id).await?;

    // Repair every user whose pointer referenced this organization.
    let dangling = tx
        .find_users_with_current_organization(organization_id)
        .await?;
    for user in &dangling {
        let next = tx.find_other_membership(&user.id, organization_id).await?;
        tx.set_current_organization(&user.id, next.as_ref().map(|m| m.organization_id.as_str()))
            .await?;
    }

    tx.delete_organization(organization_id).await?;
    tx.commit().await?;

    tracing::info!(
        organization_id,
        events = events.len(),
        repaired_users = dangling.len(),
        "organization deleted"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invite_code_collision_maps_to_a_transient_error() {
        let err = classify_insert_error(Error::Database(DatabaseError::Constraint(
            "duplicate invite code".to_string(),
        )));
        assert!(err.is_transient());

        // Postgres reports the violated index by name.
        let err = classify_insert_error(Error::Database(DatabaseError::Constraint(
            "duplicate key value violates unique constraint \"organizations_invite_code_idx\""
                .to_string(),
        )));
        assert!(err.is_transient());
    }

    #[test]
    fn name_collision_maps_to_a_conflict() {
        let err = classify_insert_error(Error::Database(DatabaseError::Constraint(
            "duplicate organization name: Greenway".to_string(),
        )));
        assert!(matches!(err, Error::Conflict(_)));
    }
}
