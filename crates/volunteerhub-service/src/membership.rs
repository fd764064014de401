//! Membership operations: invite-code join, leave, ban, role queries.
//!
//! Every mutation here touches both a Member row and the user's
//! `current_organization` pointer, so each runs in one transaction. The
//! pointer invariant: when non-null it must reference an organization the
//! user is still a member of.

use volunteerhub_core::types::CreateMember;
use volunteerhub_core::{AggregateStore, Error, Member, Result, Role, StoreTransaction};

use crate::context::{constraint_to_conflict, with_tx_retry, ServiceContext};

/// The actor's role in an organization. `NotFound` if the organization does
/// not exist, `Unauthorized` if the actor is not a member.
pub async fn member_role<S: AggregateStore>(
    ctx: &ServiceContext<S>,
    user_id: &str,
    organization_id: &str,
) -> Result<Role> {
    ctx.store()
        .get_organization(organization_id)
        .await?
        .ok_or_else(|| Error::not_found("Organization not found"))?;
    let member = ctx
        .store()
        .get_member(organization_id, user_id)
        .await?
        .ok_or_else(|| Error::unauthorized("You are not a member of this organization"))?;
    Ok(member.role)
}

/// Join an organization through its invite code, with the MEMBER role.
///
/// The pointer is set only if it was previously null, and the member row is
/// inserted before the pointer update in the same transaction.
pub async fn join_with_invite_code<S: AggregateStore>(
    ctx: &ServiceContext<S>,
    user_id: &str,
    invite_code: &str,
) -> Result<Member> {
    with_tx_retry(ctx.config(), "join_with_invite_code", || {
        try_join(ctx, user_id, invite_code)
    })
    .await
}

async fn try_join<S: AggregateStore>(
    ctx: &ServiceContext<S>,
    user_id: &str,
    invite_code: &str,
) -> Result<Member> {
    let mut tx = ctx.store().begin().await?;

    let org = tx
        .find_organization_by_invite_code(invite_code)
        .await?
        .ok_or_else(|| Error::not_found("Invalid invite code"))?;
    if tx.find_member(&org.id, user_id).await?.is_some() {
        return Err(Error::conflict(
            "You are already a member of this organization",
        ));
    }
    let user = tx
        .find_user(user_id)
        .await?
        .ok_or_else(|| Error::not_found("User not found"))?;

    let member = tx
        .insert_member(CreateMember {
            user_id: user_id.to_string(),
            organization_id: org.id.clone(),
            role: Role::Member,
        })
        .await
        .map_err(|e| constraint_to_conflict(e, "You are already a member of this organization"))?;
    if user.current_organization.is_none() {
        tx.set_current_organization(user_id, Some(&org.id)).await?;
    }
    tx.commit().await?;

    tracing::info!(user_id, organization_id = %org.id, "member joined via invite code");
    Ok(member)
}

/// Leave an organization. The owner cannot leave.
pub async fn leave_organization<S: AggregateStore>(
    ctx: &ServiceContext<S>,
    user_id: &str,
    organization_id: &str,
) -> Result<()> {
    with_tx_retry(ctx.config(), "leave_organization", || {
        try_remove_membership(ctx, user_id, organization_id, RemovalKind::Leave)
    })
    .await
}

/// Remove a member from an organization. Only the owner may do this, and
/// not to themselves.
pub async fn ban_member<S: AggregateStore>(
    ctx: &ServiceContext<S>,
    requester_id: &str,
    organization_id: &str,
    target_user_id: &str,
) -> Result<()> {
    with_tx_retry(ctx.config(), "ban_member", || {
        try_ban(ctx, requester_id, organization_id, target_user_id)
    })
    .await
}

async fn try_ban<S: AggregateStore>(
    ctx: &ServiceContext<S>,
    requester_id: &str,
    organization_id: &str,
    target_user_id: &str,
) -> Result<()> {
    let org = ctx
        .store()
        .get_organization(organization_id)
        .await?
        .ok_or_else(|| Error::not_found("Organization not found"))?;
    if org.owner_id != requester_id {
        return Err(Error::forbidden(
            "Only the organization owner can remove members",
        ));
    }
    if requester_id == target_user_id {
        return Err(Error::bad_request("The owner cannot remove themselves"));
    }
    try_remove_membership(ctx, target_user_id, organization_id, RemovalKind::Ban).await
}

#[derive(Clone, Copy)]
enum RemovalKind {
    Leave,
    Ban,
}

/// Delete the membership and repair the user's `current_organization`
/// pointer in the same transaction.
async fn try_remove_membership<S: AggregateStore>(
    ctx: &ServiceContext<S>,
    user_id: &str,
    organization_id: &str,
    kind: RemovalKind,
) -> Result<()> {
    let mut tx = ctx.store().begin().await?;

    let org = tx
        .find_organization(organization_id)
        .await?
        .ok_or_else(|| Error::not_found("Organization not found"))?;
    if matches!(kind, RemovalKind::Leave) && org.owner_id == user_id {
        return Err(Error::bad_request(
            "The organization owner cannot leave the organization",
        ));
    }
    let member = tx
        .find_member(organization_id, user_id)
        .await?
        .ok_or_else(|| Error::not_found("Member not found in this organization"))?;
    tx.delete_member(&member.id).await?;

    let user = tx
        .find_user(user_id)
        .await?
        .ok_or_else(|| Error::not_found("User not found"))?;
    if user.current_organization.as_deref() == Some(organization_id) {
        let next = tx.find_other_membership(user_id, organization_id).await?;
        tx.set_current_organization(user_id, next.as_ref().map(|m| m.organization_id.as_str()))
            .await?;
    }
    tx.commit().await?;

    tracing::info!(user_id, organization_id, "membership removed");
    Ok(())
}

/// Change a member's role. Requires the CHANGE_MEMBER_ROLE permission; the
/// owner's own role is immutable.
pub async fn change_member_role<S: AggregateStore>(
    ctx: &ServiceContext<S>,
    requester_id: &str,
    organization_id: &str,
    target_user_id: &str,
    role: Role,
) -> Result<Member> {
    let org = ctx
        .store()
        .get_organization(organization_id)
        .await?
        .ok_or_else(|| Error::not_found("Organization not found"))?;
    crate::authorization::require_permissions(
        ctx,
        requester_id,
        organization_id,
        &[volunteerhub_core::Permission::ChangeMemberRole],
    )
    .await?;
    if org.owner_id == target_user_id {
        return Err(Error::bad_request("The owner's role cannot be changed"));
    }
    ctx.store()
        .get_member(organization_id, target_user_id)
        .await?
        .ok_or_else(|| Error::not_found("Member not found in this organization"))?;
    ctx.store()
        .update_member_role(organization_id, target_user_id, role)
        .await
}
