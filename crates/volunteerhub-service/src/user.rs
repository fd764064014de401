//! User profile operations and account deletion.

use volunteerhub_core::types::UpdateUser;
use volunteerhub_core::{AggregateStore, Error, Result, StoreTransaction, User};

use crate::context::{with_tx_retry, ServiceContext};

pub async fn current_user<S: AggregateStore>(
    ctx: &ServiceContext<S>,
    user_id: &str,
) -> Result<User> {
    ctx.store()
        .get_user(user_id)
        .await?
        .ok_or_else(|| Error::not_found("User not found"))
}

/// Another user's profile. The credential hash never serializes, so the
/// returned entity is safe to expose as-is.
pub async fn get_profile<S: AggregateStore>(
    ctx: &ServiceContext<S>,
    user_id: &str,
) -> Result<User> {
    current_user(ctx, user_id).await
}

pub async fn update_profile<S: AggregateStore>(
    ctx: &ServiceContext<S>,
    user_id: &str,
    update: UpdateUser,
) -> Result<User> {
    ctx.store().update_user(user_id, update).await
}

/// Delete a user account with everything bound to it: memberships,
/// attendance rows, and accounts.
///
/// Surviving events lose one registered volunteer per deleted row; the
/// user's own hour total dies with the user row and is not decremented
/// first. Organizations the user owns are not cascaded here.
pub async fn delete_user<S: AggregateStore>(
    ctx: &ServiceContext<S>,
    user_id: &str,
) -> Result<()> {
    with_tx_retry(ctx.config(), "delete_user", || try_delete(ctx, user_id)).await
}

async fn try_delete<S: AggregateStore>(ctx: &ServiceContext<S>, user_id: &str) -> Result<()> {
    let mut tx = ctx.store().begin().await?;

    tx.find_user(user_id)
        .await?
        .ok_or_else(|| Error::not_found("User not found"))?;

    let rows = tx.list_attendance_for_user(user_id).await?;
    for row in &rows {
        tx.incr_event_registered(&row.event_id, -1).await?;
    }
    tx.delete_attendance_for_user(user_id).await?;
    tx.delete_members_for_user(user_id).await?;
    tx.delete_accounts_for_user(user_id).await?;
    tx.delete_user(user_id).await?;
    tx.commit().await?;

    tracing::info!(user_id, attendance = rows.len(), "user deleted");
    Ok(())
}
