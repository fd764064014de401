//! Program management. Programs group events under an organization;
//! deleting one cascades to its events and their attendance.

use chrono::{DateTime, Utc};
use volunteerhub_core::types::{CreateProgram, UpdateProgram};
use volunteerhub_core::{AggregateStore, Error, Permission, Program, Result, StoreTransaction};

use crate::authorization::require_permissions;
use crate::context::{with_tx_retry, ServiceContext};

#[derive(Debug, Clone)]
pub struct CreateProgramInput {
    pub name: String,
    pub description: Option<String>,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
}

pub async fn create_program<S: AggregateStore>(
    ctx: &ServiceContext<S>,
    user_id: &str,
    organization_id: &str,
    input: CreateProgramInput,
) -> Result<Program> {
    require_permissions(ctx, user_id, organization_id, &[Permission::CreateProgram]).await?;
    if input.name.is_empty() {
        return Err(Error::bad_request("Program name is required"));
    }
    ctx.store()
        .create_program(CreateProgram {
            organization_id: organization_id.to_string(),
            name: input.name,
            description: input.description,
            starts_at: input.starts_at,
            ends_at: input.ends_at,
            created_by: user_id.to_string(),
        })
        .await
}

pub async fn get_program<S: AggregateStore>(
    ctx: &ServiceContext<S>,
    user_id: &str,
    organization_id: &str,
    program_id: &str,
) -> Result<Program> {
    require_permissions(ctx, user_id, organization_id, &[Permission::ViewOnly]).await?;
    ctx.store()
        .get_program(organization_id, program_id)
        .await?
        .ok_or_else(|| Error::not_found("Program not found"))
}

pub async fn list_programs<S: AggregateStore>(
    ctx: &ServiceContext<S>,
    user_id: &str,
    organization_id: &str,
) -> Result<Vec<Program>> {
    require_permissions(ctx, user_id, organization_id, &[Permission::ViewOnly]).await?;
    ctx.store().list_programs(organization_id).await
}

pub async fn update_program<S: AggregateStore>(
    ctx: &ServiceContext<S>,
    user_id: &str,
    organization_id: &str,
    program_id: &str,
    update: UpdateProgram,
) -> Result<Program> {
    require_permissions(ctx, user_id, organization_id, &[Permission::EditProgram]).await?;
    ctx.store()
        .update_program(organization_id, program_id, update)
        .await
}

/// Delete a program together with its events and their attendance rows.
/// User hour totals come down with the deleted attendance; the dying events'
/// own counters are left alone.
pub async fn delete_program<S: AggregateStore>(
    ctx: &ServiceContext<S>,
    user_id: &str,
    organization_id: &str,
    program_id: &str,
) -> Result<()> {
    require_permissions(ctx, user_id, organization_id, &[Permission::DeleteProgram]).await?;
    with_tx_retry(ctx.config(), "delete_program", || {
        try_delete(ctx, organization_id, program_id)
    })
    .await
}

async fn try_delete<S: AggregateStore>(
    ctx: &ServiceContext<S>,
    organization_id: &str,
    program_id: &str,
) -> Result<()> {
    let mut tx = ctx.store().begin().await?;

    tx.find_program(organization_id, program_id)
        .await?
        .ok_or_else(|| Error::not_found("Program not found"))?;

    let events = tx.list_events_in_program(program_id).await?;
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
    tx.delete_events_in_program(program_id).await?;
    tx.delete_program(program_id).await?;
    tx.commit().await?;

    tracing::info!(program_id, events = events.len(), "program deleted");
    Ok(())
}
