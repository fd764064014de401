//! Event management.
//!
//! `Event.registered_volunteer` is owned by the attendance aggregator; the
//! operations here never touch it except through the cascading delete, which
//! removes the rows it counts.

use chrono::{DateTime, Utc};
use volunteerhub_core::types::{CreateEvent, UpdateEvent};
use volunteerhub_core::{
    AggregateStore, Error, Event, EventStatus, Permission, Result, StoreTransaction,
};

use crate::authorization::require_permissions;
use crate::context::{with_tx_retry, ServiceContext};

#[derive(Debug, Clone)]
pub struct CreateEventInput {
    pub program_id: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub status: Option<EventStatus>,
    pub required_volunteer: i64,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
}

pub async fn create_event<S: AggregateStore>(
    ctx: &ServiceContext<S>,
    user_id: &str,
    organization_id: &str,
    input: CreateEventInput,
) -> Result<Event> {
    require_permissions(ctx, user_id, organization_id, &[Permission::CreateEvent]).await?;
    if input.title.is_empty() {
        return Err(Error::bad_request("Event title is required"));
    }
    if input.required_volunteer < 0 {
        return Err(Error::bad_request("Required volunteer count cannot be negative"));
    }
    if let Some(program_id) = &input.program_id {
        ctx.store()
            .get_program(organization_id, program_id)
            .await?
            .ok_or_else(|| Error::not_found("Program not found in this organization"))?;
    }
    ctx.store()
        .create_event(CreateEvent {
            organization_id: organization_id.to_string(),
            program_id: input.program_id,
            title: input.title,
            description: input.description,
            location: input.location,
            status: input.status,
            required_volunteer: input.required_volunteer,
            starts_at: input.starts_at,
            ends_at: input.ends_at,
            created_by: user_id.to_string(),
        })
        .await
}

pub async fn get_event<S: AggregateStore>(
    ctx: &ServiceContext<S>,
    user_id: &str,
    organization_id: &str,
    event_id: &str,
) -> Result<Event> {
    require_permissions(ctx, user_id, organization_id, &[Permission::ViewOnly]).await?;
    ctx.store()
        .get_event(organization_id, event_id)
        .await?
        .ok_or_else(|| Error::not_found("Event not found"))
}

pub async fn list_events<S: AggregateStore>(
    ctx: &ServiceContext<S>,
    user_id: &str,
    organization_id: &str,
) -> Result<Vec<Event>> {
    require_permissions(ctx, user_id, organization_id, &[Permission::ViewOnly]).await?;
    ctx.store().list_events(organization_id).await
}

pub async fn update_event<S: AggregateStore>(
    ctx: &ServiceContext<S>,
    user_id: &str,
    organization_id: &str,
    event_id: &str,
    update: UpdateEvent,
) -> Result<Event> {
    require_permissions(ctx, user_id, organization_id, &[Permission::EditEvent]).await?;
    if let Some(program_id) = &update.program_id {
        ctx.store()
            .get_program(organization_id, program_id)
            .await?
            .ok_or_else(|| Error::not_found("Program not found in this organization"))?;
    }
    ctx.store()
        .update_event(organization_id, event_id, update)
        .await
}

/// Delete an event and its attendance rows, subtracting each row's hours
/// from the surviving user. The event's own registered counter dies with it.
pub async fn delete_event<S: AggregateStore>(
    ctx: &ServiceContext<S>,
    user_id: &str,
    organization_id: &str,
    event_id: &str,
) -> Result<()> {
    require_permissions(ctx, user_id, organization_id, &[Permission::DeleteEvent]).await?;
    with_tx_retry(ctx.config(), "delete_event", || {
        try_delete(ctx, organization_id, event_id)
    })
    .await
}

async fn try_delete<S: AggregateStore>(
    ctx: &ServiceContext<S>,
    organization_id: &str,
    event_id: &str,
) -> Result<()> {
    let mut tx = ctx.store().begin().await?;

    tx.find_event(event_id)
        .await?
        .filter(|e| e.organization_id == organization_id)
        .ok_or_else(|| Error::not_found("Event not found"))?;

    let rows = tx.list_attendance_for_event(event_id).await?;
    for row in &rows {
        if row.hours_contributed != 0.0 {
            tx.incr_user_hours(&row.user_id, -row.hours_contributed)
                .await?;
        }
    }
    tx.delete_attendance_for_event(event_id).await?;
    tx.delete_event(event_id).await?;
    tx.commit().await?;

    tracing::info!(event_id, attendance = rows.len(), "event deleted");
    Ok(())
}
