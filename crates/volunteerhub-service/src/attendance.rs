//! Event & attendance aggregator.
//!
//! Owns the two denormalized counters: `Event.registered_volunteer` (live
//! count of attendance rows per event) and `User.total_volunteer_hours`
//! (sum of hours over the user's rows). Every mutation here applies its row
//! write and the counter increments in a single transaction, and hour
//! updates are always deltas, never overwrites, so concurrent edits of a
//! user's other rows cannot be clobbered.

use chrono::{DateTime, Utc};
use volunteerhub_core::types::{CreateAttendance, UpdateAttendance};
use volunteerhub_core::{AggregateStore, Attendance, Error, Result, StoreTransaction};

use crate::context::{constraint_to_conflict, with_tx_retry, ServiceContext};

#[derive(Debug, Clone)]
pub struct RecordAttendanceInput {
    pub event_id: String,
    pub user_id: String,
    pub is_present: bool,
    pub check_in: Option<DateTime<Utc>>,
    pub check_out: Option<DateTime<Utc>>,
    /// Explicit hours, used only when the timestamps cannot derive them.
    pub hours: Option<f64>,
    pub feedback: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateAttendanceInput {
    pub is_present: Option<bool>,
    pub check_in: Option<DateTime<Utc>>,
    pub check_out: Option<DateTime<Utc>>,
    pub hours: Option<f64>,
    pub feedback: Option<String>,
}

fn hours_between(check_in: DateTime<Utc>, check_out: DateTime<Utc>) -> f64 {
    let hours = (check_out - check_in).num_seconds() as f64 / 3600.0;
    hours.max(0.0)
}

fn resolve_hours(
    check_in: Option<DateTime<Utc>>,
    check_out: Option<DateTime<Utc>>,
    explicit: Option<f64>,
) -> f64 {
    match (check_in, check_out) {
        (Some(check_in), Some(check_out)) => hours_between(check_in, check_out),
        _ => explicit.unwrap_or(0.0).max(0.0),
    }
}

/// Register a user's attendance at an event.
///
/// One row per (event, user) pair; a second call for the same pair is a
/// `Conflict` and leaves the counters untouched. Capacity
/// (`required_volunteer`) is deliberately not enforced here.
pub async fn record_attendance<S: AggregateStore>(
    ctx: &ServiceContext<S>,
    input: RecordAttendanceInput,
) -> Result<Attendance> {
    with_tx_retry(ctx.config(), "record_attendance", || try_record(ctx, &input)).await
}

async fn try_record<S: AggregateStore>(
    ctx: &ServiceContext<S>,
    input: &RecordAttendanceInput,
) -> Result<Attendance> {
    let mut tx = ctx.store().begin().await?;

    let event = tx
        .find_event(&input.event_id)
        .await?
        .ok_or_else(|| Error::not_found("Event not found"))?;
    tx.find_user(&input.user_id)
        .await?
        .ok_or_else(|| Error::not_found("User not found"))?;
    if tx
        .find_attendance_for(&input.event_id, &input.user_id)
        .await?
        .is_some()
    {
        return Err(Error::conflict(
            "Attendance is already recorded for this user and event",
        ));
    }

    let hours = resolve_hours(input.check_in, input.check_out, input.hours);
    let attendance = tx
        .insert_attendance(CreateAttendance {
            event_id: input.event_id.clone(),
            user_id: input.user_id.clone(),
            is_present: input.is_present,
            check_in: input.check_in,
            check_out: input.check_out,
            hours_contributed: hours,
            feedback: input.feedback.clone(),
        })
        .await
        .map_err(|e| {
            constraint_to_conflict(e, "Attendance is already recorded for this user and event")
        })?;
    tx.incr_event_registered(&event.id, 1).await?;
    if hours != 0.0 {
        tx.incr_user_hours(&input.user_id, hours).await?;
    }
    tx.commit().await?;

    tracing::info!(event_id = %event.id, user_id = %input.user_id, hours, "attendance recorded");
    Ok(attendance)
}

/// Edit an attendance row, recomputing hours when a timestamp changes.
///
/// A lone check-out is paired with the stored check-in. The user's hour
/// total receives the difference between the new and previous hours.
pub async fn update_attendance<S: AggregateStore>(
    ctx: &ServiceContext<S>,
    attendance_id: &str,
    input: UpdateAttendanceInput,
) -> Result<Attendance> {
    with_tx_retry(ctx.config(), "update_attendance", || {
        try_update(ctx, attendance_id, &input)
    })
    .await
}

async fn try_update<S: AggregateStore>(
    ctx: &ServiceContext<S>,
    attendance_id: &str,
    input: &UpdateAttendanceInput,
) -> Result<Attendance> {
    let mut tx = ctx.store().begin().await?;

    let existing = tx
        .find_attendance(attendance_id)
        .await?
        .ok_or_else(|| Error::not_found("Attendance record not found"))?;

    let check_in = input.check_in.or(existing.check_in);
    let check_out = input.check_out.or(existing.check_out);
    let new_hours = if input.check_in.is_some() || input.check_out.is_some() {
        match (check_in, check_out) {
            (Some(check_in), Some(check_out)) => hours_between(check_in, check_out),
            _ => input.hours.unwrap_or(existing.hours_contributed).max(0.0),
        }
    } else {
        input.hours.unwrap_or(existing.hours_contributed).max(0.0)
    };

    let updated = tx
        .update_attendance(
            attendance_id,
            UpdateAttendance {
                is_present: input.is_present,
                check_in: input.check_in,
                check_out: input.check_out,
                hours_contributed: Some(new_hours),
                feedback: input.feedback.clone(),
            },
        )
        .await?;

    let delta = new_hours - existing.hours_contributed;
    if delta != 0.0 {
        tx.incr_user_hours(&existing.user_id, delta).await?;
    }
    tx.commit().await?;

    tracing::debug!(attendance_id, delta, "attendance updated");
    Ok(updated)
}

/// Remove an attendance row, decrementing both counters (floored at zero).
pub async fn delete_attendance<S: AggregateStore>(
    ctx: &ServiceContext<S>,
    attendance_id: &str,
) -> Result<()> {
    with_tx_retry(ctx.config(), "delete_attendance", || {
        try_delete(ctx, attendance_id)
    })
    .await
}

async fn try_delete<S: AggregateStore>(
    ctx: &ServiceContext<S>,
    attendance_id: &str,
) -> Result<()> {
    let mut tx = ctx.store().begin().await?;

    let existing = tx
        .find_attendance(attendance_id)
        .await?
        .ok_or_else(|| Error::not_found("Attendance record not found"))?;
    tx.delete_attendance(attendance_id).await?;
    tx.incr_event_registered(&existing.event_id, -1).await?;
    if existing.hours_contributed != 0.0 {
        tx.incr_user_hours(&existing.user_id, -existing.hours_contributed)
            .await?;
    }
    tx.commit().await?;

    tracing::debug!(attendance_id, "attendance deleted");
    Ok(())
}

pub async fn get_attendance<S: AggregateStore>(
    ctx: &ServiceContext<S>,
    attendance_id: &str,
) -> Result<Attendance> {
    ctx.store()
        .get_attendance(attendance_id)
        .await?
        .ok_or_else(|| Error::not_found("Attendance record not found"))
}

pub async fn list_event_attendance<S: AggregateStore>(
    ctx: &ServiceContext<S>,
    event_id: &str,
) -> Result<Vec<Attendance>> {
    ctx.store().list_event_attendance(event_id).await
}

pub async fn list_user_attendance<S: AggregateStore>(
    ctx: &ServiceContext<S>,
    user_id: &str,
) -> Result<Vec<Attendance>> {
    ctx.store().list_user_attendance(user_id).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn hours_derive_from_timestamps_when_both_present() {
        let check_in = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
        let check_out = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        assert_eq!(resolve_hours(Some(check_in), Some(check_out), Some(99.0)), 3.5);
    }

    #[test]
    fn explicit_hours_used_without_full_timestamps() {
        let check_in = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
        assert_eq!(resolve_hours(Some(check_in), None, Some(2.0)), 2.0);
        assert_eq!(resolve_hours(None, None, None), 0.0);
    }

    #[test]
    fn inverted_timestamps_floor_at_zero() {
        let check_in = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let check_out = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
        assert_eq!(hours_between(check_in, check_out), 0.0);
    }
}
