mod common;

use chrono::{TimeZone, Utc};
use common::*;
use volunteerhub_core::{AggregateStore, MemoryStore, StoreTransaction};
use volunteerhub_service::attendance::{self, RecordAttendanceInput, UpdateAttendanceInput};
use volunteerhub_service::membership;
use volunteerhub_service::program::{self, CreateProgramInput};
use volunteerhub_service::user;
use volunteerhub_service::{event, ServiceContext};

#[tokio::test]
async fn record_attendance_updates_both_counters() {
    let (store, ctx) = new_ctx();
    let owner = register(&ctx, "owner@example.com", "Owner").await;
    let org = create_org(&ctx, &owner, "Green Earth").await;
    let ev = create_event(&ctx, &owner, &org, "Saturday shift", 5).await;

    let check_in = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
    let check_out = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    attendance::record_attendance(
        &ctx,
        RecordAttendanceInput {
            event_id: ev.id.clone(),
            user_id: owner.id.clone(),
            is_present: true,
            check_in: Some(check_in),
            check_out: Some(check_out),
            // The explicit value loses to the derived one.
            hours: Some(50.0),
            feedback: None,
        },
    )
    .await
    .unwrap();

    let ev = store.get_event(&org.id, &ev.id).await.unwrap().unwrap();
    assert_eq!(ev.registered_volunteer, 1);
    let owner = store.get_user(&owner.id).await.unwrap().unwrap();
    assert_eq!(owner.total_volunteer_hours, 3.0);
}

#[tokio::test]
async fn duplicate_record_conflicts_and_counter_stays() {
    let (store, ctx) = new_ctx();
    let owner = register(&ctx, "owner@example.com", "Owner").await;
    let org = create_org(&ctx, &owner, "Green Earth").await;
    let u2 = register(&ctx, "u2@example.com", "U2").await;
    membership::join_with_invite_code(&ctx, &u2.id, &org.invite_code)
        .await
        .unwrap();
    let ev = create_event(&ctx, &owner, &org, "Small shift", 1).await;

    record_hours(&ctx, &ev.id, &u2.id, 2.0).await;
    let err = attendance::record_attendance(
        &ctx,
        RecordAttendanceInput {
            event_id: ev.id.clone(),
            user_id: u2.id.clone(),
            is_present: true,
            check_in: None,
            check_out: None,
            hours: Some(2.0),
            feedback: None,
        },
    )
    .await
    .unwrap_err();
    assert_eq!(err.status_code(), 409);

    let ev = store.get_event(&org.id, &ev.id).await.unwrap().unwrap();
    assert_eq!(ev.registered_volunteer, 1);
    let u2 = store.get_user(&u2.id).await.unwrap().unwrap();
    assert_eq!(u2.total_volunteer_hours, 2.0);
}

#[tokio::test]
async fn update_applies_delta_not_overwrite() {
    let (store, ctx) = new_ctx();
    let owner = register(&ctx, "owner@example.com", "Owner").await;
    let org = create_org(&ctx, &owner, "Green Earth").await;
    let u3 = register(&ctx, "u3@example.com", "U3").await;
    let ev = create_event(&ctx, &owner, &org, "Shift", 5).await;

    let row = record_hours(&ctx, &ev.id, &u3.id, 3.0).await;
    let before = store.get_user(&u3.id).await.unwrap().unwrap();
    assert_eq!(before.total_volunteer_hours, 3.0);

    attendance::update_attendance(
        &ctx,
        &row.id,
        UpdateAttendanceInput {
            hours: Some(5.0),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    let after = store.get_user(&u3.id).await.unwrap().unwrap();
    assert_eq!(after.total_volunteer_hours, 5.0);
}

#[tokio::test]
async fn lone_checkout_pairs_with_stored_checkin() {
    let (store, ctx) = new_ctx();
    let owner = register(&ctx, "owner@example.com", "Owner").await;
    let org = create_org(&ctx, &owner, "Green Earth").await;
    let ev = create_event(&ctx, &owner, &org, "Shift", 5).await;

    let check_in = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
    let row = attendance::record_attendance(
        &ctx,
        RecordAttendanceInput {
            event_id: ev.id.clone(),
            user_id: owner.id.clone(),
            is_present: true,
            check_in: Some(check_in),
            check_out: None,
            hours: None,
            feedback: None,
        },
    )
    .await
    .unwrap();
    assert_eq!(row.hours_contributed, 0.0);

    let check_out = Utc.with_ymd_and_hms(2024, 5, 1, 13, 30, 0).unwrap();
    let updated = attendance::update_attendance(
        &ctx,
        &row.id,
        UpdateAttendanceInput {
            check_out: Some(check_out),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(updated.hours_contributed, 4.5);

    let owner = store.get_user(&owner.id).await.unwrap().unwrap();
    assert_eq!(owner.total_volunteer_hours, 4.5);
}

#[tokio::test]
async fn delete_attendance_decrements_both_counters() {
    let (store, ctx) = new_ctx();
    let owner = register(&ctx, "owner@example.com", "Owner").await;
    let org = create_org(&ctx, &owner, "Green Earth").await;
    let ev = create_event(&ctx, &owner, &org, "Shift", 5).await;

    let row = record_hours(&ctx, &ev.id, &owner.id, 2.5).await;
    attendance::delete_attendance(&ctx, &row.id).await.unwrap();

    let ev = store.get_event(&org.id, &ev.id).await.unwrap().unwrap();
    assert_eq!(ev.registered_volunteer, 0);
    let owner = store.get_user(&owner.id).await.unwrap().unwrap();
    assert_eq!(owner.total_volunteer_hours, 0.0);
    assert!(store.get_attendance(&row.id).await.unwrap().is_none());
}

#[tokio::test]
async fn counters_floor_at_zero() {
    let (store, ctx) = new_ctx();
    let owner = register(&ctx, "owner@example.com", "Owner").await;
    let org = create_org(&ctx, &owner, "Green Earth").await;
    let ev = create_event(&ctx, &owner, &org, "Shift", 5).await;

    let mut tx = store.begin().await.unwrap();
    tx.incr_event_registered(&ev.id, -5).await.unwrap();
    tx.incr_user_hours(&owner.id, -10.0).await.unwrap();
    tx.commit().await.unwrap();

    let ev = store.get_event(&org.id, &ev.id).await.unwrap().unwrap();
    assert_eq!(ev.registered_volunteer, 0);
    let owner = store.get_user(&owner.id).await.unwrap().unwrap();
    assert_eq!(owner.total_volunteer_hours, 0.0);
}

async fn assert_invariants(store: &MemoryStore, ctx: &ServiceContext<MemoryStore>, org_id: &str, user_ids: &[String]) {
    // Invariant 1: registered count equals the live row count per event.
    for ev in store.list_events(org_id).await.unwrap() {
        let rows = store.list_event_attendance(&ev.id).await.unwrap();
        assert_eq!(ev.registered_volunteer, rows.len() as i64, "event {}", ev.id);
    }
    // Invariant 2: hour totals equal the sum over each user's rows.
    for user_id in user_ids {
        let rows = store.list_user_attendance(user_id).await.unwrap();
        let sum: f64 = rows.iter().map(|r| r.hours_contributed).sum();
        let user = user::current_user(ctx, user_id).await.unwrap();
        assert!(
            (user.total_volunteer_hours - sum).abs() < 1e-9,
            "user {user_id}: {} != {sum}",
            user.total_volunteer_hours
        );
    }
}

#[tokio::test]
async fn invariants_hold_after_mixed_operation_sequence() {
    let (store, ctx) = new_ctx();
    let owner = register(&ctx, "owner@example.com", "Owner").await;
    let org = create_org(&ctx, &owner, "Green Earth").await;
    let u2 = register(&ctx, "u2@example.com", "U2").await;
    let u3 = register(&ctx, "u3@example.com", "U3").await;
    let ev1 = create_event(&ctx, &owner, &org, "Shift 1", 5).await;
    let ev2 = create_event(&ctx, &owner, &org, "Shift 2", 5).await;

    let a1 = record_hours(&ctx, &ev1.id, &u2.id, 3.0).await;
    let a2 = record_hours(&ctx, &ev1.id, &u3.id, 1.5).await;
    record_hours(&ctx, &ev2.id, &u2.id, 2.0).await;

    attendance::update_attendance(
        &ctx,
        &a1.id,
        UpdateAttendanceInput {
            hours: Some(4.0),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    attendance::delete_attendance(&ctx, &a2.id).await.unwrap();

    let users = vec![owner.id.clone(), u2.id.clone(), u3.id.clone()];
    assert_invariants(&store, &ctx, &org.id, &users).await;
}

#[tokio::test]
async fn event_delete_cascades_attendance() {
    let (store, ctx) = new_ctx();
    let owner = register(&ctx, "owner@example.com", "Owner").await;
    let org = create_org(&ctx, &owner, "Green Earth").await;
    let ev = create_event(&ctx, &owner, &org, "Shift", 5).await;
    record_hours(&ctx, &ev.id, &owner.id, 3.0).await;

    event::delete_event(&ctx, &owner.id, &org.id, &ev.id)
        .await
        .unwrap();

    assert!(store.get_event(&org.id, &ev.id).await.unwrap().is_none());
    assert!(store.list_event_attendance(&ev.id).await.unwrap().is_empty());
    let owner = store.get_user(&owner.id).await.unwrap().unwrap();
    assert_eq!(owner.total_volunteer_hours, 0.0);
}

#[tokio::test]
async fn program_delete_cascades_events_and_attendance() {
    let (store, ctx) = new_ctx();
    let owner = register(&ctx, "owner@example.com", "Owner").await;
    let org = create_org(&ctx, &owner, "Green Earth").await;
    let prog = program::create_program(
        &ctx,
        &owner.id,
        &org.id,
        CreateProgramInput {
            name: "Beach Cleanup".to_string(),
            description: None,
            starts_at: None,
            ends_at: None,
        },
    )
    .await
    .unwrap();
    let ev = event::create_event(
        &ctx,
        &owner.id,
        &org.id,
        event::CreateEventInput {
            program_id: Some(prog.id.clone()),
            title: "Saturday shift".to_string(),
            description: None,
            location: None,
            status: None,
            required_volunteer: 5,
            starts_at: None,
            ends_at: None,
        },
    )
    .await
    .unwrap();
    record_hours(&ctx, &ev.id, &owner.id, 2.0).await;

    program::delete_program(&ctx, &owner.id, &org.id, &prog.id)
        .await
        .unwrap();

    assert!(store.get_program(&org.id, &prog.id).await.unwrap().is_none());
    assert!(store.get_event(&org.id, &ev.id).await.unwrap().is_none());
    assert!(store.list_event_attendance(&ev.id).await.unwrap().is_empty());
    let owner = store.get_user(&owner.id).await.unwrap().unwrap();
    assert_eq!(owner.total_volunteer_hours, 0.0);
}

#[tokio::test]
async fn user_delete_decrements_surviving_event_counters() {
    let (store, ctx) = new_ctx();
    let owner = register(&ctx, "owner@example.com", "Owner").await;
    let org = create_org(&ctx, &owner, "Green Earth").await;
    let u2 = register(&ctx, "u2@example.com", "U2").await;
    membership::join_with_invite_code(&ctx, &u2.id, &org.invite_code)
        .await
        .unwrap();
    let ev = create_event(&ctx, &owner, &org, "Shift", 5).await;
    record_hours(&ctx, &ev.id, &u2.id, 3.0).await;

    user::delete_user(&ctx, &u2.id).await.unwrap();

    assert!(store.get_user(&u2.id).await.unwrap().is_none());
    assert!(store.get_member(&org.id, &u2.id).await.unwrap().is_none());
    assert!(store.list_user_attendance(&u2.id).await.unwrap().is_empty());
    let ev = store.get_event(&org.id, &ev.id).await.unwrap().unwrap();
    assert_eq!(ev.registered_volunteer, 0);
}
