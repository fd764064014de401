#![allow(dead_code)]

use volunteerhub_core::{Attendance, CoreConfig, Event, MemoryStore, Organization, User};
use volunteerhub_service::attendance::{self, RecordAttendanceInput};
use volunteerhub_service::event::{self, CreateEventInput};
use volunteerhub_service::identity::{self, RegisterInput};
use volunteerhub_service::organization::{self, CreateOrganizationInput};
use volunteerhub_service::ServiceContext;

/// Fresh in-memory context. The returned store handle shares state with the
/// context, so tests can inspect raw rows and inject faults.
pub fn new_ctx() -> (MemoryStore, ServiceContext<MemoryStore>) {
    new_ctx_with(CoreConfig::default())
}

pub fn new_ctx_with(config: CoreConfig) -> (MemoryStore, ServiceContext<MemoryStore>) {
    let store = MemoryStore::new();
    (store.clone(), ServiceContext::with_config(store, config))
}

pub async fn register(ctx: &ServiceContext<MemoryStore>, email: &str, name: &str) -> User {
    identity::register(
        ctx,
        RegisterInput {
            email: email.to_string(),
            name: name.to_string(),
            password: "correct-horse-battery".to_string(),
            image: None,
        },
    )
    .await
    .unwrap()
}

pub async fn create_org(
    ctx: &ServiceContext<MemoryStore>,
    owner: &User,
    name: &str,
) -> Organization {
    organization::create_organization(
        ctx,
        &owner.id,
        CreateOrganizationInput {
            name: name.to_string(),
            description: None,
            logo: None,
        },
    )
    .await
    .unwrap()
}

pub async fn create_event(
    ctx: &ServiceContext<MemoryStore>,
    creator: &User,
    org: &Organization,
    title: &str,
    required_volunteer: i64,
) -> Event {
    event::create_event(
        ctx,
        &creator.id,
        &org.id,
        CreateEventInput {
            program_id: None,
            title: title.to_string(),
            description: None,
            location: None,
            status: None,
            required_volunteer,
            starts_at: None,
            ends_at: None,
        },
    )
    .await
    .unwrap()
}

/// Record attendance with explicit hours and no timestamps.
pub async fn record_hours(
    ctx: &ServiceContext<MemoryStore>,
    event_id: &str,
    user_id: &str,
    hours: f64,
) -> Attendance {
    attendance::record_attendance(
        ctx,
        RecordAttendanceInput {
            event_id: event_id.to_string(),
            user_id: user_id.to_string(),
            is_present: true,
            check_in: None,
            check_out: None,
            hours: Some(hours),
            feedback: None,
        },
    )
    .await
    .unwrap()
}
