//! Postgres aggregate store backed by `sqlx`.
//!
//! Multi-document operations run inside a real database transaction, and the
//! denormalized counters are maintained with single-statement in-place
//! updates (`GREATEST(0, x + delta)`), so concurrent writers serialize on the
//! row instead of racing a read-modify-write cycle.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, Row, Transaction};
use uuid::Uuid;

use crate::entity::{
    Account, Attendance, Event, EventStatus, Member, Organization, Program, Provider, User,
};
use crate::error::{DatabaseError, Error, Result};
use crate::permissions::Role;
use crate::types::{
    CreateAccount, CreateAttendance, CreateEvent, CreateMember, CreateOrganization, CreateProgram,
    CreateUser, UpdateAttendance, UpdateEvent, UpdateOrganization, UpdateProgram, UpdateUser,
};

use super::{AggregateStore, StoreTransaction};

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

fn bad_column(column: &str, value: &str) -> Error {
    Error::Database(DatabaseError::Query(format!(
        "unexpected value in column {column}: {value}"
    )))
}

// Enum columns are stored as TEXT, so rows are mapped by hand instead of
// deriving FromRow.

fn map_user(row: &PgRow) -> Result<User> {
    Ok(User {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        name: row.try_get("name")?,
        password_hash: row.try_get("password_hash")?,
        image: row.try_get("image")?,
        phone_number: row.try_get("phone_number")?,
        address: row.try_get("address")?,
        skills: row.try_get("skills")?,
        total_volunteer_hours: row.try_get("total_volunteer_hours")?,
        current_organization: row.try_get("current_organization")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn map_account(row: &PgRow) -> Result<Account> {
    let provider: String = row.try_get("provider")?;
    Ok(Account {
        id: row.try_get("id")?,
        provider: Provider::parse(&provider).ok_or_else(|| bad_column("provider", &provider))?,
        provider_id: row.try_get("provider_id")?,
        user_id: row.try_get("user_id")?,
        created_at: row.try_get("created_at")?,
    })
}

fn map_organization(row: &PgRow) -> Result<Organization> {
    Ok(Organization {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        logo: row.try_get("logo")?,
        owner_id: row.try_get("owner_id")?,
        invite_code: row.try_get("invite_code")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn map_member(row: &PgRow) -> Result<Member> {
    let role: String = row.try_get("role")?;
    Ok(Member {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        organization_id: row.try_get("organization_id")?,
        role: Role::parse(&role).ok_or_else(|| bad_column("role", &role))?,
        volunteer_hours: row.try_get("volunteer_hours")?,
        joined_at: row.try_get("joined_at")?,
    })
}

fn map_program(row: &PgRow) -> Result<Program> {
    Ok(Program {
        id: row.try_get("id")?,
        organization_id: row.try_get("organization_id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        starts_at: row.try_get("starts_at")?,
        ends_at: row.try_get("ends_at")?,
        created_by: row.try_get("created_by")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn map_event(row: &PgRow) -> Result<Event> {
    let status: String = row.try_get("status")?;
    Ok(Event {
        id: row.try_get("id")?,
        organization_id: row.try_get("organization_id")?,
        program_id: row.try_get("program_id")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        location: row.try_get("location")?,
        status: EventStatus::parse(&status).ok_or_else(|| bad_column("status", &status))?,
        required_volunteer: row.try_get("required_volunteer")?,
        registered_volunteer: row.try_get("registered_volunteer")?,
        starts_at: row.try_get("starts_at")?,
        ends_at: row.try_get("ends_at")?,
        created_by: row.try_get("created_by")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn map_attendance(row: &PgRow) -> Result<Attendance> {
    Ok(Attendance {
        id: row.try_get("id")?,
        event_id: row.try_get("event_id")?,
        user_id: row.try_get("user_id")?,
        is_present: row.try_get("is_present")?,
        check_in: row.try_get("check_in")?,
        check_out: row.try_get("check_out")?,
        hours_contributed: row.try_get("hours_contributed")?,
        feedback: row.try_get("feedback")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn map_all<T>(rows: Vec<PgRow>, map: impl Fn(&PgRow) -> Result<T>) -> Result<Vec<T>> {
    rows.iter().map(map).collect()
}

/// Postgres-backed [`AggregateStore`].
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect with default pool options.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        tracing::info!("connected to postgres");
        Ok(Self::new(pool))
    }

    /// Apply the bundled schema migrations. Runs before the store accepts
    /// traffic.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(DatabaseError::Query(e.to_string())))?;
        tracing::info!("database migrations applied");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

async fn insert_attendance_row(
    executor: &mut Transaction<'static, Postgres>,
    create: CreateAttendance,
) -> Result<Attendance> {
    let now = Utc::now();
    let attendance = Attendance {
        id: new_id(),
        event_id: create.event_id,
        user_id: create.user_id,
        is_present: create.is_present,
        check_in: create.check_in,
        check_out: create.check_out,
        hours_contributed: create.hours_contributed,
        feedback: create.feedback,
        created_at: now,
        updated_at: now,
    };
    sqlx::query(
        "INSERT INTO attendance \
         (id, event_id, user_id, is_present, check_in, check_out, hours_contributed, feedback, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
    )
    .bind(&attendance.id)
    .bind(&attendance.event_id)
    .bind(&attendance.user_id)
    .bind(attendance.is_present)
    .bind(attendance.check_in)
    .bind(attendance.check_out)
    .bind(attendance.hours_contributed)
    .bind(&attendance.feedback)
    .bind(attendance.created_at)
    .bind(attendance.updated_at)
    .execute(&mut **executor)
    .await?;
    Ok(attendance)
}

#[async_trait]
impl AggregateStore for PgStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Error::Database(DatabaseError::Transaction(e.to_string())))?;
        Ok(Box::new(PgStoreTransaction { tx }))
    }

    async fn get_user(&self, id: &str) -> Result<Option<User>> {
        let row = sqlx::query("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(map_user).transpose()
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let row = sqlx::query("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(map_user).transpose()
    }

    async fn update_user(&self, id: &str, update: UpdateUser) -> Result<User> {
        let row = sqlx::query(
            "UPDATE users SET \
             name = COALESCE($2, name), \
             image = COALESCE($3, image), \
             phone_number = COALESCE($4, phone_number), \
             address = COALESCE($5, address), \
             skills = COALESCE($6, skills), \
             updated_at = $7 \
             WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(update.name)
        .bind(update.image)
        .bind(update.phone_number)
        .bind(update.address)
        .bind(update.skills)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::not_found("User not found"))?;
        map_user(&row)
    }

    async fn get_account(
        &self,
        provider: Provider,
        provider_id: &str,
    ) -> Result<Option<Account>> {
        let row = sqlx::query("SELECT * FROM accounts WHERE provider = $1 AND provider_id = $2")
            .bind(provider.as_str())
            .bind(provider_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(map_account).transpose()
    }

    async fn get_organization(&self, id: &str) -> Result<Option<Organization>> {
        let row = sqlx::query("SELECT * FROM organizations WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(map_organization).transpose()
    }

    async fn list_user_organizations(&self, user_id: &str) -> Result<Vec<Organization>> {
        let rows = sqlx::query(
            "SELECT o.* FROM organizations o \
             JOIN members m ON m.organization_id = o.id \
             WHERE m.user_id = $1 ORDER BY o.created_at",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        map_all(rows, map_organization)
    }

    async fn update_organization(
        &self,
        id: &str,
        update: UpdateOrganization,
    ) -> Result<Organization> {
        let row = sqlx::query(
            "UPDATE organizations SET \
             name = COALESCE($2, name), \
             description = COALESCE($3, description), \
             logo = COALESCE($4, logo), \
             updated_at = $5 \
             WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(update.name)
        .bind(update.description)
        .bind(update.logo)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::not_found("Organization not found"))?;
        map_organization(&row)
    }

    async fn set_invite_code(&self, id: &str, invite_code: &str) -> Result<Organization> {
        let row = sqlx::query(
            "UPDATE organizations SET invite_code = $2, updated_at = $3 \
             WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(invite_code)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::not_found("Organization not found"))?;
        map_organization(&row)
    }

    async fn get_member(&self, organization_id: &str, user_id: &str) -> Result<Option<Member>> {
        let row = sqlx::query("SELECT * FROM members WHERE organization_id = $1 AND user_id = $2")
            .bind(organization_id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(map_member).transpose()
    }

    async fn list_members(&self, organization_id: &str) -> Result<Vec<Member>> {
        let rows =
            sqlx::query("SELECT * FROM members WHERE organization_id = $1 ORDER BY joined_at")
                .bind(organization_id)
                .fetch_all(&self.pool)
                .await?;
        map_all(rows, map_member)
    }

    async fn update_member_role(
        &self,
        organization_id: &str,
        user_id: &str,
        role: Role,
    ) -> Result<Member> {
        let row = sqlx::query(
            "UPDATE members SET role = $3 \
             WHERE organization_id = $1 AND user_id = $2 RETURNING *",
        )
        .bind(organization_id)
        .bind(user_id)
        .bind(role.as_str())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::not_found("Member not found"))?;
        map_member(&row)
    }

    async fn create_program(&self, create: CreateProgram) -> Result<Program> {
        let now = Utc::now();
        let program = Program {
            id: new_id(),
            organization_id: create.organization_id,
            name: create.name,
            description: create.description,
            starts_at: create.starts_at,
            ends_at: create.ends_at,
            created_by: create.created_by,
            created_at: now,
            updated_at: now,
        };
        sqlx::query(
            "INSERT INTO programs \
             (id, organization_id, name, description, starts_at, ends_at, created_by, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(&program.id)
        .bind(&program.organization_id)
        .bind(&program.name)
        .bind(&program.description)
        .bind(program.starts_at)
        .bind(program.ends_at)
        .bind(&program.created_by)
        .bind(program.created_at)
        .bind(program.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(program)
    }

    async fn get_program(&self, organization_id: &str, id: &str) -> Result<Option<Program>> {
        let row = sqlx::query("SELECT * FROM programs WHERE id = $1 AND organization_id = $2")
            .bind(id)
            .bind(organization_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(map_program).transpose()
    }

    async fn list_programs(&self, organization_id: &str) -> Result<Vec<Program>> {
        let rows =
            sqlx::query("SELECT * FROM programs WHERE organization_id = $1 ORDER BY created_at")
                .bind(organization_id)
                .fetch_all(&self.pool)
                .await?;
        map_all(rows, map_program)
    }

    async fn update_program(
        &self,
        organization_id: &str,
        id: &str,
        update: UpdateProgram,
    ) -> Result<Program> {
        let row = sqlx::query(
            "UPDATE programs SET \
             name = COALESCE($3, name), \
             description = COALESCE($4, description), \
             starts_at = COALESCE($5, starts_at), \
             ends_at = COALESCE($6, ends_at), \
             updated_at = $7 \
             WHERE id = $1 AND organization_id = $2 RETURNING *",
        )
        .bind(id)
        .bind(organization_id)
        .bind(update.name)
        .bind(update.description)
        .bind(update.starts_at)
        .bind(update.ends_at)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::not_found("Program not found"))?;
        map_program(&row)
    }

    async fn create_event(&self, create: CreateEvent) -> Result<Event> {
        let now = Utc::now();
        let event = Event {
            id: new_id(),
            organization_id: create.organization_id,
            program_id: create.program_id,
            title: create.title,
            description: create.description,
            location: create.location,
            status: create.status.unwrap_or(EventStatus::Pending),
            required_volunteer: create.required_volunteer,
            registered_volunteer: 0,
            starts_at: create.starts_at,
            ends_at: create.ends_at,
            created_by: create.created_by,
            created_at: now,
            updated_at: now,
        };
        sqlx::query(
            "INSERT INTO events \
             (id, organization_id, program_id, title, description, location, status, \
              required_volunteer, registered_volunteer, starts_at, ends_at, created_by, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)",
        )
        .bind(&event.id)
        .bind(&event.organization_id)
        .bind(&event.program_id)
        .bind(&event.title)
        .bind(&event.description)
        .bind(&event.location)
        .bind(event.status.as_str())
        .bind(event.required_volunteer)
        .bind(event.registered_volunteer)
        .bind(event.starts_at)
        .bind(event.ends_at)
        .bind(&event.created_by)
        .bind(event.created_at)
        .bind(event.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(event)
    }

    async fn get_event(&self, organization_id: &str, id: &str) -> Result<Option<Event>> {
        let row = sqlx::query("SELECT * FROM events WHERE id = $1 AND organization_id = $2")
            .bind(id)
            .bind(organization_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(map_event).transpose()
    }

    async fn list_events(&self, organization_id: &str) -> Result<Vec<Event>> {
        let rows =
            sqlx::query("SELECT * FROM events WHERE organization_id = $1 ORDER BY created_at")
                .bind(organization_id)
                .fetch_all(&self.pool)
                .await?;
        map_all(rows, map_event)
    }

    async fn update_event(
        &self,
        organization_id: &str,
        id: &str,
        update: UpdateEvent,
    ) -> Result<Event> {
        let row = sqlx::query(
            "UPDATE events SET \
             title = COALESCE($3, title), \
             description = COALESCE($4, description), \
             location = COALESCE($5, location), \
             status = COALESCE($6, status), \
             program_id = COALESCE($7, program_id), \
             required_volunteer = COALESCE($8, required_volunteer), \
             starts_at = COALESCE($9, starts_at), \
             ends_at = COALESCE($10, ends_at), \
             updated_at = $11 \
             WHERE id = $1 AND organization_id = $2 RETURNING *",
        )
        .bind(id)
        .bind(organization_id)
        .bind(update.title)
        .bind(update.description)
        .bind(update.location)
        .bind(update.status.map(|s| s.as_str()))
        .bind(update.program_id)
        .bind(update.required_volunteer)
        .bind(update.starts_at)
        .bind(update.ends_at)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::not_found("Event not found"))?;
        map_event(&row)
    }

    async fn get_attendance(&self, id: &str) -> Result<Option<Attendance>> {
        let row = sqlx::query("SELECT * FROM attendance WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(map_attendance).transpose()
    }

    async fn list_event_attendance(&self, event_id: &str) -> Result<Vec<Attendance>> {
        let rows = sqlx::query("SELECT * FROM attendance WHERE event_id = $1 ORDER BY created_at")
            .bind(event_id)
            .fetch_all(&self.pool)
            .await?;
        map_all(rows, map_attendance)
    }

    async fn list_user_attendance(&self, user_id: &str) -> Result<Vec<Attendance>> {
        let rows = sqlx::query("SELECT * FROM attendance WHERE user_id = $1 ORDER BY created_at")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        map_all(rows, map_attendance)
    }

    async fn count_programs(&self, organization_id: &str) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM programs WHERE organization_id = $1")
            .bind(organization_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    async fn count_events(&self, organization_id: &str) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM events WHERE organization_id = $1")
            .bind(organization_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    async fn count_events_with_status(
        &self,
        organization_id: &str,
        status: EventStatus,
    ) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM events WHERE organization_id = $1 AND status = $2",
        )
        .bind(organization_id)
        .bind(status.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(count as u64)
    }
}

pub struct PgStoreTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTransaction for PgStoreTransaction {
    async fn find_user(&mut self, id: &str) -> Result<Option<User>> {
        let row = sqlx::query("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(map_user).transpose()
    }

    async fn find_user_by_email(&mut self, email: &str) -> Result<Option<User>> {
        let row = sqlx::query("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(map_user).transpose()
    }

    async fn find_organization(&mut self, id: &str) -> Result<Option<Organization>> {
        let row = sqlx::query("SELECT * FROM organizations WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(map_organization).transpose()
    }

    async fn find_organization_by_name(&mut self, name: &str) -> Result<Option<Organization>> {
        let row = sqlx::query("SELECT * FROM organizations WHERE name = $1")
            .bind(name)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(map_organization).transpose()
    }

    async fn find_organization_by_invite_code(
        &mut self,
        invite_code: &str,
    ) -> Result<Option<Organization>> {
        let row = sqlx::query("SELECT * FROM organizations WHERE invite_code = $1")
            .bind(invite_code)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(map_organization).transpose()
    }

    async fn find_member(
        &mut self,
        organization_id: &str,
        user_id: &str,
    ) -> Result<Option<Member>> {
        let row = sqlx::query("SELECT * FROM members WHERE organization_id = $1 AND user_id = $2")
            .bind(organization_id)
            .bind(user_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(map_member).transpose()
    }

    async fn find_other_membership(
        &mut self,
        user_id: &str,
        exclude_organization_id: &str,
    ) -> Result<Option<Member>> {
        let row = sqlx::query(
            "SELECT * FROM members WHERE user_id = $1 AND organization_id <> $2 \
             ORDER BY joined_at LIMIT 1",
        )
        .bind(user_id)
        .bind(exclude_organization_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.as_ref().map(map_member).transpose()
    }

    async fn find_users_with_current_organization(
        &mut self,
        organization_id: &str,
    ) -> Result<Vec<User>> {
        let rows = sqlx::query(
            "SELECT * FROM users WHERE current_organization = $1 ORDER BY created_at",
        )
        .bind(organization_id)
        .fetch_all(&mut *self.tx)
        .await?;
        map_all(rows, map_user)
    }

    async fn find_program(
        &mut self,
        organization_id: &str,
        id: &str,
    ) -> Result<Option<Program>> {
        let row = sqlx::query("SELECT * FROM programs WHERE id = $1 AND organization_id = $2")
            .bind(id)
            .bind(organization_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(map_program).transpose()
    }

    async fn find_event(&mut self, id: &str) -> Result<Option<Event>> {
        let row = sqlx::query("SELECT * FROM events WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(map_event).transpose()
    }

    async fn list_events_in_organization(
        &mut self,
        organization_id: &str,
    ) -> Result<Vec<Event>> {
        let rows =
            sqlx::query("SELECT * FROM events WHERE organization_id = $1 ORDER BY created_at")
                .bind(organization_id)
                .fetch_all(&mut *self.tx)
                .await?;
        map_all(rows, map_event)
    }

    async fn list_events_in_program(&mut self, program_id: &str) -> Result<Vec<Event>> {
        let rows = sqlx::query("SELECT * FROM events WHERE program_id = $1 ORDER BY created_at")
            .bind(program_id)
            .fetch_all(&mut *self.tx)
            .await?;
        map_all(rows, map_event)
    }

    async fn find_attendance(&mut self, id: &str) -> Result<Option<Attendance>> {
        let row = sqlx::query("SELECT * FROM attendance WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(map_attendance).transpose()
    }

    async fn find_attendance_for(
        &mut self,
        event_id: &str,
        user_id: &str,
    ) -> Result<Option<Attendance>> {
        let row = sqlx::query("SELECT * FROM attendance WHERE event_id = $1 AND user_id = $2")
            .bind(event_id)
            .bind(user_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(map_attendance).transpose()
    }

    async fn list_attendance_for_event(&mut self, event_id: &str) -> Result<Vec<Attendance>> {
        let rows = sqlx::query("SELECT * FROM attendance WHERE event_id = $1 ORDER BY created_at")
            .bind(event_id)
            .fetch_all(&mut *self.tx)
            .await?;
        map_all(rows, map_attendance)
    }

    async fn list_attendance_for_user(&mut self, user_id: &str) -> Result<Vec<Attendance>> {
        let rows = sqlx::query("SELECT * FROM attendance WHERE user_id = $1 ORDER BY created_at")
            .bind(user_id)
            .fetch_all(&mut *self.tx)
            .await?;
        map_all(rows, map_attendance)
    }

    async fn insert_user(&mut self, create: CreateUser) -> Result<User> {
        let now = Utc::now();
        let user = User {
            id: new_id(),
            email: create.email,
            name: create.name,
            password_hash: create.password_hash,
            image: create.image,
            phone_number: None,
            address: None,
            skills: None,
            total_volunteer_hours: 0.0,
            current_organization: None,
            created_at: now,
            updated_at: now,
        };
        sqlx::query(
            "INSERT INTO users \
             (id, email, name, password_hash, image, total_volunteer_hours, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(&user.id)
        .bind(&user.email)
        .bind(&user.name)
        .bind(&user.password_hash)
        .bind(&user.image)
        .bind(user.total_volunteer_hours)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(user)
    }

    async fn insert_account(&mut self, create: CreateAccount) -> Result<Account> {
        let account = Account {
            id: new_id(),
            provider: create.provider,
            provider_id: create.provider_id,
            user_id: create.user_id,
            created_at: Utc::now(),
        };
        sqlx::query(
            "INSERT INTO accounts (id, provider, provider_id, user_id, created_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(&account.id)
        .bind(account.provider.as_str())
        .bind(&account.provider_id)
        .bind(&account.user_id)
        .bind(account.created_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(account)
    }

    async fn insert_organization(&mut self, create: CreateOrganization) -> Result<Organization> {
        let now = Utc::now();
        let org = Organization {
            id: new_id(),
            name: create.name,
            description: create.description,
            logo: create.logo,
            owner_id: create.owner_id,
            invite_code: create.invite_code,
            created_at: now,
            updated_at: now,
        };
        sqlx::query(
            "INSERT INTO organizations \
             (id, name, description, logo, owner_id, invite_code, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(&org.id)
        .bind(&org.name)
        .bind(&org.description)
        .bind(&org.logo)
        .bind(&org.owner_id)
        .bind(&org.invite_code)
        .bind(org.created_at)
        .bind(org.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(org)
    }

    async fn insert_member(&mut self, create: CreateMember) -> Result<Member> {
        let member = Member {
            id: new_id(),
            user_id: create.user_id,
            organization_id: create.organization_id,
            role: create.role,
            volunteer_hours: 0.0,
            joined_at: Utc::now(),
        };
        sqlx::query(
            "INSERT INTO members (id, user_id, organization_id, role, volunteer_hours, joined_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(&member.id)
        .bind(&member.user_id)
        .bind(&member.organization_id)
        .bind(member.role.as_str())
        .bind(member.volunteer_hours)
        .bind(member.joined_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(member)
    }

    async fn insert_attendance(&mut self, create: CreateAttendance) -> Result<Attendance> {
        insert_attendance_row(&mut self.tx, create).await
    }

    async fn update_attendance(
        &mut self,
        id: &str,
        update: UpdateAttendance,
    ) -> Result<Attendance> {
        let row = sqlx::query(
            "UPDATE attendance SET \
             is_present = COALESCE($2, is_present), \
             check_in = COALESCE($3, check_in), \
             check_out = COALESCE($4, check_out), \
             hours_contributed = COALESCE($5, hours_contributed), \
             feedback = COALESCE($6, feedback), \
             updated_at = $7 \
             WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(update.is_present)
        .bind(update.check_in)
        .bind(update.check_out)
        .bind(update.hours_contributed)
        .bind(update.feedback)
        .bind(Utc::now())
        .fetch_optional(&mut *self.tx)
        .await?
        .ok_or_else(|| Error::not_found("Attendance record not found"))?;
        map_attendance(&row)
    }

    async fn set_current_organization(
        &mut self,
        user_id: &str,
        organization_id: Option<&str>,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE users SET current_organization = $2, updated_at = $3 WHERE id = $1",
        )
        .bind(user_id)
        .bind(organization_id)
        .bind(Utc::now())
        .execute(&mut *self.tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(Error::not_found("User not found"));
        }
        Ok(())
    }

    async fn incr_event_registered(&mut self, event_id: &str, delta: i64) -> Result<()> {
        let result = sqlx::query(
            "UPDATE events SET \
             registered_volunteer = GREATEST(0, registered_volunteer + $2), \
             updated_at = $3 \
             WHERE id = $1",
        )
        .bind(event_id)
        .bind(delta)
        .bind(Utc::now())
        .execute(&mut *self.tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(Error::not_found("Event not found"));
        }
        Ok(())
    }

    async fn incr_user_hours(&mut self, user_id: &str, delta: f64) -> Result<()> {
        let result = sqlx::query(
            "UPDATE users SET \
             total_volunteer_hours = GREATEST(0, total_volunteer_hours + $2), \
             updated_at = $3 \
             WHERE id = $1",
        )
        .bind(user_id)
        .bind(delta)
        .bind(Utc::now())
        .execute(&mut *self.tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(Error::not_found("User not found"));
        }
        Ok(())
    }

    async fn delete_member(&mut self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM members WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn delete_members_in_organization(&mut self, organization_id: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM members WHERE organization_id = $1")
            .bind(organization_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_members_for_user(&mut self, user_id: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM members WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_accounts_for_user(&mut self, user_id: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM accounts WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_program(&mut self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM programs WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn delete_programs_in_organization(&mut self, organization_id: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM programs WHERE organization_id = $1")
            .bind(organization_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_event(&mut self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM events WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn delete_events_in_organization(&mut self, organization_id: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM events WHERE organization_id = $1")
            .bind(organization_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_events_in_program(&mut self, program_id: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM events WHERE program_id = $1")
            .bind(program_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_attendance(&mut self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM attendance WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn delete_attendance_for_event(&mut self, event_id: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM attendance WHERE event_id = $1")
            .bind(event_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_attendance_for_user(&mut self, user_id: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM attendance WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_organization(&mut self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM organizations WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn delete_user(&mut self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx
            .commit()
            .await
            .map_err(|e| Error::Database(DatabaseError::Transaction(e.to_string())))
    }

    async fn abort(self: Box<Self>) -> Result<()> {
        self.tx
            .rollback()
            .await
            .map_err(|e| Error::Database(DatabaseError::Transaction(e.to_string())))
    }
}
