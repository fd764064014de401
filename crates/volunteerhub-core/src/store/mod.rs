//! Aggregate store abstraction.
//!
//! The store is the only stateful collaborator in the system: all service
//! components are stateless request handlers reading and writing through it.
//! It exposes three kinds of operations:
//!
//! * plain reads and single-document writes, each atomic on its own;
//! * [`AggregateStore::begin`], opening a multi-document transaction whose
//!   writes become visible all at once on commit — readers never observe a
//!   member row without its organization or an organization without its
//!   owner membership;
//! * atomic counter primitives on the transaction
//!   ([`StoreTransaction::incr_event_registered`],
//!   [`StoreTransaction::incr_user_hours`]) that increment in place instead
//!   of read-modify-write, so concurrent registrations cannot lose updates.

use async_trait::async_trait;

use crate::entity::{
    Account, Attendance, Event, EventStatus, Member, Organization, Program, Provider, User,
};
use crate::error::Result;
use crate::permissions::Role;
use crate::types::{
    CreateAccount, CreateAttendance, CreateEvent, CreateMember, CreateOrganization, CreateProgram,
    CreateUser, UpdateAttendance, UpdateEvent, UpdateOrganization, UpdateProgram, UpdateUser,
};

pub mod memory;
#[cfg(feature = "sqlx-postgres")]
pub mod postgres;

pub use memory::MemoryStore;
#[cfg(feature = "sqlx-postgres")]
pub use postgres::PgStore;

/// Document store with multi-document transactions and atomic increments.
#[async_trait]
pub trait AggregateStore: Send + Sync + 'static {
    /// Open a multi-document transaction.
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>>;

    // --- Users ---
    async fn get_user(&self, id: &str) -> Result<Option<User>>;
    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>>;
    async fn update_user(&self, id: &str, update: UpdateUser) -> Result<User>;

    // --- Accounts ---
    async fn get_account(&self, provider: Provider, provider_id: &str)
        -> Result<Option<Account>>;

    // --- Organizations ---
    async fn get_organization(&self, id: &str) -> Result<Option<Organization>>;
    async fn list_user_organizations(&self, user_id: &str) -> Result<Vec<Organization>>;
    async fn update_organization(
        &self,
        id: &str,
        update: UpdateOrganization,
    ) -> Result<Organization>;
    async fn set_invite_code(&self, id: &str, invite_code: &str) -> Result<Organization>;

    // --- Members ---
    async fn get_member(&self, organization_id: &str, user_id: &str) -> Result<Option<Member>>;
    async fn list_members(&self, organization_id: &str) -> Result<Vec<Member>>;
    async fn update_member_role(
        &self,
        organization_id: &str,
        user_id: &str,
        role: Role,
    ) -> Result<Member>;

    // --- Programs ---
    async fn create_program(&self, program: CreateProgram) -> Result<Program>;
    async fn get_program(&self, organization_id: &str, id: &str) -> Result<Option<Program>>;
    async fn list_programs(&self, organization_id: &str) -> Result<Vec<Program>>;
    async fn update_program(
        &self,
        organization_id: &str,
        id: &str,
        update: UpdateProgram,
    ) -> Result<Program>;

    // --- Events ---
    async fn create_event(&self, event: CreateEvent) -> Result<Event>;
    async fn get_event(&self, organization_id: &str, id: &str) -> Result<Option<Event>>;
    async fn list_events(&self, organization_id: &str) -> Result<Vec<Event>>;
    async fn update_event(
        &self,
        organization_id: &str,
        id: &str,
        update: UpdateEvent,
    ) -> Result<Event>;

    // --- Attendance ---
    async fn get_attendance(&self, id: &str) -> Result<Option<Attendance>>;
    async fn list_event_attendance(&self, event_id: &str) -> Result<Vec<Attendance>>;
    async fn list_user_attendance(&self, user_id: &str) -> Result<Vec<Attendance>>;

    // --- Analytics counts ---
    async fn count_programs(&self, organization_id: &str) -> Result<u64>;
    async fn count_events(&self, organization_id: &str) -> Result<u64>;
    async fn count_events_with_status(
        &self,
        organization_id: &str,
        status: EventStatus,
    ) -> Result<u64>;
}

/// An open multi-document transaction.
///
/// Writes staged here become visible atomically on [`commit`]; [`abort`]
/// discards them. Reads observe the transaction's own staged writes.
/// Dropping a transaction without committing discards it.
///
/// [`commit`]: StoreTransaction::commit
/// [`abort`]: StoreTransaction::abort
#[async_trait]
pub trait StoreTransaction: Send {
    // --- Reads within the transaction ---
    async fn find_user(&mut self, id: &str) -> Result<Option<User>>;
    async fn find_user_by_email(&mut self, email: &str) -> Result<Option<User>>;
    async fn find_organization(&mut self, id: &str) -> Result<Option<Organization>>;
    async fn find_organization_by_name(&mut self, name: &str) -> Result<Option<Organization>>;
    async fn find_organization_by_invite_code(
        &mut self,
        invite_code: &str,
    ) -> Result<Option<Organization>>;
    async fn find_member(
        &mut self,
        organization_id: &str,
        user_id: &str,
    ) -> Result<Option<Member>>;
    /// Any membership of `user_id` outside `exclude_organization_id`, used to
    /// re-point `current_organization` after a membership goes away.
    async fn find_other_membership(
        &mut self,
        user_id: &str,
        exclude_organization_id: &str,
    ) -> Result<Option<Member>>;
    /// Users whose `current_organization` points at `organization_id`.
    async fn find_users_with_current_organization(
        &mut self,
        organization_id: &str,
    ) -> Result<Vec<User>>;
    async fn find_program(
        &mut self,
        organization_id: &str,
        id: &str,
    ) -> Result<Option<Program>>;
    async fn find_event(&mut self, id: &str) -> Result<Option<Event>>;
    async fn list_events_in_organization(
        &mut self,
        organization_id: &str,
    ) -> Result<Vec<Event>>;
    async fn list_events_in_program(&mut self, program_id: &str) -> Result<Vec<Event>>;
    async fn find_attendance(&mut self, id: &str) -> Result<Option<Attendance>>;
    async fn find_attendance_for(
        &mut self,
        event_id: &str,
        user_id: &str,
    ) -> Result<Option<Attendance>>;
    async fn list_attendance_for_event(&mut self, event_id: &str) -> Result<Vec<Attendance>>;
    async fn list_attendance_for_user(&mut self, user_id: &str) -> Result<Vec<Attendance>>;

    // --- Inserts ---
    async fn insert_user(&mut self, user: CreateUser) -> Result<User>;
    async fn insert_account(&mut self, account: CreateAccount) -> Result<Account>;
    async fn insert_organization(&mut self, org: CreateOrganization) -> Result<Organization>;
    async fn insert_member(&mut self, member: CreateMember) -> Result<Member>;
    async fn insert_attendance(&mut self, attendance: CreateAttendance) -> Result<Attendance>;

    // --- Updates ---
    async fn update_attendance(
        &mut self,
        id: &str,
        update: UpdateAttendance,
    ) -> Result<Attendance>;
    async fn set_current_organization(
        &mut self,
        user_id: &str,
        organization_id: Option<&str>,
    ) -> Result<()>;

    // --- Atomic counters (increment in place, floored at zero) ---
    async fn incr_event_registered(&mut self, event_id: &str, delta: i64) -> Result<()>;
    async fn incr_user_hours(&mut self, user_id: &str, delta: f64) -> Result<()>;

    // --- Deletes ---
    async fn delete_member(&mut self, id: &str) -> Result<()>;
    async fn delete_members_in_organization(&mut self, organization_id: &str) -> Result<u64>;
    async fn delete_members_for_user(&mut self, user_id: &str) -> Result<u64>;
    async fn delete_accounts_for_user(&mut self, user_id: &str) -> Result<u64>;
    async fn delete_program(&mut self, id: &str) -> Result<()>;
    async fn delete_programs_in_organization(&mut self, organization_id: &str) -> Result<u64>;
    async fn delete_event(&mut self, id: &str) -> Result<()>;
    async fn delete_events_in_organization(&mut self, organization_id: &str) -> Result<u64>;
    async fn delete_events_in_program(&mut self, program_id: &str) -> Result<u64>;
    async fn delete_attendance(&mut self, id: &str) -> Result<()>;
    async fn delete_attendance_for_event(&mut self, event_id: &str) -> Result<u64>;
    async fn delete_attendance_for_user(&mut self, user_id: &str) -> Result<u64>;
    async fn delete_organization(&mut self, id: &str) -> Result<()>;
    async fn delete_user(&mut self, id: &str) -> Result<()>;

    // --- Outcome ---
    async fn commit(self: Box<Self>) -> Result<()>;
    async fn abort(self: Box<Self>) -> Result<()>;
}
