//! In-memory aggregate store.
//!
//! Intended for tests and local development. A transaction stages a full
//! copy of the state and swaps it in on commit, so partial writes are never
//! observable. Concurrency is optimistic, first committer wins: every write
//! bumps a state version, and a commit whose snapshot is stale fails with a
//! transient error so the caller's retry loop replays it against the new
//! state.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
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

#[derive(Debug, Default, Clone)]
struct State {
    /// Bumped on every committed transaction and every direct write; stale
    /// transactions detect it at commit time.
    version: u64,
    users: HashMap<String, User>,
    accounts: HashMap<String, Account>,
    organizations: HashMap<String, Organization>,
    members: HashMap<String, Member>,
    programs: HashMap<String, Program>,
    events: HashMap<String, Event>,
    attendance: HashMap<String, Attendance>,
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

impl State {
    fn insert_user(&mut self, create: CreateUser) -> Result<User> {
        if self.users.values().any(|u| u.email == create.email) {
            return Err(Error::Database(DatabaseError::Constraint(format!(
                "duplicate user email: {}",
                create.email
            ))));
        }
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
        self.users.insert(user.id.clone(), user.clone());
        Ok(user)
    }

    fn insert_account(&mut self, create: CreateAccount) -> Result<Account> {
        if self
            .accounts
            .values()
            .any(|a| a.provider == create.provider && a.provider_id == create.provider_id)
        {
            return Err(Error::Database(DatabaseError::Constraint(format!(
                "duplicate account: {} {}",
                create.provider, create.provider_id
            ))));
        }
        let account = Account {
            id: new_id(),
            provider: create.provider,
            provider_id: create.provider_id,
            user_id: create.user_id,
            created_at: Utc::now(),
        };
        self.accounts.insert(account.id.clone(), account.clone());
        Ok(account)
    }

    fn insert_organization(&mut self, create: CreateOrganization) -> Result<Organization> {
        if self.organizations.values().any(|o| o.name == create.name) {
            return Err(Error::Database(DatabaseError::Constraint(format!(
                "duplicate organization name: {}",
                create.name
            ))));
        }
        if self
            .organizations
            .values()
            .any(|o| o.invite_code == create.invite_code)
        {
            return Err(Error::Database(DatabaseError::Constraint(
                "duplicate invite code".to_string(),
            )));
        }
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
        self.organizations.insert(org.id.clone(), org.clone());
        Ok(org)
    }

    fn insert_member(&mut self, create: CreateMember) -> Result<Member> {
        if self
            .members
            .values()
            .any(|m| m.user_id == create.user_id && m.organization_id == create.organization_id)
        {
            return Err(Error::Database(DatabaseError::Constraint(format!(
                "duplicate membership: ({}, {})",
                create.user_id, create.organization_id
            ))));
        }
        let member = Member {
            id: new_id(),
            user_id: create.user_id,
            organization_id: create.organization_id,
            role: create.role,
            volunteer_hours: 0.0,
            joined_at: Utc::now(),
        };
        self.members.insert(member.id.clone(), member.clone());
        Ok(member)
    }

    fn insert_attendance(&mut self, create: CreateAttendance) -> Result<Attendance> {
        if self
            .attendance
            .values()
            .any(|a| a.event_id == create.event_id && a.user_id == create.user_id)
        {
            return Err(Error::Database(DatabaseError::Constraint(format!(
                "duplicate attendance: ({}, {})",
                create.event_id, create.user_id
            ))));
        }
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
        self.attendance
            .insert(attendance.id.clone(), attendance.clone());
        Ok(attendance)
    }

    fn update_attendance(&mut self, id: &str, update: UpdateAttendance) -> Result<Attendance> {
        let attendance = self
            .attendance
            .get_mut(id)
            .ok_or_else(|| Error::not_found("Attendance record not found"))?;
        if let Some(is_present) = update.is_present {
            attendance.is_present = is_present;
        }
        if let Some(check_in) = update.check_in {
            attendance.check_in = Some(check_in);
        }
        if let Some(check_out) = update.check_out {
            attendance.check_out = Some(check_out);
        }
        if let Some(hours) = update.hours_contributed {
            attendance.hours_contributed = hours;
        }
        if let Some(feedback) = update.feedback {
            attendance.feedback = Some(feedback);
        }
        attendance.updated_at = Utc::now();
        Ok(attendance.clone())
    }

    fn incr_event_registered(&mut self, event_id: &str, delta: i64) -> Result<()> {
        let event = self
            .events
            .get_mut(event_id)
            .ok_or_else(|| Error::not_found("Event not found"))?;
        event.registered_volunteer = (event.registered_volunteer + delta).max(0);
        event.updated_at = Utc::now();
        Ok(())
    }

    fn incr_user_hours(&mut self, user_id: &str, delta: f64) -> Result<()> {
        let user = self
            .users
            .get_mut(user_id)
            .ok_or_else(|| Error::not_found("User not found"))?;
        user.total_volunteer_hours = (user.total_volunteer_hours + delta).max(0.0);
        user.updated_at = Utc::now();
        Ok(())
    }

    fn sorted<T: Clone>(
        map: &HashMap<String, T>,
        mut filter: impl FnMut(&T) -> bool,
        key: impl Fn(&T) -> chrono::DateTime<Utc>,
    ) -> Vec<T> {
        let mut rows: Vec<T> = map.values().filter(|t| filter(t)).cloned().collect();
        rows.sort_by_key(|t| key(t));
        rows
    }
}

/// In-memory [`AggregateStore`].
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
    fail_after_writes: Arc<Mutex<Option<u32>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arrange for the next transaction to fail with a transient error after
    /// `writes` successful write operations. Consumed by that transaction;
    /// a retry starts clean. Test support for atomicity properties.
    pub fn fail_after_writes(&self, writes: u32) {
        *self.fail_after_writes.lock().unwrap() = Some(writes);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        // A poisoned lock means a panic mid-mutation; propagate it.
        self.state.lock().unwrap()
    }
}

pub struct MemoryTransaction {
    shared: Arc<Mutex<State>>,
    staged: State,
    base_version: u64,
    writes_done: u32,
    fail_after: Option<u32>,
}

impl MemoryTransaction {
    fn record_write(&mut self) -> Result<()> {
        if let Some(limit) = self.fail_after {
            if self.writes_done >= limit {
                return Err(Error::Database(DatabaseError::Transaction(
                    "injected write failure".to_string(),
                )));
            }
        }
        self.writes_done += 1;
        Ok(())
    }
}

#[async_trait]
impl AggregateStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>> {
        let staged = self.lock().clone();
        let fail_after = self.fail_after_writes.lock().unwrap().take();
        Ok(Box::new(MemoryTransaction {
            shared: Arc::clone(&self.state),
            base_version: staged.version,
            staged,
            writes_done: 0,
            fail_after,
        }))
    }

    async fn get_user(&self, id: &str) -> Result<Option<User>> {
        Ok(self.lock().users.get(id).cloned())
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(self.lock().users.values().find(|u| u.email == email).cloned())
    }

    async fn update_user(&self, id: &str, update: UpdateUser) -> Result<User> {
        let mut state = self.lock();
        let user = state
            .users
            .get_mut(id)
            .ok_or_else(|| Error::not_found("User not found"))?;
        if let Some(name) = update.name {
            user.name = name;
        }
        if let Some(image) = update.image {
            user.image = Some(image);
        }
        if let Some(phone_number) = update.phone_number {
            user.phone_number = Some(phone_number);
        }
        if let Some(address) = update.address {
            user.address = Some(address);
        }
        if let Some(skills) = update.skills {
            user.skills = Some(skills);
        }
        user.updated_at = Utc::now();
        let user = user.clone();
        state.version += 1;
        Ok(user)
    }

    async fn get_account(
        &self,
        provider: Provider,
        provider_id: &str,
    ) -> Result<Option<Account>> {
        Ok(self
            .lock()
            .accounts
            .values()
            .find(|a| a.provider == provider && a.provider_id == provider_id)
            .cloned())
    }

    async fn get_organization(&self, id: &str) -> Result<Option<Organization>> {
        Ok(self.lock().organizations.get(id).cloned())
    }

    async fn list_user_organizations(&self, user_id: &str) -> Result<Vec<Organization>> {
        let state = self.lock();
        let mut orgs: Vec<Organization> = state
            .members
            .values()
            .filter(|m| m.user_id == user_id)
            .filter_map(|m| state.organizations.get(&m.organization_id).cloned())
            .collect();
        orgs.sort_by_key(|o| o.created_at);
        Ok(orgs)
    }

    async fn update_organization(
        &self,
        id: &str,
        update: UpdateOrganization,
    ) -> Result<Organization> {
        let mut state = self.lock();
        let org = state
            .organizations
            .get_mut(id)
            .ok_or_else(|| Error::not_found("Organization not found"))?;
        if let Some(name) = update.name {
            org.name = name;
        }
        if let Some(description) = update.description {
            org.description = Some(description);
        }
        if let Some(logo) = update.logo {
            org.logo = Some(logo);
        }
        org.updated_at = Utc::now();
        let org = org.clone();
        state.version += 1;
        Ok(org)
    }

    async fn set_invite_code(&self, id: &str, invite_code: &str) -> Result<Organization> {
        let mut state = self.lock();
        let org = state
            .organizations
            .get_mut(id)
            .ok_or_else(|| Error::not_found("Organization not found"))?;
        org.invite_code = invite_code.to_string();
        org.updated_at = Utc::now();
        let org = org.clone();
        state.version += 1;
        Ok(org)
    }

    async fn get_member(&self, organization_id: &str, user_id: &str) -> Result<Option<Member>> {
        Ok(self
            .lock()
            .members
            .values()
            .find(|m| m.organization_id == organization_id && m.user_id == user_id)
            .cloned())
    }

    async fn list_members(&self, organization_id: &str) -> Result<Vec<Member>> {
        let state = self.lock();
        Ok(State::sorted(
            &state.members,
            |m| m.organization_id == organization_id,
            |m| m.joined_at,
        ))
    }

    async fn update_member_role(
        &self,
        organization_id: &str,
        user_id: &str,
        role: Role,
    ) -> Result<Member> {
        let mut state = self.lock();
        let member = state
            .members
            .values_mut()
            .find(|m| m.organization_id == organization_id && m.user_id == user_id)
            .ok_or_else(|| Error::not_found("Member not found"))?;
        member.role = role;
        let member = member.clone();
        state.version += 1;
        Ok(member)
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
        let mut state = self.lock();
        state.programs.insert(program.id.clone(), program.clone());
        state.version += 1;
        Ok(program)
    }

    async fn get_program(&self, organization_id: &str, id: &str) -> Result<Option<Program>> {
        Ok(self
            .lock()
            .programs
            .get(id)
            .filter(|p| p.organization_id == organization_id)
            .cloned())
    }

    async fn list_programs(&self, organization_id: &str) -> Result<Vec<Program>> {
        let state = self.lock();
        Ok(State::sorted(
            &state.programs,
            |p| p.organization_id == organization_id,
            |p| p.created_at,
        ))
    }

    async fn update_program(
        &self,
        organization_id: &str,
        id: &str,
        update: UpdateProgram,
    ) -> Result<Program> {
        let mut state = self.lock();
        let program = state
            .programs
            .get_mut(id)
            .filter(|p| p.organization_id == organization_id)
            .ok_or_else(|| Error::not_found("Program not found"))?;
        if let Some(name) = update.name {
            program.name = name;
        }
        if let Some(description) = update.description {
            program.description = Some(description);
        }
        if let Some(starts_at) = update.starts_at {
            program.starts_at = Some(starts_at);
        }
        if let Some(ends_at) = update.ends_at {
            program.ends_at = Some(ends_at);
        }
        program.updated_at = Utc::now();
        let program = program.clone();
        state.version += 1;
        Ok(program)
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
        let mut state = self.lock();
        state.events.insert(event.id.clone(), event.clone());
        state.version += 1;
        Ok(event)
    }

    async fn get_event(&self, organization_id: &str, id: &str) -> Result<Option<Event>> {
        Ok(self
            .lock()
            .events
            .get(id)
            .filter(|e| e.organization_id == organization_id)
            .cloned())
    }

    async fn list_events(&self, organization_id: &str) -> Result<Vec<Event>> {
        let state = self.lock();
        Ok(State::sorted(
            &state.events,
            |e| e.organization_id == organization_id,
            |e| e.created_at,
        ))
    }

    async fn update_event(
        &self,
        organization_id: &str,
        id: &str,
        update: UpdateEvent,
    ) -> Result<Event> {
        let mut state = self.lock();
        let event = state
            .events
            .get_mut(id)
            .filter(|e| e.organization_id == organization_id)
            .ok_or_else(|| Error::not_found("Event not found"))?;
        if let Some(title) = update.title {
            event.title = title;
        }
        if let Some(description) = update.description {
            event.description = Some(description);
        }
        if let Some(location) = update.location {
            event.location = Some(location);
        }
        if let Some(status) = update.status {
            event.status = status;
        }
        if let Some(program_id) = update.program_id {
            event.program_id = Some(program_id);
        }
        if let Some(required_volunteer) = update.required_volunteer {
            event.required_volunteer = required_volunteer;
        }
        if let Some(starts_at) = update.starts_at {
            event.starts_at = Some(starts_at);
        }
        if let Some(ends_at) = update.ends_at {
            event.ends_at = Some(ends_at);
        }
        event.updated_at = Utc::now();
        let event = event.clone();
        state.version += 1;
        Ok(event)
    }

    async fn get_attendance(&self, id: &str) -> Result<Option<Attendance>> {
        Ok(self.lock().attendance.get(id).cloned())
    }

    async fn list_event_attendance(&self, event_id: &str) -> Result<Vec<Attendance>> {
        let state = self.lock();
        Ok(State::sorted(
            &state.attendance,
            |a| a.event_id == event_id,
            |a| a.created_at,
        ))
    }

    async fn list_user_attendance(&self, user_id: &str) -> Result<Vec<Attendance>> {
        let state = self.lock();
        Ok(State::sorted(
            &state.attendance,
            |a| a.user_id == user_id,
            |a| a.created_at,
        ))
    }

    async fn count_programs(&self, organization_id: &str) -> Result<u64> {
        Ok(self
            .lock()
            .programs
            .values()
            .filter(|p| p.organization_id == organization_id)
            .count() as u64)
    }

    async fn count_events(&self, organization_id: &str) -> Result<u64> {
        Ok(self
            .lock()
            .events
            .values()
            .filter(|e| e.organization_id == organization_id)
            .count() as u64)
    }

    async fn count_events_with_status(
        &self,
        organization_id: &str,
        status: EventStatus,
    ) -> Result<u64> {
        Ok(self
            .lock()
            .events
            .values()
            .filter(|e| e.organization_id == organization_id && e.status == status)
            .count() as u64)
    }
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn find_user(&mut self, id: &str) -> Result<Option<User>> {
        Ok(self.staged.users.get(id).cloned())
    }

    async fn find_user_by_email(&mut self, email: &str) -> Result<Option<User>> {
        Ok(self
            .staged
            .users
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn find_organization(&mut self, id: &str) -> Result<Option<Organization>> {
        Ok(self.staged.organizations.get(id).cloned())
    }

    async fn find_organization_by_name(&mut self, name: &str) -> Result<Option<Organization>> {
        Ok(self
            .staged
            .organizations
            .values()
            .find(|o| o.name == name)
            .cloned())
    }

    async fn find_organization_by_invite_code(
        &mut self,
        invite_code: &str,
    ) -> Result<Option<Organization>> {
        Ok(self
            .staged
            .organizations
            .values()
            .find(|o| o.invite_code == invite_code)
            .cloned())
    }

    async fn find_member(
        &mut self,
        organization_id: &str,
        user_id: &str,
    ) -> Result<Option<Member>> {
        Ok(self
            .staged
            .members
            .values()
            .find(|m| m.organization_id == organization_id && m.user_id == user_id)
            .cloned())
    }

    async fn find_other_membership(
        &mut self,
        user_id: &str,
        exclude_organization_id: &str,
    ) -> Result<Option<Member>> {
        let mut memberships: Vec<&Member> = self
            .staged
            .members
            .values()
            .filter(|m| m.user_id == user_id && m.organization_id != exclude_organization_id)
            .collect();
        memberships.sort_by_key(|m| m.joined_at);
        Ok(memberships.first().map(|m| (*m).clone()))
    }

    async fn find_users_with_current_organization(
        &mut self,
        organization_id: &str,
    ) -> Result<Vec<User>> {
        Ok(State::sorted(
            &self.staged.users,
            |u| u.current_organization.as_deref() == Some(organization_id),
            |u| u.created_at,
        ))
    }

    async fn find_program(
        &mut self,
        organization_id: &str,
        id: &str,
    ) -> Result<Option<Program>> {
        Ok(self
            .staged
            .programs
            .get(id)
            .filter(|p| p.organization_id == organization_id)
            .cloned())
    }

    async fn find_event(&mut self, id: &str) -> Result<Option<Event>> {
        Ok(self.staged.events.get(id).cloned())
    }

    async fn list_events_in_organization(
        &mut self,
        organization_id: &str,
    ) -> Result<Vec<Event>> {
        Ok(State::sorted(
            &self.staged.events,
            |e| e.organization_id == organization_id,
            |e| e.created_at,
        ))
    }

    async fn list_events_in_program(&mut self, program_id: &str) -> Result<Vec<Event>> {
        Ok(State::sorted(
            &self.staged.events,
            |e| e.program_id.as_deref() == Some(program_id),
            |e| e.created_at,
        ))
    }

    async fn find_attendance(&mut self, id: &str) -> Result<Option<Attendance>> {
        Ok(self.staged.attendance.get(id).cloned())
    }

    async fn find_attendance_for(
        &mut self,
        event_id: &str,
        user_id: &str,
    ) -> Result<Option<Attendance>> {
        Ok(self
            .staged
            .attendance
            .values()
            .find(|a| a.event_id == event_id && a.user_id == user_id)
            .cloned())
    }

    async fn list_attendance_for_event(&mut self, event_id: &str) -> Result<Vec<Attendance>> {
        Ok(State::sorted(
            &self.staged.attendance,
            |a| a.event_id == event_id,
            |a| a.created_at,
        ))
    }

    async fn list_attendance_for_user(&mut self, user_id: &str) -> Result<Vec<Attendance>> {
        Ok(State::sorted(
            &self.staged.attendance,
            |a| a.user_id == user_id,
            |a| a.created_at,
        ))
    }

    async fn insert_user(&mut self, user: CreateUser) -> Result<User> {
        self.record_write()?;
        self.staged.insert_user(user)
    }

    async fn insert_account(&mut self, account: CreateAccount) -> Result<Account> {
        self.record_write()?;
        self.staged.insert_account(account)
    }

    async fn insert_organization(&mut self, org: CreateOrganization) -> Result<Organization> {
        self.record_write()?;
        self.staged.insert_organization(org)
    }

    async fn insert_member(&mut self, member: CreateMember) -> Result<Member> {
        self.record_write()?;
        self.staged.insert_member(member)
    }

    async fn insert_attendance(&mut self, attendance: CreateAttendance) -> Result<Attendance> {
        self.record_write()?;
        self.staged.insert_attendance(attendance)
    }

    async fn update_attendance(
        &mut self,
        id: &str,
        update: UpdateAttendance,
    ) -> Result<Attendance> {
        self.record_write()?;
        self.staged.update_attendance(id, update)
    }

    async fn set_current_organization(
        &mut self,
        user_id: &str,
        organization_id: Option<&str>,
    ) -> Result<()> {
        self.record_write()?;
        let user = self
            .staged
            .users
            .get_mut(user_id)
            .ok_or_else(|| Error::not_found("User not found"))?;
        user.current_organization = organization_id.map(|s| s.to_string());
        user.updated_at = Utc::now();
        Ok(())
    }

    async fn incr_event_registered(&mut self, event_id: &str, delta: i64) -> Result<()> {
        self.record_write()?;
        self.staged.incr_event_registered(event_id, delta)
    }

    async fn incr_user_hours(&mut self, user_id: &str, delta: f64) -> Result<()> {
        self.record_write()?;
        self.staged.incr_user_hours(user_id, delta)
    }

    async fn delete_member(&mut self, id: &str) -> Result<()> {
        self.record_write()?;
        self.staged.members.remove(id);
        Ok(())
    }

    async fn delete_members_in_organization(&mut self, organization_id: &str) -> Result<u64> {
        self.record_write()?;
        let before = self.staged.members.len();
        self.staged
            .members
            .retain(|_, m| m.organization_id != organization_id);
        Ok((before - self.staged.members.len()) as u64)
    }

    async fn delete_members_for_user(&mut self, user_id: &str) -> Result<u64> {
        self.record_write()?;
        let before = self.staged.members.len();
        self.staged.members.retain(|_, m| m.user_id != user_id);
        Ok((before - self.staged.members.len()) as u64)
    }

    async fn delete_accounts_for_user(&mut self, user_id: &str) -> Result<u64> {
        self.record_write()?;
        let before = self.staged.accounts.len();
        self.staged.accounts.retain(|_, a| a.user_id != user_id);
        Ok((before - self.staged.accounts.len()) as u64)
    }

    async fn delete_program(&mut self, id: &str) -> Result<()> {
        self.record_write()?;
        self.staged.programs.remove(id);
        Ok(())
    }

    async fn delete_programs_in_organization(&mut self, organization_id: &str) -> Result<u64> {
        self.record_write()?;
        let before = self.staged.programs.len();
        self.staged
            .programs
            .retain(|_, p| p.organization_id != organization_id);
        Ok((before - self.staged.programs.len()) as u64)
    }

    async fn delete_event(&mut self, id: &str) -> Result<()> {
        self.record_write()?;
        self.staged.events.remove(id);
        Ok(())
    }

    async fn delete_events_in_organization(&mut self, organization_id: &str) -> Result<u64> {
        self.record_write()?;
        let before = self.staged.events.len();
        self.staged
            .events
            .retain(|_, e| e.organization_id != organization_id);
        Ok((before - self.staged.events.len()) as u64)
    }

    async fn delete_events_in_program(&mut self, program_id: &str) -> Result<u64> {
        self.record_write()?;
        let before = self.staged.events.len();
        self.staged
            .events
            .retain(|_, e| e.program_id.as_deref() != Some(program_id));
        Ok((before - self.staged.events.len()) as u64)
    }

    async fn delete_attendance(&mut self, id: &str) -> Result<()> {
        self.record_write()?;
        self.staged.attendance.remove(id);
        Ok(())
    }

    async fn delete_attendance_for_event(&mut self, event_id: &str) -> Result<u64> {
        self.record_write()?;
        let before = self.staged.attendance.len();
        self.staged.attendance.retain(|_, a| a.event_id != event_id);
        Ok((before - self.staged.attendance.len()) as u64)
    }

    async fn delete_attendance_for_user(&mut self, user_id: &str) -> Result<u64> {
        self.record_write()?;
        let before = self.staged.attendance.len();
        self.staged.attendance.retain(|_, a| a.user_id != user_id);
        Ok((before - self.staged.attendance.len()) as u64)
    }

    async fn delete_organization(&mut self, id: &str) -> Result<()> {
        self.record_write()?;
        self.staged.organizations.remove(id);
        Ok(())
    }

    async fn delete_user(&mut self, id: &str) -> Result<()> {
        self.record_write()?;
        self.staged.users.remove(id);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let mut shared = self.shared.lock().unwrap();
        if shared.version != self.base_version {
            // Another commit or direct write landed since begin; swapping in
            // this snapshot would erase it. Transient, so callers retry.
            return Err(Error::Database(DatabaseError::Transaction(
                "write conflict: state changed since the transaction began".to_string(),
            )));
        }
        let mut staged = self.staged;
        staged.version += 1;
        *shared = staged;
        Ok(())
    }

    async fn abort(self: Box<Self>) -> Result<()> {
        // Staged state is simply dropped.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CreateUser;

    fn user(email: &str) -> CreateUser {
        CreateUser {
            email: email.to_string(),
            name: "Test".to_string(),
            password_hash: "x".to_string(),
            image: None,
        }
    }

    #[tokio::test]
    async fn commit_makes_staged_writes_visible() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let created = tx.insert_user(user("a@example.com")).await.unwrap();
        // Not visible until commit.
        assert!(store.get_user(&created.id).await.unwrap().is_none());
        tx.commit().await.unwrap();
        assert!(store.get_user(&created.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn abort_discards_staged_writes() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let created = tx.insert_user(user("b@example.com")).await.unwrap();
        tx.abort().await.unwrap();
        assert!(store.get_user(&created.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_email_is_a_constraint_violation() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.insert_user(user("c@example.com")).await.unwrap();
        let err = tx.insert_user(user("c@example.com")).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Database(DatabaseError::Constraint(_))
        ));
    }

    #[tokio::test]
    async fn injected_failure_fires_after_write_budget() {
        let store = MemoryStore::new();
        store.fail_after_writes(1);
        let mut tx = store.begin().await.unwrap();
        tx.insert_user(user("d@example.com")).await.unwrap();
        let err = tx.insert_user(user("e@example.com")).await.unwrap_err();
        assert!(err.is_transient());
        // The knob was consumed; a fresh transaction is unaffected.
        let mut tx2 = store.begin().await.unwrap();
        tx2.insert_user(user("f@example.com")).await.unwrap();
        tx2.commit().await.unwrap();
    }

    #[tokio::test]
    async fn overlapping_commit_conflicts_instead_of_losing_writes() {
        let store = MemoryStore::new();
        let mut tx1 = store.begin().await.unwrap();
        let mut tx2 = store.begin().await.unwrap();
        let first = tx1.insert_user(user("g@example.com")).await.unwrap();
        tx2.insert_user(user("h@example.com")).await.unwrap();
        tx1.commit().await.unwrap();

        // tx2's snapshot predates tx1's commit; letting it through would
        // erase tx1's user. It must fail transiently instead.
        let err = tx2.commit().await.unwrap_err();
        assert!(err.is_transient());
        assert!(store.get_user(&first.id).await.unwrap().is_some());

        // A replay against the fresh state succeeds and keeps both rows.
        let mut retry = store.begin().await.unwrap();
        let second = retry.insert_user(user("h@example.com")).await.unwrap();
        retry.commit().await.unwrap();
        assert!(store.get_user(&first.id).await.unwrap().is_some());
        assert!(store.get_user(&second.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn direct_write_invalidates_open_transaction() {
        let store = MemoryStore::new();
        let mut setup = store.begin().await.unwrap();
        let existing = setup.insert_user(user("i@example.com")).await.unwrap();
        setup.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.insert_user(user("j@example.com")).await.unwrap();
        store
            .update_user(
                &existing.id,
                UpdateUser {
                    name: Some("Renamed".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let err = tx.commit().await.unwrap_err();
        assert!(err.is_transient());
        let kept = store.get_user(&existing.id).await.unwrap().unwrap();
        assert_eq!(kept.name, "Renamed");
    }
}
