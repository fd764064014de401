//! Core types and storage for VolunteerHub.
//!
//! This crate holds everything below the service layer: the persisted entity
//! types, the permission catalog, password hashing, invite codes, the error
//! taxonomy, and the [`store::AggregateStore`] abstraction with its in-memory
//! and Postgres implementations.

pub mod config;
pub mod entity;
pub mod error;
pub mod invite;
pub mod password;
pub mod permissions;
pub mod store;
pub mod types;

pub use config::CoreConfig;
pub use entity::{
    Account, Attendance, Event, EventStatus, Member, Organization, Program, Provider, User,
};
pub use error::{DatabaseError, Error, Result};
pub use invite::generate_invite_code;
pub use password::{hash_password, verify_password};
pub use permissions::{Permission, Role};
pub use store::{AggregateStore, MemoryStore, StoreTransaction};
#[cfg(feature = "sqlx-postgres")]
pub use store::PgStore;
