//! VolunteerHub service layer.
//!
//! Stateless async functions over an [`volunteerhub_core::AggregateStore`],
//! threaded through a [`ServiceContext`]. Each multi-document mutation runs
//! in a single store transaction and is retried on transient store errors up
//! to the configured bound. The transport layer (HTTP, sessions, request
//! validation) lives outside this crate and supplies already-authenticated
//! user ids.

pub mod attendance;
pub mod authorization;
pub mod context;
pub mod event;
pub mod identity;
pub mod membership;
pub mod organization;
pub mod program;
pub mod user;

pub use context::ServiceContext;
