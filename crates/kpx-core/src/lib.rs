//! # kpx-core
//!
//! Core types, ID prefixes, and error types for Kutplix.
//!
//! This crate provides the foundational types shared across all Kutplix crates:
//! - Entity structs for grids, grid items, comments, users, and notifications
//! - Status enums with state machine transitions
//! - The authorization policy keyed by role, ownership, and operation
//! - The pure grid transition planner and the outbox events it emits
//! - Cross-cutting error types
//! - HTTP response envelopes

pub mod audit_detail;
pub mod entities;
pub mod enums;
pub mod errors;
pub mod events;
pub mod identity;
pub mod ids;
pub mod policy;
pub mod responses;
pub mod workflow;
