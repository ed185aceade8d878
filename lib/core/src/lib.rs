//! Core domain types for the caseflow orchestration engine.
//!
//! This crate provides the strongly-typed identifiers shared by every other
//! caseflow crate.

pub mod id;

pub use id::{
    DefinitionId, HistoryEntryId, InstanceId, NotificationId, ParseIdError, TaskId, TimerId,
    UserId,
};
