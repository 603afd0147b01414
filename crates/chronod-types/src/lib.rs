//! Shared domain types for chronod.
//!
//! This crate contains the types that cross module boundaries: compiled
//! schedules, retry settings, execution results, lifecycle events, and
//! their error types.
//!
//! Zero infrastructure dependencies -- only serde, chrono, chrono-tz,
//! thiserror.

pub mod error;
pub mod event;
pub mod execution;
pub mod retry;
pub mod schedule;
