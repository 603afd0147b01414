//! Core runtime for chronod: schedule compilation, cron evaluation, job
//! execution, and the scheduling worker.
//!
//! This crate depends only on `chronod-types` and the async runtime.
//! The HTTP dashboard surface lives in `chronod-api`.

pub mod engine;
pub mod event;
pub mod job;
pub mod registry;
pub mod schedule;
pub mod worker;

pub use engine::ExecutionEngine;
pub use event::EventBus;
pub use job::{JobConfig, JobContext, JobRecord, schedule, schedule_named};
pub use registry::JobRegistry;
pub use schedule::builder::{cron, daily, every, monthly, weekly};
pub use schedule::evaluator::CronEvaluator;
pub use worker::{OverlapPolicy, ShutdownReport, Worker};
