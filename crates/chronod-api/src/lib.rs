//! Dashboard HTTP adapter for chronod.
//!
//! Projects the registry, worker, and event bus into a read-only JSON
//! API plus a server-sent-events stream, and hosts the `CRON_SECRET`
//! verification helper for externally-triggered cron routes.

pub mod config;
pub mod history;
pub mod http;
pub mod state;
pub mod verify;
