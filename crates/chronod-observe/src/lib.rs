//! Observability setup for chronod.

pub mod tracing_setup;

pub use tracing_setup::{TracingConfig, init_tracing, shutdown_tracing};
